//! Test-run result classification.
//!
//! Two sources, in order of preference:
//! 1. the structured JSON results file written by the test runner, where
//!    every failing spec carries its file (`tests/<slug>.spec.js`) and title
//!    (`[<slug>] ...`)
//! 2. the combined stdout/stderr, scanned line by line for known failure
//!    signatures
//!
//! Page attribution is best-effort. Only slugs present in the site are ever
//! reported; anything else is left unattributed.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::domain::report::TestFailure;
use crate::quality::suite::slug_of_spec_file;

fn ansi_pattern() -> &'static Regex {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    ANSI.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("Invalid ANSI regex"))
}

fn title_slug_pattern() -> &'static Regex {
    static TITLE: OnceLock<Regex> = OnceLock::new();
    TITLE.get_or_init(|| Regex::new(r"\[([a-z0-9][a-z0-9_-]*)\]").expect("Invalid title regex"))
}

fn page_field_pattern() -> &'static Regex {
    static PAGE: OnceLock<Regex> = OnceLock::new();
    PAGE.get_or_init(|| Regex::new(r"\bpage=([A-Za-z0-9_-]+)").expect("Invalid page regex"))
}

fn spec_file_pattern() -> &'static Regex {
    static SPEC: OnceLock<Regex> = OnceLock::new();
    SPEC.get_or_init(|| {
        Regex::new(r"([A-Za-z0-9_.-]+\.spec\.js)").expect("Invalid spec file regex")
    })
}

/// Per-test lines the list reporter prints for passing tests.
fn passed_pattern() -> &'static Regex {
    static PASSED: OnceLock<Regex> = OnceLock::new();
    PASSED.get_or_init(|| Regex::new(r"^(?:[✓✔]|ok\b)").expect("Invalid pass marker regex"))
}

fn heading_pattern() -> &'static Regex {
    static HEADING: OnceLock<Regex> = OnceLock::new();
    HEADING.get_or_init(|| {
        Regex::new(r"^\s*\d+\)\s+.*\.spec\.js").expect("Invalid failure heading regex")
    })
}

fn signature_pattern() -> &'static Regex {
    static SIGNATURE: OnceLock<Regex> = OnceLock::new();
    SIGNATURE.get_or_init(|| {
        Regex::new(
            r"(A11Y_VIOLATION page=|PLACEHOLDER_ANCHOR page=|OVERFLOW page=|^\s*(?:\w*Error|Error):|^\s*Expected\b|^\s*Received\b|^\s*[✘×]\s)",
        )
        .expect("Invalid failure signature regex")
    })
}

/// Remove terminal color codes.
pub fn strip_ansi(text: &str) -> String {
    ansi_pattern().replace_all(text, "").into_owned()
}

/// Page implicated by a spec file name or test title, if it is a known slug.
fn attribute(file: Option<&str>, title: &str, known: &[String]) -> Option<String> {
    let is_known = |slug: &str| known.iter().any(|k| k == slug);

    if let Some(slug) = file.and_then(slug_of_spec_file) {
        if is_known(slug) {
            return Some(slug.to_string());
        }
    }
    title_slug_pattern()
        .captures_iter(title)
        .map(|c| c[1].to_string())
        .find(|slug| is_known(slug))
}

/// Failures from a Playwright-style JSON report.
///
/// Returns `None` when `raw` is not a JSON report at all, so the caller can
/// fall back to the text scan.
pub fn parse_results_json(raw: &str, known: &[String]) -> Option<Vec<TestFailure>> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let suites = value.get("suites")?.as_array()?;

    let mut failures = Vec::new();
    for suite in suites {
        collect_suite(suite, None, known, &mut failures);
    }
    if let Some(errors) = value.get("errors").and_then(Value::as_array) {
        for error in errors {
            if let Some(message) = error_message(error) {
                failures.push(TestFailure::unattributed(message));
            }
        }
    }
    Some(failures)
}

fn collect_suite(suite: &Value, file: Option<&str>, known: &[String], out: &mut Vec<TestFailure>) {
    let file = suite.get("file").and_then(Value::as_str).or(file);

    for spec in suite.get("specs").and_then(Value::as_array).into_iter().flatten() {
        if spec.get("ok").and_then(Value::as_bool) != Some(false) {
            continue;
        }
        let title = spec.get("title").and_then(Value::as_str).unwrap_or_default();
        let spec_file = spec.get("file").and_then(Value::as_str).or(file);
        let message = spec
            .get("tests")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .flat_map(|t| t.get("results").and_then(Value::as_array).into_iter().flatten())
            .find_map(|r| r.get("error").and_then(error_message))
            .unwrap_or_else(|| "test failed".to_string());

        out.push(TestFailure {
            page: attribute(spec_file, title, known),
            test: title.to_string(),
            message,
        });
    }

    for child in suite.get("suites").and_then(Value::as_array).into_iter().flatten() {
        collect_suite(child, file, known, out);
    }
}

fn error_message(error: &Value) -> Option<String> {
    let message = error.get("message").and_then(Value::as_str)?;
    let first = strip_ansi(message)
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())?
        .to_string();
    Some(first)
}

/// Failures found by scanning raw output for known signatures.
///
/// Numbered failure headings (`1) ... tests/about.spec.js ...`) open a
/// block; signature lines inside the block are attributed to the block's
/// page unless they name a page themselves.
pub fn scan_output(output: &str, known: &[String]) -> Vec<TestFailure> {
    let mut failures: Vec<TestFailure> = Vec::new();
    let mut current_page: Option<String> = None;

    for line in strip_ansi(output).lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || passed_pattern().is_match(trimmed) {
            continue;
        }

        let named = page_field_pattern()
            .captures(trimmed)
            .map(|c| c[1].to_string())
            .filter(|slug| known.contains(slug))
            .or_else(|| {
                let file = spec_file_pattern().captures(trimmed).map(|c| c[1].to_string());
                attribute(file.as_deref(), trimmed, known)
            });

        if heading_pattern().is_match(trimmed) {
            current_page = named.clone();
            push_unique(&mut failures, named, trimmed);
            continue;
        }
        if signature_pattern().is_match(trimmed) {
            let page = named.or_else(|| current_page.clone());
            push_unique(&mut failures, page, trimmed);
        }
    }
    failures
}

fn push_unique(failures: &mut Vec<TestFailure>, page: Option<String>, line: &str) {
    let failure = TestFailure {
        page,
        test: String::new(),
        message: line.to_string(),
    };
    if !failures.contains(&failure) {
        failures.push(failure);
    }
}

/// Classify one test run.
///
/// Structured results win when present. With no structured failures and a
/// non-zero exit, the raw output is scanned; if that also finds nothing,
/// a single unattributed failure records the exit code.
pub fn classify(
    exit_code: Option<i32>,
    output: &str,
    results_json: Option<&str>,
    known: &[String],
) -> Vec<TestFailure> {
    let structured = results_json.and_then(|raw| parse_results_json(raw, known));
    let clean_exit = exit_code == Some(0);

    let mut failures = match structured {
        Some(failures) if !failures.is_empty() || clean_exit => failures,
        _ => scan_output(output, known),
    };

    if failures.is_empty() && !clean_exit {
        let code = exit_code.map_or_else(|| "a signal".to_string(), |c| format!("code {c}"));
        failures.push(TestFailure::unattributed(format!("test runner exited with {code}")));
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn known() -> Vec<String> {
        vec!["index".to_string(), "about".to_string(), "contact".to_string()]
    }

    fn report() -> String {
        json!({
            "suites": [
                {
                    "title": "about.spec.js",
                    "file": "about.spec.js",
                    "specs": [
                        {"title": "[about] has visible content", "ok": true, "tests": []},
                        {"title": "[about] no critical accessibility violations", "ok": false,
                         "tests": [{"results": [{"status": "failed",
                            "error": {"message": "\u{1b}[31mError: expect(received).toEqual(expected)\u{1b}[39m\n\nExpected: []"}}]}]}
                    ]
                },
                {
                    "title": "site.integration.spec.js",
                    "file": "site.integration.spec.js",
                    "specs": [],
                    "suites": [{
                        "title": "site",
                        "specs": [
                            {"title": "[contact] internal links resolve", "ok": false, "tests": []},
                            {"title": "[pricing] internal links resolve", "ok": false, "tests": []}
                        ]
                    }]
                }
            ],
            "errors": []
        })
        .to_string()
    }

    #[test]
    fn test_structured_results_attribute_pages() {
        let failures = parse_results_json(&report(), &known()).unwrap();
        assert_eq!(failures.len(), 3);
        assert_eq!(failures[0].page.as_deref(), Some("about"));
        assert_eq!(failures[0].message, "Error: expect(received).toEqual(expected)");
        assert_eq!(failures[1].page.as_deref(), Some("contact"));
        assert_eq!(failures[2].page, None);
    }

    #[test]
    fn test_non_report_json_is_none() {
        assert!(parse_results_json("not json", &known()).is_none());
        assert!(parse_results_json("{\"x\": 1}", &known()).is_none());
    }

    #[test]
    fn test_scan_output_blocks() {
        let output = "\
Running 12 tests using 1 worker
  ✓  1 [chromium] › tests/index.spec.js:4:3 › [index] has visible content (120ms)

  1) [chromium] › tests/about.spec.js:20:3 › [about] no horizontal overflow on mobile

    Error: expect(received).toBeLessThanOrEqual(expected)
    Expected: <= 375
    Received:    412

A11Y_VIOLATION page=contact rule=color-contrast impact=serious nodes=3
";
        let failures = scan_output(output, &known());
        assert!(failures.iter().all(|f| f.page.is_some()));
        let pages: Vec<_> = failures.iter().filter_map(|f| f.page.as_deref()).collect();
        assert!(pages.contains(&"about"));
        assert!(pages.contains(&"contact"));
        assert!(!pages.contains(&"index"));
        assert!(failures.iter().any(|f| f.message.starts_with("Received:")));
    }

    #[test]
    fn test_unknown_page_names_stay_unattributed() {
        let failures = scan_output("PLACEHOLDER_ANCHOR page=pricing count=2", &known());
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].page, None);
    }

    #[test]
    fn test_classify_prefers_structured() {
        let failures = classify(Some(1), "Error: noise", Some(&report()), &known());
        assert_eq!(failures.len(), 3);
    }

    #[test]
    fn test_classify_clean_run_passes() {
        let clean = json!({"suites": [], "errors": []}).to_string();
        assert!(classify(Some(0), "", Some(&clean), &known()).is_empty());
        assert!(classify(Some(0), "  12 passed (4.2s)", None, &known()).is_empty());
    }

    #[test]
    fn test_passing_lines_are_not_failures() {
        let clean = "\
Running 8 tests using 1 worker
  ✓  1 [chromium] › tests/index.spec.js:12:3 › [index] no horizontal overflow on mobile (210ms)
  ✓  2 [chromium] › tests/about.spec.js:12:3 › [about] no horizontal overflow on mobile (190ms)
  ✔  3 [chromium] › tests/about.spec.js:22:3 › [about] no critical accessibility violations (900ms)
  ok 4 [chromium] › tests/contact.spec.js:4:3 › [contact] has visible content (80ms)

  8 passed (4.1s)
";
        assert!(classify(Some(0), clean, None, &known()).is_empty());

        let failing = "\
Running 8 tests using 1 worker
  ✓  1 [chromium] › tests/index.spec.js:12:3 › [index] no horizontal overflow on mobile (210ms)
  ✘  2 [chromium] › tests/about.spec.js:12:3 › [about] no horizontal overflow on mobile (190ms)
OVERFLOW page=about scrollWidth=412 viewport=375

  1) [chromium] › tests/about.spec.js:12:3 › [about] no horizontal overflow on mobile

    Error: expect(received).toBeLessThanOrEqual(expected)

  1 failed
  7 passed (4.3s)
";
        let failures = classify(Some(1), failing, None, &known());
        assert!(!failures.is_empty());
        assert!(failures.iter().all(|f| f.page.as_deref() == Some("about")));
    }

    #[test]
    fn test_classify_nonzero_exit_without_signatures() {
        let failures = classify(Some(2), "something odd happened", None, &known());
        assert_eq!(failures, vec![TestFailure::unattributed("test runner exited with code 2")]);
    }
}
