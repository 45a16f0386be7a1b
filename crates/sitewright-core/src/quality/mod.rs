//! Quality Gate.
//!
//! ```text
//! Setup -> Run -> Pass
//!            \-> Fail -> Repair -> Run ...   (at most max_fix_attempts runs)
//! ```
//!
//! Exhausting the attempts is not an error: the gate ends `Degraded` with
//! the last report and the build still deploys. Only cancellation makes
//! [`QualityGate::run`] return `Err`.
//!
//! Repairs touch only the pages named by the last run's failures, or every
//! page when the failures could not be attributed. Each repair rewrites a
//! single file and repairs run one at a time.

pub mod repair;
pub mod results;
pub mod suite;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::cancel::CancellationToken;
use crate::config::QualityConfig;
use crate::domain::blueprint::{slug_from_filename, Blueprint, ColorTokens, PageSpec, TypographyTokens};
use crate::domain::error::Result;
use crate::domain::page::{PageArtifact, PageStatus};
use crate::domain::report::{TestFailure, TestReport};
use crate::events::{BuildEvent, EventSink};
use crate::inference::InferenceClient;
use crate::markup::PageDocument;
use crate::obs;
use crate::runner::{CommandSpec, ProcessRunner, RunnerError};

pub use repair::{failure_summary, PageRepairer, RepairRejected};
pub use results::{classify, parse_results_json, scan_output};

/// How the gate ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityStatus {
    Passed,
    /// Attempts exhausted or the test tooling was unavailable.
    Degraded,
    /// Disabled by configuration.
    Skipped,
}

impl std::fmt::Display for QualityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QualityStatus::Passed => "passed",
            QualityStatus::Degraded => "degraded",
            QualityStatus::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

/// Terminal result of the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityOutcome {
    pub status: QualityStatus,
    /// Report from the last run.
    pub report: TestReport,
    /// Number of test runs performed.
    pub attempts: u32,
    /// Slugs whose repair was accepted at least once.
    pub repaired: Vec<String>,
}

impl QualityOutcome {
    fn skipped() -> Self {
        Self {
            status: QualityStatus::Skipped,
            report: TestReport::skipped(),
            attempts: 0,
            repaired: Vec::new(),
        }
    }

    fn degraded(report: TestReport, attempts: u32, repaired: Vec<String>) -> Self {
        Self {
            status: QualityStatus::Degraded,
            report,
            attempts,
            repaired,
        }
    }
}

/// Result of one Run step.
struct RunResult {
    report: TestReport,
    failures: Vec<TestFailure>,
    /// The test command could not be started at all.
    tool_missing: bool,
}

/// Bounded test-and-repair loop over a built site directory.
pub struct QualityGate {
    runner: Arc<dyn ProcessRunner>,
    repairer: PageRepairer,
    config: QualityConfig,
    events: EventSink,
    cancel: CancellationToken,
}

impl QualityGate {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        client: InferenceClient,
        config: QualityConfig,
        max_tokens: u32,
    ) -> Self {
        let repairer = PageRepairer::new(
            client,
            config.repair_temperature,
            max_tokens,
            config.max_failure_lines,
        );
        Self {
            runner,
            repairer,
            config,
            events: EventSink::disabled(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the gate. `pages` are updated in place when repairs are accepted.
    #[instrument(skip_all, fields(site = %site_dir.display(), max_attempts = self.config.max_fix_attempts))]
    pub async fn run(
        &self,
        blueprint: &Blueprint,
        site_dir: &Path,
        qa_dir: &Path,
        pages: &mut [PageArtifact],
    ) -> Result<QualityOutcome> {
        if !self.config.enabled {
            info!("Quality gate disabled by configuration");
            return Ok(QualityOutcome::skipped());
        }
        self.cancel.check()?;

        if let Err(failure) = self.setup(blueprint, site_dir, qa_dir).await {
            warn!(error = %failure.message, "Quality gate setup failed; continuing degraded");
            obs::emit_advisory("quality.setup", &failure.message);
            self.events.warn(format!("test setup failed: {}", failure.message));
            let report = TestReport::from_failures(0, None, &[failure]);
            return Ok(QualityOutcome::degraded(report, 0, Vec::new()));
        }

        let max_attempts = self.config.max_fix_attempts.max(1);
        let known: Vec<String> = pages.iter().map(|p| p.slug.clone()).collect();
        let mut repaired: Vec<String> = Vec::new();
        let mut last = TestReport::default();

        for attempt in 1..=max_attempts {
            self.cancel.check()?;
            let run = self.run_once(attempt, qa_dir, &known).await;
            let report = run.report;

            obs::emit_test_attempt(
                attempt,
                report.passed,
                report.failures.len(),
                report.failing_pages.len(),
            );
            self.events.emit(BuildEvent::TestAttempt {
                attempt,
                max_attempts,
                passed: report.passed,
                failure_count: report.failures.len(),
            });

            if report.passed {
                info!(attempt, "Quality gate passed");
                return Ok(QualityOutcome {
                    status: QualityStatus::Passed,
                    report,
                    attempts: attempt,
                    repaired,
                });
            }
            if run.tool_missing {
                warn!("Test runner unavailable; skipping repairs");
                self.events.warn("test runner unavailable; deploying without a passing quality gate");
                return Ok(QualityOutcome::degraded(report, attempt, repaired));
            }
            if attempt == max_attempts {
                last = report;
                break;
            }

            self.cancel.check()?;
            for slug in self
                .repair_round(attempt, &report, &run.failures, site_dir, pages)
                .await
            {
                if !repaired.contains(&slug) {
                    repaired.push(slug);
                }
            }
            last = report;
        }

        warn!(
            attempts = max_attempts,
            failures = last.failures.len(),
            "Quality gate exhausted; continuing with best page set"
        );
        self.events.warn(format!(
            "quality gate still failing after {max_attempts} attempt(s); deploying anyway"
        ));
        Ok(QualityOutcome::degraded(last, max_attempts, repaired))
    }

    async fn setup(
        &self,
        blueprint: &Blueprint,
        site_dir: &Path,
        qa_dir: &Path,
    ) -> std::result::Result<(), TestFailure> {
        let project = qa_dir
            .file_name()
            .map(|n| n.to_string_lossy().trim_end_matches("-qa").to_string())
            .unwrap_or_else(|| "site".to_string());
        suite::materialize(qa_dir, site_dir, &project, blueprint, &self.config)
            .await
            .map_err(|e| TestFailure::unattributed(format!("could not write test project: {e}")))?;

        for argv in &self.config.setup_commands {
            let spec = CommandSpec::new("quality.setup", argv.clone(), self.config.setup_timeout_secs)
                .in_dir(qa_dir);
            match self.runner.run(&spec).await {
                Ok(output) if output.success() => {}
                Ok(output) => {
                    let tail = output.combined().lines().last().unwrap_or_default().to_string();
                    return Err(TestFailure::unattributed(format!(
                        "setup command `{}` exited with {:?}: {tail}",
                        spec.display(),
                        output.exit_code
                    )));
                }
                Err(e) => {
                    return Err(TestFailure::unattributed(format!(
                        "setup command `{}` failed: {e}",
                        spec.display()
                    )))
                }
            }
        }
        Ok(())
    }

    async fn run_once(&self, attempt: u32, qa_dir: &Path, known: &[String]) -> RunResult {
        let results_path = qa_dir.join(&self.config.results_file);
        if let Err(e) = tokio::fs::remove_file(&results_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %results_path.display(), error = %e, "Could not remove stale results file");
            }
        }

        let spec = CommandSpec::new(
            "quality.test",
            self.config.test_command.clone(),
            self.config.timeout_secs,
        )
        .in_dir(qa_dir)
        .with_env("CI", "1");

        match self.runner.run(&spec).await {
            Ok(output) => {
                let structured = tokio::fs::read_to_string(&results_path).await.ok();
                let failures = classify(
                    output.exit_code,
                    &output.combined(),
                    structured.as_deref(),
                    known,
                );
                RunResult {
                    report: TestReport::from_failures(attempt, output.exit_code, &failures),
                    failures,
                    tool_missing: false,
                }
            }
            Err(e) => {
                let tool_missing = e.is_not_found() || matches!(e, RunnerError::EmptyCommand(_));
                let failures = vec![TestFailure::unattributed(e.to_string())];
                RunResult {
                    report: TestReport::from_failures(attempt, None, &failures),
                    failures,
                    tool_missing,
                }
            }
        }
    }

    /// Repair the implicated pages; returns the slugs whose repair was accepted.
    async fn repair_round(
        &self,
        attempt: u32,
        report: &TestReport,
        failures: &[TestFailure],
        site_dir: &Path,
        pages: &mut [PageArtifact],
    ) -> Vec<String> {
        let targets: Vec<usize> = if report.failing_pages.is_empty() {
            (0..pages.len()).collect()
        } else {
            pages
                .iter()
                .enumerate()
                .filter(|(_, p)| report.failing_pages.contains(&p.slug))
                .map(|(i, _)| i)
                .collect()
        };
        info!(
            attempt,
            targets = targets.len(),
            attributed = !report.failing_pages.is_empty(),
            "Repairing pages"
        );

        let mut accepted = Vec::new();
        for index in targets {
            let page = &mut pages[index];
            let ok = match self.repairer.repair(page, failures, site_dir).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(slug = %page.slug, error = %e, "Repair not applied; keeping page");
                    false
                }
            };
            obs::emit_page_fixed(&page.slug, attempt, ok);
            self.events.emit(BuildEvent::PageFixed {
                slug: page.slug.clone(),
                attempt,
                accepted: ok,
            });
            if ok {
                accepted.push(page.slug.clone());
            }
        }
        accepted
    }
}

/// Load an already-built site directory as pages plus a synthetic blueprint.
///
/// Every `*.html` file except `404.html` that parses as a page becomes one
/// page; the page title comes from its `<title>`.
pub async fn load_site(dir: &Path) -> Result<(Blueprint, Vec<PageArtifact>)> {
    let mut paths: Vec<PathBuf> = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|e| e == "html") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut specs = Vec::new();
    let mut pages = Vec::new();
    for path in paths {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let Some(slug) = slug_from_filename(&filename).map(str::to_string) else {
            continue;
        };
        if slug == "404" {
            continue;
        }
        let html = tokio::fs::read_to_string(&path).await?;
        let Some(document) = PageDocument::parse(&html) else {
            warn!(file = %filename, "Skipping file without <head> and <main>");
            continue;
        };
        let title = title_of(&document.head).unwrap_or_else(|| slug.clone());
        specs.push(PageSpec {
            slug: slug.clone(),
            title: title.clone(),
            nav_label: title,
            purpose: String::new(),
            sections: Vec::new(),
            content_guidance: String::new(),
        });
        pages.push(PageArtifact::new(slug, document, PageStatus::Generated));
    }

    // Root first, matching built sites.
    if let Some(pos) = specs.iter().position(|s| s.is_root()) {
        specs[..=pos].rotate_right(1);
        pages[..=pos].rotate_right(1);
    }

    let site_name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "site".to_string());
    let blueprint = Blueprint {
        site_name,
        tagline: String::new(),
        brand_voice: String::new(),
        colors: ColorTokens::default(),
        typography: TypographyTokens::default(),
        pages: specs,
    };
    blueprint.validate()?;
    Ok((blueprint, pages))
}

fn title_of(head: &str) -> Option<String> {
    let lower = head.to_ascii_lowercase();
    let start = lower.find("<title>")? + "<title>".len();
    let end = lower[start..].find("</title>")? + start;
    let title = head[start..end].trim();
    let title = title.split(" | ").next().unwrap_or(title).trim();
    (!title.is_empty()).then(|| title.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{ScriptedBackend, ScriptedOutcome, ScriptedRunner};
    use serde_json::json;

    fn page(slug: &str) -> PageArtifact {
        PageArtifact::new(
            slug,
            PageDocument::new(
                format!("<title>{slug} | Sunrise</title>"),
                "",
                "<nav>n</nav>",
                format!("<main><h1>{slug}</h1></main>"),
                "<footer>f</footer>",
            ),
            PageStatus::Generated,
        )
    }

    fn spec(slug: &str) -> PageSpec {
        PageSpec {
            slug: slug.to_string(),
            title: slug.to_string(),
            nav_label: slug.to_string(),
            purpose: String::new(),
            sections: vec![],
            content_guidance: String::new(),
        }
    }

    struct Site {
        _dir: tempfile::TempDir,
        site: PathBuf,
        qa: PathBuf,
        blueprint: Blueprint,
        pages: Vec<PageArtifact>,
    }

    async fn site() -> Site {
        let dir = tempfile::tempdir().unwrap();
        let site = dir.path().join("sunrise");
        let qa = dir.path().join("sunrise-qa");
        tokio::fs::create_dir_all(&site).await.unwrap();
        let pages = vec![page("index"), page("about")];
        for p in &pages {
            p.write_to(&site).await.unwrap();
        }
        let blueprint = Blueprint {
            site_name: "Sunrise".to_string(),
            tagline: String::new(),
            brand_voice: String::new(),
            colors: ColorTokens::default(),
            typography: TypographyTokens::default(),
            pages: vec![spec("index"), spec("about")],
        };
        Site {
            _dir: dir,
            site,
            qa,
            blueprint,
            pages,
        }
    }

    fn failing_about() -> String {
        json!({"suites": [{"file": "about.spec.js", "specs": [
            {"title": "[about] no placeholder anchors", "ok": false,
             "tests": [{"results": [{"error": {"message": "Error: expected 0, received 2"}}]}]}
        ]}], "errors": []})
        .to_string()
    }

    fn gate(runner: Arc<ScriptedRunner>, backend: Arc<ScriptedBackend>, max: u32) -> QualityGate {
        QualityGate::new(
            runner,
            InferenceClient::new(backend),
            QualityConfig {
                max_fix_attempts: max,
                ..QualityConfig::default()
            },
            1024,
        )
    }

    #[tokio::test]
    async fn test_passes_first_attempt() {
        let mut s = site().await;
        let runner = Arc::new(ScriptedRunner::new());
        let backend = Arc::new(ScriptedBackend::new());

        let outcome = gate(runner.clone(), backend.clone(), 3)
            .run(&s.blueprint, &s.site, &s.qa, &mut s.pages)
            .await
            .unwrap();

        assert_eq!(outcome.status, QualityStatus::Passed);
        assert_eq!(outcome.attempts, 1);
        assert!(backend.calls().is_empty());
        assert_eq!(runner.calls_for("npm install").len(), 1);
        assert!(s.qa.join("tests/about.spec.js").exists());
    }

    #[tokio::test]
    async fn test_repairs_only_attributed_page() {
        let mut s = site().await;
        let index_before = std::fs::read(s.site.join("index.html")).unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.on(
            "npx playwright test",
            ScriptedOutcome::exit(1, "").with_file("test-results/results.json", failing_about()),
        );
        runner.on("npx playwright test", ScriptedOutcome::ok("2 passed"));
        let backend = Arc::new(ScriptedBackend::new());
        backend.always_for("page.repair", "<main><h1>About us</h1></main>");

        let (events, mut rx) = EventSink::channel();
        let outcome = gate(runner, backend.clone(), 3)
            .with_events(events)
            .run(&s.blueprint, &s.site, &s.qa, &mut s.pages)
            .await
            .unwrap();

        assert_eq!(outcome.status, QualityStatus::Passed);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.repaired, vec!["about".to_string()]);
        assert_eq!(backend.calls_for("page.repair:about").len(), 1);
        assert!(backend.calls_for("page.repair:index").is_empty());
        assert_eq!(std::fs::read(s.site.join("index.html")).unwrap(), index_before);
        assert_eq!(s.pages[1].status, PageStatus::Fixed);
        assert_eq!(s.pages[0].status, PageStatus::Generated);

        let events = crate::events::drain(&mut rx);
        assert!(events.iter().any(|e| matches!(e, BuildEvent::PageFixed { slug, accepted: true, .. } if slug == "about")));
    }

    #[tokio::test]
    async fn test_exhaustion_is_degraded_not_error() {
        let mut s = site().await;
        let runner = Arc::new(ScriptedRunner::new());
        runner.on("npx playwright test", ScriptedOutcome::exit(1, "Error: page crashed"));
        let backend = Arc::new(ScriptedBackend::new());
        backend.always_for("page.repair", "<main><h1>Still broken</h1></main>");

        let outcome = gate(runner.clone(), backend.clone(), 3)
            .run(&s.blueprint, &s.site, &s.qa, &mut s.pages)
            .await
            .unwrap();

        assert_eq!(outcome.status, QualityStatus::Degraded);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(runner.calls_for("npx playwright test").len(), 3);
        // unattributed failures repair every page, between runs only
        assert_eq!(backend.calls_for("page.repair").len(), 4);
        assert!(!outcome.report.failures.is_empty());
    }

    #[tokio::test]
    async fn test_missing_tool_degrades_immediately() {
        let mut s = site().await;
        let runner = Arc::new(ScriptedRunner::new());
        runner.on("npx playwright test", ScriptedOutcome::NotFound);
        let backend = Arc::new(ScriptedBackend::new());

        let outcome = gate(runner.clone(), backend.clone(), 3)
            .run(&s.blueprint, &s.site, &s.qa, &mut s.pages)
            .await
            .unwrap();

        assert_eq!(outcome.status, QualityStatus::Degraded);
        assert_eq!(outcome.attempts, 1);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_setup_failure_degrades_without_running() {
        let mut s = site().await;
        let runner = Arc::new(ScriptedRunner::new());
        runner.on("npm install", ScriptedOutcome::exit(1, "npm ERR! network"));

        let outcome = gate(runner.clone(), Arc::new(ScriptedBackend::new()), 3)
            .run(&s.blueprint, &s.site, &s.qa, &mut s.pages)
            .await
            .unwrap();

        assert_eq!(outcome.status, QualityStatus::Degraded);
        assert_eq!(outcome.attempts, 0);
        assert!(runner.calls_for("npx playwright test").is_empty());
        assert!(outcome.report.failures[0].contains("npm ERR! network"));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failed_attempt() {
        let mut s = site().await;
        let runner = Arc::new(ScriptedRunner::new());
        runner.on("npx playwright test", ScriptedOutcome::Timeout);
        runner.on("npx playwright test", ScriptedOutcome::ok(""));
        let backend = Arc::new(ScriptedBackend::new());
        backend.always_for("page.repair", "<main><h1>ok</h1></main>");

        let outcome = gate(runner, backend.clone(), 2)
            .run(&s.blueprint, &s.site, &s.qa, &mut s.pages)
            .await
            .unwrap();

        assert_eq!(outcome.status, QualityStatus::Passed);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(backend.calls_for("page.repair").len(), 2);
    }

    #[tokio::test]
    async fn test_disabled_gate_is_skipped() {
        let mut s = site().await;
        let runner = Arc::new(ScriptedRunner::new());
        let gate = QualityGate::new(
            runner.clone(),
            InferenceClient::new(Arc::new(ScriptedBackend::new())),
            QualityConfig {
                enabled: false,
                ..QualityConfig::default()
            },
            1024,
        );
        let outcome = gate.run(&s.blueprint, &s.site, &s.qa, &mut s.pages).await.unwrap();
        assert_eq!(outcome.status, QualityStatus::Skipped);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_run() {
        let mut s = site().await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = gate(Arc::new(ScriptedRunner::new()), Arc::new(ScriptedBackend::new()), 3)
            .with_cancellation(cancel)
            .run(&s.blueprint, &s.site, &s.qa, &mut s.pages)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::domain::error::BuildError::Cancelled));
    }

    #[tokio::test]
    async fn test_load_site_round_trip() {
        let s = site().await;
        std::fs::write(s.site.join("404.html"), "<html><head></head><body><main>x</main></body></html>").unwrap();
        std::fs::write(s.site.join("notes.html"), "<p>no structure</p>").unwrap();

        let (blueprint, pages) = load_site(&s.site).await.unwrap();
        assert_eq!(blueprint.pages.len(), 2);
        assert_eq!(blueprint.pages[0].slug, "index");
        assert_eq!(blueprint.pages[1].title, "about");
        assert_eq!(pages[1].digest, s.pages[1].digest);
    }
}
