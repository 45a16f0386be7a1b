//! Quality Gate results.

use serde::{Deserialize, Serialize};

/// One failing check, attributed to a page when attribution is possible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFailure {
    /// Page slug, when the failure could be tied to one.
    pub page: Option<String>,
    pub test: String,
    pub message: String,
}

impl TestFailure {
    pub fn unattributed(message: impl Into<String>) -> Self {
        Self {
            page: None,
            test: String::new(),
            message: message.into(),
        }
    }

    /// Single-line description used in reports and repair prompts.
    pub fn describe(&self) -> String {
        let message = self.message.lines().next().unwrap_or_default().trim();
        match (&self.page, self.test.is_empty()) {
            (Some(page), false) if self.test.starts_with(&format!("[{page}]")) => {
                format!("{}: {message}", self.test)
            }
            (Some(page), false) => format!("[{page}] {}: {message}", self.test),
            (Some(page), true) => format!("[{page}] {message}"),
            (None, false) => format!("{}: {message}", self.test),
            (None, true) => message.to_string(),
        }
    }
}

/// Output of one Quality Gate attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReport {
    pub passed: bool,
    /// Ordered failure descriptions.
    pub failures: Vec<String>,
    /// Best-effort list of implicated page slugs, deduplicated, in first-seen order.
    pub failing_pages: Vec<String>,
    /// 1-based attempt that produced this report.
    pub attempt: u32,
    pub exit_code: Option<i32>,
}

impl TestReport {
    /// Build a report from classified failures.
    pub fn from_failures(attempt: u32, exit_code: Option<i32>, failures: &[TestFailure]) -> Self {
        let mut failing_pages: Vec<String> = Vec::new();
        for failure in failures {
            if let Some(page) = &failure.page {
                if !failing_pages.contains(page) {
                    failing_pages.push(page.clone());
                }
            }
        }
        let passed = failures.is_empty() && exit_code == Some(0);
        Self {
            passed,
            failures: failures.iter().map(TestFailure::describe).collect(),
            failing_pages,
            attempt,
            exit_code,
        }
    }

    /// A passing report for gates that were skipped by configuration.
    pub fn skipped() -> Self {
        Self {
            passed: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_failures_dedupes_pages() {
        let failures = vec![
            TestFailure {
                page: Some("about".into()),
                test: "has content".into(),
                message: "expected visible\nstack".into(),
            },
            TestFailure {
                page: Some("about".into()),
                test: "no overflow".into(),
                message: "overflow".into(),
            },
            TestFailure::unattributed("boom"),
        ];
        let report = TestReport::from_failures(2, Some(1), &failures);
        assert!(!report.passed);
        assert_eq!(report.failing_pages, vec!["about".to_string()]);
        assert_eq!(report.failures[0], "[about] has content: expected visible");
        assert_eq!(report.failures[2], "boom");
    }

    #[test]
    fn test_describe_does_not_repeat_page_prefix() {
        let failure = TestFailure {
            page: Some("about".into()),
            test: "[about] no placeholder anchors".into(),
            message: "count 2".into(),
        };
        assert_eq!(failure.describe(), "[about] no placeholder anchors: count 2");
    }

    #[test]
    fn test_pass_requires_clean_exit() {
        assert!(TestReport::from_failures(1, Some(0), &[]).passed);
        assert!(!TestReport::from_failures(1, Some(1), &[]).passed);
        assert!(!TestReport::from_failures(1, None, &[]).passed);
    }
}
