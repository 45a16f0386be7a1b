//! Single-page repair.
//!
//! The page's head, nav, and footer are kept exactly as they are; only the
//! `<main>` fragment is sent to the model and replaced. A response without
//! recognisable markup is rejected and the page is left untouched.

use std::path::Path;

use tracing::{instrument, warn};

use crate::domain::page::{PageArtifact, PageStatus};
use crate::domain::report::TestFailure;
use crate::inference::{CompletionRequest, InferenceClient, Message};
use crate::markup::{contains_content_markup, wrap_fragment};

const REPAIR_SYSTEM: &str = "You fix one page of a static website so that its automated browser \
tests pass. You receive the page's <main> element and the failing checks. Return only the \
corrected <main> element. Keep the content and structure unless a failure requires a change. \
Every link must point at a real page filename, a mailto: address, or an external URL; never use \
href=\"#\". Text must meet WCAG AA contrast and nothing may overflow a 375px wide screen.";

/// Why a repair did not replace the page.
#[derive(Debug, thiserror::Error)]
pub enum RepairRejected {
    #[error("inference failed: {0}")]
    Inference(#[from] crate::inference::InferenceError),

    #[error("response contains no recognisable markup")]
    NoMarkup,

    #[error("failed to write page: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure lines to send for `slug`: its own and unattributed failures
/// first, else everything, capped at `limit`.
pub fn failure_summary(slug: &str, failures: &[TestFailure], limit: usize) -> Vec<String> {
    let relevant: Vec<String> = failures
        .iter()
        .filter(|f| f.page.as_deref().map_or(true, |p| p == slug))
        .map(TestFailure::describe)
        .collect();
    let lines = if relevant.is_empty() {
        failures.iter().map(TestFailure::describe).collect()
    } else {
        relevant
    };
    lines.into_iter().take(limit).collect()
}

/// Repairs pages through the inference client.
#[derive(Debug, Clone)]
pub struct PageRepairer {
    client: InferenceClient,
    temperature: f32,
    max_tokens: u32,
    max_failure_lines: usize,
}

impl PageRepairer {
    pub fn new(client: InferenceClient, temperature: f32, max_tokens: u32, max_failure_lines: usize) -> Self {
        Self {
            client,
            temperature,
            max_tokens,
            max_failure_lines,
        }
    }

    /// Repair `page` in place and rewrite its file in `site_dir`.
    ///
    /// On rejection neither the artifact nor its file changes.
    #[instrument(skip_all, fields(slug = %page.slug))]
    pub async fn repair(
        &self,
        page: &mut PageArtifact,
        failures: &[TestFailure],
        site_dir: &Path,
    ) -> Result<(), RepairRejected> {
        let summary = failure_summary(&page.slug, failures, self.max_failure_lines);
        let messages = vec![
            Message::system(REPAIR_SYSTEM),
            Message::user(format!(
                "Page file: {}\n\nFailing checks:\n{}\n\nCurrent <main> element:\n{}\n\nReturn the corrected <main> element.",
                page.filename,
                summary
                    .iter()
                    .map(|line| format!("- {line}"))
                    .collect::<Vec<_>>()
                    .join("\n"),
                page.document.body,
            )),
        ];
        let request = CompletionRequest::new(format!("page.repair:{}", page.slug), messages)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        let text = self.client.complete(&request).await?;
        if !contains_content_markup(&text) {
            warn!(slug = %page.slug, "Repair response rejected: no markup");
            return Err(RepairRejected::NoMarkup);
        }

        let document = page.document.with_body(wrap_fragment(&text));
        tokio::fs::write(page.path_in(site_dir), document.render()).await?;
        page.update(document, PageStatus::Fixed);
        Ok(())
    }
}
