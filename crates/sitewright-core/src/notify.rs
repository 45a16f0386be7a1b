//! Notify phase collaborator.
//!
//! Notification is advisory: the orchestrator logs a failed notification
//! and still reports the build's real status.

use async_trait::async_trait;
use tracing::info;

use crate::domain::error::Result;
use crate::domain::state::BuildOutcome;

/// Delivers the terminal build summary somewhere.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, outcome: &BuildOutcome) -> Result<()>;
}

/// Writes the summary to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, outcome: &BuildOutcome) -> Result<()> {
        info!(
            event = "build.notified",
            build_id = %outcome.build_id,
            status = ?outcome.status,
            live_url = ?outcome.live_url,
            repository = ?outcome.repository,
            residual_failures = outcome.residual_failures().len(),
            "Build summary"
        );
        Ok(())
    }
}
