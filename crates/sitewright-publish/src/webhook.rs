//! Webhook notifier.
//!
//! POSTs the [`BuildOutcome`] as JSON. Any non-2xx response is an error,
//! which the orchestrator logs and otherwise ignores.

use std::time::Duration;

use async_trait::async_trait;
use sitewright_core::{BuildOutcome, Notifier};
use tracing::{debug, instrument};

use crate::error::{PublishError, Result};

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Sends build outcomes to an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    url: String,
    http_client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let url = url.into();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(PublishError::Http(format!("invalid webhook URL: {url}")));
        }
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("sitewright/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { url, http_client })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, outcome: &BuildOutcome) -> Result<()> {
        let response = self
            .http_client
            .post(&self.url)
            .json(outcome)
            .send()
            .await?
            .error_for_status()?;
        debug!(status = %response.status(), "Webhook delivered");
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    #[instrument(skip_all, fields(build_id = %outcome.build_id))]
    async fn notify(&self, outcome: &BuildOutcome) -> sitewright_core::Result<()> {
        Ok(self.post(outcome).await?)
    }
}
