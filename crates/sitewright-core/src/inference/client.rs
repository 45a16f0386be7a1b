//! Retrying inference client.
//!
//! Wraps an [`InferenceBackend`] with:
//! - linear backoff retries for transient failures (`attempt × backoff_unit`)
//! - code-fence stripping on every response
//! - JSON / HTML extraction helpers

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::inference::error::InferenceError;
use crate::inference::extract::{extract_json, strip_code_fences};
use crate::inference::types::{CompletionRequest, InferenceBackend};

/// Retry policy for inference requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries beyond the first attempt.
    pub max_retries: u32,
    /// Wait before retry `n` is `n × backoff_unit`.
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_unit: Duration::from_secs(2),
        }
    }
}

/// Cloneable handle to a backend plus retry policy.
#[derive(Clone)]
pub struct InferenceClient {
    backend: Arc<dyn InferenceBackend>,
    policy: RetryPolicy,
    default_model: String,
}

impl std::fmt::Debug for InferenceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceClient")
            .field("backend", &self.backend.name())
            .field("policy", &self.policy)
            .field("default_model", &self.default_model)
            .finish()
    }
}

impl InferenceClient {
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self {
            backend,
            policy: RetryPolicy::default(),
            default_model: String::new(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Model applied to requests that do not name one.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run a completion with retries and return fence-stripped text.
    pub async fn complete(&self, request: &CompletionRequest) -> Result<String, InferenceError> {
        let mut request = request.clone();
        if request.model.is_empty() {
            request.model = self.default_model.clone();
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            debug!(
                provider = self.backend.name(),
                purpose = %request.purpose,
                attempt = attempt,
                "Invoking inference backend"
            );

            let result = self.backend.complete(&request).await.and_then(|text| {
                if text.trim().is_empty() {
                    Err(InferenceError::EmptyResponse)
                } else {
                    Ok(text)
                }
            });

            match result {
                Ok(text) => return Ok(strip_code_fences(&text)),
                Err(e) if e.is_retryable() && attempt <= self.policy.max_retries => {
                    let backoff = self.policy.backoff_unit * attempt;
                    warn!(
                        provider = self.backend.name(),
                        purpose = %request.purpose,
                        attempt = attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Inference request failed, will retry"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Complete and parse the outermost JSON object.
    pub async fn complete_json(&self, request: &CompletionRequest) -> Result<Value, InferenceError> {
        let text = self.complete(request).await?;
        extract_json(&text)
    }
}
