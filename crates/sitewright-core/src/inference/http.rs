//! OpenAI-compatible chat-completions backend.
//!
//! Performs one HTTP request per call. Timeouts surface as
//! [`InferenceError::Timeout`], 401/403 as [`InferenceError::Unauthorized`],
//! any other non-2xx as [`InferenceError::Status`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::InferenceConfig;
use crate::inference::error::{excerpt, InferenceError};
use crate::inference::types::{CompletionRequest, InferenceBackend, Message, Role};

/// Default connect timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP backend for any endpoint speaking the chat-completions protocol.
#[derive(Clone)]
pub struct OpenAiCompatibleBackend {
    client: Client,
    base_url: String,
    api_key: String,
    default_model: String,
    timeout: Duration,
}

impl std::fmt::Debug for OpenAiCompatibleBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleBackend")
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl OpenAiCompatibleBackend {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        default_model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, InferenceError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| InferenceError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            default_model: default_model.into(),
            timeout,
        })
    }

    /// Build from configuration, reading the API key from the configured
    /// environment variable.
    ///
    /// Fails with [`InferenceError::MissingCredential`] before any request
    /// is attempted when the variable is unset or empty.
    pub fn from_config(config: &InferenceConfig) -> Result<Self, InferenceError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| InferenceError::MissingCredential(config.api_key_env.clone()))?;

        Self::new(
            api_key,
            config.base_url.clone(),
            config.model.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{base}/chat/completions")
        }
    }

    fn convert_messages(messages: &[Message]) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|msg| ChatMessage {
                role: match msg.role {
                    Role::System => "system".to_string(),
                    Role::User => "user".to_string(),
                    Role::Assistant => "assistant".to_string(),
                },
                content: msg.content.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl InferenceBackend for OpenAiCompatibleBackend {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, InferenceError> {
        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model.clone()
        };

        debug!(
            model = %model,
            purpose = %request.purpose,
            max_tokens = request.max_tokens,
            temperature = request.temperature,
            timeout_secs = self.timeout.as_secs(),
            "Sending chat completion request"
        );

        let body = ChatRequest {
            model,
            messages: Self::convert_messages(&request.messages),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout {
                        duration: self.timeout,
                    }
                } else {
                    InferenceError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    InferenceError::Unauthorized(format!("HTTP {status}"))
                }
                _ => InferenceError::Status {
                    status: status.as_u16(),
                    body: excerpt(&text),
                },
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout {
                    duration: self.timeout,
                }
            } else {
                InferenceError::Transport(format!("failed to decode completion: {e}"))
            }
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(InferenceError::EmptyResponse)
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}
