//! Core types for the inference backend abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::inference::error::InferenceError;

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single role-tagged message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// One completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Model identifier; empty means the backend default.
    pub model: String,
    /// Free-form tag used for logging and by scripted backends (e.g.
    /// `council.propose`, `page.generate:about`).
    pub purpose: String,
}

impl CompletionRequest {
    pub fn new(purpose: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            messages,
            temperature: 0.7,
            max_tokens: 4096,
            model: String::new(),
            purpose: purpose.into(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Trait for LLM completion backends (HTTP endpoint, scripted fake, ...).
///
/// Backends perform exactly one request per call; retries belong to
/// [`crate::inference::InferenceClient`].
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Return the raw completion text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, InferenceError>;
}
