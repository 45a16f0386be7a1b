//! Error types for the inference layer.

use std::time::Duration;

/// Longest excerpt of model output carried by an extraction error.
pub const EXCERPT_CHARS: usize = 200;

/// Errors produced by inference backends and the client wrapper.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("missing credential: environment variable {0} is not set")]
    MissingCredential(String),

    #[error("inference request timed out after {}s", duration.as_secs())]
    Timeout { duration: Duration },

    #[error("inference endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("inference endpoint rejected credentials: {0}")]
    Unauthorized(String),

    #[error("inference transport error: {0}")]
    Transport(String),

    #[error("inference endpoint returned an empty completion")]
    EmptyResponse,

    #[error("could not extract {kind} from model output ({reason}); excerpt: {excerpt:?}")]
    Extraction {
        kind: &'static str,
        reason: String,
        excerpt: String,
    },
}

impl InferenceError {
    /// Whether the client should retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            InferenceError::Timeout { .. }
                | InferenceError::Status { .. }
                | InferenceError::Transport(_)
                | InferenceError::EmptyResponse
        )
    }

    /// Build an extraction error carrying a bounded excerpt of `text`.
    pub fn extraction(kind: &'static str, reason: impl Into<String>, text: &str) -> Self {
        InferenceError::Extraction {
            kind,
            reason: reason.into(),
            excerpt: excerpt(text),
        }
    }
}

/// First [`EXCERPT_CHARS`] characters of `text`, with an ellipsis when cut.
pub fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    let mut out: String = trimmed.chars().take(EXCERPT_CHARS).collect();
    if trimmed.chars().count() > EXCERPT_CHARS {
        out.push('…');
    }
    out
}
