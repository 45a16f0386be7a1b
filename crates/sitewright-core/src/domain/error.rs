//! Build-level error taxonomy for Sitewright.

use crate::inference::InferenceError;
use crate::runner::RunnerError;

/// How the orchestrator must treat an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Abort the build immediately.
    Fatal,
    /// May be retried; escalates to fatal once retries are exhausted.
    Transient,
    /// Replace the affected artifact with a fallback and continue.
    Degradable,
    /// Log only.
    Advisory,
}

/// Sitewright build errors.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing credential: environment variable {0} is not set")]
    MissingCredential(String),

    #[error("blueprint has no pages")]
    EmptyBlueprint,

    #[error("design system response is missing required key: {0}")]
    MissingDesignKey(String),

    #[error("inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("process error: {0}")]
    Process(#[from] RunnerError),

    #[error("publish error: {0}")]
    Publish(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("build cancelled")]
    Cancelled,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// Classify this error per the build error policy.
    pub fn class(&self) -> ErrorClass {
        match self {
            BuildError::MissingCredential(_)
            | BuildError::EmptyBlueprint
            | BuildError::MissingDesignKey(_)
            | BuildError::Config(_)
            | BuildError::Cancelled => ErrorClass::Fatal,
            BuildError::Inference(e) if e.is_retryable() => ErrorClass::Transient,
            BuildError::Inference(InferenceError::MissingCredential(_)) => ErrorClass::Fatal,
            BuildError::Inference(_) => ErrorClass::Degradable,
            BuildError::Process(RunnerError::Timeout { .. }) => ErrorClass::Transient,
            BuildError::Process(_) => ErrorClass::Fatal,
            BuildError::Publish(_) | BuildError::Serialization(_) | BuildError::Io(_) => {
                ErrorClass::Fatal
            }
        }
    }

    /// Whether this error indicates a timeout rather than a semantic failure.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            BuildError::Inference(InferenceError::Timeout { .. })
                | BuildError::Process(RunnerError::Timeout { .. })
        )
    }
}

/// Result type for Sitewright build operations.
pub type Result<T> = std::result::Result<T, BuildError>;
