//! Error types for sitewright-publish

use sitewright_core::{BuildError, RunnerError};
use thiserror::Error;

/// Errors from creating repositories, deploying, or notifying.
#[derive(Error, Debug)]
pub enum PublishError {
    /// The command could not be run at all
    #[error("{step}: {source}")]
    Runner {
        step: &'static str,
        #[source]
        source: RunnerError,
    },

    /// The command ran and exited non-zero
    #[error("{step} failed ({command}, exit {exit_code:?}): {output}")]
    CommandFailed {
        step: &'static str,
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    /// No repository owner configured and none could be discovered
    #[error("no repository owner configured and `gh api user` returned none")]
    OwnerUnknown,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error (for webhooks)
    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for PublishError {
    fn from(err: reqwest::Error) -> Self {
        PublishError::Http(err.to_string())
    }
}

impl From<PublishError> for BuildError {
    fn from(err: PublishError) -> Self {
        BuildError::Publish(err.to_string())
    }
}

/// Result type for publish operations
pub type Result<T> = std::result::Result<T, PublishError>;
