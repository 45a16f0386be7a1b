//! Source-hosting collaborator seam.
//!
//! The core only needs two things from hosting: somewhere on disk to write
//! the site (a [`RepoHandle`] with a checkout directory) and a way to ship
//! that directory (a [`DeployReceipt`] with the live URL). Implementations
//! live in `sitewright-publish`; [`crate::fakes::MemoryPublisher`] serves
//! tests.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::error::Result;
use crate::domain::request::ClientRequest;

/// A repository (or plain directory) that receives the generated site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoHandle {
    pub name: String,
    pub owner: Option<String>,
    /// Local working copy; every page file is written here.
    pub checkout: PathBuf,
    pub remote_url: Option<String>,
    /// Public URL the site will be served from, when known up front.
    pub live_url: Option<String>,
}

impl RepoHandle {
    /// A directory-only handle with no remote.
    pub fn local(name: impl Into<String>, checkout: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            owner: None,
            checkout: checkout.into(),
            remote_url: None,
            live_url: None,
        }
    }

    /// `owner/name` when an owner is known, otherwise the checkout path.
    pub fn reference(&self) -> String {
        match (&self.owner, &self.remote_url) {
            (Some(owner), _) => format!("{owner}/{}", self.name),
            (None, Some(url)) => url.clone(),
            (None, None) => self.checkout.display().to_string(),
        }
    }
}

/// Result of a successful deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployReceipt {
    pub live_url: String,
    /// Commit identifier, for git-backed publishers.
    pub commit: Option<String>,
    /// Files shipped, relative to the checkout.
    pub files: Vec<String>,
}

/// Repository creation and deployment.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Name for logs.
    fn name(&self) -> &str;

    /// Create (or reuse) the repository for this client and return a handle
    /// whose checkout directory exists.
    async fn create_repository(&self, request: &ClientRequest) -> Result<RepoHandle>;

    /// Commit and publish `files` from the checkout.
    async fn deploy(&self, repo: &RepoHandle, files: &[String], message: &str)
        -> Result<DeployReceipt>;
}
