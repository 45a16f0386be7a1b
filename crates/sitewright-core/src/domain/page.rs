//! Generated page artifacts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::blueprint::page_filename;
use crate::markup::PageDocument;

/// How a page's current content came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Generated,
    Fallback,
    Fixed,
}

impl std::fmt::Display for PageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PageStatus::Generated => "generated",
            PageStatus::Fallback => "fallback",
            PageStatus::Fixed => "fixed",
        };
        write!(f, "{s}")
    }
}

/// One page of the site, backed by exactly one file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageArtifact {
    pub slug: String,
    pub filename: String,
    pub document: PageDocument,
    pub byte_size: usize,
    pub status: PageStatus,
    /// SHA-256 hex digest of the rendered markup.
    pub digest: String,
}

impl PageArtifact {
    pub fn new(slug: impl Into<String>, document: PageDocument, status: PageStatus) -> Self {
        let slug = slug.into();
        let rendered = document.render();
        Self {
            filename: page_filename(&slug),
            slug,
            byte_size: rendered.len(),
            digest: content_digest(rendered.as_bytes()),
            document,
            status,
        }
    }

    /// Replace the document and refresh size and digest.
    pub fn update(&mut self, document: PageDocument, status: PageStatus) {
        let rendered = document.render();
        self.byte_size = rendered.len();
        self.digest = content_digest(rendered.as_bytes());
        self.document = document;
        self.status = status;
    }

    pub fn render(&self) -> String {
        self.document.render()
    }

    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(&self.filename)
    }

    /// Write the rendered page to `dir`, replacing any existing file.
    pub async fn write_to(&self, dir: &Path) -> std::io::Result<()> {
        tokio::fs::write(self.path_in(dir), self.render()).await
    }
}

/// SHA-256 hex digest of `data`.
pub fn content_digest(data: &[u8]) -> String {
    use sha2::Digest;
    let mut hasher = sha2::Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
