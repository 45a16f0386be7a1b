//! Directory publisher: no remote, the checkout is the deliverable.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sitewright_core::{ClientRequest, DeployReceipt, Publisher, RepoHandle};
use tracing::info;

use crate::error::{PublishError, Result};

/// Writes each site to `<root>/<repo-slug>/`.
#[derive(Debug, Clone)]
pub struct LocalPublisher {
    root: PathBuf,
}

impl LocalPublisher {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn file_url(dir: &Path) -> String {
        format!("file://{}/", dir.display().to_string().trim_end_matches('/'))
    }

    async fn create(&self, request: &ClientRequest) -> Result<RepoHandle> {
        let name = request.repo_slug();
        let checkout = self.root.join(&name);
        tokio::fs::create_dir_all(&checkout).await?;
        let checkout = tokio::fs::canonicalize(&checkout).await?;
        Ok(RepoHandle {
            live_url: Some(Self::file_url(&checkout)),
            ..RepoHandle::local(name, checkout)
        })
    }

    async fn publish(&self, repo: &RepoHandle, files: &[String]) -> Result<DeployReceipt> {
        for file in files {
            let path = repo.checkout.join(file);
            if !tokio::fs::try_exists(&path).await? {
                return Err(PublishError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} was not written", path.display()),
                )));
            }
        }
        let live_url = repo
            .live_url
            .clone()
            .unwrap_or_else(|| Self::file_url(&repo.checkout));
        info!(dir = %repo.checkout.display(), files = files.len(), "Site written");
        Ok(DeployReceipt {
            live_url,
            commit: None,
            files: files.to_vec(),
        })
    }
}

#[async_trait]
impl Publisher for LocalPublisher {
    fn name(&self) -> &str {
        "local"
    }

    async fn create_repository(
        &self,
        request: &ClientRequest,
    ) -> sitewright_core::Result<RepoHandle> {
        Ok(self.create(request).await?)
    }

    async fn deploy(
        &self,
        repo: &RepoHandle,
        files: &[String],
        _message: &str,
    ) -> sitewright_core::Result<DeployReceipt> {
        Ok(self.publish(repo, files).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ClientRequest {
        ClientRequest::new("Sunrise Bakery", "bakery", "Fresh bread", "hello@sunrise.test")
    }

    #[tokio::test]
    async fn test_create_makes_checkout() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = LocalPublisher::new(dir.path());

        let repo = publisher.create_repository(&request()).await.unwrap();

        assert!(repo.checkout.is_dir());
        assert!(repo.checkout.ends_with("sunrise-bakery"));
        assert!(repo.owner.is_none());
        let url = repo.live_url.unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("sunrise-bakery/"));
    }

    #[tokio::test]
    async fn test_deploy_checks_files_exist() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = LocalPublisher::new(dir.path());
        let repo = publisher.create_repository(&request()).await.unwrap();
        std::fs::write(repo.checkout.join("index.html"), "<html></html>").unwrap();

        let receipt = publisher
            .deploy(&repo, &["index.html".to_string()], "Deploy")
            .await
            .unwrap();
        assert_eq!(Some(receipt.live_url), repo.live_url);
        assert!(receipt.commit.is_none());

        let err = publisher
            .deploy(&repo, &["about.html".to_string()], "Deploy")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("about.html was not written"));
    }
}
