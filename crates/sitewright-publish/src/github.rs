//! GitHub publisher.
//!
//! Repository creation and Pages setup go through the `gh` CLI, commits and
//! pushes through `git`, both via a [`ProcessRunner`] so the whole flow is
//! scriptable in tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use sitewright_core::{
    ClientRequest, CommandSpec, DeployReceipt, ProcessOutput, ProcessRunner, PublishConfig,
    Publisher, RepoHandle,
};
use tracing::{debug, info, instrument, warn};

use crate::error::{PublishError, Result};

/// Creates `owner/name` repositories and serves them with GitHub Pages.
pub struct GithubPublisher {
    runner: Arc<dyn ProcessRunner>,
    config: PublishConfig,
    work_dir: PathBuf,
}

impl GithubPublisher {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        config: PublishConfig,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            config,
            work_dir: work_dir.into(),
        }
    }

    /// Pages URL for a repository.
    pub fn pages_url(owner: &str, name: &str) -> String {
        format!("https://{}.github.io/{name}/", owner.to_lowercase())
    }

    async fn run(
        &self,
        step: &'static str,
        argv: Vec<String>,
        cwd: Option<&Path>,
    ) -> Result<ProcessOutput> {
        let mut spec = CommandSpec::new(step, argv, self.config.timeout_secs);
        if let Some(dir) = cwd {
            spec = spec.in_dir(dir);
        }
        debug!(step, command = %spec.display(), "Running publish step");
        self.runner
            .run(&spec)
            .await
            .map_err(|source| PublishError::Runner { step, source })
    }

    /// Run a step that must exit zero.
    async fn run_ok(
        &self,
        step: &'static str,
        argv: Vec<String>,
        cwd: Option<&Path>,
    ) -> Result<ProcessOutput> {
        let command = argv.join(" ");
        let output = self.run(step, argv, cwd).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(PublishError::CommandFailed {
                step,
                command,
                exit_code: output.exit_code,
                output: output.combined().trim().to_string(),
            })
        }
    }

    async fn resolve_owner(&self) -> Result<String> {
        if let Some(owner) = self.config.owner.as_deref().filter(|o| !o.is_empty()) {
            return Ok(owner.to_string());
        }
        let output = self
            .run_ok("gh whoami", args(&["gh", "api", "user", "--jq", ".login"]), None)
            .await?;
        let login = output.stdout.trim();
        if login.is_empty() {
            return Err(PublishError::OwnerUnknown);
        }
        Ok(login.to_string())
    }

    async fn create(&self, request: &ClientRequest) -> Result<RepoHandle> {
        let owner = self.resolve_owner().await?;
        let name = request.repo_slug();
        let full = format!("{owner}/{name}");

        let visibility = if self.config.private {
            "--private"
        } else {
            "--public"
        };
        let description = format!("Website for {}", request.business_name);
        let created = self
            .run(
                "gh repo create",
                vec![
                    "gh".into(),
                    "repo".into(),
                    "create".into(),
                    full.clone(),
                    visibility.into(),
                    "--description".into(),
                    description,
                ],
                None,
            )
            .await?;
        if created.success() {
            info!(repo = %full, "Created repository");
        } else if created.combined().to_lowercase().contains("already exists") {
            info!(repo = %full, "Reusing existing repository");
        } else {
            return Err(PublishError::CommandFailed {
                step: "gh repo create",
                command: format!("gh repo create {full} {visibility}"),
                exit_code: created.exit_code,
                output: created.combined().trim().to_string(),
            });
        }

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let checkout = self.work_dir.join(&name);
        if checkout.join(".git").exists() {
            self.run_ok(
                "git pull",
                args(&["git", "pull", "--ff-only"]),
                Some(&checkout),
            )
            .await?;
        } else {
            let target = checkout.display().to_string();
            self.run_ok(
                "gh repo clone",
                args(&["gh", "repo", "clone", &full, &target]),
                None,
            )
            .await?;
            tokio::fs::create_dir_all(&checkout).await?;
        }

        Ok(RepoHandle {
            live_url: Some(Self::pages_url(&owner, &name)),
            remote_url: Some(format!("https://github.com/{full}.git")),
            owner: Some(owner),
            checkout,
            name,
        })
    }

    async fn publish(
        &self,
        repo: &RepoHandle,
        files: &[String],
        message: &str,
    ) -> Result<DeployReceipt> {
        let dir = repo.checkout.as_path();
        let branch = self.config.branch.as_str();

        let mut add = args(&["git", "add", "--"]);
        add.extend(files.iter().cloned());
        self.run_ok("git add", add, Some(dir)).await?;

        let commit = self
            .run("git commit", args(&["git", "commit", "-m", message]), Some(dir))
            .await?;
        if !commit.success() {
            if commit.combined().contains("nothing to commit") {
                info!(repo = %repo.reference(), "Nothing changed since last deploy");
            } else {
                return Err(PublishError::CommandFailed {
                    step: "git commit",
                    command: "git commit -m <message>".to_string(),
                    exit_code: commit.exit_code,
                    output: commit.combined().trim().to_string(),
                });
            }
        }

        let refspec = format!("HEAD:{branch}");
        self.run_ok(
            "git push",
            args(&["git", "push", "origin", &refspec]),
            Some(dir),
        )
        .await?;

        let head = self
            .run_ok("git rev-parse", args(&["git", "rev-parse", "HEAD"]), Some(dir))
            .await?;
        let sha = head.stdout.trim().to_string();

        if let Some(owner) = &repo.owner {
            self.enable_pages(owner, &repo.name, branch).await?;
        }

        let live_url = repo
            .live_url
            .clone()
            .or_else(|| repo.owner.as_deref().map(|o| Self::pages_url(o, &repo.name)))
            .unwrap_or_else(|| repo.reference());
        info!(repo = %repo.reference(), commit = %sha, live_url = %live_url, "Pushed site");

        Ok(DeployReceipt {
            live_url,
            commit: (!sha.is_empty()).then_some(sha),
            files: files.to_vec(),
        })
    }

    /// Turn on Pages for `branch`. Already enabled counts as success.
    async fn enable_pages(&self, owner: &str, name: &str, branch: &str) -> Result<()> {
        let endpoint = format!("repos/{owner}/{name}/pages");
        let source_branch = format!("source[branch]={branch}");
        let output = self
            .run(
                "gh pages",
                args(&[
                    "gh",
                    "api",
                    &endpoint,
                    "-X",
                    "POST",
                    "-f",
                    &source_branch,
                    "-f",
                    "source[path]=/",
                ]),
                None,
            )
            .await?;
        if output.success() {
            info!(repo = %format!("{owner}/{name}"), "Enabled GitHub Pages");
            return Ok(());
        }
        let text = output.combined();
        let lower = text.to_lowercase();
        if lower.contains("already enabled") || lower.contains("http 409") {
            debug!(repo = %format!("{owner}/{name}"), "GitHub Pages already enabled");
            return Ok(());
        }
        warn!(repo = %format!("{owner}/{name}"), output = %text.trim(), "Enabling GitHub Pages failed");
        Err(PublishError::CommandFailed {
            step: "gh pages",
            command: format!("gh api {endpoint} -X POST"),
            exit_code: output.exit_code,
            output: text.trim().to_string(),
        })
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl Publisher for GithubPublisher {
    fn name(&self) -> &str {
        "github"
    }

    #[instrument(skip_all, fields(business = %request.business_name))]
    async fn create_repository(
        &self,
        request: &ClientRequest,
    ) -> sitewright_core::Result<RepoHandle> {
        Ok(self.create(request).await?)
    }

    #[instrument(skip_all, fields(repo = %repo.reference(), files = files.len()))]
    async fn deploy(
        &self,
        repo: &RepoHandle,
        files: &[String],
        message: &str,
    ) -> sitewright_core::Result<DeployReceipt> {
        Ok(self.publish(repo, files, message).await?)
    }
}

impl std::fmt::Debug for GithubPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubPublisher")
            .field("config", &self.config)
            .field("work_dir", &self.work_dir)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitewright_core::fakes::{ScriptedOutcome, ScriptedRunner};

    fn config() -> PublishConfig {
        PublishConfig {
            owner: Some("Acme".to_string()),
            ..PublishConfig::default()
        }
    }

    fn request() -> ClientRequest {
        ClientRequest::new("Sunrise Bakery", "bakery", "Fresh bread daily", "hello@sunrise.test")
    }

    #[test]
    fn test_pages_url_lowercases_owner() {
        assert_eq!(
            GithubPublisher::pages_url("Acme", "sunrise-bakery"),
            "https://acme.github.io/sunrise-bakery/"
        );
    }

    #[tokio::test]
    async fn test_create_then_clone() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let publisher = GithubPublisher::new(runner.clone(), config(), dir.path());

        let repo = publisher.create(&request()).await.unwrap();

        assert_eq!(repo.name, "sunrise-bakery");
        assert_eq!(repo.reference(), "Acme/sunrise-bakery");
        assert_eq!(repo.checkout, dir.path().join("sunrise-bakery"));
        assert!(repo.checkout.is_dir());
        assert_eq!(
            repo.live_url.as_deref(),
            Some("https://acme.github.io/sunrise-bakery/")
        );
        let create = runner.calls_for("gh repo create")[0].display();
        assert!(create.contains("Acme/sunrise-bakery --public"));
        assert_eq!(runner.calls_for("gh repo clone").len(), 1);
        assert!(runner.calls_for("gh api user").is_empty());
    }

    #[tokio::test]
    async fn test_existing_repository_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.on(
            "gh repo create",
            ScriptedOutcome::exit(1, "GraphQL: Name already exists on this account"),
        );
        let publisher = GithubPublisher::new(runner.clone(), config(), dir.path());

        assert!(publisher.create(&request()).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.on("gh repo create", ScriptedOutcome::exit(4, "authentication required"));
        let publisher = GithubPublisher::new(runner.clone(), config(), dir.path());

        let err = publisher.create(&request()).await.unwrap_err();
        assert!(matches!(err, PublishError::CommandFailed { step: "gh repo create", .. }));
        assert!(err.to_string().contains("authentication required"));
        assert!(runner.calls_for("gh repo clone").is_empty());
    }

    #[tokio::test]
    async fn test_owner_discovered_when_unset() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.on("gh api user", ScriptedOutcome::ok("octo\n"));
        let publisher =
            GithubPublisher::new(runner.clone(), PublishConfig::default(), dir.path());

        let repo = publisher.create(&request()).await.unwrap();
        assert_eq!(repo.owner.as_deref(), Some("octo"));
    }

    #[tokio::test]
    async fn test_missing_gh_is_runner_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.on("gh", ScriptedOutcome::NotFound);
        let publisher = GithubPublisher::new(runner, config(), dir.path());

        let err = publisher.create(&request()).await.unwrap_err();
        match err {
            PublishError::Runner { source, .. } => assert!(source.is_not_found()),
            other => panic!("unexpected error: {other}"),
        }
    }

    fn handle(dir: &Path) -> RepoHandle {
        RepoHandle {
            name: "sunrise-bakery".to_string(),
            owner: Some("acme".to_string()),
            checkout: dir.to_path_buf(),
            remote_url: Some("https://github.com/acme/sunrise-bakery.git".to_string()),
            live_url: Some("https://acme.github.io/sunrise-bakery/".to_string()),
        }
    }

    #[tokio::test]
    async fn test_deploy_commits_pushes_and_enables_pages() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.on("git rev-parse", ScriptedOutcome::ok("abc123\n"));
        runner.on(
            "gh api repos/acme/sunrise-bakery/pages",
            ScriptedOutcome::exit(1, "gh: GitHub Pages is already enabled. (HTTP 409)"),
        );
        let publisher = GithubPublisher::new(runner.clone(), config(), dir.path());
        let files = vec!["index.html".to_string(), "sitemap.xml".to_string()];

        let receipt = publisher
            .publish(&handle(dir.path()), &files, "Deploy Sunrise Bakery (1 pages)")
            .await
            .unwrap();

        assert_eq!(receipt.commit.as_deref(), Some("abc123"));
        assert_eq!(receipt.live_url, "https://acme.github.io/sunrise-bakery/");
        assert_eq!(receipt.files, files);
        let steps: Vec<String> = runner.calls().iter().map(|c| c.name.clone()).collect();
        assert_eq!(
            steps,
            vec!["git add", "git commit", "git push", "git rev-parse", "gh pages"]
        );
        assert_eq!(
            runner.calls_for("git add")[0].display(),
            "git add -- index.html sitemap.xml"
        );
        assert!(runner.calls_for("git push")[0].display().ends_with("HEAD:main"));
    }

    #[tokio::test]
    async fn test_deploy_tolerates_nothing_to_commit() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.on(
            "git commit",
            ScriptedOutcome::exit(1, "nothing to commit, working tree clean"),
        );
        let publisher = GithubPublisher::new(runner, config(), dir.path());

        let receipt = publisher
            .publish(&handle(dir.path()), &["index.html".to_string()], "Deploy")
            .await
            .unwrap();
        assert_eq!(receipt.live_url, "https://acme.github.io/sunrise-bakery/");
    }

    #[tokio::test]
    async fn test_push_failure_stops_deploy() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.on("git push", ScriptedOutcome::exit(128, "remote: Permission denied"));
        let publisher = GithubPublisher::new(runner.clone(), config(), dir.path());

        let err: sitewright_core::BuildError = publisher
            .publish(&handle(dir.path()), &["index.html".to_string()], "Deploy")
            .await
            .unwrap_err()
            .into();

        assert!(err.to_string().contains("Permission denied"));
        assert!(runner.calls_for("gh api").is_empty());
    }

    #[tokio::test]
    async fn test_pages_failure_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.on("gh api", ScriptedOutcome::exit(1, "HTTP 422: plan does not support Pages"));
        let publisher = GithubPublisher::new(runner, config(), dir.path());

        let err = publisher
            .publish(&handle(dir.path()), &["index.html".to_string()], "Deploy")
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::CommandFailed { step: "gh pages", .. }));
    }
}
