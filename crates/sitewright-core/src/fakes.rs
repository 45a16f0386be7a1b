//! In-memory fakes for collaborator traits (testing only).
//!
//! Provides `ScriptedBackend`, `ScriptedRunner`, `MemoryPublisher`, and
//! `RecordingNotifier`, which satisfy the trait contracts without network
//! access or external tools.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::error::{BuildError, Result};
use crate::domain::request::ClientRequest;
use crate::domain::state::BuildOutcome;
use crate::hosting::{DeployReceipt, Publisher, RepoHandle};
use crate::inference::{CompletionRequest, InferenceBackend, InferenceError};
use crate::notify::Notifier;
use crate::runner::{CommandSpec, ProcessOutput, ProcessRunner, RunnerError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// ScriptedBackend
// ---------------------------------------------------------------------------

/// One scripted inference reply.
#[derive(Debug)]
pub enum ScriptedReply {
    Text(String),
    Error(InferenceError),
}

#[derive(Debug, Default)]
struct Route {
    prefix: String,
    queue: VecDeque<ScriptedReply>,
    sticky: Option<String>,
}

#[derive(Debug, Default)]
struct BackendState {
    routes: Vec<Route>,
    default_queue: VecDeque<ScriptedReply>,
    calls: Vec<CompletionRequest>,
}

/// Inference backend that replays scripted replies.
///
/// Replies are routed by request purpose prefix (`council.review`,
/// `page.generate:about`, ...). The longest matching prefix wins: its queue
/// is consumed first, then its sticky reply repeats. Requests no route
/// answers take from the default queue.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    state: Mutex<BackendState>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for any purpose.
    pub fn push(&self, reply: ScriptedReply) {
        lock(&self.state).default_queue.push_back(reply);
    }

    /// Queue a reply for purposes starting with `prefix`.
    pub fn push_for(&self, prefix: &str, reply: ScriptedReply) {
        let mut state = lock(&self.state);
        Self::route_mut(&mut state, prefix).queue.push_back(reply);
    }

    /// Answer every otherwise unscripted request under `prefix` with `text`.
    pub fn always_for(&self, prefix: &str, text: &str) {
        let mut state = lock(&self.state);
        Self::route_mut(&mut state, prefix).sticky = Some(text.to_string());
    }

    /// Every request seen so far, in order.
    pub fn calls(&self) -> Vec<CompletionRequest> {
        lock(&self.state).calls.clone()
    }

    /// Requests whose purpose starts with `prefix`.
    pub fn calls_for(&self, prefix: &str) -> Vec<CompletionRequest> {
        self.calls()
            .into_iter()
            .filter(|c| c.purpose.starts_with(prefix))
            .collect()
    }

    fn route_mut<'a>(state: &'a mut BackendState, prefix: &str) -> &'a mut Route {
        let index = match state.routes.iter().position(|r| r.prefix == prefix) {
            Some(index) => index,
            None => {
                state.routes.push(Route {
                    prefix: prefix.to_string(),
                    ..Route::default()
                });
                state.routes.len() - 1
            }
        };
        &mut state.routes[index]
    }

    fn next_reply(state: &mut BackendState, purpose: &str) -> Option<ScriptedReply> {
        let mut matching: Vec<&mut Route> = state
            .routes
            .iter_mut()
            .filter(|r| purpose.starts_with(&r.prefix))
            .collect();
        matching.sort_by_key(|r| std::cmp::Reverse(r.prefix.len()));

        for route in matching {
            if let Some(reply) = route.queue.pop_front() {
                return Some(reply);
            }
            if let Some(text) = &route.sticky {
                return Some(ScriptedReply::Text(text.clone()));
            }
        }
        state.default_queue.pop_front()
    }
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> std::result::Result<String, InferenceError> {
        let reply = {
            let mut state = lock(&self.state);
            state.calls.push(request.clone());
            Self::next_reply(&mut state, &request.purpose)
        };
        match reply {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Error(e)) => Err(e),
            None => Err(InferenceError::Unauthorized(format!(
                "no scripted reply for '{}'",
                request.purpose
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptedRunner
// ---------------------------------------------------------------------------

/// One scripted process result. Cloneable so the last outcome of a rule can
/// repeat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedOutcome {
    Exit {
        code: i32,
        stdout: String,
        stderr: String,
        /// Files written relative to the command's working directory before
        /// the outcome is returned.
        files: Vec<(PathBuf, String)>,
    },
    NotFound,
    Timeout,
}

impl ScriptedOutcome {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self::exit(0, stdout)
    }

    pub fn exit(code: i32, stdout: impl Into<String>) -> Self {
        ScriptedOutcome::Exit {
            code,
            stdout: stdout.into(),
            stderr: String::new(),
            files: Vec::new(),
        }
    }

    /// Also write `content` to `path` under the working directory.
    pub fn with_file(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        if let ScriptedOutcome::Exit { files, .. } = &mut self {
            files.push((path.into(), content.into()));
        }
        self
    }
}

#[derive(Debug)]
struct RunnerRule {
    prefix: String,
    outcomes: VecDeque<ScriptedOutcome>,
}

/// Process runner that records commands and replays scripted outcomes.
///
/// Rules match on the start of [`CommandSpec::display`]. Each rule's
/// outcomes are consumed in order and the last one repeats. Unmatched
/// commands exit 0 with empty output.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<RunnerRule>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, prefix: &str, outcome: ScriptedOutcome) {
        let mut rules = lock(&self.rules);
        match rules.iter_mut().find(|r| r.prefix == prefix) {
            Some(rule) => rule.outcomes.push_back(outcome),
            None => rules.push(RunnerRule {
                prefix: prefix.to_string(),
                outcomes: VecDeque::from([outcome]),
            }),
        }
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        lock(&self.calls).clone()
    }

    /// Commands whose rendering starts with `prefix`.
    pub fn calls_for(&self, prefix: &str) -> Vec<CommandSpec> {
        self.calls()
            .into_iter()
            .filter(|c| c.display().starts_with(prefix))
            .collect()
    }

    fn next_outcome(&self, display: &str) -> ScriptedOutcome {
        let mut rules = lock(&self.rules);
        let rule = rules
            .iter_mut()
            .filter(|r| display.starts_with(&r.prefix))
            .max_by_key(|r| r.prefix.len());
        match rule {
            Some(rule) if rule.outcomes.len() > 1 => rule
                .outcomes
                .pop_front()
                .unwrap_or_else(|| ScriptedOutcome::ok("")),
            Some(rule) => rule
                .outcomes
                .front()
                .cloned()
                .unwrap_or_else(|| ScriptedOutcome::ok("")),
            None => ScriptedOutcome::ok(""),
        }
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> std::result::Result<ProcessOutput, RunnerError> {
        lock(&self.calls).push(spec.clone());
        let program = spec.program().to_string();
        if program.is_empty() {
            return Err(RunnerError::EmptyCommand(spec.name.clone()));
        }

        match self.next_outcome(&spec.display()) {
            ScriptedOutcome::Exit {
                code,
                stdout,
                stderr,
                files,
            } => {
                let base = spec.cwd.clone().unwrap_or_default();
                for (path, content) in files {
                    let target = base.join(path);
                    if let Some(parent) = target.parent() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                    tokio::fs::write(target, content).await?;
                }
                Ok(ProcessOutput {
                    name: spec.name.clone(),
                    exit_code: Some(code),
                    stdout,
                    stderr,
                    duration_ms: 0,
                })
            }
            ScriptedOutcome::NotFound => Err(RunnerError::Spawn {
                program,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            }),
            ScriptedOutcome::Timeout => Err(RunnerError::Timeout {
                program,
                timeout_secs: spec.timeout_secs,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryPublisher
// ---------------------------------------------------------------------------

/// Snapshot of one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRecord {
    pub repo: String,
    pub message: String,
    /// Filename to content as read from the checkout at deploy time.
    pub files: BTreeMap<String, String>,
}

/// Publisher that creates checkouts under a root directory and records
/// deployments in memory.
#[derive(Debug)]
pub struct MemoryPublisher {
    root: PathBuf,
    fail_create: bool,
    deployments: Mutex<Vec<DeployRecord>>,
}

impl MemoryPublisher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            fail_create: false,
            deployments: Mutex::new(Vec::new()),
        }
    }

    /// A publisher whose repository creation always fails.
    pub fn failing(root: impl Into<PathBuf>) -> Self {
        Self {
            fail_create: true,
            ..Self::new(root)
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn deployments(&self) -> Vec<DeployRecord> {
        lock(&self.deployments).clone()
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create_repository(&self, request: &ClientRequest) -> Result<RepoHandle> {
        if self.fail_create {
            return Err(BuildError::Publish("repository creation refused".to_string()));
        }
        let name = request.repo_slug();
        let checkout = self.root.join(&name);
        tokio::fs::create_dir_all(&checkout).await?;
        Ok(RepoHandle {
            live_url: Some(format!("https://sites.example.test/{name}/")),
            remote_url: Some(format!("memory://{name}")),
            owner: Some("memory".to_string()),
            checkout,
            name,
        })
    }

    async fn deploy(
        &self,
        repo: &RepoHandle,
        files: &[String],
        message: &str,
    ) -> Result<DeployReceipt> {
        let mut contents = BTreeMap::new();
        for file in files {
            let content = tokio::fs::read_to_string(repo.checkout.join(file)).await?;
            contents.insert(file.clone(), content);
        }
        let mut deployments = lock(&self.deployments);
        deployments.push(DeployRecord {
            repo: repo.name.clone(),
            message: message.to_string(),
            files: contents,
        });
        Ok(DeployReceipt {
            live_url: repo
                .live_url
                .clone()
                .unwrap_or_else(|| format!("https://sites.example.test/{}/", repo.name)),
            commit: Some(format!("{:040x}", deployments.len())),
            files: files.to_vec(),
        })
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

/// Notifier that keeps every outcome it is given.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    fail: bool,
    outcomes: Mutex<Vec<BuildOutcome>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier that records, then reports failure.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn outcomes(&self) -> Vec<BuildOutcome> {
        lock(&self.outcomes).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn notify(&self, outcome: &BuildOutcome) -> Result<()> {
        lock(&self.outcomes).push(outcome.clone());
        if self.fail {
            return Err(BuildError::Publish("notification endpoint unavailable".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::Message;

    fn request(purpose: &str) -> CompletionRequest {
        CompletionRequest::new(purpose, vec![Message::user("x")])
    }

    #[tokio::test]
    async fn test_backend_routes_by_longest_prefix() {
        let backend = ScriptedBackend::new();
        backend.always_for("page.generate", "generic");
        backend.push_for("page.generate:about", ScriptedReply::Text("about".into()));
        backend.push(ScriptedReply::Text("default".into()));

        assert_eq!(backend.complete(&request("page.generate:about")).await.unwrap(), "about");
        assert_eq!(backend.complete(&request("page.generate:about")).await.unwrap(), "generic");
        assert_eq!(backend.complete(&request("page.generate:index")).await.unwrap(), "generic");
        assert_eq!(backend.complete(&request("design.system")).await.unwrap(), "default");
        assert!(backend.complete(&request("design.system")).await.is_err());
        assert_eq!(backend.calls_for("page.").len(), 3);
    }

    #[tokio::test]
    async fn test_runner_last_outcome_repeats() {
        let runner = ScriptedRunner::new();
        runner.on("npx playwright test", ScriptedOutcome::exit(1, "fail"));
        runner.on("npx playwright test", ScriptedOutcome::ok("pass"));

        let spec = CommandSpec::from_args("test", &["npx", "playwright", "test"], 5);
        assert_eq!(runner.run(&spec).await.unwrap().exit_code, Some(1));
        assert_eq!(runner.run(&spec).await.unwrap().stdout, "pass");
        assert_eq!(runner.run(&spec).await.unwrap().stdout, "pass");

        let other = CommandSpec::from_args("git", &["git", "status"], 5);
        assert!(runner.run(&other).await.unwrap().success());
        assert_eq!(runner.calls_for("npx").len(), 3);
    }

    #[tokio::test]
    async fn test_runner_writes_files_and_scripts_errors() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new();
        runner.on(
            "npx",
            ScriptedOutcome::ok("").with_file("out/results.json", "{}"),
        );
        runner.on("gh", ScriptedOutcome::NotFound);

        let spec = CommandSpec::from_args("t", &["npx", "x"], 5).in_dir(dir.path());
        runner.run(&spec).await.unwrap();
        assert!(dir.path().join("out/results.json").exists());

        let gh = CommandSpec::from_args("gh", &["gh", "repo"], 5);
        assert!(runner.run(&gh).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_memory_publisher_snapshots_files() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = MemoryPublisher::new(dir.path());
        let repo = publisher
            .create_repository(&ClientRequest::new("Sunrise Bakery", "bakery", "sell", "a@b.c"))
            .await
            .unwrap();
        std::fs::write(repo.checkout.join("index.html"), "<html></html>").unwrap();

        let receipt = publisher
            .deploy(&repo, &["index.html".to_string()], "initial")
            .await
            .unwrap();
        assert_eq!(receipt.live_url, "https://sites.example.test/sunrise-bakery/");
        let deployments = publisher.deployments();
        assert_eq!(deployments[0].files["index.html"], "<html></html>");
    }
}
