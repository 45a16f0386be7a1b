//! Process Runner: external command execution with timeout and captured output.
//!
//! A non-zero exit is not an error here. It comes back as a
//! [`ProcessOutput`] whose [`ProcessOutput::success`] is false, so callers
//! can tell an expected failure (tests failed, repo already exists) from a
//! runner failure (could not spawn, timed out).

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

/// Errors from running an external command.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("command {0} is empty")]
    EmptyCommand(String),

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {timeout_secs} seconds")]
    Timeout { program: String, timeout_secs: u64 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    /// Whether the program could not be found at all.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RunnerError::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Label for logs.
    pub name: String,
    /// Program followed by its arguments.
    pub argv: Vec<String>,
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub env: Vec<(String, String)>,
    /// Zero disables the timeout.
    pub timeout_secs: u64,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>, argv: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            name: name.into(),
            argv,
            cwd: None,
            env: Vec::new(),
            timeout_secs,
        }
    }

    /// Convenience constructor from string slices.
    pub fn from_args(name: impl Into<String>, argv: &[&str], timeout_secs: u64) -> Self {
        Self::new(
            name,
            argv.iter().map(|s| s.to_string()).collect(),
            timeout_secs,
        )
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    /// Shell-like rendering for logs.
    pub fn display(&self) -> String {
        self.argv.join(" ")
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOutput {
    pub name: String,
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// Trait for process execution backends.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput, RunnerError>;
}

/// Runs commands with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput, RunnerError> {
        let start = Instant::now();

        let Some((exe, args)) = spec.argv.split_first() else {
            return Err(RunnerError::EmptyCommand(spec.name.clone()));
        };

        debug!(command = %spec.display(), cwd = ?spec.cwd, "Spawning process");

        let mut command = Command::new(exe);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.cwd {
            command.current_dir(dir);
        }
        for (key, value) in &spec.env {
            command.env(key, value);
        }

        let child = command.spawn().map_err(|source| RunnerError::Spawn {
            program: exe.clone(),
            source,
        })?;

        let output = if spec.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(spec.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| RunnerError::Timeout {
                program: exe.clone(),
                timeout_secs: spec.timeout_secs,
            })??
        } else {
            child.wait_with_output().await?
        };

        Ok(ProcessOutput {
            name: spec.name.clone(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_success_and_combined() {
        let output = ProcessOutput {
            name: "t".to_string(),
            exit_code: Some(0),
            stdout: "out".to_string(),
            stderr: "err".to_string(),
            duration_ms: 1,
        };
        assert!(output.success());
        assert_eq!(output.combined(), "out\nerr");

        let killed = ProcessOutput {
            exit_code: None,
            ..output
        };
        assert!(!killed.success());
    }

    #[tokio::test]
    async fn test_execute_simple_command() {
        let spec = CommandSpec::from_args("echo", &["echo", "hello"], 60);
        let output = TokioProcessRunner.run(&spec).await.expect("run failed");
        assert!(output.success());
        assert!(output.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_failing_command_is_not_an_error() {
        let spec = CommandSpec::from_args("false", &["false"], 60);
        let output = TokioProcessRunner.run(&spec).await.expect("run failed");
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_timeout_is_distinct_error() {
        let spec = CommandSpec::from_args("sleep", &["sleep", "5"], 1);
        let err = TokioProcessRunner.run(&spec).await.unwrap_err();
        assert!(matches!(err, RunnerError::Timeout { timeout_secs: 1, .. }));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let spec = CommandSpec::from_args("nope", &["sitewright-definitely-missing-binary"], 5);
        let err = TokioProcessRunner.run(&spec).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_empty_command() {
        let spec = CommandSpec::new("empty", vec![], 5);
        let err = TokioProcessRunner.run(&spec).await.unwrap_err();
        assert!(matches!(err, RunnerError::EmptyCommand(_)));
    }

    #[tokio::test]
    async fn test_runs_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let spec = CommandSpec::from_args("ls", &["ls"], 10).in_dir(dir.path());
        let output = TokioProcessRunner.run(&spec).await.unwrap();
        assert!(output.stdout.contains("marker.txt"));
    }
}
