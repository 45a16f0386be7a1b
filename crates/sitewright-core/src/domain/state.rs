//! Orchestrator working memory and the terminal build summary.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assemble::AssemblyReport;
use crate::domain::blueprint::Blueprint;
use crate::domain::critique::NegotiationTranscript;
use crate::domain::design::DesignSystem;
use crate::domain::page::{PageArtifact, PageStatus};
use crate::domain::report::TestReport;
use crate::domain::request::ClientRequest;
use crate::hosting::{DeployReceipt, RepoHandle};
use crate::quality::{QualityOutcome, QualityStatus};

/// Pipeline phases in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildPhase {
    Repo,
    Blueprint,
    Design,
    Generate,
    Assemble,
    Test,
    Deploy,
    Notify,
}

impl BuildPhase {
    pub const ALL: [BuildPhase; 8] = [
        BuildPhase::Repo,
        BuildPhase::Blueprint,
        BuildPhase::Design,
        BuildPhase::Generate,
        BuildPhase::Assemble,
        BuildPhase::Test,
        BuildPhase::Deploy,
        BuildPhase::Notify,
    ];

    /// 1-based position in the pipeline.
    pub fn step(self) -> usize {
        Self::ALL.iter().position(|p| *p == self).unwrap_or(0) + 1
    }

    pub fn total() -> usize {
        Self::ALL.len()
    }

    pub fn name(self) -> &'static str {
        match self {
            BuildPhase::Repo => "repo",
            BuildPhase::Blueprint => "blueprint",
            BuildPhase::Design => "design",
            BuildPhase::Generate => "generate",
            BuildPhase::Assemble => "assemble",
            BuildPhase::Test => "test",
            BuildPhase::Deploy => "deploy",
            BuildPhase::Notify => "notify",
        }
    }
}

impl std::fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Orchestrator-owned working memory. Phases receive the specific parts
/// they need, never the whole state.
#[derive(Debug, Clone)]
pub struct BuildState {
    pub build_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub phase: Option<BuildPhase>,
    pub request: ClientRequest,
    pub repo: Option<RepoHandle>,
    pub blueprint: Option<Blueprint>,
    pub transcript: NegotiationTranscript,
    pub design: Option<Arc<DesignSystem>>,
    pub pages: Vec<PageArtifact>,
    pub assembly: Option<AssemblyReport>,
    pub quality: Option<QualityOutcome>,
    pub deploy: Option<DeployReceipt>,
}

impl BuildState {
    pub fn new(request: ClientRequest) -> Self {
        Self {
            build_id: Uuid::new_v4(),
            started_at: Utc::now(),
            phase: None,
            request,
            repo: None,
            blueprint: None,
            transcript: NegotiationTranscript::default(),
            design: None,
            pages: Vec::new(),
            assembly: None,
            quality: None,
            deploy: None,
        }
    }
}

/// Terminal status of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    /// Deployed with a clean quality pass.
    Succeeded,
    /// Deployed, but the Quality Gate exhausted its attempts.
    Degraded,
    /// Aborted before deployment.
    Failed,
}

/// Per-page line in the build summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSummary {
    pub slug: String,
    pub filename: String,
    pub status: PageStatus,
    pub byte_size: usize,
}

/// User-visible result of a build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildOutcome {
    pub build_id: Uuid,
    pub status: BuildStatus,
    pub live_url: Option<String>,
    pub repository: Option<String>,
    pub commit: Option<String>,
    pub pages: Vec<PageSummary>,
    pub transcript: NegotiationTranscript,
    pub quality: Option<TestReport>,
    pub quality_attempts: u32,
    pub broken_links: usize,
    /// Phase that failed, for `Failed` builds.
    pub failed_phase: Option<BuildPhase>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl BuildOutcome {
    /// Summarise a state that reached the end of the pipeline (or failed in
    /// `failed_phase` with `error`).
    pub fn from_state(
        state: &BuildState,
        failed_phase: Option<BuildPhase>,
        error: Option<String>,
    ) -> Self {
        let status = match (&error, &state.quality) {
            (Some(_), _) => BuildStatus::Failed,
            (None, Some(q)) if q.status == QualityStatus::Degraded => BuildStatus::Degraded,
            (None, _) => BuildStatus::Succeeded,
        };

        Self {
            build_id: state.build_id,
            status,
            live_url: state
                .deploy
                .as_ref()
                .map(|d| d.live_url.clone())
                .or_else(|| state.repo.as_ref().and_then(|r| r.live_url.clone())),
            repository: state.repo.as_ref().map(|r| r.reference()),
            commit: state.deploy.as_ref().and_then(|d| d.commit.clone()),
            pages: state
                .pages
                .iter()
                .map(|p| PageSummary {
                    slug: p.slug.clone(),
                    filename: p.filename.clone(),
                    status: p.status,
                    byte_size: p.byte_size,
                })
                .collect(),
            transcript: state.transcript.clone(),
            quality: state.quality.as_ref().map(|q| q.report.clone()),
            quality_attempts: state.quality.as_ref().map(|q| q.attempts).unwrap_or(0),
            broken_links: state
                .assembly
                .as_ref()
                .map(|a| a.broken_link_count())
                .unwrap_or(0),
            failed_phase,
            error,
            duration_ms: (Utc::now() - state.started_at).num_milliseconds().max(0) as u64,
        }
    }

    /// Residual failure list for degraded builds.
    pub fn residual_failures(&self) -> &[String] {
        self.quality
            .as_ref()
            .map(|r| r.failures.as_slice())
            .unwrap_or(&[])
    }
}
