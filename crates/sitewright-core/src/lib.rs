//! Sitewright Core Library
//!
//! Turns a client brief into a tested static website: negotiated blueprint,
//! shared design system, generated pages, deterministic assembly, and a
//! bounded test-and-repair quality gate in front of deployment.

pub mod assemble;
pub mod cancel;
pub mod config;
pub mod council;
pub mod design;
pub mod domain;
pub mod events;
pub mod fakes;
pub mod hosting;
pub mod inference;
pub mod markup;
pub mod notify;
pub mod obs;
pub mod orchestrator;
pub mod pages;
pub mod quality;
pub mod runner;
pub mod telemetry;

pub use domain::{
    page_filename, slugify, Blueprint, BuildError, BuildOutcome, BuildPhase, BuildState,
    BuildStatus, ClientRequest, ColorTokens, Critique, DesignSystem, ErrorClass, Issue,
    IssueSeverity, NegotiationTranscript, NegotiationTurn, PageArtifact, PageSpec, PageStatus,
    PageSummary, Result, TestFailure, TestReport, TypographyTokens,
};

pub use assemble::{Assembler, Assembly, AssemblyReport, BrokenLink, LinkProblem};
pub use cancel::CancellationToken;
pub use config::{
    CouncilConfig, GenerationConfig, InferenceConfig, NotifyConfig, PublishConfig, PublishMode,
    QualityConfig, SiteConfig, SitewrightConfig,
};
pub use council::{BlueprintNegotiator, Negotiation};
pub use design::{correct_color, ColorCorrection, DesignGenerator, MIN_CONTRAST};
pub use events::{BuildEvent, EventSink};
pub use hosting::{DeployReceipt, Publisher, RepoHandle};
pub use inference::{
    CompletionRequest, InferenceBackend, InferenceClient, InferenceError, Message,
    OpenAiCompatibleBackend, RetryPolicy,
};
pub use markup::PageDocument;
pub use notify::{LogNotifier, Notifier};
pub use orchestrator::BuildOrchestrator;
pub use pages::PageGenerator;
pub use quality::{load_site, QualityGate, QualityOutcome, QualityStatus};
pub use runner::{CommandSpec, ProcessOutput, ProcessRunner, RunnerError, TokioProcessRunner};
pub use telemetry::init_tracing;

/// Sitewright version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
