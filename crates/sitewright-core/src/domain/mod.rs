//! Domain models for Sitewright.
//!
//! Canonical definitions for the core entities:
//! - `ClientRequest`: Immutable brief that seeds a build
//! - `Blueprint`: Negotiated site plan with its `PageSpec`s
//! - `Critique`: Reviewer verdict for one negotiation round
//! - `DesignSystem`: Shared tokens and nav/footer markup
//! - `PageArtifact`: One generated page and its on-disk file
//! - `TestReport`: Result of one Quality Gate attempt
//! - `BuildState`: Orchestrator working memory

pub mod blueprint;
pub mod critique;
pub mod design;
pub mod error;
pub mod page;
pub mod report;
pub mod request;
pub mod state;

// Re-export main types and errors
pub use blueprint::{
    page_filename, slugify, Blueprint, ColorTokens, PageSpec, TypographyTokens, CONTACT_SLUG,
    ROOT_SLUG,
};
pub use critique::{
    Critique, Issue, IssueSeverity, NegotiationTranscript, NegotiationTurn, Speaker, TurnAction,
};
pub use design::DesignSystem;
pub use error::{BuildError, ErrorClass, Result};
pub use page::{content_digest, PageArtifact, PageStatus};
pub use report::{TestFailure, TestReport};
pub use request::ClientRequest;
pub use state::{BuildOutcome, BuildPhase, BuildState, BuildStatus, PageSummary};
