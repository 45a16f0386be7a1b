//! Structured observability hooks for the build lifecycle.
//!
//! This module provides:
//! - Build-scoped tracing spans via the `BuildSpan` RAII guard
//! - Emission functions for key lifecycle events with stable `event` names
//!
//! Events are emitted at `info!` level (filter with `SITEWRIGHT_LOG`).

use tracing::{info, warn};

/// RAII guard that enters a build-scoped tracing span.
///
/// ```ignore
/// let _span = BuildSpan::enter("3f1c...");
/// // every tracing call below carries build_id = "3f1c..."
/// ```
pub struct BuildSpan {
    _span: tracing::span::EnteredSpan,
}

impl BuildSpan {
    pub fn enter(build_id: &str) -> Self {
        Self {
            _span: build_span(build_id).entered(),
        }
    }
}

/// Build-scoped span for instrumenting futures that cross `.await` points.
pub fn build_span(build_id: &str) -> tracing::Span {
    tracing::info_span!("sitewright.build", build_id = %build_id)
}

pub fn emit_build_started(build_id: &str, business_name: &str) {
    info!(event = "build.started", build_id = %build_id, business_name = %business_name);
}

pub fn emit_build_finished(build_id: &str, status: &str, duration_ms: u64, pages: usize) {
    info!(
        event = "build.finished",
        build_id = %build_id,
        status = %status,
        duration_ms = duration_ms,
        pages = pages,
    );
}

pub fn emit_build_failed(build_id: &str, phase: &str, error: &dyn std::fmt::Display) {
    tracing::error!(event = "build.failed", build_id = %build_id, phase = %phase, error = %error);
}

pub fn emit_phase_started(phase: &str, step: usize, total: usize) {
    info!(event = "phase.started", phase = %phase, step = step, total = total);
}

pub fn emit_phase_finished(phase: &str, step: usize, total: usize, duration_ms: u64) {
    info!(
        event = "phase.finished",
        phase = %phase,
        step = step,
        total = total,
        duration_ms = duration_ms,
    );
}

/// Emit event: one Proposer or Reviewer turn.
pub fn emit_negotiation_turn(round: u32, speaker: &str, action: &str, score: Option<f64>) {
    info!(
        event = "council.turn",
        round = round,
        speaker = %speaker,
        action = %action,
        score = ?score,
    );
}

pub fn emit_page_generated(slug: &str, status: &str, bytes: usize) {
    info!(event = "page.generated", slug = %slug, status = %status, bytes = bytes);
}

pub fn emit_page_fixed(slug: &str, attempt: u32, accepted: bool) {
    info!(event = "page.fixed", slug = %slug, attempt = attempt, accepted = accepted);
}

pub fn emit_test_attempt(attempt: u32, passed: bool, failures: usize, failing_pages: usize) {
    info!(
        event = "quality.attempt",
        attempt = attempt,
        passed = passed,
        failures = failures,
        failing_pages = failing_pages,
    );
}

/// Emit event: a color was darkened to meet the contrast threshold.
pub fn emit_contrast_corrected(role: &str, from: &str, to: &str, ratio: f64) {
    info!(
        event = "design.contrast_corrected",
        role = %role,
        from = %from,
        to = %to,
        ratio = ratio,
    );
}

/// Emit event: advisory issue that never blocks the build (warning level).
pub fn emit_advisory(kind: &str, detail: &str) {
    warn!(event = "build.advisory", kind = %kind, detail = %detail);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_span_create() {
        let _span = BuildSpan::enter("test-build-id");
        emit_phase_started("repo", 1, 8);
        emit_negotiation_turn(1, "reviewer", "approved", Some(8.0));
    }
}
