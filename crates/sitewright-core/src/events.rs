//! Progress events for external consumers.
//!
//! Events are purely observational: the orchestrator pushes them into an
//! [`EventSink`] and nothing flows back. The sink wraps an unbounded
//! `tokio::sync::mpsc` sender, so emitting never blocks, and a dropped
//! receiver only means nobody is listening.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::domain::critique::{Speaker, TurnAction};
use crate::domain::page::PageStatus;
use crate::domain::state::{BuildPhase, BuildStatus};

/// One progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuildEvent {
    PhaseStarted {
        phase: BuildPhase,
        step: usize,
        total: usize,
    },
    PhaseCompleted {
        phase: BuildPhase,
        step: usize,
        total: usize,
        duration_ms: u64,
    },
    NegotiationRound {
        round: u32,
        speaker: Speaker,
        action: TurnAction,
        score: Option<f64>,
    },
    PageGenerated {
        slug: String,
        status: PageStatus,
        index: usize,
        total: usize,
    },
    PageFixed {
        slug: String,
        attempt: u32,
        accepted: bool,
    },
    TestAttempt {
        attempt: u32,
        max_attempts: u32,
        passed: bool,
        failure_count: usize,
    },
    Warning {
        message: String,
    },
    BuildFinished {
        status: BuildStatus,
        live_url: Option<String>,
    },
    BuildFailed {
        phase: Option<BuildPhase>,
        error: String,
    },
}

impl BuildEvent {
    pub fn phase_started(phase: BuildPhase) -> Self {
        BuildEvent::PhaseStarted {
            phase,
            step: phase.step(),
            total: BuildPhase::total(),
        }
    }

    pub fn phase_completed(phase: BuildPhase, duration_ms: u64) -> Self {
        BuildEvent::PhaseCompleted {
            phase,
            step: phase.step(),
            total: BuildPhase::total(),
            duration_ms,
        }
    }
}

/// Cloneable, non-blocking event emitter.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<BuildEvent>>,
}

impl EventSink {
    /// A sink paired with its receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<BuildEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: BuildEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(BuildEvent::Warning {
            message: message.into(),
        });
    }
}

/// Drain everything currently queued on `rx`.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<BuildEvent>) -> Vec<BuildEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_delivers_in_order() {
        let (sink, mut rx) = EventSink::channel();
        sink.emit(BuildEvent::phase_started(BuildPhase::Repo));
        sink.warn("careful");
        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            BuildEvent::PhaseStarted {
                phase: BuildPhase::Repo,
                step: 1,
                total: 8
            }
        );
    }

    #[test]
    fn test_dropped_receiver_is_harmless() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.warn("nobody listening");
        EventSink::disabled().warn("discarded");
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(BuildEvent::phase_completed(BuildPhase::Test, 10)).unwrap();
        assert_eq!(json["type"], "phase_completed");
        assert_eq!(json["phase"], "test");
        assert_eq!(json["step"], 6);
    }
}
