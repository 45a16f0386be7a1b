//! Reviewer output and the negotiation transcript.

use serde::{Deserialize, Serialize};

/// Issue severity as judged by the Reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
}

impl IssueSeverity {
    /// Lenient parse; unknown values map to `Medium`.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" | "critical" | "major" => IssueSeverity::High,
            "low" | "minor" | "nit" => IssueSeverity::Low,
            _ => IssueSeverity::Medium,
        }
    }
}

/// One problem the Reviewer found in a Blueprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: IssueSeverity,
    pub area: String,
    pub description: String,
    pub suggested_fix: String,
}

/// Reviewer verdict for one negotiation round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Critique {
    pub approved: bool,
    /// Quality score in `0.0..=10.0`.
    pub score: f64,
    pub issues: Vec<Issue>,
    pub summary: String,
}

impl Critique {
    /// Number of issues at or above `severity`.
    pub fn count_at_least(&self, severity: IssueSeverity) -> usize {
        self.issues.iter().filter(|i| i.severity >= severity).count()
    }
}

/// Which side of the negotiation spoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Proposer,
    Reviewer,
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Speaker::Proposer => write!(f, "proposer"),
            Speaker::Reviewer => write!(f, "reviewer"),
        }
    }
}

/// What a negotiation turn did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnAction {
    Proposed,
    Revised,
    Approved,
    RequestedChanges,
}

impl std::fmt::Display for TurnAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TurnAction::Proposed => "proposed",
            TurnAction::Revised => "revised",
            TurnAction::Approved => "approved",
            TurnAction::RequestedChanges => "requested_changes",
        };
        write!(f, "{s}")
    }
}

/// One logged turn. Critiques are discarded after use; only this record survives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationTurn {
    pub round: u32,
    pub speaker: Speaker,
    pub action: TurnAction,
    pub score: Option<f64>,
    pub issue_count: usize,
    pub summary: String,
}

/// Full negotiation record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NegotiationTranscript {
    pub turns: Vec<NegotiationTurn>,
    pub rounds: u32,
    pub approved: bool,
}

impl NegotiationTranscript {
    pub fn push(&mut self, turn: NegotiationTurn) {
        self.rounds = self.rounds.max(turn.round);
        self.turns.push(turn);
    }

    /// Score of the last Reviewer turn, if any.
    pub fn final_score(&self) -> Option<f64> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.speaker == Speaker::Reviewer)
            .and_then(|t| t.score)
    }
}
