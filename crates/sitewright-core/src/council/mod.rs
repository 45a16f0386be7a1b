//! Blueprint Negotiator ("Council").
//!
//! Two roles, bounded by `max_rounds`:
//!
//! ```text
//! round 1:  Proposer(request)                      -> Blueprint
//! round n:  Reviewer(Blueprint)                    -> Critique
//!           approved                               -> done
//!           rounds remain                          -> Proposer(Blueprint, Critique) -> Blueprint
//!           rounds exhausted                       -> done with the last Blueprint
//! ```
//!
//! Exhausting the rounds without approval is a degraded outcome, not an
//! error. Every Proposer output is a complete replacement and passes through
//! [`normalize::blueprint_from_value`] before anyone else sees it.

pub mod normalize;
pub mod prompts;

use tracing::{info, instrument, warn};

use crate::cancel::CancellationToken;
use crate::config::CouncilConfig;
use crate::domain::blueprint::Blueprint;
use crate::domain::critique::{
    Critique, IssueSeverity, NegotiationTranscript, NegotiationTurn, Speaker, TurnAction,
};
use crate::domain::error::{BuildError, Result};
use crate::domain::request::ClientRequest;
use crate::events::{BuildEvent, EventSink};
use crate::inference::{CompletionRequest, InferenceClient, InferenceError, Message};
use crate::obs;

pub use normalize::{blueprint_from_value, critique_from_value};

/// Final plan plus how it was reached.
#[derive(Debug, Clone)]
pub struct Negotiation {
    pub blueprint: Blueprint,
    pub transcript: NegotiationTranscript,
}

/// Runs the Proposer/Reviewer negotiation.
#[derive(Debug, Clone)]
pub struct BlueprintNegotiator {
    client: InferenceClient,
    config: CouncilConfig,
    max_tokens: u32,
}

impl BlueprintNegotiator {
    pub fn new(client: InferenceClient, config: CouncilConfig, max_tokens: u32) -> Self {
        Self {
            client,
            config,
            max_tokens,
        }
    }

    #[instrument(skip_all, fields(business = %request.business_name, max_rounds = self.config.max_rounds))]
    pub async fn negotiate(
        &self,
        request: &ClientRequest,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<Negotiation> {
        let max_rounds = self.config.max_rounds.max(1);
        let mut transcript = NegotiationTranscript::default();
        let mut round = 1;

        let mut blueprint = self.propose(request).await?;
        record(
            &mut transcript,
            events,
            NegotiationTurn {
                round,
                speaker: Speaker::Proposer,
                action: TurnAction::Proposed,
                score: None,
                issue_count: 0,
                summary: format!("{} pages", blueprint.pages.len()),
            },
        );

        loop {
            cancel.check()?;
            let critique = self.review(request, &blueprint).await?;
            record(
                &mut transcript,
                events,
                NegotiationTurn {
                    round,
                    speaker: Speaker::Reviewer,
                    action: if critique.approved {
                        TurnAction::Approved
                    } else {
                        TurnAction::RequestedChanges
                    },
                    score: Some(critique.score),
                    issue_count: critique.issues.len(),
                    summary: critique.summary.clone(),
                },
            );

            if critique.approved {
                transcript.approved = true;
                info!(round, score = critique.score, "Blueprint approved");
                break;
            }
            if round >= max_rounds {
                warn!(
                    round,
                    high_issues = critique.count_at_least(IssueSeverity::High),
                    "Negotiation rounds exhausted without approval; using last blueprint"
                );
                events.warn(format!(
                    "blueprint not approved after {max_rounds} round(s); continuing with the last proposal"
                ));
                break;
            }

            cancel.check()?;
            round += 1;
            match self.revise(request, &blueprint, &critique).await {
                Ok(revised) => {
                    blueprint = revised;
                    record(
                        &mut transcript,
                        events,
                        NegotiationTurn {
                            round,
                            speaker: Speaker::Proposer,
                            action: TurnAction::Revised,
                            score: None,
                            issue_count: 0,
                            summary: format!("{} pages", blueprint.pages.len()),
                        },
                    );
                }
                // An unusable revision leaves the previous, valid plan in place.
                Err(BuildError::EmptyBlueprint)
                | Err(BuildError::Inference(InferenceError::Extraction { .. })) => {
                    warn!(round, "Revision unusable; keeping previous blueprint");
                    events.warn(format!(
                        "round {round} revision was unusable; keeping the previous blueprint"
                    ));
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Negotiation {
            blueprint,
            transcript,
        })
    }

    async fn propose(&self, request: &ClientRequest) -> Result<Blueprint> {
        let value = self
            .complete_json("council.propose", prompts::propose(request), self.config.proposer_temperature)
            .await?;
        blueprint_from_value(&value, request)
    }

    async fn revise(
        &self,
        request: &ClientRequest,
        previous: &Blueprint,
        critique: &Critique,
    ) -> Result<Blueprint> {
        let value = self
            .complete_json(
                "council.revise",
                prompts::revise(request, previous, critique)?,
                self.config.proposer_temperature,
            )
            .await?;
        blueprint_from_value(&value, request)
    }

    async fn review(&self, request: &ClientRequest, blueprint: &Blueprint) -> Result<Critique> {
        let value = self
            .complete_json(
                "council.review",
                prompts::review(request, blueprint)?,
                self.config.reviewer_temperature,
            )
            .await?;
        Ok(critique_from_value(&value))
    }

    async fn complete_json(
        &self,
        purpose: &str,
        messages: Vec<Message>,
        temperature: f32,
    ) -> Result<serde_json::Value> {
        let request = CompletionRequest::new(purpose, messages)
            .with_temperature(temperature)
            .with_max_tokens(self.max_tokens);
        Ok(self.client.complete_json(&request).await?)
    }
}

fn record(transcript: &mut NegotiationTranscript, events: &EventSink, turn: NegotiationTurn) {
    obs::emit_negotiation_turn(
        turn.round,
        &turn.speaker.to_string(),
        &turn.action.to_string(),
        turn.score,
    );
    events.emit(BuildEvent::NegotiationRound {
        round: turn.round,
        speaker: turn.speaker,
        action: turn.action,
        score: turn.score,
    });
    transcript.push(turn);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::drain;
    use crate::fakes::{ScriptedBackend, ScriptedReply};
    use serde_json::json;
    use std::sync::Arc;

    fn request() -> ClientRequest {
        ClientRequest::new("Sunrise Bakery", "bakery", "sell bread", "hello@sunrise.test")
    }

    fn proposal(pages: &[&str]) -> String {
        let pages: Vec<_> = pages.iter().map(|t| json!({"title": t})).collect();
        json!({"site_name": "Sunrise Bakery", "pages": pages}).to_string()
    }

    fn verdict(approved: bool) -> String {
        json!({"approved": approved, "score": if approved { 8.5 } else { 4.0 },
               "issues": if approved { json!([]) } else { json!([{"severity": "high", "description": "x"}]) },
               "summary": "verdict"})
        .to_string()
    }

    fn negotiator(backend: Arc<ScriptedBackend>, max_rounds: u32) -> BlueprintNegotiator {
        BlueprintNegotiator::new(
            InferenceClient::new(backend),
            CouncilConfig {
                max_rounds,
                ..CouncilConfig::default()
            },
            2048,
        )
    }

    #[tokio::test]
    async fn test_revision_replaces_blueprint() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_for("council.propose", ScriptedReply::Text(proposal(&["Home"])));
        backend.push_for("council.review", ScriptedReply::Text(verdict(false)));
        backend.push_for("council.review", ScriptedReply::Text(verdict(true)));
        backend.push_for("council.revise", ScriptedReply::Text(proposal(&["Home", "Menu", "Contact"])));

        let (events, mut rx) = EventSink::channel();
        let result = negotiator(backend.clone(), 3)
            .negotiate(&request(), &events, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.blueprint.pages.len(), 3);
        assert!(result.transcript.approved);
        assert_eq!(result.transcript.rounds, 2);
        assert_eq!(result.transcript.final_score(), Some(8.5));
        let revise_prompt = &backend.calls_for("council.revise")[0].messages[1].content;
        assert!(revise_prompt.contains("Previous blueprint"));
        assert_eq!(drain(&mut rx).len(), 4);
    }

    #[tokio::test]
    async fn test_unusable_revision_keeps_previous() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_for("council.propose", ScriptedReply::Text(proposal(&["Home", "About"])));
        backend.always_for("council.review", &verdict(false));
        backend.push_for("council.revise", ScriptedReply::Text(json!({"pages": []}).to_string()));

        let result = negotiator(backend, 3)
            .negotiate(&request(), &EventSink::disabled(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.blueprint.pages.len(), 2);
        assert!(!result.transcript.approved);
    }

    #[tokio::test]
    async fn test_empty_initial_proposal_is_fatal() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_for("council.propose", ScriptedReply::Text(json!({"pages": []}).to_string()));

        let err = negotiator(backend, 2)
            .negotiate(&request(), &EventSink::disabled(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::EmptyBlueprint));
    }

    #[tokio::test]
    async fn test_cancelled_before_review() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_for("council.propose", ScriptedReply::Text(proposal(&["Home"])));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = negotiator(backend.clone(), 2)
            .negotiate(&request(), &EventSink::disabled(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Cancelled));
        assert!(backend.calls_for("council.review").is_empty());
    }
}
