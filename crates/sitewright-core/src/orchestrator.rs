//! Build Orchestrator.
//!
//! Runs one build end to end:
//!
//! ```text
//! Repo -> Blueprint -> Design -> Generate -> Assemble -> Test -> Deploy -> Notify
//! ```
//!
//! The orchestrator alone owns [`BuildState`]; each phase receives only the
//! parts it needs. A fatal error in any phase stops the pipeline before
//! deployment and becomes a `Failed` [`BuildOutcome`]. A degraded Quality
//! Gate still deploys. Notification runs for every build and never changes
//! its status.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn, Instrument};

use crate::assemble::Assembler;
use crate::cancel::CancellationToken;
use crate::config::SitewrightConfig;
use crate::council::BlueprintNegotiator;
use crate::design::DesignGenerator;
use crate::domain::error::Result;
use crate::domain::page::PageStatus;
use crate::domain::request::ClientRequest;
use crate::domain::state::{BuildOutcome, BuildPhase, BuildState, BuildStatus};
use crate::events::{BuildEvent, EventSink};
use crate::hosting::Publisher;
use crate::inference::{InferenceBackend, InferenceClient};
use crate::notify::Notifier;
use crate::obs;
use crate::pages::PageGenerator;
use crate::quality::QualityGate;
use crate::runner::ProcessRunner;

/// Wires the phases to their collaborators.
pub struct BuildOrchestrator {
    config: SitewrightConfig,
    client: InferenceClient,
    runner: Arc<dyn ProcessRunner>,
    publisher: Arc<dyn Publisher>,
    notifier: Arc<dyn Notifier>,
    events: EventSink,
    cancel: CancellationToken,
}

impl BuildOrchestrator {
    pub fn new(
        config: SitewrightConfig,
        backend: Arc<dyn InferenceBackend>,
        runner: Arc<dyn ProcessRunner>,
        publisher: Arc<dyn Publisher>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let client = InferenceClient::new(backend)
            .with_policy(config.inference.retry_policy())
            .with_default_model(config.inference.model.clone());
        Self {
            config,
            client,
            runner,
            publisher,
            notifier,
            events: EventSink::disabled(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels this orchestrator's builds at the next check.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the full pipeline. Never fails: errors become a `Failed` outcome.
    pub async fn build(&self, request: ClientRequest) -> BuildOutcome {
        let mut state = BuildState::new(request);
        let build_id = state.build_id.to_string();
        let span = obs::build_span(&build_id);

        async {
            obs::emit_build_started(&build_id, &state.request.business_name);

            let result = self.run_phases(&mut state).await;
            let outcome = match result {
                Ok(()) => BuildOutcome::from_state(&state, None, None),
                Err(e) => {
                    let phase = state.phase;
                    obs::emit_build_failed(
                        &build_id,
                        phase.map(BuildPhase::name).unwrap_or("setup"),
                        &e,
                    );
                    BuildOutcome::from_state(&state, phase, Some(e.to_string()))
                }
            };

            self.notify(&mut state, &outcome).await;

            match outcome.status {
                BuildStatus::Failed => self.events.emit(BuildEvent::BuildFailed {
                    phase: outcome.failed_phase,
                    error: outcome.error.clone().unwrap_or_default(),
                }),
                status => self.events.emit(BuildEvent::BuildFinished {
                    status,
                    live_url: outcome.live_url.clone(),
                }),
            }
            obs::emit_build_finished(
                &build_id,
                &format!("{:?}", outcome.status).to_lowercase(),
                outcome.duration_ms,
                outcome.pages.len(),
            );
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run_phases(&self, state: &mut BuildState) -> Result<()> {
        let max_tokens = self.config.inference.max_tokens;

        // Repo
        let started = self.begin(state, BuildPhase::Repo)?;
        let repo = self.publisher.create_repository(&state.request).await?;
        info!(repo = %repo.reference(), checkout = %repo.checkout.display(), "Repository ready");
        state.repo = Some(repo.clone());
        self.finish(BuildPhase::Repo, started);

        // Blueprint
        let started = self.begin(state, BuildPhase::Blueprint)?;
        let negotiation = BlueprintNegotiator::new(
            self.client.clone(),
            self.config.council.clone(),
            max_tokens,
        )
        .negotiate(&state.request, &self.events, &self.cancel)
        .await?;
        let blueprint = negotiation.blueprint;
        state.transcript = negotiation.transcript;
        state.blueprint = Some(blueprint.clone());
        self.finish(BuildPhase::Blueprint, started);

        // Design
        let started = self.begin(state, BuildPhase::Design)?;
        let design = Arc::new(
            DesignGenerator::new(
                self.client.clone(),
                self.config.generation.design_temperature,
                max_tokens,
            )
            .generate(&blueprint)
            .await?,
        );
        state.design = Some(Arc::clone(&design));
        self.finish(BuildPhase::Design, started);

        // Generate
        let started = self.begin(state, BuildPhase::Generate)?;
        let pages = PageGenerator::new(
            self.client.clone(),
            self.config.generation.page_temperature,
            max_tokens,
        )
        .with_max_concurrency(self.config.generation.max_concurrency)
        .generate_all(&state.request, &blueprint, Arc::clone(&design), &self.events)
        .await;
        let fallbacks = pages
            .iter()
            .filter(|p| p.status == PageStatus::Fallback)
            .count();
        if fallbacks > 0 {
            self.events
                .warn(format!("{fallbacks} page(s) replaced by fallback content"));
        }
        state.pages = pages;
        self.finish(BuildPhase::Generate, started);

        // Assemble
        let started = self.begin(state, BuildPhase::Assemble)?;
        let base_url = self
            .config
            .site
            .base_url
            .clone()
            .or_else(|| repo.live_url.clone())
            .unwrap_or_default();
        let assembly = Assembler::new(base_url).assemble(
            &blueprint,
            &design,
            &mut state.pages,
            Utc::now().date_naive(),
        );
        Assembler::write(&repo.checkout, &state.pages, &assembly).await?;
        let broken = assembly.report.broken_link_count();
        if broken > 0 {
            self.events
                .warn(format!("{broken} broken or placeholder link(s) found"));
        }
        state.assembly = Some(assembly.report);
        self.finish(BuildPhase::Assemble, started);

        // Test
        let started = self.begin(state, BuildPhase::Test)?;
        let qa_dir = self
            .config
            .site
            .work_dir
            .join(format!("{}-qa", repo.name));
        let quality = QualityGate::new(
            Arc::clone(&self.runner),
            self.client.clone(),
            self.config.quality.clone(),
            max_tokens,
        )
        .with_events(self.events.clone())
        .with_cancellation(self.cancel.clone())
        .run(&blueprint, &repo.checkout, &qa_dir, &mut state.pages)
        .await?;
        state.quality = Some(quality);
        self.finish(BuildPhase::Test, started);

        // Deploy
        let started = self.begin(state, BuildPhase::Deploy)?;
        let mut files: Vec<String> = state.pages.iter().map(|p| p.filename.clone()).collect();
        if let Some(assembly) = &state.assembly {
            files.extend(assembly.files.iter().cloned());
        }
        let message = format!(
            "Deploy {} ({} pages)",
            blueprint.site_name,
            state.pages.len()
        );
        let receipt = self.publisher.deploy(&repo, &files, &message).await?;
        info!(live_url = %receipt.live_url, commit = ?receipt.commit, "Site deployed");
        state.deploy = Some(receipt);
        self.finish(BuildPhase::Deploy, started);

        Ok(())
    }

    async fn notify(&self, state: &mut BuildState, outcome: &BuildOutcome) {
        let phase = BuildPhase::Notify;
        state.phase = Some(phase);
        let started = Instant::now();
        self.events.emit(BuildEvent::phase_started(phase));
        obs::emit_phase_started(phase.name(), phase.step(), BuildPhase::total());

        if let Err(e) = self.notifier.notify(outcome).await {
            warn!(notifier = self.notifier.name(), error = %e, "Notification failed");
            obs::emit_advisory("notify", &e.to_string());
            self.events
                .warn(format!("notification via {} failed: {e}", self.notifier.name()));
        }
        self.finish(phase, started);
    }

    fn begin(&self, state: &mut BuildState, phase: BuildPhase) -> Result<Instant> {
        self.cancel.check()?;
        state.phase = Some(phase);
        self.events.emit(BuildEvent::phase_started(phase));
        obs::emit_phase_started(phase.name(), phase.step(), BuildPhase::total());
        Ok(Instant::now())
    }

    fn finish(&self, phase: BuildPhase, started: Instant) {
        let duration_ms = started.elapsed().as_millis() as u64;
        self.events.emit(BuildEvent::phase_completed(phase, duration_ms));
        obs::emit_phase_finished(phase.name(), phase.step(), BuildPhase::total(), duration_ms);
    }
}

impl std::fmt::Debug for BuildOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildOrchestrator")
            .field("client", &self.client)
            .field("publisher", &self.publisher.name())
            .field("notifier", &self.notifier.name())
            .finish_non_exhaustive()
    }
}

