//! Sitewright CLI
//!
//! The `sitewright` command turns a client brief into a deployed, tested
//! static website.
//!
//! ## Commands
//!
//! - `build`: Run the full pipeline for a brief
//! - `check`: Run the quality gate against an existing site directory
//! - `contrast`: Correct hex colours for WCAG AA contrast against white
//! - `config`: Print the effective configuration

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn, Level};

use sitewright_core::obs::BuildSpan;
use sitewright_core::{
    correct_color, load_site, BuildEvent, BuildOrchestrator, BuildStatus, CancellationToken,
    ClientRequest, EventSink, InferenceBackend, InferenceClient, LogNotifier, Notifier,
    OpenAiCompatibleBackend, ProcessRunner, PublishMode, QualityGate, QualityStatus,
    SitewrightConfig, TokioProcessRunner, MIN_CONTRAST,
};
use sitewright_publish::{publisher_for, WebhookNotifier};

#[derive(Parser)]
#[command(name = "sitewright")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Turn a client brief into a deployed, tested static website", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and progress events
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "SITEWRIGHT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and deploy a site for a client brief
    Build(BuildArgs),

    /// Run the quality gate against an already-built site directory
    Check {
        /// Directory containing the site's HTML files
        dir: PathBuf,

        /// Report failures without attempting repairs
        #[arg(long)]
        no_repair: bool,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Darken hex colours until they reach WCAG AA contrast against white
    Contrast {
        /// Colours such as "#ff0000" or "f80"
        #[arg(required = true)]
        colors: Vec<String>,
    },

    /// Print the effective configuration as TOML
    Config {
        #[command(flatten)]
        overrides: Overrides,
    },
}

#[derive(Args)]
struct BuildArgs {
    /// Brief as a JSON file with business_name, niche, goals, contact_email
    #[arg(long, conflicts_with_all = ["name", "niche", "goals", "email"])]
    brief: Option<PathBuf>,

    /// Business name
    #[arg(long)]
    name: Option<String>,

    /// Business niche, e.g. "artisan bakery"
    #[arg(long)]
    niche: Option<String>,

    /// What the site should achieve
    #[arg(long)]
    goals: Option<String>,

    /// Contact email shown on the site
    #[arg(long)]
    email: Option<String>,

    #[command(flatten)]
    overrides: Overrides,
}

/// Flags that override configuration file values.
#[derive(Args, Debug, Default)]
struct Overrides {
    /// Model identifier
    #[arg(long, env = "SITEWRIGHT_MODEL")]
    model: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "SITEWRIGHT_BASE_URL")]
    base_url: Option<String>,

    /// Directory for checkouts and test projects
    #[arg(long, env = "SITEWRIGHT_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Where to publish (local or github)
    #[arg(long, env = "SITEWRIGHT_PUBLISH", value_parser = parse_mode)]
    publish: Option<PublishMode>,

    /// GitHub account or organisation owning created repositories
    #[arg(long, env = "SITEWRIGHT_OWNER")]
    owner: Option<String>,

    /// Endpoint receiving the build summary
    #[arg(long, env = "SITEWRIGHT_WEBHOOK_URL")]
    webhook: Option<String>,

    /// Maximum quality gate test runs
    #[arg(long, env = "SITEWRIGHT_MAX_FIX_ATTEMPTS")]
    max_fix_attempts: Option<u32>,

    /// Pages generated at once
    #[arg(long, env = "SITEWRIGHT_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Skip the quality gate
    #[arg(long)]
    skip_tests: bool,
}

fn parse_mode(value: &str) -> std::result::Result<PublishMode, String> {
    match value.to_ascii_lowercase().as_str() {
        "local" => Ok(PublishMode::Local),
        "github" => Ok(PublishMode::Github),
        other => Err(format!("unknown publish mode '{other}' (expected local or github)")),
    }
}

impl Overrides {
    fn apply(&self, config: &mut SitewrightConfig) {
        if let Some(model) = &self.model {
            config.inference.model = model.clone();
        }
        if let Some(base_url) = &self.base_url {
            config.inference.base_url = base_url.clone();
        }
        if let Some(dir) = &self.work_dir {
            config.site.work_dir = dir.clone();
        }
        if let Some(mode) = self.publish {
            config.publish.mode = mode;
        }
        if let Some(owner) = &self.owner {
            config.publish.owner = Some(owner.clone());
        }
        if let Some(url) = &self.webhook {
            config.notify.webhook_url = Some(url.clone());
        }
        if let Some(n) = self.max_fix_attempts {
            config.quality.max_fix_attempts = n;
        }
        if let Some(n) = self.concurrency {
            config.generation.max_concurrency = n;
        }
        if self.skip_tests {
            config.quality.enabled = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    sitewright_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Build(args) => {
            let config = effective_config(cli.config.as_deref(), &args.overrides)?;
            cmd_build(config, &args, cli.json).await
        }
        Commands::Check {
            dir,
            no_repair,
            overrides,
        } => {
            let config = effective_config(cli.config.as_deref(), &overrides)?;
            cmd_check(config, &dir, no_repair, cli.json).await
        }
        Commands::Contrast { colors } => cmd_contrast(&colors),
        Commands::Config { overrides } => {
            let config = effective_config(cli.config.as_deref(), &overrides)?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn effective_config(path: Option<&Path>, overrides: &Overrides) -> Result<SitewrightConfig> {
    let mut config = SitewrightConfig::load_or_default(path).context("Failed to load configuration")?;
    overrides.apply(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn read_brief(args: &BuildArgs) -> Result<ClientRequest> {
    if let Some(path) = &args.brief {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read brief: {:?}", path))?;
        return serde_json::from_str(&content).with_context(|| format!("Invalid brief JSON in {:?}", path));
    }
    match (&args.name, &args.niche, &args.goals, &args.email) {
        (Some(name), Some(niche), Some(goals), Some(email)) => {
            Ok(ClientRequest::new(name, niche, goals, email))
        }
        _ => bail!("Provide --brief <file> or all of --name, --niche, --goals, --email"),
    }
}

fn inference_backend(config: &SitewrightConfig) -> Result<Arc<dyn InferenceBackend>> {
    let backend = OpenAiCompatibleBackend::from_config(&config.inference).with_context(|| {
        format!(
            "Set {} to an API key for {}",
            config.inference.api_key_env, config.inference.base_url
        )
    })?;
    Ok(Arc::new(backend))
}

fn notifier_for(config: &SitewrightConfig) -> Result<Arc<dyn Notifier>> {
    match &config.notify.webhook_url {
        Some(url) => Ok(Arc::new(
            WebhookNotifier::new(url.clone()).context("Invalid webhook configuration")?,
        )),
        None => Ok(Arc::new(LogNotifier)),
    }
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; stopping at the next phase boundary");
            token.cancel();
        }
    });
}

/// Print progress events to stderr until the sender side is dropped.
fn spawn_progress(mut rx: UnboundedReceiver<BuildEvent>, json: bool) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if json {
                if let Ok(line) = serde_json::to_string(&event) {
                    eprintln!("{line}");
                }
            } else if let Some(line) = render_event(&event) {
                eprintln!("{line}");
            }
        }
    })
}

fn render_event(event: &BuildEvent) -> Option<String> {
    let line = match event {
        BuildEvent::PhaseStarted { phase, step, total } => format!("[{step}/{total}] {phase}"),
        BuildEvent::PhaseCompleted { .. } => return None,
        BuildEvent::NegotiationRound {
            round,
            speaker,
            action,
            score,
        } => match score {
            Some(score) => format!("  round {round}: {speaker:?} {action:?} (score {score:.1})"),
            None => format!("  round {round}: {speaker:?} {action:?}"),
        },
        BuildEvent::PageGenerated {
            slug,
            status,
            index,
            total,
        } => format!("  page {index}/{total} {slug} ({status:?})"),
        BuildEvent::PageFixed {
            slug,
            attempt,
            accepted,
        } => format!(
            "  repair {slug} after attempt {attempt}: {}",
            if *accepted { "accepted" } else { "rejected" }
        ),
        BuildEvent::TestAttempt {
            attempt,
            max_attempts,
            passed,
            failure_count,
        } => {
            if *passed {
                format!("  tests passed on attempt {attempt}/{max_attempts}")
            } else {
                format!("  attempt {attempt}/{max_attempts}: {failure_count} failure(s)")
            }
        }
        BuildEvent::Warning { message } => format!("  warning: {message}"),
        BuildEvent::BuildFinished { status, live_url } => match live_url {
            Some(url) => format!("Build {status:?}: {url}"),
            None => format!("Build {status:?}"),
        },
        BuildEvent::BuildFailed { phase, error } => match phase {
            Some(phase) => format!("Build failed during {phase}: {error}"),
            None => format!("Build failed: {error}"),
        },
    };
    Some(line)
}

async fn cmd_build(config: SitewrightConfig, args: &BuildArgs, json: bool) -> Result<()> {
    let request = read_brief(args)?;
    let backend = inference_backend(&config)?;
    let runner: Arc<dyn ProcessRunner> = Arc::new(TokioProcessRunner);
    let publisher = publisher_for(&config, Arc::clone(&runner));
    let notifier = notifier_for(&config)?;

    std::fs::create_dir_all(&config.site.work_dir)
        .with_context(|| format!("Failed to create work dir {:?}", config.site.work_dir))?;

    let (events, rx) = EventSink::channel();
    let progress = spawn_progress(rx, json);
    let orchestrator =
        BuildOrchestrator::new(config, backend, runner, publisher, notifier).with_events(events);
    cancel_on_interrupt(orchestrator.cancellation());

    info!(business = %request.business_name, "Starting build");
    let outcome = orchestrator.build(request).await;
    drop(orchestrator);
    let _ = progress.await;

    println!("{}", serde_json::to_string_pretty(&outcome)?);

    match outcome.status {
        BuildStatus::Failed => bail!(
            "Build failed: {}",
            outcome.error.as_deref().unwrap_or("unknown error")
        ),
        BuildStatus::Degraded => {
            warn!(
                residual_failures = outcome.residual_failures().len(),
                "Site deployed with unresolved test failures"
            );
            Ok(())
        }
        BuildStatus::Succeeded => Ok(()),
    }
}

async fn cmd_check(mut config: SitewrightConfig, dir: &Path, no_repair: bool, json: bool) -> Result<()> {
    let dir = dir
        .canonicalize()
        .with_context(|| format!("Site directory not found: {:?}", dir))?;
    let (blueprint, mut pages) = load_site(&dir)
        .await
        .with_context(|| format!("Failed to load site from {:?}", dir))?;
    let _span = BuildSpan::enter(&format!("check:{}", blueprint.site_name));
    info!(pages = pages.len(), "Loaded site");

    config.quality.enabled = true;
    let backend: Arc<dyn InferenceBackend> = if no_repair {
        config.quality.max_fix_attempts = 1;
        // A single test run never reaches a repair round.
        Arc::new(OpenAiCompatibleBackend::new(
            String::new(),
            config.inference.base_url.clone(),
            config.inference.model.clone(),
            std::time::Duration::from_secs(config.inference.timeout_secs),
        )?)
    } else {
        inference_backend(&config)?
    };
    let client = InferenceClient::new(backend)
        .with_policy(config.inference.retry_policy())
        .with_default_model(config.inference.model.clone());

    let qa_dir = config
        .site
        .work_dir
        .join(format!("{}-qa", blueprint.site_name));
    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    let (events, rx) = EventSink::channel();
    let progress = spawn_progress(rx, json);
    let outcome = QualityGate::new(
        Arc::new(TokioProcessRunner),
        client,
        config.quality.clone(),
        config.inference.max_tokens,
    )
    .with_events(events)
    .with_cancellation(cancel)
    .run(&blueprint, &dir, &qa_dir, &mut pages)
    .await?;
    let _ = progress.await;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if outcome.status == QualityStatus::Degraded {
        bail!(
            "{} failure(s) remain after {} run(s)",
            outcome.report.failures.len(),
            outcome.attempts
        );
    }
    Ok(())
}

fn cmd_contrast(colors: &[String]) -> Result<()> {
    let mut invalid = Vec::new();
    for color in colors {
        match correct_color(color) {
            Some(c) if c.changed() => println!(
                "{} -> {}  ({:.2}:1 -> {:.2}:1, {} step(s))",
                c.original, c.corrected, c.ratio_before, c.ratio_after, c.steps
            ),
            Some(c) => println!(
                "{}  ({:.2}:1, already meets {MIN_CONTRAST}:1)",
                c.original, c.ratio_before
            ),
            None => {
                println!("{color}  (not a hex colour)");
                invalid.push(color.as_str());
            }
        }
    }
    if !invalid.is_empty() {
        bail!("Invalid colour(s): {}", invalid.join(", "));
    }
    Ok(())
}
