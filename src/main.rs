//! ReviewSwarm - multi-agent LLM code review
//!
//! A CLI tool that sends one source file to several specialized LLM
//! reviewers in parallel, enriches their prompts with similar reference
//! patterns, and aggregates the findings into one pollable review.
//!
//! Exit codes:
//!   0 - Success (no issues above threshold, or no --fail-on set)
//!   1 - Runtime error (config, store, unknown review id, degraded health)
//!   2 - Issues found above --fail-on threshold

mod agent;
mod cli;
mod config;
mod error;
mod inference;
mod models;
mod report;
mod retrieval;
mod review;
mod source;
mod store;

use anyhow::{bail, Context, Result};
use cli::{Args, Command, FailOnLevel, OutputFormat, ReviewArgs};
use config::{Config, CONFIG_FILE};
use error::ReviewError;
use indicatif::{ProgressBar, ProgressStyle};
use inference::{Embedder, OllamaEmbedder};
use models::{
    HealthStatus, IssueSummary, ReferencePattern, ReviewRequest, ReviewSnapshot, Severity,
};
use review::Orchestrator;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use store::Store;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // No logging needed to write a config file
    if matches!(args.command, Command::InitConfig) {
        return handle_init_config();
    }

    init_logging(&args);

    info!("ReviewSwarm v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle `init-config`: generate a default .reviewswarm.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to customize providers, retrieval and storage.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
///
/// Logs go to stderr so reports can be piped from stdout. `RUST_LOG`
/// overrides `--verbose`/`--quiet` when set.
fn init_logging(args: &Args) {
    let result = if std::env::var_os("RUST_LOG").is_some() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(args.log_level())
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    };

    if let Err(e) = result {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Dispatch the subcommand. Returns the process exit code.
async fn run(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let store = store::open_store(&config.store)
        .await
        .context("Failed to open review store")?;

    match args.command {
        Command::Review(ref review) => run_review(review, &config, store, args.quiet).await,
        Command::Show {
            ref review_id,
            format,
        } => show_review(review_id, format, store).await,
        Command::Stats => {
            let stats = store.stats().await.context("Failed to read stats")?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(0)
        }
        Command::Health => {
            let health = Orchestrator::from_config(&config, store).health().await;
            println!("{}", serde_json::to_string_pretty(&health)?);
            Ok(match health.status {
                HealthStatus::Healthy => 0,
                HealthStatus::Degraded => 1,
            })
        }
        Command::ImportPatterns { ref file } => import_patterns(file, &config, store).await,
        Command::InitConfig => handle_init_config().map(|_| 0),
    }
}

/// Submit a file, wait for the review to complete and write the report.
async fn run_review(
    review: &ReviewArgs,
    config: &Config,
    store: Arc<dyn Store>,
    quiet: bool,
) -> Result<i32> {
    let submission = source::load_submission(&review.file, review.language.as_deref())?;

    let agents = review
        .agents
        .clone()
        .unwrap_or_else(|| config.general.default_agents.clone());
    let mut expected = agents.clone();
    expected.sort();
    expected.dedup();

    let orchestrator = Orchestrator::from_config(config, store);

    let mut request = ReviewRequest::new(submission, agents);
    request.use_retrieval = config.retrieval.enabled && !review.no_retrieval;

    let submitted = orchestrator.submit(request).await?;
    let review_id = submitted.snapshot.review_id.clone();
    let handle = submitted.handle;

    if review.no_wait {
        println!("{}", review_id);
        // The job still has to finish before the runtime goes away.
        if let Err(e) = handle.await {
            warn!("Review job for {} ended abnormally: {}", review_id, e);
        }
        return Ok(0);
    }

    if !quiet {
        eprintln!("📨 Review {} submitted", review_id);
        eprintln!(
            "   Agents: {}",
            expected
                .iter()
                .map(|a| a.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    let interval = Duration::from_millis(
        review
            .poll_interval
            .unwrap_or(config.general.poll_interval_ms),
    );

    let spinner = if quiet {
        None
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    };

    let snapshot = loop {
        let finished = handle.is_finished();
        let snapshot = orchestrator.get_review(&review_id).await?;
        if snapshot.is_completed() {
            break snapshot;
        }
        if finished {
            bail!(
                "Review {} stopped before completing ({} of {} agent result(s) stored; see the log)",
                review_id,
                snapshot.results.len(),
                expected.len()
            );
        }
        if let Some(ref pb) = spinner {
            pb.set_message(format!(
                "{} of {} agent(s) reported",
                snapshot.results.len(),
                expected.len()
            ));
        }
        tokio::time::sleep(interval).await;
    };

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let output = render(&snapshot, review.format)?;
    match review.output {
        Some(ref path) => {
            std::fs::write(path, &output)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
        }
        None => print!("{}", output),
    }

    let summary = IssueSummary::from_issues(snapshot.counted_issues());
    if !quiet {
        print_summary(&snapshot, &summary);
        if let Some(ref path) = review.output {
            eprintln!("\n✅ Review complete! Report saved to: {}", path.display());
        }
    }

    // Check --fail-on threshold
    if let Some(fail_level) = review.fail_on {
        let threshold = fail_on_to_severity(fail_level);
        if snapshot.counted_issues().any(|i| i.severity >= threshold) {
            eprintln!(
                "\n⛔ Issues found at or above {} severity. Failing (exit code 2).",
                threshold
            );
            return Ok(2);
        }
    }

    Ok(0)
}

fn print_summary(snapshot: &ReviewSnapshot, summary: &IssueSummary) {
    eprintln!("\n📊 Review Summary:");
    eprintln!("   Total issues: {}", summary.total);
    eprintln!(
        "   - 🔴 Critical: {} | 🟠 High: {} | 🟡 Medium: {} | 🟢 Low: {}",
        summary.critical, summary.high, summary.medium, summary.low
    );
    for failed in snapshot.failed_results() {
        eprintln!(
            "   ⚠️  {} agent failed: {}",
            failed.variant,
            failed.error.as_deref().unwrap_or("unknown error")
        );
    }
    if let Some(total_time) = snapshot.total_time {
        eprintln!("   Duration: {:.1}s", total_time);
    }
}

/// Print a stored review in the requested format.
async fn show_review(
    review_id: &str,
    format: OutputFormat,
    store: Arc<dyn Store>,
) -> Result<i32> {
    let orchestrator = Orchestrator::new(store, Vec::new(), None);

    match orchestrator.get_review(review_id).await {
        Ok(snapshot) => {
            print!("{}", render(&snapshot, format)?);
            Ok(0)
        }
        Err(ReviewError::NotFound(id)) => {
            eprintln!("❌ Review not found: {}", id);
            Ok(1)
        }
        Err(e) => Err(e.into()),
    }
}

/// Load reference patterns from a JSON array and insert them.
///
/// Patterns without an embedding are embedded first when an embedding
/// model is configured.
async fn import_patterns(file: &Path, config: &Config, store: Arc<dyn Store>) -> Result<i32> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let patterns: Vec<ReferencePattern> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse patterns from {}", file.display()))?;

    let embedder: Option<Arc<dyn Embedder>> =
        config.retrieval.embedding_model.as_deref().map(|model| {
            Arc::new(OllamaEmbedder::new(&config.retrieval.embedding_url, model)) as Arc<dyn Embedder>
        });

    let mut embedded = 0usize;
    for mut pattern in patterns.iter().cloned() {
        if pattern.embedding.is_none() {
            if let Some(ref embedder) = embedder {
                match embedder.embed(&pattern.snippet).await {
                    Ok(vector) => {
                        pattern.embedding = Some(vector);
                        embedded += 1;
                    }
                    Err(e) => warn!("Could not embed pattern '{}': {}", pattern.name, e),
                }
            }
        }
        let id = store
            .insert_pattern(&pattern)
            .await
            .with_context(|| format!("Failed to store pattern '{}'", pattern.name))?;
        debug!("Stored pattern '{}' as #{}", pattern.name, id);
    }

    println!(
        "✅ Imported {} pattern(s) ({} embedded now)",
        patterns.len(),
        embedded
    );
    Ok(0)
}

fn render(snapshot: &ReviewSnapshot, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => report::generate_json_report(snapshot),
        OutputFormat::Markdown => Ok(report::generate_markdown_report(snapshot)),
    }
}

/// Convert FailOnLevel to Severity for comparison.
fn fail_on_to_severity(level: FailOnLevel) -> Severity {
    match level {
        FailOnLevel::Low => Severity::Low,
        FailOnLevel::Medium => Severity::Medium,
        FailOnLevel::High => Severity::High,
        FailOnLevel::Critical => Severity::Critical,
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
