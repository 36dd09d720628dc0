//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use skillcatalog_core::{
    CycleReport, CycleStages, Pipeline, ProgressReporter, load_policy, read_status, update_policy,
};
use skillcatalog_shared::{
    AppConfig, ClassifierMode, IntentTier, PolicyPatch, RuntimePolicy, ValidationProfile,
    config_file_path, init_config, load_config, load_config_from,
};
use skillcatalog_storage::{RequeueFilter, Storage};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// SkillCatalog: crawl, validate, and publish agent skills.
#[derive(Parser)]
#[command(
    name = "skillcatalog",
    version,
    about = "Discover SKILL.md documents, validate and scan them, and publish a trusted catalog.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.skillcatalog/skillcatalog.toml).
    #[arg(long, global = true, env = "SKILLCATALOG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database file, overriding the config.
    #[arg(long, global = true, env = "SKILLCATALOG_DB")]
    pub db: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the worker loop until interrupted.
    Run,

    /// Run a single full cycle: ingest (if enabled), process, backfill.
    Once,

    /// Crawl every active source and store new or changed documents.
    Ingest,

    /// Drain pending documents through validation and publishing.
    Process,

    /// Fill derived fields missing on existing catalog entries.
    Backfill,

    /// Show document counts, catalog size, and the worker heartbeat.
    Status {
        /// Number of recent worker events to print.
        #[arg(long, default_value = "10")]
        events: usize,
    },

    /// Reset processed or errored documents to pending.
    Requeue {
        /// Only requeue documents in the error state.
        #[arg(long, conflicts_with = "processed_only")]
        errors_only: bool,

        /// Only requeue processed documents.
        #[arg(long)]
        processed_only: bool,

        /// Only documents whose URL ends in /SKILL.md.
        #[arg(long)]
        skill_md: bool,

        /// Only documents without a recorded spec report.
        #[arg(long)]
        missing_spec: bool,
    },

    /// List the resolved crawl sources.
    Sources,

    /// Runtime policy management.
    Policy {
        #[command(subcommand)]
        action: PolicyAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Policy subcommands.
#[derive(Subcommand)]
pub(crate) enum PolicyAction {
    /// Show the effective runtime policy.
    Show,
    /// Patch the stored runtime policy.
    Set(PolicySetArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct PolicySetArgs {
    /// lax or strict.
    #[arg(long)]
    validation_profile: Option<ValidationProfile>,
    #[arg(long)]
    enforce_spec: Option<bool>,
    #[arg(long)]
    quality_enforce: Option<bool>,
    #[arg(long)]
    security_scan_enabled: Option<bool>,
    #[arg(long)]
    security_enforce: Option<bool>,
    /// off, suspicious, or always.
    #[arg(long)]
    classifier_mode: Option<ClassifierMode>,
    /// Model confidence needed to block, in [0, 1].
    #[arg(long)]
    confidence_threshold: Option<f64>,
    /// not_skills, mixed, skills_focused, or skills_only.
    #[arg(long)]
    min_repo_tier: Option<IntentTier>,
    #[arg(long)]
    min_intent_score: Option<u8>,
    #[arg(long)]
    auto_ingest_enabled: Option<bool>,
    /// Seconds between cycles, in [10, 86400].
    #[arg(long)]
    interval_secs: Option<u64>,
}

impl From<PolicySetArgs> for PolicyPatch {
    fn from(args: PolicySetArgs) -> Self {
        Self {
            validation_profile: args.validation_profile,
            enforce_spec: args.enforce_spec,
            quality_enforce: args.quality_enforce,
            security_scan_enabled: args.security_scan_enabled,
            security_enforce: args.security_enforce,
            classifier_mode: args.classifier_mode,
            confidence_threshold: args.confidence_threshold,
            min_repo_tier: args.min_repo_tier,
            min_intent_score: args.min_intent_score,
            auto_ingest_enabled: args.auto_ingest_enabled,
            interval_secs: args.interval_secs,
        }
    }
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "skillcatalog=info",
        1 => "skillcatalog=debug",
        _ => "skillcatalog=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;
    match cli.command {
        Command::Run => cmd_run(config).await,
        Command::Once => cmd_cycle(config, CycleStages::FULL).await,
        Command::Ingest => cmd_cycle(config, CycleStages::INGEST).await,
        Command::Process => cmd_cycle(config, CycleStages::PROCESS).await,
        Command::Backfill => cmd_cycle(config, CycleStages::BACKFILL).await,
        Command::Status { events } => cmd_status(&config, events).await,
        Command::Requeue {
            errors_only,
            processed_only,
            skill_md,
            missing_spec,
        } => {
            let filter = RequeueFilter {
                include_processed: !errors_only,
                include_errors: !processed_only,
                only_skill_md: skill_md,
                only_missing_spec: missing_spec,
            };
            cmd_requeue(&config, filter).await
        }
        Command::Sources => cmd_sources(config).await,
        Command::Policy { action } => match action {
            PolicyAction::Show => cmd_policy_show(&config).await,
            PolicyAction::Set(args) => cmd_policy_set(&config, args.into()).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init { force } => cmd_config_init(force),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

fn resolve_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    if let Some(db) = &cli.db {
        config.database.path = Some(db.to_string_lossy().into_owned());
    }
    Ok(config)
}

async fn open_storage(config: &AppConfig) -> Result<Storage> {
    let path = config.database_path()?;
    info!(path = %path.display(), "opening database");
    Ok(Storage::open(&path).await?)
}

async fn open_pipeline(config: AppConfig) -> Result<Pipeline> {
    let storage = open_storage(&config).await?;
    Ok(Pipeline::new(storage, config)?)
}

// ---------------------------------------------------------------------------
// Worker commands
// ---------------------------------------------------------------------------

async fn cmd_run(config: AppConfig) -> Result<()> {
    let pipeline = open_pipeline(config).await?;
    let policy = pipeline.load_policy().await;
    info!(
        interval_secs = policy.interval_secs,
        auto_ingest = policy.auto_ingest_enabled,
        sources = pipeline.sources().len(),
        "starting worker loop"
    );

    let reporter = CliProgress::new();
    pipeline.run_loop(&reporter).await?;
    reporter.finish();
    println!("Worker stopped.");
    Ok(())
}

async fn cmd_cycle(config: AppConfig, stages: CycleStages) -> Result<()> {
    let pipeline = open_pipeline(config).await?;
    let reporter = CliProgress::new();
    let result = pipeline.run_cycle(stages, &reporter).await;
    reporter.finish();
    let report = result?;

    println!();
    print_cycle(&report);
    println!();
    Ok(())
}

fn print_cycle(report: &CycleReport) {
    if let Some(ingest) = &report.ingest {
        println!("  Ingest");
        println!("    Sources:       {} visited, {} skipped", ingest.sources_visited, ingest.sources_skipped);
        println!("    Repositories:  {}", ingest.repositories_scanned);
        println!("    Candidates:    {}", ingest.candidates);
        println!("    New:           {}", ingest.created);
        println!("    Changed:       {}", ingest.content_changed);
        println!("    Unchanged:     {}", ingest.unchanged);
        if ingest.fetch_failures > 0 {
            println!("    Fetch failed:  {}", ingest.fetch_failures);
        }
        for err in &ingest.errors {
            println!("    ! {err}");
        }
    }
    if let Some(processing) = &report.processing {
        println!("  Processing");
        println!("    Batches:       {}", processing.batches);
        println!("    Published:     {} ({} new)", processing.published, processing.created);
        println!("    Skipped:       {}", processing.skipped);
        println!("    Errors:        {}", processing.failed);
        if processing.write_failures > 0 {
            println!("    Unrecorded:    {}", processing.write_failures);
        }
    }
    if let Some(backfill) = &report.backfill {
        println!("  Backfill");
        println!("    Source links:  {}", backfill.source_links);
        println!("    Tags:          {}", backfill.tags);
        println!("    Spec:          {}", backfill.spec);
        println!("    Trust:         {}", backfill.trust);
        println!("    Summaries:     {}", backfill.summaries);
    }
    println!("  Pending:         {} -> {}", report.pending_before, report.pending_after);
    let elapsed = report.finished_at - report.started_at;
    println!(
        "  Time:            {:.1}s",
        elapsed.num_milliseconds() as f64 / 1000.0
    );
}

// ---------------------------------------------------------------------------
// Administrative commands
// ---------------------------------------------------------------------------

async fn cmd_status(config: &AppConfig, events: usize) -> Result<()> {
    let path = config.database_path()?;
    if !path.exists() {
        println!("No database at {} yet. Run `skillcatalog once` first.", path.display());
        return Ok(());
    }
    let storage = Storage::open_readonly(&path).await?;

    let counts = storage.raw_status_counts().await?;
    println!();
    println!("  Database:   {}", path.display());
    println!("  Documents");
    println!("    Pending:    {}", counts.pending);
    println!("    Processed:  {}", counts.processed);
    println!("    Error:      {}", counts.error);
    let by_kind = storage.error_kind_counts().await?;
    if !by_kind.is_empty() {
        println!("  Errors by kind");
        for (kind, count) in by_kind {
            println!("    {kind:<11} {count}");
        }
    }
    println!("  Catalog entries: {}", storage.count_entries().await?);

    match read_status(&storage).await? {
        None => println!("  Worker:     never ran"),
        Some(status) => {
            println!("  Worker");
            println!("    Phase:      {}", status.phase.as_str());
            println!("    Heartbeat:  {}", fmt_time(status.heartbeat_at));
            println!("    Last loop:  {} -> {}", fmt_time(status.loop_started_at), fmt_time(status.loop_finished_at));
            println!("    Next run:   {}", fmt_time(status.next_run_at));
            println!(
                "    Auto-ingest: {} (every {}s)",
                status.auto_ingest_enabled, status.interval_secs
            );
            println!(
                "    Last loop:  {} ingested, {} processed, {} errors, {} backfilled",
                status.last_ingested_documents,
                status.last_processed_in_loop,
                status.last_error_count_in_loop,
                status.last_backfilled
            );
            if let Some(source) = &status.ingest.source_id {
                println!(
                    "    Source:     {source} [{}/{}]",
                    status.ingest.source_index, status.ingest.source_total
                );
            }
            if let Some(err) = &status.last_error {
                println!("    Last error: {err}");
            }
            let skip = status.recent_events.len().saturating_sub(events);
            if events > 0 && !status.recent_events.is_empty() {
                println!("  Recent events");
                for event in status.recent_events.iter().skip(skip) {
                    println!(
                        "    {} {:<5} {}",
                        event.at.format("%Y-%m-%d %H:%M:%S"),
                        format!("{:?}", event.level).to_lowercase(),
                        event.message
                    );
                }
            }
        }
    }
    println!();
    Ok(())
}

fn fmt_time(at: Option<chrono::DateTime<chrono::Utc>>) -> String {
    at.map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}

async fn cmd_requeue(config: &AppConfig, filter: RequeueFilter) -> Result<()> {
    let storage = open_storage(config).await?;
    let count = storage.requeue(filter).await?;
    info!(count, ?filter, "documents requeued");
    println!("Requeued {count} document(s).");
    Ok(())
}

async fn cmd_sources(config: AppConfig) -> Result<()> {
    let storage = open_storage(&config).await?;
    let pipeline = Pipeline::new(storage, config)?;
    println!();
    for source in pipeline.sources() {
        let state = if source.is_active { "active" } else { "inactive" };
        println!(
            "  {:<32} {:<14} {:<8} {}",
            source.id,
            source.kind().as_str(),
            state,
            source.url()
        );
    }
    println!();
    Ok(())
}

async fn cmd_policy_show(config: &AppConfig) -> Result<()> {
    let storage = open_storage(config).await?;
    let policy = load_policy(&storage, &config.policy).await;
    print_policy(&policy)
}

async fn cmd_policy_set(config: &AppConfig, patch: PolicyPatch) -> Result<()> {
    if patch.is_empty() {
        return Err(eyre!("nothing to change: pass at least one policy flag"));
    }
    let storage = open_storage(config).await?;
    let policy = update_policy(&storage, &config.policy, &patch).await?;
    println!("Runtime policy updated.");
    print_policy(&policy)
}

fn print_policy(policy: &RuntimePolicy) -> Result<()> {
    println!("{}", toml::to_string_pretty(policy)?);
    Ok(())
}

fn cmd_config_init(force: bool) -> Result<()> {
    let path = config_file_path()?;
    if path.exists() && !force {
        return Err(eyre!(
            "config already exists at '{}' (use --force to overwrite)",
            path.display()
        ));
    }
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn source_started(&self, source_id: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Ingesting [{current}/{total}] {source_id}"));
    }

    fn document_processed(&self, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Processing [{current}/{total}]"));
    }

    fn done(&self, report: &CycleReport) {
        let published = report.processing.as_ref().map_or(0, |p| p.published);
        self.spinner.println(format!(
            "cycle finished: {published} published, {} pending",
            report.pending_after
        ));
        self.spinner
            .set_message(format!("Idle, next cycle in {}s", report.policy.interval_secs));
    }
}
