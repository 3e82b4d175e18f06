//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use tenderwatch_artifacts::{export_json, write_digest, write_recommendations_csv};
use tenderwatch_core::{
    DecisionEngine, NoticeOutcome, NoticeReport, NoticeStore, OllamaClient, PipelineCoordinator,
    ProgressReporter, RunSummary,
};
use tenderwatch_crawler::{BrowserlessRenderer, FetchOrchestrator, Renderer};
use tenderwatch_shared::{
    AppConfig, CanonicalKey, DecisionState, RunConfig, expand_home, init_config, load_config,
    load_config_from,
};
use tenderwatch_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// TenderWatch: tender-notice ingestion and triage.
#[derive(Parser)]
#[command(
    name = "tenderwatch",
    version,
    about = "Fetch tender notices, decide which are worth pursuing, and keep an auditable record.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.tenderwatch/tenderwatch.toml).
    #[arg(long, global = true, env = "TENDERWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
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
    /// Fetch the notice list and process new or changed notices.
    Run(RunArgs),

    /// List stored notices, best fit first.
    List {
        /// Only notices in this state (RECOMMEND, REVIEW, SKIP, UNKNOWN).
        #[arg(long)]
        state: Option<DecisionState>,

        /// Maximum rows to show.
        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// Show one stored notice with its decision.
    Show {
        /// Canonical key, e.g. `source:12345`.
        key: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Flags for `tenderwatch run`. Unset flags fall back to the config file.
#[derive(Args)]
pub(crate) struct RunArgs {
    /// Maximum notices to process.
    #[arg(long)]
    max_notices: Option<usize>,

    /// Store notices without consulting the decision engine.
    #[arg(long)]
    no_analyze: bool,

    /// Do not open the database; every notice counts as new.
    #[arg(long)]
    no_db: bool,

    /// Write the run's results as JSON to this file.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Seconds to wait between notices.
    #[arg(long)]
    delay: Option<f64>,

    /// Re-analyze notices even when their content is unchanged.
    #[arg(long)]
    force: bool,

    /// Notices processed at the same time.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Directory for the recommendations CSV and the Markdown digest.
    #[arg(long)]
    report_dir: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
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
        0 => "tenderwatch=info",
        1 => "tenderwatch=debug",
        _ => "tenderwatch=trace",
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
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run(args) => cmd_run(&load(config_path)?, args).await,
        Command::List { state, limit } => cmd_list(&load(config_path)?, state, limit).await,
        Command::Show { key } => cmd_show(&load(config_path)?, &key).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&load(config_path)?),
        },
    }
}

fn load(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

fn run_config(config: &AppConfig, args: &RunArgs) -> Result<RunConfig> {
    let mut run = RunConfig::from(config);
    if let Some(max) = args.max_notices {
        run.max_notices = max;
    }
    if args.no_analyze {
        run.analyze = false;
    }
    if args.no_db {
        run.persist = false;
    }
    if let Some(delay) = args.delay {
        run.request_delay = Duration::try_from_secs_f64(delay)
            .map_err(|e| eyre!("invalid --delay {delay}: {e}"))?;
    }
    if let Some(concurrency) = args.concurrency {
        run.concurrency = concurrency.max(1);
    }
    run.force = args.force;
    Ok(run)
}

async fn cmd_run(config: &AppConfig, args: RunArgs) -> Result<()> {
    let run = run_config(config, &args)?;
    info!(
        max_notices = run.max_notices,
        analyze = run.analyze,
        persist = run.persist,
        force = run.force,
        concurrency = run.concurrency,
        "starting tenderwatch run"
    );

    let renderer: Option<Arc<dyn Renderer>> = match BrowserlessRenderer::from_config(&config.renderer)? {
        Some(renderer) => Some(Arc::new(renderer) as Arc<dyn Renderer>),
        None => {
            info!("no renderer endpoint configured, render tiers disabled");
            None
        }
    };
    let orchestrator = Arc::new(FetchOrchestrator::new(config, renderer)?);
    let completion = Arc::new(OllamaClient::new(&config.completion)?);
    let engine = DecisionEngine::new(config, completion)?;

    let store: Option<Arc<dyn NoticeStore>> = if run.persist {
        let path = config.storage.resolved_db_path()?;
        info!(path = %path.display(), "opening notice database");
        Some(Arc::new(Storage::open(&path).await?) as Arc<dyn NoticeStore>)
    } else {
        None
    };

    let analyze = run.analyze;
    let coordinator = PipelineCoordinator::new(run, orchestrator, engine, store);
    let cancel = coordinator.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing notices in flight");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let reporter = CliProgress::new();
    let summary = coordinator.run(&reporter).await?;

    if let Some(output) = &args.output {
        export_json(&summary, output)?;
    }
    let report_dir = match &args.report_dir {
        Some(dir) => dir.clone(),
        None => expand_home(&config.run.report_dir)?,
    };
    let reports = write_reports(&summary, analyze, &report_dir, chrono::Utc::now())?;

    print_summary(&summary);
    if let Some(output) = &args.output {
        println!("  Results:   {}", output.display());
    }
    if let Some(reports) = &reports {
        println!("  CSV:       {}", reports.csv.display());
        println!("  Digest:    {}", reports.digest.display());
    }
    println!();

    Ok(())
}

/// Files written next to each other in the report directory.
#[derive(Debug)]
struct Reports {
    csv: PathBuf,
    digest: PathBuf,
}

/// Write the recommendations CSV and the digest. Runs without analysis have
/// no decisions to report, so nothing is written.
fn write_reports(
    summary: &RunSummary,
    analyze: bool,
    dir: &Path,
    generated_at: chrono::DateTime<chrono::Utc>,
) -> Result<Option<Reports>> {
    if !analyze {
        info!("analysis disabled, skipping reports");
        return Ok(None);
    }
    Ok(Some(Reports {
        csv: write_recommendations_csv(summary, dir, generated_at)?,
        digest: write_digest(summary, dir, generated_at)?,
    }))
}

fn print_summary(summary: &RunSummary) {
    let stats = &summary.stats;
    println!();
    if stats.cancelled {
        println!("  Run interrupted.");
    } else {
        println!("  Run complete.");
    }
    println!("  Listed:    {}", stats.listed);
    println!("  New:       {}", stats.new);
    println!("  Changed:   {}", stats.changed);
    println!("  Unchanged: {}", stats.unchanged);
    println!("  Failed:    {}", stats.failed);
    println!(
        "  Decisions: {} RECOMMEND, {} REVIEW, {} SKIP, {} UNKNOWN",
        stats.recommend, stats.review, stats.skip, stats.unknown
    );
    println!("  Time:      {:.1}s", summary.elapsed.as_secs_f64());
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner, then a bar once the list is known.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            bar.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
        }
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn notices_found(&self, total: usize) {
        self.bar.set_length(total as u64);
        if let Ok(style) = ProgressStyle::with_template("{bar:30.cyan/blue} {pos}/{len} {msg}") {
            self.bar.set_style(style);
        }
    }

    fn notice_done(&self, report: &NoticeReport) {
        self.bar.inc(1);
        let status = match &report.outcome {
            NoticeOutcome::Processed {
                decision: Some(d), ..
            } => d.state().as_str().to_string(),
            NoticeOutcome::Processed { .. } => "stored".to_string(),
            NoticeOutcome::Unchanged => "unchanged".to_string(),
            NoticeOutcome::Failed { kind, .. } => kind.clone(),
        };
        self.bar.set_message(format!("{status}: {}", report.title));
    }

    fn done(&self, _summary: &RunSummary) {
        self.bar.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// list / show
// ---------------------------------------------------------------------------

async fn cmd_list(config: &AppConfig, state: Option<DecisionState>, limit: u32) -> Result<()> {
    let storage = Storage::open_readonly(&config.storage.resolved_db_path()?).await?;
    let notices = storage.list_notices(state, limit).await?;

    if notices.is_empty() {
        println!("No notices stored.");
        return Ok(());
    }

    println!("{:<10} {:>5}  {:<36} TITLE", "STATE", "SCORE", "KEY");
    for notice in notices {
        let (state, score) = match &notice.decision {
            Some(d) => (
                d.state().as_str(),
                d.fit_score().map_or_else(|| "-".to_string(), |s| s.to_string()),
            ),
            None => ("-", "-".to_string()),
        };
        println!(
            "{state:<10} {score:>5}  {:<36} {}",
            notice.canonical_key.as_str(),
            notice.title
        );
    }
    Ok(())
}

async fn cmd_show(config: &AppConfig, key: &str) -> Result<()> {
    let storage = Storage::open_readonly(&config.storage.resolved_db_path()?).await?;
    let record = storage
        .get_by_canonical_key(&CanonicalKey::from_stored(key))
        .await?
        .ok_or_else(|| eyre!("no notice stored under '{key}'"))?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use tenderwatch_core::RunStats;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tenderwatch").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn run_flags_override_config() {
        let cli = parse(&[
            "run",
            "--max-notices",
            "3",
            "--no-analyze",
            "--no-db",
            "--delay",
            "0.5",
            "--force",
            "--concurrency",
            "0",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        let run = run_config(&AppConfig::default(), &args).unwrap();

        assert_eq!(run.max_notices, 3);
        assert!(!run.analyze);
        assert!(!run.persist);
        assert!(run.force);
        assert_eq!(run.request_delay, Duration::from_millis(500));
        assert_eq!(run.concurrency, 1);
    }

    #[test]
    fn run_without_flags_uses_config() {
        let Command::Run(args) = parse(&["run"]).command else {
            panic!("expected run");
        };
        let config = AppConfig::default();
        let run = run_config(&config, &args).unwrap();
        assert_eq!(run.max_notices, config.run.max_notices);
        assert!(run.analyze);
        assert!(run.persist);
        assert!(!run.force);
    }

    #[test]
    fn negative_delay_is_rejected() {
        let Command::Run(args) = parse(&["run", "--delay=-1"]).command else {
            panic!("expected run");
        };
        assert!(run_config(&AppConfig::default(), &args).is_err());
    }

    #[test]
    fn list_state_parses_case_insensitively() {
        let Command::List { state, limit } = parse(&["list", "--state", "review"]).command else {
            panic!("expected list");
        };
        assert_eq!(state, Some(DecisionState::Review));
        assert_eq!(limit, 20);
        assert!(Cli::try_parse_from(["tenderwatch", "list", "--state", "later"]).is_err());
    }

    fn empty_summary() -> RunSummary {
        RunSummary {
            run_id: None,
            stats: RunStats::default(),
            notices: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn reports_written_for_analyzed_run() {
        let dir = std::env::temp_dir().join(format!("tw_cli_{}", uuid::Uuid::now_v7()));

        let reports = write_reports(&empty_summary(), true, &dir, chrono::Utc::now())
            .unwrap()
            .unwrap();

        assert!(reports.csv.exists());
        assert!(reports.digest.exists());
        assert_eq!(reports.csv.parent(), Some(dir.as_path()));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn no_reports_without_analysis() {
        let dir = std::env::temp_dir().join(format!("tw_cli_{}", uuid::Uuid::now_v7()));

        let reports = write_reports(&empty_summary(), false, &dir, chrono::Utc::now()).unwrap();

        assert!(reports.is_none());
        assert!(!dir.exists());
    }

    #[test]
    fn global_flags_accepted_after_subcommand() {
        let cli = parse(&["show", "source:881", "-vv", "--log-format", "json"]);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.log_format, LogFormat::Json));
    }
}
