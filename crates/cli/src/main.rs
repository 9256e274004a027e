use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use context_impact::memory::{InMemoryConceptStore, KeywordConceptExtractor, RulePatternEngine};
use context_impact::{
    lightweight_analysis, minimal_analysis, AnalyzerEvent, AnalyzerOptions, ChangeAnalyzer,
    ChangeKind, Collaborators, FileChange,
};
use log::{debug, info, warn};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

const DRAIN_POLL: Duration = Duration::from_millis(10);
const PRINTER_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "context-impact")]
#[command(about = "Incremental change-impact analysis for a codebase", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,

    /// Analyzer configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: OptionOverrides,
}

#[derive(Args, Debug, Default)]
struct OptionOverrides {
    /// Maximum number of changes drained per batch
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Debounce window in milliseconds
    #[arg(long, global = true)]
    delay_ms: Option<u64>,

    /// Disable the per-change heuristic analysis
    #[arg(long, global = true)]
    no_realtime: bool,

    /// Disable learning write-back
    #[arg(long, global = true)]
    no_learning: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the immediate heuristic analysis of one change
    Quick(QuickArgs),

    /// Read JSON-lines file changes from stdin and print analyzer events
    Stream,

    /// Print the effective configuration
    Config,
}

#[derive(Args)]
struct QuickArgs {
    /// Changed file path
    path: String,

    /// Kind of change
    #[arg(long, value_enum, default_value_t = KindArg::Change)]
    kind: KindArg,

    /// Language tag (inferred from the extension when omitted)
    #[arg(long)]
    language: Option<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindArg {
    Add,
    Change,
    Unlink,
}

impl From<KindArg> for ChangeKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Add => Self::Add,
            KindArg::Change => Self::Change,
            KindArg::Unlink => Self::Unlink,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let options = resolve_options(cli.config.as_ref(), &cli.overrides)?;
    debug!("Effective options: {options:?}");

    match cli.command {
        Commands::Quick(args) => run_quick(args, &options),
        Commands::Stream => run_stream(options).await,
        Commands::Config => print_json(&options),
    }
}

fn resolve_options(path: Option<&PathBuf>, overrides: &OptionOverrides) -> Result<AnalyzerOptions> {
    let base = match path {
        Some(path) => AnalyzerOptions::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => AnalyzerOptions::default(),
    };
    let mut options = base
        .with_env_overrides()
        .context("invalid CONTEXT_IMPACT_* environment override")?;

    if let Some(batch_size) = overrides.batch_size {
        options.batch_size = batch_size;
    }
    if let Some(delay_ms) = overrides.delay_ms {
        options.analysis_delay_ms = delay_ms;
    }
    if overrides.no_realtime {
        options.enable_real_time_analysis = false;
    }
    if overrides.no_learning {
        options.enable_pattern_learning = false;
    }
    options.validate()?;
    Ok(options)
}

fn run_quick(args: QuickArgs, options: &AnalyzerOptions) -> Result<()> {
    let mut change = FileChange::new(args.path, args.kind.into());
    change.language = args.language;
    let change = Arc::new(change);
    let analysis = if options.enable_real_time_analysis {
        lightweight_analysis(change)
    } else {
        minimal_analysis(change)
    };
    print_json(&analysis)
}

async fn run_stream(options: AnalyzerOptions) -> Result<()> {
    let store = Arc::new(InMemoryConceptStore::new());
    let collaborators = Collaborators::new(
        Arc::new(KeywordConceptExtractor::new(store.clone())?),
        Arc::new(RulePatternEngine::with_default_rules()?),
        store,
    );
    let analyzer = ChangeAnalyzer::start(collaborators, options)?;
    let printer = spawn_printer(analyzer.subscribe());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut accepted = 0usize;
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<FileChange>(line) {
            Ok(change) => {
                analyzer.analyze_change(change);
                accepted += 1;
            }
            Err(err) => warn!("Skipping malformed change event: {err}"),
        }
    }
    info!("Input closed after {accepted} change(s); draining queue");

    drain(&analyzer).await;
    drop(analyzer);

    if tokio::time::timeout(PRINTER_GRACE, printer).await.is_err() {
        warn!("Event printer did not finish within {PRINTER_GRACE:?}");
    }
    Ok(())
}

/// Stops the scheduler and analyzes whatever is still queued.
async fn drain(analyzer: &ChangeAnalyzer) {
    analyzer.shutdown();
    loop {
        while analyzer.is_analyzing() {
            tokio::time::sleep(DRAIN_POLL).await;
        }
        match analyzer.process_batch().await {
            Ok(Some(summary)) => debug!("Drained {} change(s)", summary.count),
            Ok(None) if analyzer.queue_size() == 0 => break,
            Ok(None) => {}
            Err(err) => warn!("Final batch failed: {err}"),
        }
    }
}

fn spawn_printer(
    mut events: tokio::sync::broadcast::Receiver<AnalyzerEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Err(err) = print_json_line(&event) {
                        warn!("Failed to print {} event: {err}", event.name());
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event printer fell behind; {skipped} event(s) dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn print_json_line(value: &impl serde::Serialize) -> Result<()> {
    let line = serde_json::to_string(value)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}")?;
    stdout.flush()?;
    Ok(())
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
