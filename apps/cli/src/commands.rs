//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use riskclause_classifier::{Classifier, OpenAiCompatClient};
use riskclause_core::aggregator::aggregate_run;
use riskclause_core::pipeline::{
    AnalyzeConfig, AnalyzeResult, PageOutcome, ProgressReporter, analyze_document,
};
use riskclause_riskmodel::{TableFormat, build_risk_model};
use riskclause_shared::{
    AppConfig, ClassifierConfig, RiskClauseError, init_config, load_config, validate_api_key,
};
use riskclause_storage::{RunStore, write_json_atomic};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// riskclause: sort contract clauses into risk bands.
#[derive(Parser)]
#[command(
    name = "riskclause",
    version,
    about = "Classify contract clauses against a scored risk table and report them by severity.",
    long_about = None,
)]
pub(crate) struct Cli {
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
    /// Classify a contract PDF and build its severity report.
    Analyze {
        /// Contract document (PDF).
        document: PathBuf,

        /// Risk table (.csv, .xlsx, .xls, .ods). Defaults to the configured table.
        #[arg(long)]
        risk_table: Option<PathBuf>,

        /// Run directory (defaults to <work_root>/<document stem>).
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Discard results of an earlier run instead of resuming it.
        #[arg(long)]
        fresh: bool,

        /// Write the report JSON to this file instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Give up on a page after this many rate-limited attempts.
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        max_attempts: Option<u32>,
    },

    /// Show how the risk table's terms are scored and banded.
    Model {
        /// Risk table (.csv, .xlsx, .xls, .ods). Defaults to the configured table.
        #[arg(long)]
        risk_table: Option<PathBuf>,

        /// Print the band partitions as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Rebuild the severity report from a run directory.
    Report {
        /// Run directory written by `analyze`.
        #[arg(long)]
        work_dir: PathBuf,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
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

/// Initialize tracing based on CLI flags. Logs go to stderr; stdout carries reports.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "riskclause=info",
        1 => "riskclause=debug",
        _ => "riskclause=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
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
    match cli.command {
        Command::Analyze {
            document,
            risk_table,
            work_dir,
            fresh,
            out,
            max_attempts,
        } => {
            cmd_analyze(AnalyzeArgs {
                document,
                risk_table,
                work_dir,
                fresh,
                out,
                max_attempts,
            })
            .await
        }
        Command::Model { risk_table, json } => cmd_model(risk_table, json),
        Command::Report { work_dir } => cmd_report(&work_dir),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// analyze
// ---------------------------------------------------------------------------

struct AnalyzeArgs {
    document: PathBuf,
    risk_table: Option<PathBuf>,
    work_dir: Option<PathBuf>,
    fresh: bool,
    out: Option<PathBuf>,
    max_attempts: Option<u32>,
}

async fn cmd_analyze(args: AnalyzeArgs) -> Result<()> {
    let config = load_config()?;

    // Reject bad inputs before anything touches the network.
    check_is_pdf(&args.document)?;
    let risk_table = resolve_risk_table(args.risk_table, &config);
    TableFormat::from_path(&risk_table)?;
    validate_api_key(&config)?;

    let bytes =
        std::fs::read(&args.document).map_err(|e| RiskClauseError::io(&args.document, e))?;
    let document_name = args
        .document
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| args.document.display().to_string());
    let work_dir = args
        .work_dir
        .unwrap_or_else(|| default_work_dir(&config, &args.document));

    let mut classifier_config = ClassifierConfig::from(&config);
    if let Some(max) = args.max_attempts {
        classifier_config.retry.max_attempts = Some(max);
    }
    let classifier = Classifier::new(OpenAiCompatClient::from_config(&config)?, classifier_config);

    let analyze_config = AnalyzeConfig {
        document_name,
        risk_table,
        work_dir,
        fresh: args.fresh,
    };

    info!(
        document = %analyze_config.document_name,
        risk_table = %analyze_config.risk_table.display(),
        work_dir = %analyze_config.work_dir.display(),
        model = %classifier.config().model,
        "analyzing contract"
    );

    let reporter = CliProgress::new();
    let result = match analyze_document(&analyze_config, &bytes, &classifier, &reporter).await {
        Ok(result) => result,
        Err(e) => {
            reporter.spinner.abandon_with_message("analysis failed");
            return Err(e.into());
        }
    };

    eprintln!();
    eprintln!("  Analysis complete!");
    eprintln!("  Pages:    {}", result.pages_total);
    eprintln!("  Classified: {}", result.pages_classified);
    if result.pages_resumed > 0 {
        eprintln!("  Resumed:  {}", result.pages_resumed);
    }
    if result.pages_failed > 0 {
        eprintln!("  Failed:   {} (re-run to retry)", result.pages_failed);
    }
    eprintln!(
        "  Report:   {} high / {} medium / {} low",
        result.report.high.len(),
        result.report.medium.len(),
        result.report.low.len()
    );
    eprintln!("  Run dir:  {}", result.work_dir.display());
    eprintln!("  Time:     {:.1}s", result.elapsed.as_secs_f64());
    eprintln!();

    match args.out {
        Some(path) => {
            write_json_atomic(&path, &result.report)?;
            eprintln!("  Report written to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&result.report)?),
    }

    Ok(())
}

fn check_is_pdf(document: &Path) -> Result<()> {
    let is_pdf = document
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        return Err(eyre!(
            "'{}' is not a PDF document: expected a .pdf file",
            document.display()
        ));
    }
    Ok(())
}

fn resolve_risk_table(flag: Option<PathBuf>, config: &AppConfig) -> PathBuf {
    flag.unwrap_or_else(|| PathBuf::from(&config.defaults.risk_table))
}

/// `<work_root>/<document stem>`, so re-running the same file resumes its run.
fn default_work_dir(config: &AppConfig, document: &Path) -> PathBuf {
    let stem = document
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    PathBuf::from(&config.defaults.work_root).join(stem)
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
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn page_done(&self, page: u32, total: usize, outcome: PageOutcome) {
        let status = match outcome {
            PageOutcome::Merged { sentences } => format!("{sentences} sentences"),
            PageOutcome::AlreadyMerged => "already done".to_string(),
            PageOutcome::Failed => "failed, skipped".to_string(),
        };
        self.spinner
            .set_message(format!("Classifying [{page}/{total}] {status}"));
    }

    fn done(&self, _result: &AnalyzeResult) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// model / report / config
// ---------------------------------------------------------------------------

fn cmd_model(risk_table: Option<PathBuf>, json: bool) -> Result<()> {
    let config = load_config()?;
    let risk_table = resolve_risk_table(risk_table, &config);
    let model = build_risk_model(&risk_table)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&model.partitions())?);
        return Ok(());
    }

    println!("{:<8} {:>10} {:>8} {:>8}  TERM", "BAND", "IMPACT", "PROB", "SCORE");
    for term in model.terms() {
        println!(
            "{:<8} {:>10} {:>8} {:>8.2}  {}",
            term.band, term.financial_impact, term.probability, term.severity_score, term.term
        );
    }
    Ok(())
}

fn cmd_report(work_dir: &Path) -> Result<()> {
    let store = RunStore::open_readonly(work_dir)?;
    let report = aggregate_run(&store)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
