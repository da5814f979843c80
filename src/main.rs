//! SimConsult - simulation workbook to executive report
//!
//! Usage:
//!   simconsult analyze ./run42.xlsx
//!   simconsult analyze ./run42.xlsx --json
//!   simconsult inspect ./run42.xlsx
//!   simconsult prompt ./run42.xlsx
//!   simconsult validate ./run42.xlsx --response ./saved_response.json

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use simconsult::ingest::{classify, select, CalamineDecoder, SheetDecoder};
use simconsult::report::{
    ChartPolicy, GeminiGateway, ReportRenderer, ReportValidator, SimulationReport, TextRenderer,
};
use simconsult::{
    AnalysisOutcome, AnalysisSession, AnalyzerConfig, ReportPipeline, ResetHandle, SheetStore,
};

/// Simulation results consultant
#[derive(Parser, Debug)]
#[command(name = "simconsult")]
#[command(about = "Turn a simulation results workbook into an executive report")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true, env = "SIMCONSULT_CONFIG")]
    config: Option<PathBuf>,

    /// Character budget for the serialized workbook payload
    #[arg(long, global = true)]
    max_payload_chars: Option<usize>,

    /// Let the engine estimate chart values (every estimate is flagged)
    #[arg(long, global = true)]
    allow_estimates: bool,

    /// Engine model name
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze a workbook and print the report
    Analyze {
        file: PathBuf,

        /// Print the validated report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show sheets, row counts and how each sheet was classified
    Inspect { file: PathBuf },

    /// Print the instruction and prompt that would be sent, without sending it
    Prompt { file: PathBuf },

    /// Validate a saved engine response against a workbook
    Validate {
        file: PathBuf,

        /// Raw engine response (JSON)
        #[arg(short, long)]
        response: PathBuf,

        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config =
        AnalyzerConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(max) = cli.max_payload_chars {
        config.max_payload_chars = max;
    }
    if cli.allow_estimates {
        config.chart_policy = ChartPolicy::AllowEstimates;
    }
    if let Some(model) = cli.model {
        config.engine.model = model;
    }
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Commands::Analyze { file, json } => analyze(&config, &file, json).await,
        Commands::Inspect { file } => inspect(&config, &file),
        Commands::Prompt { file } => prompt(&config, &file),
        Commands::Validate {
            file,
            response,
            json,
        } => validate(&config, &file, &response, json),
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "simconsult=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Prints the report as pretty JSON.
struct JsonRenderer;

impl ReportRenderer for JsonRenderer {
    fn render(&self, report: Arc<SimulationReport>, _reset: ResetHandle) {
        match serde_json::to_string_pretty(report.as_ref()) {
            Ok(json) => println!("{}", json),
            Err(e) => warn!(error = %e, "failed to serialize report"),
        }
    }
}

fn pipeline(config: &AnalyzerConfig) -> Result<ReportPipeline> {
    let gateway = GeminiGateway::from_config(&config.engine)?;
    Ok(ReportPipeline::new(config, Arc::new(gateway)))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn read_workbook(path: &Path) -> Result<SheetStore> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read workbook: {:?}", path))?;
    let store = CalamineDecoder.decode(&file_name(path), &bytes)?;
    Ok(store)
}

async fn analyze(config: &AnalyzerConfig, path: &Path, json: bool) -> Result<()> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read workbook: {:?}", path))?;
    let renderer: Arc<dyn ReportRenderer> = if json {
        Arc::new(JsonRenderer)
    } else {
        Arc::new(TextRenderer::default())
    };
    let session = AnalysisSession::new(
        Arc::new(pipeline(config)?),
        Arc::new(CalamineDecoder),
        renderer,
    );

    info!(file = ?path, model = %config.engine.model, "analyzing workbook");
    match session.analyze_bytes(&file_name(path), bytes).await {
        Ok(AnalysisOutcome::Rendered(_)) => Ok(()),
        Ok(AnalysisOutcome::Superseded) => {
            warn!("analysis was superseded");
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", e.user_message());
            Err(e).context("Analysis failed")
        }
    }
}

fn inspect(config: &AnalyzerConfig, path: &Path) -> Result<()> {
    let store = read_workbook(path)?;
    let classification = classify(&store, &config.vocabulary);
    let selection = select(&store, &classification);

    println!("Workbook: {:?}", path);
    println!("Sheets:   {}  Rows: {}", store.len(), store.total_rows());
    println!();
    for sheet in store.sheets() {
        let role = classification
            .matched
            .iter()
            .find(|m| m.sheet.name == sheet.name)
            .map(|m| format!("{:?} ({})", m.entry.role, m.entry.id))
            .unwrap_or_else(|| "-".to_string());
        println!("  {:<32} {:>6} rows  {}", sheet.name, sheet.rows.len(), role);
    }
    println!();
    match classification.ground_truth() {
        Some(name) => println!("Ground truth: {}", name),
        None => println!("Ground truth: (none)"),
    }
    if !classification.missing_ids.is_empty() {
        println!("Not found:    {}", classification.missing_ids.join(", "));
    }
    if selection.fallback {
        println!("No known simulation sheets; every sheet would be sent.");
    }
    Ok(())
}

fn prompt(config: &AnalyzerConfig, path: &Path) -> Result<()> {
    let store = read_workbook(path)?;
    let request = pipeline(config)?.prepare(&store)?;

    println!("=== Instruction ===\n{}\n", request.instruction);
    println!("=== Prompt ===\n{}\n", request.prompt);
    println!(
        "=== Schema ===\n{}",
        serde_json::to_string_pretty(&request.schema)?
    );
    Ok(())
}

fn validate(config: &AnalyzerConfig, path: &Path, response: &Path, json: bool) -> Result<()> {
    let store = read_workbook(path)?;
    let raw = std::fs::read_to_string(response)
        .with_context(|| format!("Failed to read response: {:?}", response))?;

    let report = ReportValidator::new(store.names(), config.chart_policy)
        .validate(&raw)
        .context("Response rejected")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", TextRenderer::default().format(&report));
    }
    Ok(())
}
