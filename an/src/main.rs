//! Analyst - multi-period research analysis
//!
//! CLI entry point for running analyses and inspecting the setup.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use futures::StreamExt;
use tracing::{debug, info, warn};

use analyst::cli::{Cli, Command, get_log_path};
use analyst::config::Config;
use analyst::extract::Decision;
use analyst::prompts::PromptLoader;
use analyst::tools::builtin::TavilySearch;
use analyst::tools::{LocalFilingStore, LocalMetricsStore, SearchSource, ToolRegistry};
use analyst::{
    AnalysisMode, AnalysisRecord, AnalysisRequest, Analyst, CancelFlag, FinalDocument, JsonFileSink, ReportSink,
    create_client,
};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level).map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;
    info!(model = %config.llm.model, "Analyst loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Analyze {
            subjects,
            depth,
            mode,
            data_dir,
            output,
        } => {
            debug!(?subjects, depth, %mode, "main: matched Analyze command");
            cmd_analyze(config, subjects, depth as usize, mode, data_dir, output).await
        }
        Command::Tools => {
            debug!("main: matched Tools command");
            cmd_tools(&config)
        }
        Command::Config => {
            debug!("main: matched Config command");
            cmd_config(&config)
        }
        Command::Logs { lines } => {
            debug!(lines, "main: matched Logs command");
            cmd_logs(lines)
        }
    }
}

/// Analyze every subject, up to `max-concurrent-requests` at a time
async fn cmd_analyze(
    mut config: Config,
    subjects: Vec<String>,
    depth: usize,
    mode: AnalysisMode,
    data_dir: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<()> {
    debug!(?subjects, depth, %mode, "cmd_analyze: called");
    if let Some(dir) = data_dir {
        config.tools.data_dir = dir;
    }
    if let Some(dir) = output {
        config.output.report_dir = dir;
    }
    config.validate().context("Invalid configuration")?;

    let llm = create_client(&config.llm).context("Failed to create LLM client")?;
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let sink = JsonFileSink::new(&config.output.report_dir);
    let concurrency = config.max_concurrent_requests;
    let analyst = Arc::new(Analyst::from_config(config, llm, PromptLoader::new(cwd)));

    let cancel = CancelFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current stage");
            eprintln!("{}", "Interrupted: finishing the current stage, then stopping...".yellow());
            on_interrupt.cancel();
        }
    });

    let total = subjects.len();
    let results: Vec<(String, Result<PathBuf>)> = futures::stream::iter(subjects)
        .map(|subject| {
            let analyst = analyst.clone();
            let cancel = cancel.clone();
            let sink = &sink;
            async move {
                let result = analyze_one(&analyst, sink, &subject, depth, mode, &cancel).await;
                (subject, result)
            }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    let failed: Vec<&String> = results
        .iter()
        .filter_map(|(subject, result)| result.is_err().then_some(subject))
        .collect();
    for (subject, result) in &results {
        if let Err(e) = result {
            println!("{} {}: {:#}", "✗".red(), subject.bold(), e);
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(eyre::eyre!("{} of {} analyses failed", failed.len(), total))
    }
}

async fn analyze_one(
    analyst: &Analyst,
    sink: &JsonFileSink,
    subject: &str,
    depth: usize,
    mode: AnalysisMode,
    cancel: &CancelFlag,
) -> Result<PathBuf> {
    debug!(%subject, "analyze_one: called");
    let request = AnalysisRequest::new(subject, depth, mode);
    let started_at = Utc::now();
    let document = analyst.analyze(&request, cancel).await?;
    print_summary(&document);

    let record = AnalysisRecord::new(request, document, started_at, Utc::now());
    let path = sink.write(&record).await?;
    println!("  {} {}", "report:".dimmed(), path.display());
    Ok(path)
}

fn print_summary(document: &FinalDocument) {
    let decision = match document.fields.decision {
        Some(Decision::Buy) => "BUY".green().bold(),
        Some(Decision::Hold) => "HOLD".yellow().bold(),
        Some(Decision::Sell) => "SELL".red().bold(),
        None => "no decision".dimmed(),
    };
    let confidence = document
        .fields
        .confidence
        .map(|c| format!(" ({} confidence)", c))
        .unwrap_or_default();
    println!("{} {}: {}{}", "✓".green(), document.subject.bold(), decision, confidence);

    for (key, value) in &document.fields.numbers {
        println!("  {:<22} {}", key.dimmed(), value);
    }
    let periods: Vec<String> = document.periods.iter().map(|p| format!("{} ({})", p.id, p.strategy)).collect();
    println!("  {:<22} {}", "periods".dimmed(), periods.join(", "));
    if let Some(refinement) = &document.refinement {
        let score = refinement
            .critique
            .as_ref()
            .map_or_else(|| "n/a".to_string(), |c| c.score.to_string());
        println!(
            "  {:<22} score {}, {} fixes applied, {} skipped",
            "review".dimmed(),
            score,
            refinement.applied,
            refinement.skipped
        );
    }
    let usage = document.usage.total();
    println!(
        "  {:<22} {} calls, {} in / {} out tokens",
        "usage".dimmed(),
        document.usage.calls(),
        usage.input_tokens,
        usage.output_tokens
    );
    for degradation in &document.degradations {
        println!("  {} {}", "!".yellow(), degradation);
    }
}

/// List registered tools and their schemas
fn cmd_tools(config: &Config) -> Result<()> {
    debug!("cmd_tools: called");
    let filings = Arc::new(LocalFilingStore::new(&config.tools.data_dir));
    let metrics = Arc::new(LocalMetricsStore::new(&config.tools.data_dir));
    let search = TavilySearch::from_env().map(|s| Arc::new(s) as Arc<dyn SearchSource>);
    let registry = ToolRegistry::standard(filings, metrics, search);

    for definition in registry.definitions() {
        println!("{}", definition.name.bold());
        println!("  {}", definition.description);
        let schema = serde_json::to_string_pretty(&definition.input_schema).context("Failed to render schema")?;
        for line in schema.lines() {
            println!("  {}", line.dimmed());
        }
        println!();
    }
    Ok(())
}

/// Print the resolved configuration as YAML
fn cmd_config(config: &Config) -> Result<()> {
    debug!("cmd_config: called");
    let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    print!("{}", yaml);
    Ok(())
}

/// Print the last `lines` lines of the log file
fn cmd_logs(lines: usize) -> Result<()> {
    debug!(lines, "cmd_logs: called");
    let log_path = get_log_path();

    if !log_path.exists() {
        debug!(?log_path, "cmd_logs: log file does not exist");
        println!("No log file found at: {}", log_path.display());
        return Ok(());
    }

    let file = fs::File::open(&log_path).context("Failed to open log file")?;
    let reader = BufReader::new(file);
    let all_lines: Vec<String> = reader.lines().map_while(Result::ok).collect();
    let start = all_lines.len().saturating_sub(lines);
    for line in &all_lines[start..] {
        println!("{}", line);
    }
    Ok(())
}
