//! XCW CLI
//!
//! Command-line interface for the service graph threshold alerting engine.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use xcw::clients::{Clients, Credentials, MemoryBackend};
use xcw::models::{PolicyDocument, ServiceGraph};
use xcw::{AppConfig, Scanner};

/// XCW - Threshold alerting for service graphs
#[derive(Parser)]
#[command(name = "xcw")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "XCW_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Policy document (overrides scan.policy_path)
    #[arg(short, long, global = true, env = "XCW_POLICY")]
    policy: Option<PathBuf>,

    /// Record topics, events and metrics in memory instead of sending them
    #[arg(long, global = true)]
    dry_run: bool,

    /// Saved service graph to evaluate during a dry run
    #[arg(long, global = true, requires = "dry_run")]
    graph: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single scan cycle
    Scan,

    /// Run scan cycles periodically until interrupted
    Run {
        /// Time between cycles (e.g. "5m"); defaults to the policy window
        #[arg(long, value_parser = humantime::parse_duration)]
        every: Option<std::time::Duration>,
    },

    /// Validate configuration and policy, then print the derived settings
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config, cli.verbose);

    let policy_path = cli
        .policy
        .clone()
        .unwrap_or_else(|| config.scan.policy_path.clone());

    let mode = if cli.dry_run {
        Mode::DryRun(cli.graph.clone())
    } else {
        Mode::Live
    };

    let result = match cli.command {
        Commands::Scan => run_scan(&config, &policy_path, &mode).await,
        Commands::Run { every } => {
            run_periodic(&config, policy_path, every.or(config.scan.interval), &mode).await
        }
        Commands::Check => run_check(&config, &policy_path),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(config: &AppConfig, verbose: bool) {
    let filter = log_filter(&config.logging.level, verbose);

    if config.logging.format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// `--verbose` wins over `RUST_LOG`, which wins over the configured level
fn log_filter(level: &str, verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Where cycle writes go
enum Mode {
    Live,
    /// In-memory writes, graph from the given snapshot or the live endpoint
    DryRun(Option<PathBuf>),
}

fn build_scanner(config: &AppConfig, mode: &Mode) -> anyhow::Result<Scanner> {
    let credentials = Credentials::resolve(&config.aws);

    let clients = match mode {
        Mode::Live => Clients::http_with(&config.aws, credentials.as_ref())
            .context("building upstream clients")?,
        Mode::DryRun(snapshot) => {
            info!("Dry run, recording topics, events and metrics in memory");
            let snapshot = snapshot
                .as_deref()
                .map(|path| {
                    ServiceGraph::load(path)
                        .with_context(|| format!("loading service graph {}", path.display()))
                })
                .transpose()?;
            Clients::dry_run(&config.aws, credentials.as_ref(), &MemoryBackend::new(), snapshot)
                .context("building dry-run clients")?
        }
    };

    Ok(Scanner::new(&config.app, clients))
}

async fn run_scan(config: &AppConfig, policy_path: &Path, mode: &Mode) -> anyhow::Result<()> {
    let document = PolicyDocument::load(policy_path)
        .with_context(|| format!("loading policy {}", policy_path.display()))?;
    let scanner = build_scanner(config, mode)?;

    let report = scanner.run_cycle(&document).await?;

    println!(
        "Window {} .. {}",
        report.window_start.to_rfc3339(),
        report.window_end.to_rfc3339()
    );
    println!(
        "Evaluated {} node(s), skipped {}",
        report.evaluation.evaluated, report.evaluation.skipped
    );
    for (category, services) in report.evaluation.alerts.iter() {
        println!("  {category}: {}", services.join(", "));
    }
    match report.dispatch {
        Some(receipt) => println!("Dispatched event {}", receipt.event_id),
        None => println!("No thresholds breached"),
    }

    Ok(())
}

async fn run_periodic(
    config: &AppConfig,
    policy_path: PathBuf,
    every: Option<std::time::Duration>,
    mode: &Mode,
) -> anyhow::Result<()> {
    let scanner = build_scanner(config, mode)?;
    scanner.run_periodic(policy_path, every).await?;
    Ok(())
}

fn run_check(config: &AppConfig, policy_path: &Path) -> anyhow::Result<()> {
    let document = PolicyDocument::load(policy_path)
        .with_context(|| format!("loading policy {}", policy_path.display()))?;

    println!("App:                {}", config.app.name);
    println!("Event topic (SMS):  {}", config.app.event_topic());
    println!("Alarm topic (mail): {}", config.app.alarm_topic());
    println!("Lookback minutes:   {}", document.analyze_minutes);
    println!("Alarm period (s):   {}", document.alarm_period_seconds());
    println!("Evaluation periods: {}", document.alarm_evaluation_periods);
    println!("Policy entries:     {}", document.alerts.len());
    println!("SMS targets:        {}", document.communications.sms.len());
    println!("Email targets:      {}", document.communications.email.len());

    Ok(())
}
