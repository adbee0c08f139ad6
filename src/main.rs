// ABOUTME: CLI entry point for the pipeline health monitor
// ABOUTME: Runs monitoring cycles from a TOML config and prints each outcome as JSON

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pipeline_health_monitor::gateway::{
    JsonFileStore, LogNotifier, MemoryStore, NotificationGateway, PersistenceGateway,
};
use pipeline_health_monitor::{
    HealthAssessor, Monitor, MonitorConfig, RiskLevel, SessionAggregator,
};

const CONFIG_ENV: &str = "PIPELINE_MONITOR_CONFIG";

// Distinguishes "ran fine, pipelines unhealthy" from a crash (exit 1).
const UNHEALTHY_EXIT_CODE: i32 = 2;

#[derive(Parser)]
#[command(name = "pipeline-monitor")]
#[command(version)]
#[command(about = "Monitor job health across Airbyte, Databricks, Power Automate and Snowflake tasks")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one monitoring cycle, or repeat it with --interval-secs
    Run(RunArgs),
    /// Validate the config file and print the enabled platforms
    CheckConfig {
        /// Config file path (defaults to $PIPELINE_MONITOR_CONFIG, then ./pipeline-monitor.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Config file path (defaults to $PIPELINE_MONITOR_CONFIG, then ./pipeline-monitor.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON store file, overriding [store].path
    #[arg(long)]
    store: Option<PathBuf>,

    /// Skip drafting notifications
    #[arg(long)]
    no_notify: bool,

    /// Exit with status 2 when the assessed risk is at or above this level;
    /// with --interval-secs this also stops the loop
    #[arg(long)]
    fail_on: Option<RiskLevel>,

    /// Repeat the cycle every N seconds instead of running once
    #[arg(long)]
    interval_secs: Option<u64>,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config_path(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }
    if let Ok(path) = env::var(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    PathBuf::from("pipeline-monitor.toml")
}

fn load_config(path: &Path) -> Result<MonitorConfig> {
    info!(path = %path.display(), "Loading configuration");
    MonitorConfig::load(path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::CheckConfig { config } => {
            let path = resolve_config_path(config);
            let config = load_config(&path)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&config).context("Failed to render config")?
            );
            let enabled: Vec<String> = config
                .enabled_platforms()
                .map(|p| format!("{} ({})", p.platform.display_name(), p.url))
                .collect();
            eprintln!("Configuration OK: {} platform(s) enabled", enabled.len());
            for line in enabled {
                eprintln!("  {}", line);
            }
            Ok(())
        }
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let path = resolve_config_path(args.config);
    let config = load_config(&path)?;

    let store: Arc<dyn PersistenceGateway> = match args.store.or(config.store.path.clone()) {
        Some(path) => {
            info!(path = %path.display(), "Persisting to JSON store");
            Arc::new(JsonFileStore::new(path))
        }
        None => {
            info!("No store configured, records are kept in memory for this run");
            Arc::new(MemoryStore::new())
        }
    };
    let notifier: Option<Arc<dyn NotificationGateway>> = if args.no_notify {
        None
    } else {
        Some(Arc::new(LogNotifier))
    };

    let monitor = Monitor::new(
        SessionAggregator::new(config.collector_timeout()),
        HealthAssessor::new(config.assessment.clone()),
        store,
        notifier,
    );
    let sources = config.build_sources()?;
    if sources.is_empty() {
        warn!("No platforms enabled; every cycle will assess as CRITICAL");
    }

    let Some(interval_secs) = args.interval_secs else {
        let outcome = monitor.run_cycle(sources).await;
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).context("Failed to render cycle outcome")?
        );
        if breaches(outcome.assessment.risk_level, args.fail_on) {
            std::process::exit(UNHEALTHY_EXIT_CODE);
        }
        return Ok(());
    };

    let interval = Duration::from_secs(interval_secs.max(1));
    info!(interval_secs = interval.as_secs(), "Starting monitoring loop");
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping monitoring loop");
                return Ok(());
            }
        }

        let outcome = tokio::select! {
            outcome = monitor.run_cycle(sources.clone()) => outcome,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted during a cycle, stopping monitoring loop");
                return Ok(());
            }
        };
        println!(
            "{}",
            serde_json::to_string(&outcome).context("Failed to render cycle outcome")?
        );

        if breaches(outcome.assessment.risk_level, args.fail_on) {
            warn!(
                session_id = %outcome.session_id,
                risk_level = %outcome.assessment.risk_level,
                "Risk reached the --fail-on level, stopping monitoring loop"
            );
            std::process::exit(UNHEALTHY_EXIT_CODE);
        }
    }
}

fn breaches(risk_level: RiskLevel, fail_on: Option<RiskLevel>) -> bool {
    fail_on.is_some_and(|threshold| risk_level >= threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_on_threshold() {
        assert!(!breaches(RiskLevel::Critical, None));
        assert!(breaches(RiskLevel::High, Some(RiskLevel::High)));
        assert!(breaches(RiskLevel::Critical, Some(RiskLevel::Medium)));
        assert!(!breaches(RiskLevel::Medium, Some(RiskLevel::High)));
    }

    #[test]
    fn test_fail_on_is_accepted_with_interval() {
        let cli = Cli::try_parse_from([
            "pipeline-monitor",
            "run",
            "--interval-secs",
            "300",
            "--fail-on",
            "critical",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.interval_secs, Some(300));
                assert_eq!(args.fail_on, Some(RiskLevel::Critical));
            }
            Commands::CheckConfig { .. } => panic!("expected run"),
        }
    }
}
