use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use livewatch::config::EngineConfig;
use livewatch::domain::UnitStatus;
use livewatch::logging::{LoggingConfig, init_logging};
use livewatch::registry::UnitEvent;
use livewatch::{Capabilities, Engine};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Monitor and heal units until Ctrl-C (default)
    Run,
    /// Import operator units from a pipe-delimited or JSON file
    Import {
        /// File with `NAME | URL | LOCATION | SECTOR` lines or a JSON array
        file: PathBuf,
    },
    /// Print the catalog with unit statuses
    List {
        /// Only show units in this status (e.g. `healthy`, `unavailable`)
        #[arg(long, value_parser = parse_status)]
        status: Option<UnitStatus>,
    },
    /// Run one discovery pass and persist the result
    Discover,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config_path = EngineConfig::resolve_path(args.config.as_deref());
    let mut config = EngineConfig::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    config.apply_env_overrides();

    let (logging, _guard) = init_logging(&config.logging, args.verbose)?;

    let capabilities = Capabilities::from_config(&config).context("Failed to build capabilities")?;
    match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            let engine = Engine::start(config, capabilities).context("Failed to start engine")?;
            let log_cancel = CancellationToken::new();
            logging.start_retention_cleanup(log_cancel.clone());
            tokio::spawn(log_unit_events(engine.subscribe(), log_cancel.clone()));
            spawn_filter_reload(logging.clone(), config_path.clone(), log_cancel.clone());

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            info!("Received Ctrl-C");

            log_cancel.cancel();
            engine.shutdown().await?;
        }
        Command::Import { file } => {
            let text = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let engine = Engine::open(config, capabilities)?;
            let report = engine.import_units(&text)?;
            engine.shutdown().await?;

            println!(
                "added {}, duplicates {}, rejected {}",
                report.added, report.duplicates, report.rejected
            );
            for e in &report.errors {
                println!("  {e}");
            }
        }
        Command::List { status } => {
            let engine = Engine::open(config, capabilities)?;
            print_catalog(&engine, status);
        }
        Command::Discover => {
            let engine = Engine::open(config, capabilities)?;
            let report = engine.run_discovery_once().await;
            if let Err(e) = engine.shutdown().await {
                error!(error = %e, "Failed to persist discovery results");
                return Err(e.into());
            }
            println!(
                "searched {}, found {}, added {}, duplicates {}, failed {}",
                report.searched, report.found, report.added, report.duplicates, report.failed
            );
        }
    }

    Ok(())
}

fn parse_status(s: &str) -> Result<UnitStatus, String> {
    UnitStatus::parse(s).ok_or_else(|| {
        let names: Vec<&str> = UnitStatus::ALL.iter().map(|s| s.as_str()).collect();
        format!("unknown status '{s}', expected one of {}", names.join(", "))
    })
}

/// Log registry events until cancelled.
async fn log_unit_events(mut events: broadcast::Receiver<UnitEvent>, cancel: CancellationToken) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(event @ (UnitEvent::Added { .. } | UnitEvent::Removed { .. })) => {
                info!(unit_id = %event.unit_id(), "{}", event.description());
            }
            Ok(event) => debug!(unit_id = %event.unit_id(), "{}", event.description()),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event log fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Re-read `logging.filter` from the config file on SIGHUP.
#[cfg(unix)]
fn spawn_filter_reload(logging: Arc<LoggingConfig>, config_path: PathBuf, cancel: CancellationToken) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGHUP handler, log filter reload disabled");
            return;
        }
    };

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = hangup.recv() => {
                    if received.is_none() {
                        break;
                    }
                    reload_filter(&logging, &config_path);
                }
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_filter_reload(_logging: Arc<LoggingConfig>, _config_path: PathBuf, _cancel: CancellationToken) {}

#[cfg_attr(not(unix), allow(dead_code))]
fn reload_filter(logging: &LoggingConfig, config_path: &Path) {
    let config = match EngineConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Config reload failed, keeping log filter");
            return;
        }
    };
    let current = logging.get_filter();
    if current == config.logging.filter {
        debug!(filter = %current, "Log filter unchanged");
        return;
    }
    info!(from = %current, to = %config.logging.filter, "Reloading log filter");
    if let Err(e) = logging.set_filter(&config.logging.filter) {
        warn!(error = %e, "Keeping previous log filter");
    }
}

fn print_catalog(engine: &Engine, status: Option<UnitStatus>) {
    let catalog = engine.catalog();
    if catalog.is_empty() {
        println!("No units in {}", engine.catalog_path().display());
        return;
    }

    for (country, country_entry) in &catalog.countries {
        println!("{country}");
        for (state, state_entry) in &country_entry.states {
            println!("  {state}");
            for (city, units) in &state_entry.cities {
                println!("    {city}");
                for unit in units.iter().filter(|u| status.is_none_or(|s| u.status == s)) {
                    println!("      [{:<11}] {} ({})", unit.status.as_str(), unit.name, unit.source_query);
                }
            }
        }
    }

    let counts = engine.stats().units;
    let breakdown: Vec<String> = UnitStatus::ALL
        .iter()
        .map(|s| format!("{} {}", counts.get(*s), s.as_str().to_lowercase()))
        .collect();
    println!("\n{} units: {}", counts.total(), breakdown.join(", "));
}
