#![warn(clippy::all)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod config;
mod database;
mod error;
mod monitoring;
mod pool;
mod signals;

use config::{Config, ConfigLoader};
use database::{DatabaseImpl, initialize_database};
use error::{MonitorError, PersistenceError};
use monitoring::controller::LogNotifier;
use monitoring::{IcmpProber, Mode, ModeController, MonitorScheduler};
use signals::ReloadFlag;

/// Adaptive ICMP reachability monitor
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Configuration file (defaults to $XDG_CONFIG_HOME/pingmon/config.toml)
    #[arg(long, short, env = "PINGMON_CONFIG")]
    config: Option<PathBuf>,

    /// Env file with SITE/DBFILE/LOGFILE/STDINTERVAL overrides (defaults to ./.env)
    #[arg(long)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Probe the target until stopped (default)
    Run {
        /// Exit after this many completed batches
        #[arg(long)]
        max_batches: Option<u64>,
    },
    /// Print the most recent stored batches
    History {
        #[arg(long, short, default_value_t = 20)]
        limit: usize,
        /// Emit JSON instead of one line per batch
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if tracing::dispatcher::has_been_set() {
                error!("pingmon stopped: {err:#}");
            } else {
                eprintln!("pingmon: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let loader = ConfigLoader { config_path: cli.config, env_file: cli.env_file };
    let config = loader.load().map_err(MonitorError::from)?;

    match cli.command.unwrap_or(Command::Run { max_batches: None }) {
        Command::Run { max_batches } => monitor(config, loader, max_batches).await,
        Command::History { limit, json } => history(&config, limit, json).await,
        Command::Config => {
            print!("{config}");
            Ok(())
        }
    }
}

async fn open_database(config: &Config) -> Result<DatabaseImpl, PersistenceError> {
    let pool = pool::open_pool(&config.storage.database).await?;
    {
        let conn = pool.get().await?;
        initialize_database(&conn).await?;
    }
    Ok(DatabaseImpl::new_from_pool(pool))
}

async fn monitor(config: Config, loader: ConfigLoader, max_batches: Option<u64>) -> Result<()> {
    let log_options = config.log_options().map_err(MonitorError::from)?;
    logger::init(&log_options).map_err(|err| MonitorError::Configuration(err.into()))?;

    info!(
        target_host = %config.target,
        database = %config.storage.database.display(),
        environment = %config.environment,
        "STARTING pingmon"
    );

    let database = open_database(&config).await.map_err(MonitorError::from)?;

    let prober = IcmpProber::new().map_err(|err| MonitorError::ProbeCreation {
        target: config.target.clone(),
        reason: err.to_string(),
    })?;
    for mode in [Mode::Standard, Mode::Outage] {
        let target = config.probe_config(mode).target;
        if let Err(err) = prober.resolve(&target).await {
            return Err(MonitorError::ProbeCreation { target, reason: err.to_string() }.into());
        }
    }

    let shutdown = CancellationToken::new();
    let reload = ReloadFlag::new();
    let listener = signals::spawn_listener(shutdown.clone(), reload.clone())
        .context("cannot install signal handlers")?;

    let mut scheduler = MonitorScheduler::new(
        Arc::new(prober),
        Arc::new(database),
        ModeController::new(LogNotifier),
        config.monitor_settings(),
        shutdown.clone(),
    )
    .with_reload(reload, loader)
    .with_max_batches(max_batches);

    let result = scheduler.run().await;

    shutdown.cancel();
    if let Err(err) = listener.await {
        warn!("Signal listener ended abnormally: {err}");
    }

    let summary = result?;
    info!(
        batches = summary.batches,
        failed_batches = summary.failed_batches,
        transitions = summary.transitions,
        final_mode = %summary.final_mode,
        "EXITING pingmon"
    );
    Ok(())
}

async fn history(config: &Config, limit: usize, json: bool) -> Result<()> {
    let database = open_database(config).await.map_err(MonitorError::from)?;
    let records = database.recent(limit).await.map_err(MonitorError::from)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No batches recorded in {}", config.storage.database.display());
        return Ok(());
    }

    println!("{} of {} batches:", records.len(), database.count().await.map_err(MonitorError::from)?);
    for record in &records {
        println!("{record}");
    }
    Ok(())
}
