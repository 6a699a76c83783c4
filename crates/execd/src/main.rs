//! Binary entrypoint: parse arguments, load config, wire the estimator,
//! executor, and WebSocket frontend together, then serve until killed.
//! Tracing is initialized before anything else runs so startup failures
//! are still logged.

mod cli;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Command, ConfigCommand};
use exec_estimator::{Estimator, EstimatorConfig};
use exec_process::UnixPtyPort;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Serve { bind: None, config: None });

    match command {
        Command::Serve { bind, config } => serve(bind, config).await,
        Command::Config { cmd: ConfigCommand::Validate { config } } => validate(config),
    }
}

async fn serve(bind: Option<String>, config_path: Option<PathBuf>) -> Result<()> {
    let config_path = config_path.or_else(exec_config::default_config_path);
    let mut config = exec_config::load(config_path.as_deref())?;
    if let Some(bind) = bind {
        config.bind_address = bind;
    }

    let _log_guard = logging::init(exec_config::default_log_dir().as_deref())?;
    tracing::info!(bind_address = %config.bind_address, max_sessions = config.max_sessions, "starting execd");

    let estimator_config = EstimatorConfig {
        history_max: config.history_max,
        min_samples_high: config.min_samples_high,
        min_timeout_s: config.min_timeout_s,
        max_timeout_s: config.max_timeout_s,
        default_idle_s: config.default_idle_s,
    };
    let mut estimator = Estimator::new(estimator_config);
    if let Some(path) = config.timing_log_path.clone().or_else(exec_config::default_timing_log_path) {
        estimator = estimator.with_sidecar(&path).await?;
        tracing::debug!(path = %path.display(), "loaded timing history sidecar");
    }

    let bind_address = config.bind_address.clone();
    let executor = exec_executor::Executor::new(config, Arc::new(estimator), Arc::new(UnixPtyPort));

    exec_ws::serve(&bind_address, executor, config_path).await
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    let config_path = config_path.or_else(exec_config::default_config_path);
    let config = exec_config::load(config_path.as_deref())?;
    println!(
        "config OK: bind_address={} max_sessions={} allow_pty={}",
        config.bind_address, config.max_sessions, config.allow_pty
    );
    Ok(())
}
