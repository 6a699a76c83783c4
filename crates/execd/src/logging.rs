//! Tracing subscriber setup: a single daily-rotating log for the whole
//! server process, with a non-blocking writer so logging never blocks the
//! async runtime.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;

/// Initialize the global subscriber. When `log_dir` resolves, logs go to a
/// daily-rotating file there instead of stderr; without it, falls back to
/// stderr.
///
/// The returned guard must be kept alive for the process lifetime or
/// buffered lines are dropped on exit.
pub fn init(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory: {}", dir.display()))?;
            let file_appender = tracing_appender::rolling::daily(dir, "execd.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt()
                .with_writer(non_blocking)
                .with_env_filter(env_filter)
                .try_init()
                .ok();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(env_filter)
                .try_init()
                .ok();
            Ok(None)
        }
    }
}
