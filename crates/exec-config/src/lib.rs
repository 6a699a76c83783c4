//! Runtime configuration for the executor service.

mod config;
mod paths;
mod validate;

pub use config::ExecdConfig;
pub use paths::{default_config_path, default_log_dir, default_timing_log_path};
pub use validate::validate;

use anyhow::{Context, Result};
use std::path::Path;

/// Load config with layered precedence: built-in defaults → `config.toml` →
/// `EXECD_*` environment overrides. CLI flags are applied by the caller on
/// top of the returned value: defaults live in `#[serde(default = ...)]`,
/// the file overlays them, and the caller runs the final validation pass.
pub fn load(path: Option<&Path>) -> Result<ExecdConfig> {
    let mut cfg = match path {
        Some(p) if p.exists() => {
            let contents = std::fs::read_to_string(p)
                .with_context(|| format!("failed to read config file: {}", p.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("failed to parse config file: {}", p.display()))?
        }
        Some(p) => {
            tracing::debug!(path = %p.display(), "config file not found, using defaults");
            ExecdConfig::default()
        }
        None => ExecdConfig::default(),
    };

    cfg.apply_env_overrides();
    validate(&cfg)?;
    Ok(cfg)
}
