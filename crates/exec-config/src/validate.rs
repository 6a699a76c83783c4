use anyhow::{Result, bail};

use crate::config::ExecdConfig;

/// Reject nonsensical config values, one bailing message per violation.
pub fn validate(cfg: &ExecdConfig) -> Result<()> {
    if cfg.max_sessions == 0 {
        bail!("max_sessions must be at least 1");
    }
    if cfg.min_timeout_s == 0 {
        bail!("min_timeout_s must be at least 1");
    }
    if cfg.min_timeout_s > cfg.max_timeout_s {
        bail!(
            "min_timeout_s ({}) must not exceed max_timeout_s ({})",
            cfg.min_timeout_s,
            cfg.max_timeout_s
        );
    }
    if cfg.default_idle_s == 0 {
        bail!("default_idle_s must be at least 1");
    }
    if cfg.max_line == 0 {
        bail!("max_line must be at least 1");
    }
    if cfg.max_output_payload < cfg.max_line {
        bail!(
            "max_output_payload ({}) must be at least max_line ({})",
            cfg.max_output_payload,
            cfg.max_line
        );
    }
    if cfg.stream_buffer_bytes == 0 {
        bail!("stream_buffer_bytes must be at least 1");
    }
    if cfg.min_samples_high == 0 {
        bail!("min_samples_high must be at least 1");
    }
    if cfg.history_max < cfg.min_samples_high {
        bail!(
            "history_max ({}) must be at least min_samples_high ({})",
            cfg.history_max,
            cfg.min_samples_high
        );
    }
    if cfg.bind_address.parse::<std::net::SocketAddr>().is_err() {
        bail!("bind_address '{}' is not a valid socket address", cfg.bind_address);
    }
    Ok(())
}
