//! Adaptive idle/absolute timeout estimation driven by historical samples
//! (spec §4.3).

mod heuristic;
mod history;
mod record;

pub use heuristic::{CommandHints, HeuristicBucket, classify};
pub use record::{Outcome, TimingRecord};

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use history::History;

/// Bounds and policy knobs the estimator is configured with; mirrors the
/// relevant slice of `ExecdConfig`.
#[derive(Debug, Clone)]
pub struct EstimatorConfig {
    pub history_max: usize,
    pub min_samples_high: usize,
    pub min_timeout_s: u64,
    pub max_timeout_s: u64,
    pub default_idle_s: u64,
}

/// Result of `estimate()`: spec §4.3's `{absolute_s, idle_s, confidence}`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub absolute_s: u64,
    pub idle_s: u64,
    pub confidence: f64,
}

/// Process-wide owner of timing history, keyed by command fingerprint.
///
/// History lives in memory, bounded per fingerprint at `HISTORY_MAX`
/// samples (oldest evicted first); an optional append-only JSONL sidecar
/// persists every terminal outcome so history survives a restart.
pub struct Estimator {
    config: EstimatorConfig,
    history: Mutex<History>,
    sidecar_path: Option<PathBuf>,
}

impl Estimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            config,
            history: Mutex::new(History::new()),
            sidecar_path: None,
        }
    }

    /// Load prior history from a JSONL sidecar, trimming it in place if it
    /// has grown beyond what any single fingerprint could ever need.
    pub async fn with_sidecar(mut self, path: &Path) -> Result<Self> {
        let records = record::load_and_trim(path, self.config.history_max)
            .await
            .with_context(|| format!("failed to load timing sidecar: {}", path.display()))?;
        {
            let mut history = self.history.lock().await;
            for record in records {
                if record.outcome == Outcome::Success {
                    history.record(&record.fingerprint, record.duration_ms, self.config.history_max);
                }
            }
        }
        self.sidecar_path = Some(path.to_path_buf());
        Ok(self)
    }

    /// Produce a timeout estimate for a new request, per spec §4.3's
    /// four-step algorithm, always clamped to `[MIN_TIMEOUT, MAX_TIMEOUT]`.
    pub async fn estimate(&self, fingerprint: &str, hints: &CommandHints) -> Estimate {
        let samples = self.history.lock().await.samples(fingerprint);
        let min = self.config.min_timeout_s;
        let max = self.config.max_timeout_s;

        let (absolute_s, confidence) = if samples.len() >= self.config.min_samples_high {
            let p90_ms = percentile_ms(&samples, 0.90);
            let absolute = ((p90_ms as f64 / 1000.0 * 1.2) as u64).max(min);
            let confidence = (samples.len() as f64 / 10.0).min(0.9);
            (absolute, confidence)
        } else if !samples.is_empty() {
            let max_observed_ms = samples.iter().copied().max().unwrap_or(0);
            let absolute = ((max_observed_ms as f64 / 1000.0 * 1.5) as u64).max(min);
            (absolute, 0.5)
        } else {
            let bucket = classify(hints);
            (bucket.seconds().max(min), bucket.confidence())
        };

        let absolute_s = absolute_s.clamp(min, max);
        let idle_s = absolute_s.min(self.config.default_idle_s).clamp(min, max);

        Estimate {
            absolute_s,
            idle_s,
            confidence,
        }
    }

    /// Append a terminal outcome. Only successes feed future estimates;
    /// failures and timeouts are recorded for observability but never
    /// shrink the running p90 (spec §4.3 "post-execution update").
    pub async fn record(&self, fingerprint: &str, duration_ms: u64, outcome: Outcome) -> Result<()> {
        if outcome == Outcome::Success {
            self.history
                .lock()
                .await
                .record(fingerprint, duration_ms, self.config.history_max);
        }

        if let Some(path) = &self.sidecar_path {
            let record = TimingRecord {
                fingerprint: fingerprint.to_string(),
                duration_ms,
                outcome,
                ts: now_rfc3339(),
            };
            record::append(path, &record).await?;
        }
        Ok(())
    }
}

fn now_rfc3339() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

/// Nearest-rank percentile (in milliseconds), parameterized on `p` rather
/// than hardcoding the 90th.
fn percentile_ms(samples: &[u64], p: f64) -> u64 {
    if samples.is_empty() {
        return 0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    let idx = ((sorted.len() as f64) * p).ceil() as usize;
    let idx = idx.min(sorted.len()).saturating_sub(1);
    sorted[idx]
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
