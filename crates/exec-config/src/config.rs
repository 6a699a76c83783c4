use exec_hooks::HookSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The full set of tunables for the executor service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecdConfig {
    /// Hard cap on concurrent sessions; over-cap accepts are refused.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Per-stream ring buffer size, in bytes.
    #[serde(default = "default_stream_buffer_bytes")]
    pub stream_buffer_bytes: usize,
    /// Line truncation threshold, in bytes.
    #[serde(default = "default_max_line")]
    pub max_line: usize,
    /// Max bytes per `process.output` payload.
    #[serde(default = "default_max_output_payload")]
    pub max_output_payload: usize,
    /// WS send queue threshold that triggers read pause.
    #[serde(default = "default_send_high_water")]
    pub send_high_water: usize,
    /// Default idle timeout, in seconds, absent an estimate override.
    #[serde(default = "default_idle")]
    pub default_idle_s: u64,
    /// Lower clamp for both idle and absolute timeouts.
    #[serde(default = "default_min_timeout")]
    pub min_timeout_s: u64,
    /// Upper clamp for both idle and absolute timeouts.
    #[serde(default = "default_max_timeout")]
    pub max_timeout_s: u64,
    /// SIGTERM → SIGKILL grace window, in milliseconds.
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
    /// Aggregate pre-hook budget, in milliseconds.
    #[serde(default = "default_prehook_budget_ms")]
    pub prehook_budget_ms: u64,
    /// Max retained duration samples per fingerprint.
    #[serde(default = "default_history_max")]
    pub history_max: usize,
    /// Samples required before the estimator trusts a p90 computation.
    #[serde(default = "default_min_samples_high")]
    pub min_samples_high: usize,
    /// Env var names stripped from the child's environment after overrides.
    #[serde(default = "default_env_denylist")]
    pub env_denylist: HashSet<String>,
    /// Whether the PTY spawn path is enabled at all.
    #[serde(default = "default_allow_pty")]
    pub allow_pty: bool,
    /// Address the WebSocket frontend binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Optional path to the append-only timing-record sidecar log.
    #[serde(default)]
    pub timing_log_path: Option<std::path::PathBuf>,
    /// Pre-execution hook chain, run in order before every spawn.
    #[serde(default)]
    pub pre_hooks: Vec<HookSpec>,
    /// Post-execution hook chain, run after every reap regardless of outcome.
    #[serde(default)]
    pub post_hooks: Vec<HookSpec>,
}

fn default_max_sessions() -> usize {
    100
}
fn default_stream_buffer_bytes() -> usize {
    4 * 1024 * 1024
}
fn default_max_line() -> usize {
    8192
}
fn default_max_output_payload() -> usize {
    256 * 1024
}
fn default_send_high_water() -> usize {
    8 * 1024 * 1024
}
fn default_idle() -> u64 {
    300
}
fn default_min_timeout() -> u64 {
    5
}
fn default_max_timeout() -> u64 {
    24 * 60 * 60
}
fn default_grace_ms() -> u64 {
    5_000
}
fn default_prehook_budget_ms() -> u64 {
    10_000
}
fn default_history_max() -> usize {
    50
}
fn default_min_samples_high() -> usize {
    5
}
fn default_allow_pty() -> bool {
    true
}
fn default_bind_address() -> String {
    "127.0.0.1:8765".to_string()
}

fn default_env_denylist() -> HashSet<String> {
    [
        "ANTHROPIC_API_KEY",
        "OPENAI_API_KEY",
        "GEMINI_API_KEY",
        "AWS_SECRET_ACCESS_KEY",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

impl Default for ExecdConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            stream_buffer_bytes: default_stream_buffer_bytes(),
            max_line: default_max_line(),
            max_output_payload: default_max_output_payload(),
            send_high_water: default_send_high_water(),
            default_idle_s: default_idle(),
            min_timeout_s: default_min_timeout(),
            max_timeout_s: default_max_timeout(),
            grace_ms: default_grace_ms(),
            prehook_budget_ms: default_prehook_budget_ms(),
            history_max: default_history_max(),
            min_samples_high: default_min_samples_high(),
            env_denylist: default_env_denylist(),
            allow_pty: default_allow_pty(),
            bind_address: default_bind_address(),
            timing_log_path: None,
            pre_hooks: Vec::new(),
            post_hooks: Vec::new(),
        }
    }
}

impl ExecdConfig {
    /// Apply `EXECD_*` environment variable overrides on top of file/defaults.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("EXECD_MAX_SESSIONS") {
            if let Ok(n) = v.parse() {
                self.max_sessions = n;
            }
        }
        if let Ok(v) = std::env::var("EXECD_BIND_ADDRESS") {
            self.bind_address = v;
        }
        if let Ok(v) = std::env::var("EXECD_ALLOW_PTY") {
            if let Ok(b) = v.parse() {
                self.allow_pty = b;
            }
        }
        if let Ok(v) = std::env::var("EXECD_DEFAULT_IDLE_S") {
            if let Ok(n) = v.parse() {
                self.default_idle_s = n;
            }
        }
    }
}
