//! Error taxonomy. Kinds, not concrete error types: each kind names a
//! distinct way an `execute` call or a running `Execution` can fail, and is
//! shared between the JSON-RPC error path (pre-start) and the
//! `process.completed` reason path (post-start).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pre-start and fatal-transport error kinds, returned to the caller as a
/// JSON-RPC error object. None of these imply a child process was spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    #[error("malformed request or unsupported option")]
    InvalidParams,
    #[error("session already running an execution")]
    Busy,
    #[error("a pre-execution hook vetoed this command")]
    PrecheckFailed,
    #[error("the operating system failed to spawn the command")]
    SpawnError,
    #[error("no execution is currently running for this request")]
    NotRunning,
    #[error("the requested control action is not supported on this platform")]
    Unsupported,
}

/// Why an `Execution` reached a terminal state, reported in
/// `process.completed.reason`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    #[error("exited normally")]
    Ok,
    #[error("cancelled by client")]
    Cancelled,
    #[error("absolute timeout elapsed")]
    Timeout,
    #[error("idle timeout elapsed")]
    IdleTimeout,
    #[error("failed to spawn the command")]
    SpawnError,
    #[error("the output sink failed fatally")]
    SinkError,
    #[error("a pre-execution hook vetoed this command")]
    PrecheckFailed,
}

impl TerminationReason {
    /// Whether this outcome should feed a successful duration sample into
    /// the timeout estimator. Only a clean exit drives the p90.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Ok)
    }
}
