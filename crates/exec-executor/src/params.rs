//! Request/response shapes for the two stateful RPC methods (spec §4.6).

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use exec_core::RequestId;

/// Params for the `execute` method.
#[derive(Debug, Clone, Default)]
pub struct ExecuteParams {
    pub command: String,
    pub env: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
    pub pty: Option<bool>,
    pub idle_timeout_s: Option<u64>,
    pub absolute_timeout_s: Option<u64>,
}

/// Successful result of `execute`, mirroring the `process.started`
/// notification that follows it.
#[derive(Debug, Clone)]
pub struct ExecuteResult {
    pub request_id: RequestId,
    pub pid: u32,
    pub pgid: u32,
    pub absolute_deadline: DateTime<Utc>,
    pub idle_deadline: DateTime<Utc>,
}

/// The `action` field of a `control` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Pause,
    Resume,
    Cancel,
}
