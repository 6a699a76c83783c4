//! Domain-level notification events an `Execution` emits over its lifetime
//! (spec §4.6). Framing into JSON-RPC (`seq`, method names) is the wire
//! frontend's job; this crate only decides *what* happened and *when*.

use chrono::{DateTime, Utc};
use exec_core::{RequestId, TerminationReason};
use exec_process::StreamTag;

/// Either half of the client-visible pause/resume acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Paused,
    Resumed,
}

/// One notification-worthy event in an `Execution`'s lifecycle.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    Started {
        pid: u32,
        pgid: u32,
        absolute_deadline: DateTime<Utc>,
        idle_deadline: DateTime<Utc>,
    },
    Output {
        stream: StreamTag,
        seq: u64,
        data: String,
        truncated: bool,
    },
    Status {
        state: ControlState,
    },
    Completed {
        exit_code: Option<i32>,
        reason: TerminationReason,
        wall_ms: u64,
        stdout_bytes: u64,
        stderr_bytes: u64,
    },
}

/// An [`ExecutionEvent`] tagged with the `request_id` it belongs to, which is
/// what actually flows through a session's ordered notification channel
/// (spec §3: "all notifications ... totally ordered by the session's send
/// sequence").
#[derive(Debug, Clone)]
pub struct ExecutionNotification {
    pub request_id: RequestId,
    pub event: ExecutionEvent,
}
