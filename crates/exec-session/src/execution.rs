use std::path::PathBuf;
use std::time::Instant;

use exec_core::{ExecutionId, TerminationReason};

/// Lifecycle status of an `Execution` (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Starting,
    Running,
    Paused,
    Cancelling,
    Completed,
    Failed,
    TimedOut,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }
}

/// One in-flight or completed command run, uniquely identified by
/// `(session_id, request_id)`.
///
/// Reaches a terminal status exactly once; the owning session releases its
/// slot on that transition.
#[derive(Debug, Clone)]
pub struct Execution {
    pub id: ExecutionId,
    pub original_command: String,
    pub wrapped_command: String,
    pub pgid: Option<u32>,
    pub cwd: Option<PathBuf>,
    pub started_at: Instant,
    pub absolute_deadline: Option<Instant>,
    pub idle_deadline: Option<Instant>,
    pub stdout_bytes: u64,
    pub stderr_bytes: u64,
    pub status: ExecutionStatus,
    pub exit_code: Option<i32>,
    pub termination_reason: Option<TerminationReason>,
}

impl Execution {
    pub fn starting(id: ExecutionId, original_command: String) -> Self {
        Self {
            id,
            wrapped_command: original_command.clone(),
            original_command,
            pgid: None,
            cwd: None,
            started_at: Instant::now(),
            absolute_deadline: None,
            idle_deadline: None,
            stdout_bytes: 0,
            stderr_bytes: 0,
            status: ExecutionStatus::Starting,
            exit_code: None,
            termination_reason: None,
        }
    }

    /// Transition to a terminal status exactly once; re-entrant calls after
    /// the first are a no-op, matching the "reaches terminal state exactly
    /// once" invariant.
    pub fn finish(&mut self, reason: TerminationReason, exit_code: Option<i32>) {
        if self.status.is_terminal() {
            return;
        }
        self.exit_code = exit_code;
        self.termination_reason = Some(reason);
        self.status = if reason.is_success() {
            ExecutionStatus::Completed
        } else if matches!(reason, TerminationReason::Timeout | TerminationReason::IdleTimeout) {
            ExecutionStatus::TimedOut
        } else {
            ExecutionStatus::Failed
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exec_core::{RequestId, SessionId};

    fn id() -> ExecutionId {
        ExecutionId {
            session_id: SessionId::new(),
            request_id: RequestId(1),
        }
    }

    #[test]
    fn finish_is_idempotent() {
        let mut exec = Execution::starting(id(), "echo hi".to_string());
        exec.finish(TerminationReason::Ok, Some(0));
        exec.finish(TerminationReason::Cancelled, Some(137));
        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert_eq!(exec.exit_code, Some(0));
    }

    #[test]
    fn timeout_reasons_map_to_timed_out() {
        let mut exec = Execution::starting(id(), "sleep 100".to_string());
        exec.finish(TerminationReason::Timeout, None);
        assert_eq!(exec.status, ExecutionStatus::TimedOut);
    }

    #[test]
    fn other_failures_map_to_failed() {
        let mut exec = Execution::starting(id(), "bad".to_string());
        exec.finish(TerminationReason::SpawnError, None);
        assert_eq!(exec.status, ExecutionStatus::Failed);
    }
}
