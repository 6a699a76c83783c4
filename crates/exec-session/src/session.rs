use tokio::sync::mpsc;

use crate::execution::Execution;

/// Lifecycle state of a `Session` (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Draining,
    Closed,
}

/// One logical WebSocket connection's worth of state: at most one live
/// `Execution`, plus the ordered outgoing notification channel.
///
/// `notify_tx` is the sole owner of send order for this session: every
/// notification goes through it, so FIFO delivery on an `mpsc` channel is
/// enough to satisfy "all notifications ... are totally ordered by the
/// session's send sequence" without any extra bookkeeping. The channel is
/// bounded (spec §4.7/§6 `SEND_HIGH_WATER`) so a lagging client applies
/// back-pressure all the way into the multiplexer's sink rather than
/// letting the queue grow without bound.
pub struct Session<N> {
    pub state: SessionState,
    pub execution: Option<Execution>,
    pub notify_tx: mpsc::Sender<N>,
}

impl<N> Session<N> {
    pub fn new(notify_tx: mpsc::Sender<N>) -> Self {
        Self {
            state: SessionState::Idle,
            execution: None,
            notify_tx,
        }
    }

    pub fn has_live_execution(&self) -> bool {
        self.execution.as_ref().is_some_and(|e| !e.status.is_terminal())
    }
}
