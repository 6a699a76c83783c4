use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

use exec_core::{ErrorKind, ExecutionId, RequestId, RequestIdAllocator, SessionId, TerminationReason};

use crate::execution::Execution;
use crate::session::{Session, SessionState};

/// Owns the bounded set of live sessions and routes notifications to each
/// one's ordered outgoing channel. Generic over the notification payload
/// type `N` so the frontend crate decides the wire shape.
pub struct SessionManager<N> {
    sessions: RwLock<HashMap<SessionId, Session<N>>>,
    count: AtomicUsize,
    max_sessions: usize,
    /// Capacity of each session's outgoing notification channel, derived
    /// from `SEND_HIGH_WATER` (spec §4.7). Bounding it here is what lets a
    /// slow client's back-pressure reach all the way back into the output
    /// sink that feeds the stream multiplexer.
    notify_capacity: usize,
}

impl<N> SessionManager<N> {
    pub fn new(max_sessions: usize, notify_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            count: AtomicUsize::new(0),
            max_sessions,
            notify_capacity: notify_capacity.max(1),
        })
    }

    /// Admit a new session if the global cap has room, via compare-and-swap
    /// on the live count (spec §9: "global session count (atomic counter
    /// with CAS on accept)"). Returns the notification receiver the caller
    /// should forward to the WebSocket write pump.
    pub async fn accept(&self) -> Result<(SessionId, mpsc::Receiver<N>), ErrorKind> {
        loop {
            let current = self.count.load(Ordering::Acquire);
            if current >= self.max_sessions {
                return Err(ErrorKind::Busy);
            }
            if self
                .count
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }

        let id = SessionId::new();
        let (tx, rx) = mpsc::channel(self.notify_capacity);
        self.sessions.write().await.insert(id, Session::new(tx));
        debug!(session = %id, "session accepted");
        Ok((id, rx))
    }

    /// Begin a new execution for `session_id`. Fails with `Busy` if the
    /// session already has a live execution (spec §4.5).
    pub async fn begin_execution(
        &self,
        session_id: SessionId,
        allocator: &RequestIdAllocator,
        command: String,
    ) -> Result<ExecutionId, ErrorKind> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&session_id).ok_or(ErrorKind::NotRunning)?;

        if session.state == SessionState::Closed || session.state == SessionState::Draining {
            return Err(ErrorKind::NotRunning);
        }
        if session.has_live_execution() {
            return Err(ErrorKind::Busy);
        }

        let request_id = allocator.next();
        let execution_id = ExecutionId { session_id, request_id };
        session.execution = Some(Execution::starting(execution_id, command));
        session.state = SessionState::Running;
        Ok(execution_id)
    }

    /// Attach spawn-time facts (process group, deadlines) to the session's
    /// live execution once the child has actually started.
    pub async fn mark_running(
        &self,
        session_id: SessionId,
        pgid: u32,
        absolute_deadline: std::time::Instant,
        idle_deadline: std::time::Instant,
    ) -> Result<(), ErrorKind> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&session_id).ok_or(ErrorKind::NotRunning)?;
        let execution = session.execution.as_mut().ok_or(ErrorKind::NotRunning)?;
        execution.pgid = Some(pgid);
        execution.absolute_deadline = Some(absolute_deadline);
        execution.idle_deadline = Some(idle_deadline);
        execution.status = crate::execution::ExecutionStatus::Running;
        Ok(())
    }

    /// Record a terminal outcome and release the session's execution slot.
    pub async fn finish_execution(
        &self,
        session_id: SessionId,
        reason: TerminationReason,
        exit_code: Option<i32>,
    ) -> Result<(), ErrorKind> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&session_id).ok_or(ErrorKind::NotRunning)?;
        let execution = session.execution.as_mut().ok_or(ErrorKind::NotRunning)?;
        execution.finish(reason, exit_code);
        if session.state == SessionState::Running {
            session.state = SessionState::Idle;
        }
        Ok(())
    }

    /// Send a notification to a session's ordered outgoing channel.
    ///
    /// Blocks while the channel is full (spec §4.7 back-pressure). The
    /// sender is cloned and the read lock dropped before awaiting the send,
    /// so a lagging client never holds a lock across a suspension point
    /// (spec §5's locking discipline).
    pub async fn send(&self, session_id: SessionId, notification: N) -> Result<(), ErrorKind> {
        let tx = {
            let sessions = self.sessions.read().await;
            let session = sessions.get(&session_id).ok_or(ErrorKind::NotRunning)?;
            session.notify_tx.clone()
        };
        tx.send(notification).await.map_err(|_| ErrorKind::NotRunning)
    }

    /// Look up the request id of the session's current live execution, if
    /// any, for `control` method validation.
    pub async fn current_request_id(&self, session_id: SessionId) -> Option<RequestId> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&session_id)
            .and_then(|s| s.execution.as_ref())
            .filter(|e| !e.status.is_terminal())
            .map(|e| e.id.request_id)
    }

    /// Called on WebSocket disconnect. Returns `true` if the session had a
    /// live execution and now needs draining (the caller must invoke the
    /// Fault Controller and later call [`SessionManager::close`]); `false`
    /// if the session could be closed immediately.
    pub async fn begin_disconnect(&self, session_id: SessionId) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(&session_id) else {
            return false;
        };
        if session.has_live_execution() {
            session.state = SessionState::Draining;
            true
        } else {
            session.state = SessionState::Closed;
            drop(sessions);
            self.remove(session_id).await;
            false
        }
    }

    /// Called once the Fault Controller has finished reaping a draining
    /// session's process group; transitions `Draining -> Closed` and
    /// removes the session.
    pub async fn close(&self, session_id: SessionId) {
        {
            let mut sessions = self.sessions.write().await;
            if let Some(session) = sessions.get_mut(&session_id) {
                session.state = SessionState::Closed;
            } else {
                warn!(session = %session_id, "close called for unknown session");
                return;
            }
        }
        self.remove(session_id).await;
    }

    async fn remove(&self, session_id: SessionId) {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(&session_id).is_some() {
            self.count.fetch_sub(1, Ordering::AcqRel);
            debug!(session = %session_id, "session removed");
        }
    }

    pub async fn state(&self, session_id: SessionId) -> Option<SessionState> {
        self.sessions.read().await.get(&session_id).map(|s| s.state)
    }

    pub fn live_count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
