//! The pieces that drive one spawned child to a terminal state: the output
//! sink that turns [`StreamChunk`]s into notifications, and the two
//! satellite tasks (multiplexer, reap-waiter) that let the main select loop
//! in [`crate::executor`] stay free of `&mut ProcessHandle` aliasing.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::sync::{Mutex, oneshot};

use exec_core::{RequestId, SessionId};
use exec_process::{ProcessHandle, Sink, StreamChunk, StreamTag, decode_lossy, multiplex};
use exec_session::SessionManager;

use crate::event::{ExecutionEvent, ExecutionNotification};

/// How often the drive loop wakes up to re-check idle/absolute deadlines.
pub(crate) const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Per-stream byte counters plus the shared "last activity" clock the idle
/// timer reads. Cheap to clone (all `Arc`s); shared between the sink and
/// the drive loop.
#[derive(Clone)]
pub(crate) struct ActivityTracker {
    pub last_activity: Arc<Mutex<Instant>>,
    pub stdout_bytes: Arc<AtomicU64>,
    pub stderr_bytes: Arc<AtomicU64>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self {
            last_activity: Arc::new(Mutex::new(Instant::now())),
            stdout_bytes: Arc::new(AtomicU64::new(0)),
            stderr_bytes: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn touch(&self) {
        *self.last_activity.lock().await = Instant::now();
    }

    pub async fn idle_for(&self) -> Duration {
        self.last_activity.lock().await.elapsed()
    }

    pub fn totals(&self) -> (u64, u64) {
        (
            self.stdout_bytes.load(Ordering::Relaxed),
            self.stderr_bytes.load(Ordering::Relaxed),
        )
    }
}

/// Turns each [`StreamChunk`] the multiplexer reads into a `process.output`
/// notification, feeding the activity tracker along the way. An error here
/// (notification channel closed) is fatal to the multiplexer by contract
/// (spec §4.1), which is exactly the `sink_error` outcome.
pub(crate) struct NotifySink {
    pub sessions: Arc<SessionManager<ExecutionNotification>>,
    pub session_id: SessionId,
    pub request_id: RequestId,
    pub activity: ActivityTracker,
}

#[async_trait]
impl Sink for NotifySink {
    async fn emit(&mut self, chunk: StreamChunk) -> Result<()> {
        self.activity.touch().await;
        match chunk.stream {
            StreamTag::Stdout => self
                .activity
                .stdout_bytes
                .fetch_add(chunk.payload.len() as u64, Ordering::Relaxed),
            StreamTag::Stderr => self
                .activity
                .stderr_bytes
                .fetch_add(chunk.payload.len() as u64, Ordering::Relaxed),
        };

        let event = ExecutionEvent::Output {
            stream: chunk.stream,
            seq: chunk.seq,
            data: decode_lossy(&chunk.payload),
            truncated: chunk.truncated,
        };
        self.sessions
            .send(
                self.session_id,
                ExecutionNotification {
                    request_id: self.request_id,
                    event,
                },
            )
            .await
            .map_err(|_| anyhow!("notification channel closed"))
    }
}

/// Take the child's output handles off `handle` and drive them to EOF on a
/// dedicated task, reporting the multiplexer's terminal `Result` back once
/// both streams have closed.
pub(crate) fn spawn_multiplexer(
    handle: &mut ProcessHandle,
    sink: Box<dyn Sink>,
    max_line: usize,
    stream_buffer_bytes: usize,
) -> oneshot::Receiver<Result<()>> {
    let (tx, rx) = oneshot::channel();

    if let Some(pty_reader) = handle.take_pty_reader() {
        tokio::spawn(async move {
            let result = multiplex::<exec_process::PtyMasterReader, tokio::process::ChildStderr>(
                Some(pty_reader),
                None,
                max_line,
                stream_buffer_bytes,
                sink,
            )
            .await;
            let _ = tx.send(result);
        });
    } else {
        let stdout = handle.take_stdout();
        let stderr = handle.take_stderr();
        tokio::spawn(async move {
            let result = multiplex(stdout, stderr, max_line, stream_buffer_bytes, sink).await;
            let _ = tx.send(result);
        });
    }

    rx
}

/// Move the (stdio-stripped) `ProcessHandle` onto its own task whose only
/// job is to reap it; the main drive loop never needs `&mut ProcessHandle`
/// itself, only the `pgid` for signaling, which sidesteps any aliasing
/// between "wait for exit" and "send a signal".
pub(crate) fn spawn_reaper(mut handle: ProcessHandle) -> oneshot::Receiver<i32> {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let code = handle.wait().await.unwrap_or(-1);
        let _ = tx.send(code);
    });
    rx
}
