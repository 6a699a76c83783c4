//! Ties the pipeline together: C6's two stateful RPC methods (`execute`,
//! `control`) are the only entry points, and everything between a spawn and
//! its terminal notification happens on a task this module owns (the Fault
//! & Cleanup Controller, C8, included).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::warn;

use exec_config::ExecdConfig;
use exec_core::{ErrorKind, ExecutionId, RequestId, RequestIdAllocator, SessionId, TerminationReason};
use exec_estimator::{CommandHints, Estimator, Outcome};
use exec_hooks::{HookContext, HookSpec, PostHookOutcome, run_post_hooks, run_pre_hooks};
use exec_process::{PtyPort, SpawnOptions, SpawnTarget, continue_process_group, kill_process_group, spawn, stop_process_group, terminate_process_group};
use exec_session::{SessionManager, SessionState};

use crate::event::{ControlState, ExecutionEvent, ExecutionNotification};
use crate::params::{ControlAction, ExecuteParams, ExecuteResult};
use crate::runner::{ActivityTracker, IDLE_POLL_INTERVAL, NotifySink, spawn_multiplexer, spawn_reaper};

/// Orchestrates C1-C5 plus the Fault & Cleanup Controller (C8) for one
/// server. One instance is shared (via `Arc`) across every connection.
pub struct Executor {
    config: RwLock<Arc<ExecdConfig>>,
    sessions: Arc<SessionManager<ExecutionNotification>>,
    estimator: Arc<Estimator>,
    pty_port: Arc<dyn PtyPort>,
    allocators: RwLock<HashMap<SessionId, Arc<RequestIdAllocator>>>,
    controls: RwLock<HashMap<ExecutionId, mpsc::Sender<ControlAction>>>,
}

impl Executor {
    pub fn new(config: ExecdConfig, estimator: Arc<Estimator>, pty_port: Arc<dyn PtyPort>) -> Arc<Self> {
        let max_sessions = config.max_sessions;
        // SEND_HIGH_WATER is a byte threshold; each queued notification is
        // bounded by MAX_OUTPUT_PAYLOAD, so dividing gives the channel
        // depth at which the session's outgoing queue is "high water"
        // (spec §4.7).
        let notify_capacity = (config.send_high_water / config.max_output_payload.max(1)).max(1);
        Arc::new(Self {
            config: RwLock::new(Arc::new(config)),
            sessions: SessionManager::new(max_sessions, notify_capacity),
            estimator,
            pty_port,
            allocators: RwLock::new(HashMap::new()),
            controls: RwLock::new(HashMap::new()),
        })
    }

    /// Admit a new session, returning the receiver the WebSocket write pump
    /// should drain (spec §4.5).
    pub async fn accept(self: &Arc<Self>) -> Result<(SessionId, mpsc::Receiver<ExecutionNotification>), ErrorKind> {
        let (session_id, rx) = self.sessions.accept().await?;
        self.allocators
            .write()
            .await
            .insert(session_id, Arc::new(RequestIdAllocator::default()));
        Ok((session_id, rx))
    }

    /// Replace the live config. Only new `execute` calls observe it (spec
    /// §4.6, `hot_reload`); executions already in flight keep the settings
    /// they were spawned with.
    pub async fn hot_reload(&self, config: ExecdConfig) {
        *self.config.write().await = Arc::new(config);
    }

    pub async fn config_snapshot(&self) -> Arc<ExecdConfig> {
        self.config.read().await.clone()
    }

    pub fn live_sessions(&self) -> usize {
        self.sessions.live_count()
    }

    /// Run the `execute` pipeline: pre-hooks, estimator, spawn, then hand
    /// off to a detached task that drives the execution to completion.
    pub async fn execute(self: &Arc<Self>, session_id: SessionId, params: ExecuteParams) -> Result<ExecuteResult, ErrorKind> {
        if params.command.trim().is_empty() {
            return Err(ErrorKind::InvalidParams);
        }

        let config = self.config_snapshot().await;
        let pty_requested = params.pty.unwrap_or(false);
        if pty_requested && !config.allow_pty {
            return Err(ErrorKind::InvalidParams);
        }

        let allocator = self
            .allocators
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or(ErrorKind::InvalidParams)?;

        let execution_id = self
            .sessions
            .begin_execution(session_id, &allocator, params.command.clone())
            .await?;

        let mut ctx = HookContext::new(session_id, execution_id.request_id, params.command.clone());
        ctx.cwd = params.cwd.clone();
        for (key, value) in &params.env {
            ctx.env.insert(key.clone(), value.clone());
        }

        if let Err(kind) = run_pre_hooks(&mut ctx, &config.pre_hooks, config.prehook_budget_ms).await {
            let _ = self
                .sessions
                .finish_execution(session_id, TerminationReason::PrecheckFailed, None)
                .await;
            self.settle_if_draining(session_id).await;
            return Err(kind);
        }

        let fingerprint = exec_core::fingerprint(&params.command);
        let hints = CommandHints::from_command(&params.command);
        let estimate = self.estimator.estimate(&fingerprint, &hints).await;

        let absolute_s = params
            .absolute_timeout_s
            .unwrap_or(estimate.absolute_s)
            .clamp(config.min_timeout_s, config.max_timeout_s);
        let idle_s = params
            .idle_timeout_s
            .unwrap_or(estimate.idle_s)
            .clamp(config.min_timeout_s, config.max_timeout_s);

        let target = SpawnTarget {
            command: ctx.wrapped_command.clone(),
            env_overrides: ctx.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            cwd: ctx.cwd.clone(),
            env_denylist: config.env_denylist.clone(),
        };
        let options = SpawnOptions {
            pty: pty_requested,
            shell: true,
            process_group: true,
            combine_stderr: false,
        };

        let mut handle = match spawn(target, options, self.pty_port.as_ref()).await {
            Ok(handle) => handle,
            Err(error) => {
                warn!(%error, command = %params.command, "spawn failed");
                let _ = self
                    .sessions
                    .finish_execution(session_id, TerminationReason::SpawnError, None)
                    .await;
                self.settle_if_draining(session_id).await;
                return Err(ErrorKind::SpawnError);
            }
        };

        let pid = handle.pid;
        let pgid = handle.pgid;
        let started_at = Instant::now();
        let absolute_deadline = started_at + Duration::from_secs(absolute_s);
        let idle_timeout = Duration::from_secs(idle_s);

        let _ = self
            .sessions
            .mark_running(session_id, pgid, absolute_deadline, started_at + idle_timeout)
            .await;

        let (control_tx, control_rx) = mpsc::channel(8);
        self.controls.write().await.insert(execution_id, control_tx);

        let activity = ActivityTracker::new();
        let sink = Box::new(NotifySink {
            sessions: Arc::clone(&self.sessions),
            session_id,
            request_id: execution_id.request_id,
            activity: activity.clone(),
        });
        let mux_done_rx = spawn_multiplexer(&mut handle, sink, config.max_line, config.stream_buffer_bytes);
        let reaper_rx = spawn_reaper(handle);

        let absolute_deadline_wall = to_datetime(absolute_deadline, started_at);
        let idle_deadline_wall = to_datetime(started_at + idle_timeout, started_at);

        self.notify(
            session_id,
            execution_id.request_id,
            ExecutionEvent::Started {
                pid,
                pgid,
                absolute_deadline: absolute_deadline_wall,
                idle_deadline: idle_deadline_wall,
            },
        )
        .await;

        let executor = Arc::clone(self);
        let grace = Duration::from_millis(config.grace_ms);
        let post_hooks = config.post_hooks.clone();

        tokio::spawn(async move {
            executor
                .run_to_completion(RunCtx {
                    session_id,
                    execution_id,
                    pgid,
                    absolute_deadline,
                    idle_timeout,
                    grace,
                    control_rx,
                    mux_done_rx,
                    reaper_rx,
                    activity,
                    started_at,
                    fingerprint,
                    hook_ctx: ctx,
                    post_hooks,
                })
                .await;
        });

        Ok(ExecuteResult {
            request_id: execution_id.request_id,
            pid,
            pgid,
            absolute_deadline: absolute_deadline_wall,
            idle_deadline: idle_deadline_wall,
        })
    }

    /// Route a `control` request to the live execution's channel.
    pub async fn control(&self, session_id: SessionId, request_id: RequestId, action: ControlAction) -> Result<(), ErrorKind> {
        let current = self.sessions.current_request_id(session_id).await;
        if current != Some(request_id) {
            return Err(ErrorKind::NotRunning);
        }

        #[cfg(not(unix))]
        if matches!(action, ControlAction::Pause | ControlAction::Resume) {
            return Err(ErrorKind::Unsupported);
        }

        let execution_id = ExecutionId { session_id, request_id };
        let tx = self
            .controls
            .read()
            .await
            .get(&execution_id)
            .cloned()
            .ok_or(ErrorKind::NotRunning)?;
        tx.send(action).await.map_err(|_| ErrorKind::NotRunning)
    }

    /// WebSocket disconnect: cancel any live execution (C8) and let
    /// `run_to_completion` close the session once the child is reaped.
    pub async fn disconnect(self: &Arc<Self>, session_id: SessionId) {
        self.allocators.write().await.remove(&session_id);
        let needs_drain = self.sessions.begin_disconnect(session_id).await;
        if !needs_drain {
            return;
        }
        if let Some(request_id) = self.sessions.current_request_id(session_id).await {
            let execution_id = ExecutionId { session_id, request_id };
            if let Some(tx) = self.controls.read().await.get(&execution_id).cloned() {
                let _ = tx.send(ControlAction::Cancel).await;
            }
        }
    }

    async fn notify(&self, session_id: SessionId, request_id: RequestId, event: ExecutionEvent) {
        let _ = self.sessions.send(session_id, ExecutionNotification { request_id, event }).await;
    }

    async fn settle_if_draining(&self, session_id: SessionId) {
        if self.sessions.state(session_id).await == Some(SessionState::Draining) {
            self.sessions.close(session_id).await;
        }
    }

    /// The Fault & Cleanup Controller (C8) and the rest of an execution's
    /// lifetime after spawn: races the reaper, the multiplexer's EOF, timer
    /// deadlines, and `control` actions, then finalizes exactly once.
    async fn run_to_completion(self: Arc<Self>, run: RunCtx) {
        let RunCtx {
            session_id,
            execution_id,
            pgid,
            absolute_deadline,
            idle_timeout,
            grace,
            mut control_rx,
            mux_done_rx,
            reaper_rx,
            activity,
            started_at,
            fingerprint,
            hook_ctx,
            post_hooks,
        } = run;

        tokio::pin!(mux_done_rx);
        tokio::pin!(reaper_rx);

        let mut reason: Option<TerminationReason> = None;
        let mut exit_code: Option<i32> = None;
        let mut mux_done = false;
        let mut fault_triggered = false;

        loop {
            if exit_code.is_some() && mux_done {
                break;
            }

            tokio::select! {
                biased;

                code = &mut reaper_rx, if exit_code.is_none() => {
                    exit_code = Some(code.unwrap_or(-1));
                }

                result = &mut mux_done_rx, if !mux_done => {
                    mux_done = true;
                    if let Ok(Err(error)) = result {
                        warn!(%error, execution = %execution_id, "output sink failed fatally");
                        reason.get_or_insert(TerminationReason::SinkError);
                        trigger_fault(&mut fault_triggered, pgid, grace);
                    }
                }

                action = control_rx.recv() => {
                    match action {
                        Some(ControlAction::Cancel) => {
                            reason.get_or_insert(TerminationReason::Cancelled);
                            trigger_fault(&mut fault_triggered, pgid, grace);
                        }
                        Some(ControlAction::Pause) => {
                            stop_process_group(pgid);
                            self.notify(session_id, execution_id.request_id, ExecutionEvent::Status { state: ControlState::Paused }).await;
                        }
                        Some(ControlAction::Resume) => {
                            continue_process_group(pgid);
                            self.notify(session_id, execution_id.request_id, ExecutionEvent::Status { state: ControlState::Resumed }).await;
                        }
                        None => {}
                    }
                }

                _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => {
                    let now = Instant::now();
                    if reason.is_none() && now >= absolute_deadline {
                        reason = Some(TerminationReason::Timeout);
                    } else if reason.is_none() && activity.idle_for().await >= idle_timeout {
                        reason = Some(TerminationReason::IdleTimeout);
                    }
                    if reason.is_some() {
                        trigger_fault(&mut fault_triggered, pgid, grace);
                    }
                }
            }
        }

        let reason = reason.unwrap_or(TerminationReason::Ok);
        let exit_code = exit_code.unwrap_or(-1);
        let wall_ms = started_at.elapsed().as_millis() as u64;
        let (stdout_bytes, stderr_bytes) = activity.totals();

        self.controls.write().await.remove(&execution_id);
        let _ = self
            .sessions
            .finish_execution(session_id, reason, Some(exit_code))
            .await;

        self.notify(
            session_id,
            execution_id.request_id,
            ExecutionEvent::Completed {
                exit_code: Some(exit_code),
                reason,
                wall_ms,
                stdout_bytes,
                stderr_bytes,
            },
        )
        .await;

        let outcome = match reason {
            TerminationReason::Ok => Outcome::Success,
            TerminationReason::Timeout | TerminationReason::IdleTimeout => Outcome::Timeout,
            _ => Outcome::Failure,
        };
        if let Err(error) = self.estimator.record(&fingerprint, wall_ms, outcome).await {
            warn!(%error, "failed to record timing sample");
        }

        let post_hook_timeout_ms = self.config_snapshot().await.prehook_budget_ms;
        for outcome in run_post_hooks(&hook_ctx, &post_hooks, post_hook_timeout_ms).await {
            if let PostHookOutcome::Failed(why) = outcome {
                warn!(reason = %why, execution = %execution_id, "post-hook failed");
            }
        }

        self.settle_if_draining(session_id).await;
    }
}

struct RunCtx {
    session_id: SessionId,
    execution_id: ExecutionId,
    pgid: u32,
    absolute_deadline: Instant,
    idle_timeout: Duration,
    grace: Duration,
    control_rx: mpsc::Receiver<ControlAction>,
    mux_done_rx: oneshot::Receiver<anyhow::Result<()>>,
    reaper_rx: oneshot::Receiver<i32>,
    activity: ActivityTracker,
    started_at: Instant,
    fingerprint: String,
    hook_ctx: HookContext,
    post_hooks: Vec<HookSpec>,
}

/// SIGTERM the group immediately; schedule a SIGKILL `grace` later if it's
/// still alive. Idempotent: only the first trigger for a given execution
/// actually signals anything (spec §4.8 "multiple triggers ... collapse to
/// a single terminal transition").
fn trigger_fault(fault_triggered: &mut bool, pgid: u32, grace: Duration) {
    if *fault_triggered {
        return;
    }
    *fault_triggered = true;
    terminate_process_group(pgid);
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        kill_process_group(pgid);
    });
}

fn to_datetime(deadline: Instant, reference: Instant) -> DateTime<Utc> {
    let remaining = deadline.saturating_duration_since(reference);
    Utc::now() + chrono::Duration::from_std(remaining).unwrap_or_else(|_| chrono::Duration::zero())
}
