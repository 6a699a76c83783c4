//! JSON-RPC 2.0 message shapes and the request dispatcher (spec §4.6, §6:
//! "All server→client messages include a monotonically increasing `seq`
//! field per session").

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;
use serde_json::{Value, json};

use exec_core::{ErrorKind, RequestId, SessionId};
use exec_executor::{ControlAction, ExecuteParams, ExecutionEvent, ExecutionNotification, Executor};
use exec_process::StreamTag;

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Deserialize)]
struct ExecuteParamsWire {
    command: String,
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(default)]
    cwd: Option<PathBuf>,
    #[serde(default)]
    pty: Option<bool>,
    #[serde(default)]
    idle_timeout_s: Option<u64>,
    #[serde(default)]
    absolute_timeout_s: Option<u64>,
}

impl From<ExecuteParamsWire> for ExecuteParams {
    fn from(wire: ExecuteParamsWire) -> Self {
        ExecuteParams {
            command: wire.command,
            env: wire.env,
            cwd: wire.cwd,
            pty: wire.pty,
            idle_timeout_s: wire.idle_timeout_s,
            absolute_timeout_s: wire.absolute_timeout_s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ControlParamsWire {
    request_id: u64,
    action: String,
}

/// Per-session outgoing sequence counter, shared between request responses
/// and notifications so both count against the same `seq` space.
pub(crate) struct SeqCounter(AtomicU64);

impl SeqCounter {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self(AtomicU64::new(0)))
    }

    fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Parse and dispatch one incoming text frame, returning the serialized
/// response frame to send back.
pub(crate) async fn dispatch(
    executor: &Arc<Executor>,
    session_id: SessionId,
    config_path: Option<&PathBuf>,
    text: &str,
    seq: &SeqCounter,
) -> String {
    let request: RpcRequest = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(error) => return error_frame(Value::Null, -32700, format!("parse error: {error}"), None, seq),
    };

    let id = request.id;
    match request.method.as_str() {
        "execute" => handle_execute(executor, session_id, id, request.params, seq).await,
        "control" => handle_control(executor, session_id, id, request.params, seq).await,
        "hot_reload" => handle_hot_reload(executor, config_path, id, seq).await,
        other => error_frame(id, -32601, format!("unknown method '{other}'"), None, seq),
    }
}

async fn handle_execute(executor: &Arc<Executor>, session_id: SessionId, id: Value, params: Value, seq: &SeqCounter) -> String {
    let wire: ExecuteParamsWire = match serde_json::from_value(params) {
        Ok(wire) => wire,
        Err(error) => return kind_error_frame(id, ErrorKind::InvalidParams, Some(error.to_string()), seq),
    };

    match executor.execute(session_id, wire.into()).await {
        Ok(result) => ok_frame(
            id,
            json!({
                "request_id": result.request_id.0,
                "pid": result.pid,
                "pgid": result.pgid,
                "absolute_deadline": result.absolute_deadline.to_rfc3339(),
                "idle_deadline": result.idle_deadline.to_rfc3339(),
            }),
            seq,
        ),
        Err(kind) => kind_error_frame(id, kind, None, seq),
    }
}

async fn handle_control(executor: &Arc<Executor>, session_id: SessionId, id: Value, params: Value, seq: &SeqCounter) -> String {
    let wire: ControlParamsWire = match serde_json::from_value(params) {
        Ok(wire) => wire,
        Err(error) => return kind_error_frame(id, ErrorKind::InvalidParams, Some(error.to_string()), seq),
    };

    let action = match wire.action.as_str() {
        "pause" => ControlAction::Pause,
        "resume" => ControlAction::Resume,
        "cancel" => ControlAction::Cancel,
        other => {
            return kind_error_frame(
                id,
                ErrorKind::InvalidParams,
                Some(format!("unknown control action '{other}'")),
                seq,
            );
        }
    };

    match executor.control(session_id, RequestId(wire.request_id), action).await {
        Ok(()) => ok_frame(id, json!({"acknowledged": true}), seq),
        Err(kind) => kind_error_frame(id, kind, None, seq),
    }
}

async fn handle_hot_reload(executor: &Arc<Executor>, config_path: Option<&PathBuf>, id: Value, seq: &SeqCounter) -> String {
    match exec_config::load(config_path.map(|p| p.as_path())) {
        Ok(config) => {
            executor.hot_reload(config).await;
            ok_frame(id, json!({"reloaded": true}), seq)
        }
        Err(error) => kind_error_frame(id, ErrorKind::InvalidParams, Some(error.to_string()), seq),
    }
}

/// Turn one domain [`ExecutionNotification`] into its wire frame.
pub(crate) fn notification_frame(notification: ExecutionNotification, seq: &SeqCounter) -> String {
    let request_id = notification.request_id.0;
    let (method, mut params) = match notification.event {
        ExecutionEvent::Started { pid, pgid, absolute_deadline, idle_deadline } => (
            "process.started",
            json!({
                "pid": pid,
                "pgid": pgid,
                "absolute_deadline": absolute_deadline.to_rfc3339(),
                "idle_deadline": idle_deadline.to_rfc3339(),
            }),
        ),
        ExecutionEvent::Output { stream, seq: stream_seq, data, truncated } => (
            "process.output",
            json!({
                "stream": stream_tag_str(stream),
                "seq": stream_seq,
                "data": data,
                "truncated": truncated,
            }),
        ),
        ExecutionEvent::Status { state } => (
            "process.status",
            json!({"state": control_state_str(state)}),
        ),
        ExecutionEvent::Completed { exit_code, reason, wall_ms, stdout_bytes, stderr_bytes } => (
            "process.completed",
            json!({
                "exit_code": exit_code,
                "reason": reason,
                "wall_ms": wall_ms,
                "stdout_bytes": stdout_bytes,
                "stderr_bytes": stderr_bytes,
            }),
        ),
    };
    params["request_id"] = json!(request_id);
    json!({"jsonrpc": "2.0", "method": method, "params": params, "seq": seq.next()}).to_string()
}

fn stream_tag_str(tag: StreamTag) -> &'static str {
    tag.as_str()
}

fn control_state_str(state: exec_executor::ControlState) -> &'static str {
    match state {
        exec_executor::ControlState::Paused => "paused",
        exec_executor::ControlState::Resumed => "resumed",
    }
}

fn ok_frame(id: Value, result: Value, seq: &SeqCounter) -> String {
    json!({"jsonrpc": "2.0", "id": id, "result": result, "seq": seq.next()}).to_string()
}

fn kind_error_frame(id: Value, kind: ErrorKind, detail: Option<String>, seq: &SeqCounter) -> String {
    let message = match detail {
        Some(detail) => format!("{kind}: {detail}"),
        None => kind.to_string(),
    };
    error_frame(id, error_code(kind), message, Some(kind), seq)
}

fn error_frame(id: Value, code: i64, message: String, kind: Option<ErrorKind>, seq: &SeqCounter) -> String {
    let mut error = json!({"code": code, "message": message});
    if let Some(kind) = kind {
        error["data"] = json!({"kind": kind});
    }
    json!({"jsonrpc": "2.0", "id": id, "error": error, "seq": seq.next()}).to_string()
}

/// JSON-RPC error codes for the domain `ErrorKind`s (spec §7); all share one
/// "application error" code since the client discriminates on `data.kind`.
fn error_code(kind: ErrorKind) -> i64 {
    match kind {
        ErrorKind::InvalidParams => -32602,
        ErrorKind::Busy | ErrorKind::PrecheckFailed | ErrorKind::SpawnError | ErrorKind::NotRunning | ErrorKind::Unsupported => -32000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_method_gets_method_not_found() {
        let seq = SeqCounter::new();
        let frame = error_frame(json!(1), -32601, "unknown method 'bogus'".to_string(), None, &seq);
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["error"]["code"], -32601);
        assert_eq!(value["seq"], 1);
    }

    #[test]
    fn seq_increments_across_calls() {
        let seq = SeqCounter::new();
        assert_eq!(seq.next(), 1);
        assert_eq!(seq.next(), 2);
        assert_eq!(seq.next(), 3);
    }
}
