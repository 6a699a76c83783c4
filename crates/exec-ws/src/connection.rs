//! One WebSocket connection's worth of state: a read loop that dispatches
//! JSON-RPC requests, and a write pump that serializes request responses
//! and execution notifications onto the socket in the order they're
//! produced (spec §5: "WS send queue (single owner: the write pump)").

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use exec_core::ErrorKind;
use exec_executor::Executor;

use crate::protocol::{self, SeqCounter};

pub(crate) async fn handle(stream: TcpStream, peer: SocketAddr, executor: Arc<Executor>, config_path: Option<PathBuf>) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(error) => {
            warn!(%peer, %error, "websocket handshake failed");
            return;
        }
    };

    if let Err(error) = drive(ws_stream, executor, config_path).await {
        warn!(%peer, %error, "connection ended with an error");
    }
}

async fn drive(ws_stream: WebSocketStream<TcpStream>, executor: Arc<Executor>, config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let (session_id, mut notify_rx) = match executor.accept().await {
        Ok(pair) => pair,
        Err(kind) => {
            let reason = if kind == ErrorKind::Busy { "server at capacity" } else { "accept failed" };
            let text = json!({"jsonrpc": "2.0", "error": {"code": -32000, "message": reason, "data": {"kind": kind}}}).to_string();
            let _ = ws_tx.send(Message::Text(text)).await;
            let _ = ws_tx.send(Message::Close(None)).await;
            return Ok(());
        }
    };
    info!(session = %session_id, "session accepted");

    // Bound the send queue at SEND_HIGH_WATER worth of messages (spec §4.7):
    // once it fills, `.send().await` below blocks, which stalls the
    // notifier, which stalls `NotifySink::emit`, which is what pauses both
    // stream readers rather than letting the queue grow without bound.
    let config = executor.config_snapshot().await;
    let queue_capacity = (config.send_high_water / config.max_output_payload.max(1)).max(1);

    let seq = SeqCounter::new();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(queue_capacity);

    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if ws_tx.send(message).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let notify_out_tx = out_tx.clone();
    let notify_seq = Arc::clone(&seq);
    let notifier = tokio::spawn(async move {
        while let Some(notification) = notify_rx.recv().await {
            let text = protocol::notification_frame(notification, &notify_seq);
            if notify_out_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = ws_rx.next().await {
        let message = match message {
            Ok(message) => message,
            Err(error) => {
                debug!(session = %session_id, %error, "websocket read error");
                break;
            }
        };

        match message {
            Message::Text(text) => {
                let response = protocol::dispatch(&executor, session_id, config_path.as_ref(), &text, &seq).await;
                if out_tx.send(Message::Text(response)).await.is_err() {
                    break;
                }
            }
            Message::Ping(payload) => {
                if out_tx.send(Message::Pong(payload)).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    executor.disconnect(session_id).await;
    drop(out_tx);
    let _ = notifier.await;
    let _ = writer.await;
    info!(session = %session_id, "session closed");
    Ok(())
}
