//! TCP accept loop: one task per incoming connection (spec §4.6's
//! "WebSocket connection" as the unit of a session).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use exec_executor::Executor;

use crate::connection;

/// Bind `bind_address` and accept connections until the process is killed,
/// handing each one to a freshly spawned [`connection::handle`] task.
pub async fn serve(bind_address: &str, executor: Arc<Executor>, config_path: Option<PathBuf>) -> Result<()> {
    let listener = TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    info!(%bind_address, "execd listening");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(error) => {
                warn!(%error, "failed to accept a connection");
                continue;
            }
        };

        let executor = Arc::clone(&executor);
        let config_path = config_path.clone();
        tokio::spawn(async move {
            connection::handle(stream, peer, executor, config_path).await;
        });
    }
}
