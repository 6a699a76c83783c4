//! PTY-backed spawning for interactive children (`pty: true`).
//!
//! `portable-pty` gives a synchronous `Read`/`Write` pair; callers that need
//! an `AsyncRead` (the multiplexer) get one via [`PtyMasterReader`], which
//! bridges a blocking reader thread into a channel-backed `poll_read`.

use anyhow::{Context, Result};
use portable_pty::{Child as PtyChild, CommandBuilder, MasterPty, PtySize, native_pty_system};
use std::io::{Read, Write};
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;

/// Everything the supervisor needs after spawning a command inside a PTY.
pub struct PtyHandle {
    pub master: Box<dyn MasterPty + Send>,
    pub reader: PtyMasterReader,
    pub writer: Box<dyn Write + Send>,
    pub child: Box<dyn PtyChild + Send + Sync>,
}

/// Abstracts PTY allocation so the supervisor is not hard-wired to one
/// backend; swappable in tests.
pub trait PtyPort: Send + Sync {
    fn spawn(
        &self,
        command: &str,
        args: &[String],
        cwd: Option<&str>,
        env: &[(String, String)],
    ) -> Result<PtyHandle>;
}

/// `portable-pty`'s native backend: `openpty()` on unix, ConPTY on Windows.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixPtyPort;

impl PtyPort for UnixPtyPort {
    fn spawn(
        &self,
        command: &str,
        args: &[String],
        cwd: Option<&str>,
        env: &[(String, String)],
    ) -> Result<PtyHandle> {
        let system = native_pty_system();
        let pair = system
            .openpty(PtySize {
                rows: 24,
                cols: 80,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("openpty failed")?;

        let mut cmd = CommandBuilder::new(command);
        cmd.args(args);
        if let Some(cwd) = cwd {
            cmd.cwd(cwd);
        }
        for (k, v) in env {
            cmd.env(k, v);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .context("failed to spawn command in pty")?;
        let sync_reader = pair
            .master
            .try_clone_reader()
            .context("failed to clone pty reader")?;
        let writer = pair
            .master
            .take_writer()
            .context("failed to take pty writer")?;

        Ok(PtyHandle {
            master: pair.master,
            reader: PtyMasterReader::spawn(sync_reader),
            writer,
            child,
        })
    }
}

/// Bridges a blocking `Read` (the PTY master) into `tokio::io::AsyncRead`.
///
/// A dedicated OS thread blocks on `read()` and forwards chunks over a
/// bounded channel; `poll_read` drains the channel, buffering any bytes
/// that didn't fit in the caller's slice.
pub struct PtyMasterReader {
    rx: mpsc::Receiver<std::io::Result<Vec<u8>>>,
    leftover: Vec<u8>,
}

impl PtyMasterReader {
    pub fn spawn(mut reader: Box<dyn Read + Send>) -> Self {
        let (tx, rx) = mpsc::channel(16);
        std::thread::spawn(move || {
            let mut buf = [0u8; 8192];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.blocking_send(Ok(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.blocking_send(Err(e));
                        break;
                    }
                }
            }
        });
        Self {
            rx,
            leftover: Vec::new(),
        }
    }
}

impl AsyncRead for PtyMasterReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if !self.leftover.is_empty() {
            let n = self.leftover.len().min(buf.remaining());
            buf.put_slice(&self.leftover[..n]);
            self.leftover.drain(..n);
            return Poll::Ready(Ok(()));
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                let n = chunk.len().min(buf.remaining());
                buf.put_slice(&chunk[..n]);
                if n < chunk.len() {
                    self.leftover = chunk[n..].to_vec();
                }
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Err(e)),
            Poll::Ready(None) => Poll::Ready(Ok(())),
            Poll::Pending => Poll::Pending,
        }
    }
}
