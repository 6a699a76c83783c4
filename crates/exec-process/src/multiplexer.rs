//! Dual-stream reader with line-integrity chunking and per-stream back-pressure.

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;

/// Which child stream a [`StreamChunk`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamTag {
    Stdout,
    Stderr,
}

impl StreamTag {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamTag::Stdout => "stdout",
            StreamTag::Stderr => "stderr",
        }
    }
}

/// A bounded fragment of a child's stdout or stderr.
///
/// `payload` is either a complete line (newline-terminated) or a
/// `MAX_LINE`-sized boundary segment with `truncated` set.
#[derive(Debug, Clone)]
pub struct StreamChunk {
    pub stream: StreamTag,
    pub payload: Vec<u8>,
    pub truncated: bool,
    pub seq: u64,
}

/// Sink the multiplexer drives one chunk at a time, in receipt order.
///
/// `emit` may block (e.g. a slow WebSocket send queue); while blocked, the
/// multiplexer applies back-pressure to both streams rather than buffering
/// without bound. An error here is fatal: it surfaces as a `sink_error`
/// execution outcome and tears the whole multiplexer down.
#[async_trait]
pub trait Sink: Send {
    async fn emit(&mut self, chunk: StreamChunk) -> Result<()>;
}

/// Drive `stdout`/`stderr` concurrently to EOF, emitting [`StreamChunk`]s to
/// `sink` in receipt order with a gap-free, strictly increasing `seq`.
///
/// `stream_buffer_bytes` bounds memory per stream: each stream gets its own
/// `mpsc` channel sized to roughly that many bytes worth of chunks, so a
/// lagging reader on one stream never blocks reads on the other. Because a
/// single consumer task pulls from both channels and awaits `emit` before
/// pulling again, a blocked sink eventually fills and pauses both channels
/// together, which is also the desired behavior when the downstream send
/// queue backs up (§4.7: pause both streams, not just one).
pub async fn multiplex<O, E>(
    stdout: Option<O>,
    stderr: Option<E>,
    max_line: usize,
    stream_buffer_bytes: usize,
    mut sink: Box<dyn Sink>,
) -> Result<()>
where
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
{
    let capacity = (stream_buffer_bytes / max_line.max(1)).max(1);
    let (stdout_tx, mut stdout_rx) = mpsc::channel::<StreamChunk>(capacity);
    let (stderr_tx, mut stderr_rx) = mpsc::channel::<StreamChunk>(capacity);

    let stdout_task = stdout.map(|r| tokio::spawn(read_stream(r, StreamTag::Stdout, max_line, stdout_tx)));
    let stderr_task = stderr.map(|r| tokio::spawn(read_stream(r, StreamTag::Stderr, max_line, stderr_tx)));

    let mut stdout_open = stdout_task.is_some();
    let mut stderr_open = stderr_task.is_some();
    let mut next_seq: u64 = 1;
    let mut result = Ok(());

    while stdout_open || stderr_open {
        tokio::select! {
            biased;
            chunk = stdout_rx.recv(), if stdout_open => {
                match chunk {
                    Some(mut chunk) => {
                        chunk.seq = next_seq;
                        next_seq += 1;
                        if let Err(e) = sink.emit(chunk).await {
                            result = Err(e);
                            break;
                        }
                    }
                    None => stdout_open = false,
                }
            }
            chunk = stderr_rx.recv(), if stderr_open => {
                match chunk {
                    Some(mut chunk) => {
                        chunk.seq = next_seq;
                        next_seq += 1;
                        if let Err(e) = sink.emit(chunk).await {
                            result = Err(e);
                            break;
                        }
                    }
                    None => stderr_open = false,
                }
            }
        }
    }

    if let Some(task) = stdout_task {
        task.abort();
    }
    if let Some(task) = stderr_task {
        task.abort();
    }

    result
}

/// Read one stream to EOF, splitting into line-integral chunks and pushing
/// them to `tx`. A read error closes this stream only; it does not affect
/// the sibling stream.
async fn read_stream<R>(mut reader: R, tag: StreamTag, max_line: usize, tx: mpsc::Sender<StreamChunk>)
where
    R: AsyncRead + Unpin,
{
    let mut pending: Vec<u8> = Vec::new();
    let mut buf = vec![0u8; 8192];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => break,
        };
        pending.extend_from_slice(&buf[..n]);

        loop {
            if let Some(newline_pos) = pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = pending.drain(..=newline_pos).collect();
                if tx
                    .send(StreamChunk {
                        stream: tag,
                        payload: line,
                        truncated: false,
                        seq: 0,
                    })
                    .await
                    .is_err()
                {
                    return;
                }
                continue;
            }
            if pending.len() >= max_line {
                let fragment: Vec<u8> = pending.drain(..max_line).collect();
                if tx
                    .send(StreamChunk {
                        stream: tag,
                        payload: fragment,
                        truncated: true,
                        seq: 0,
                    })
                    .await
                    .is_err()
                {
                    return;
                }
                continue;
            }
            break;
        }
    }

    if !pending.is_empty() {
        let _ = tx
            .send(StreamChunk {
                stream: tag,
                payload: pending,
                truncated: false,
                seq: 0,
            })
            .await;
    }
}

/// Lossily decode a chunk's payload as UTF-8, replacing invalid sequences
/// with the Unicode replacement character rather than dropping the chunk.
pub fn decode_lossy(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload).into_owned()
}

#[cfg(test)]
#[path = "multiplexer_tests.rs"]
mod tests;
