use super::*;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct CollectingSink(Arc<Mutex<Vec<StreamChunk>>>);

#[async_trait]
impl Sink for CollectingSink {
    async fn emit(&mut self, chunk: StreamChunk) -> Result<()> {
        self.0.lock().unwrap().push(chunk);
        Ok(())
    }
}

struct FailingSink;

#[async_trait]
impl Sink for FailingSink {
    async fn emit(&mut self, _chunk: StreamChunk) -> Result<()> {
        anyhow::bail!("boom")
    }
}

#[tokio::test]
async fn complete_lines_are_not_truncated() {
    let stdout = Cursor::new(b"hello\nworld\n".to_vec());
    let collected = Arc::new(Mutex::new(Vec::new()));
    let sink = CollectingSink(collected.clone());

    multiplex::<_, Cursor<Vec<u8>>>(Some(stdout), None, 8192, 65536, Box::new(sink))
        .await
        .unwrap();

    let chunks = collected.lock().unwrap();
    assert_eq!(chunks.len(), 2);
    assert!(chunks.iter().all(|c| !c.truncated));
    assert_eq!(decode_lossy(&chunks[0].payload), "hello\n");
    assert_eq!(decode_lossy(&chunks[1].payload), "world\n");
    assert_eq!(chunks[0].seq, 1);
    assert_eq!(chunks[1].seq, 2);
}

#[tokio::test]
async fn oversized_line_splits_at_max_line_and_reassembles() {
    let max_line = 16;
    let original = "x".repeat(50);
    let stdout = Cursor::new(original.clone().into_bytes());
    let collected = Arc::new(Mutex::new(Vec::new()));
    let sink = CollectingSink(collected.clone());

    multiplex::<_, Cursor<Vec<u8>>>(Some(stdout), None, max_line, 65536, Box::new(sink))
        .await
        .unwrap();

    let chunks = collected.lock().unwrap();
    assert!(chunks.len() >= 2);
    assert!(chunks[..chunks.len() - 1].iter().all(|c| c.truncated));
    assert!(!chunks.last().unwrap().truncated);

    let reassembled: String = chunks.iter().map(|c| decode_lossy(&c.payload)).collect();
    assert_eq!(reassembled, original);

    let seqs: Vec<u64> = chunks.iter().map(|c| c.seq).collect();
    let mut sorted = seqs.clone();
    sorted.sort_unstable();
    assert_eq!(seqs, sorted);
    for w in seqs.windows(2) {
        assert_eq!(w[1], w[0] + 1);
    }
}

#[tokio::test]
async fn eof_without_trailing_newline_flushes_remainder() {
    let stdout = Cursor::new(b"error".to_vec());
    let collected = Arc::new(Mutex::new(Vec::new()));
    let sink = CollectingSink(collected.clone());

    multiplex::<_, Cursor<Vec<u8>>>(Some(stdout), None, 8192, 65536, Box::new(sink))
        .await
        .unwrap();

    let chunks = collected.lock().unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(decode_lossy(&chunks[0].payload), "error");
}

#[tokio::test]
async fn sink_error_is_fatal() {
    let stdout = Cursor::new(b"hello\n".to_vec());
    let result = multiplex::<_, Cursor<Vec<u8>>>(Some(stdout), None, 8192, 65536, Box::new(FailingSink)).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn both_streams_are_drained() {
    let stdout = Cursor::new(b"out-1\nout-2\n".to_vec());
    let stderr = Cursor::new(b"err-1\n".to_vec());
    let collected = Arc::new(Mutex::new(Vec::new()));
    let sink = CollectingSink(collected.clone());

    multiplex(Some(stdout), Some(stderr), 8192, 65536, Box::new(sink))
        .await
        .unwrap();

    let chunks = collected.lock().unwrap();
    assert_eq!(chunks.len(), 3);
    assert!(chunks.iter().any(|c| c.stream == StreamTag::Stdout));
    assert!(chunks.iter().any(|c| c.stream == StreamTag::Stderr));

    let seqs: Vec<u64> = chunks.iter().map(|c| c.seq).collect();
    let mut sorted = seqs.clone();
    sorted.sort_unstable();
    assert_eq!(seqs, sorted);
}
