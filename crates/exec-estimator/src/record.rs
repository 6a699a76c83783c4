use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Terminal outcome of an execution, as recorded against its fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
    Timeout,
}

/// One line of the append-only sidecar log (spec §6 "Persisted state").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingRecord {
    pub fingerprint: String,
    pub duration_ms: u64,
    pub outcome: Outcome,
    pub ts: chrono::DateTime<chrono::Utc>,
}

/// Append one record as a single JSON line, creating the parent directory
/// and the file itself if neither exists yet.
pub async fn append(path: &Path, record: &TimingRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create sidecar directory: {}", parent.display()))?;
    }
    let mut line = serde_json::to_string(record).context("failed to serialize timing record")?;
    line.push('\n');

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("failed to open timing sidecar: {}", path.display()))?;
    file.write_all(line.as_bytes()).await?;
    Ok(())
}

/// Load every record from the sidecar. Malformed lines are skipped rather
/// than failing the whole load; a truncated write from a prior crash
/// should not block startup.
///
/// If the file holds more lines than any fingerprint could plausibly need
/// (`history_max * retention_factor`), it is rewritten with only the
/// trailing slice kept, bounding its size across restarts.
pub async fn load_and_trim(path: &Path, history_max: usize) -> Result<Vec<TimingRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read timing sidecar: {}", path.display()))?;

    let records: Vec<TimingRecord> = contents
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect();

    let retention_cap = history_max.saturating_mul(50).max(1000);
    if records.len() > retention_cap {
        let trimmed = &records[records.len() - retention_cap..];
        let mut rewritten = String::new();
        for record in trimmed {
            rewritten.push_str(&serde_json::to_string(record)?);
            rewritten.push('\n');
        }
        tokio::fs::write(path, rewritten)
            .await
            .with_context(|| format!("failed to trim timing sidecar: {}", path.display()))?;
        return Ok(trimmed.to_vec());
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn append_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("timing-history.jsonl");
        let record = TimingRecord {
            fingerprint: "abc".to_string(),
            duration_ms: 1234,
            outcome: Outcome::Success,
            ts: chrono::Utc::now(),
        };
        append(&path, &record).await.unwrap();

        let loaded = load_and_trim(&path, 50).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].fingerprint, "abc");
        assert_eq!(loaded[0].duration_ms, 1234);
    }

    #[tokio::test]
    async fn missing_file_loads_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("does-not-exist.jsonl");
        let loaded = load_and_trim(&path, 50).await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn oversized_sidecar_is_trimmed_to_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("timing-history.jsonl");
        for i in 0..1500u64 {
            let record = TimingRecord {
                fingerprint: "fp".to_string(),
                duration_ms: i,
                outcome: Outcome::Success,
                ts: chrono::Utc::now(),
            };
            append(&path, &record).await.unwrap();
        }

        let loaded = load_and_trim(&path, 10).await.unwrap();
        assert_eq!(loaded.len(), 1000);
        assert_eq!(loaded[0].duration_ms, 500);
        assert_eq!(loaded.last().unwrap().duration_ms, 1499);

        let reloaded = load_and_trim(&path, 10).await.unwrap();
        assert_eq!(reloaded.len(), 1000);
    }
}
