//! Position Tracker (SPEC_FULL.md §4.12): tracks read-offset bookkeeping for
//! per-instance log files so the usage-enrichment and summary features can
//! tail them incrementally instead of re-reading from scratch each sweep.
//! All records live in one JSON document; writes are write-temp-then-rename.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use orc_core::Error;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRecord {
    pub file_path: String,
    pub last_byte_offset: u64,
    pub last_line_number: u64,
    pub last_read_timestamp: DateTime<Utc>,
    pub prefix_checksum: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PositionStore {
    /// Keyed by `"{instance_id}:{log_kind}"`.
    pub records: HashMap<String, PositionRecord>,
}

fn key(instance_id: &str, log_kind: &str) -> String {
    format!("{instance_id}:{log_kind}")
}

fn checksum_prefix(bytes: &[u8]) -> u32 {
    // Simple rolling checksum over the first 256 bytes; not cryptographic,
    // only used to detect truncation/rotation.
    let mut sum: u32 = 0;
    for &b in bytes.iter().take(256) {
        sum = sum.wrapping_mul(31).wrapping_add(b as u32);
    }
    sum
}

pub async fn load(path: &str) -> PositionStore {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
        Err(_) => PositionStore::default(),
    }
}

pub async fn save(path: &str, store: &PositionStore) -> Result<(), Error> {
    let rendered = serde_json::to_string_pretty(store)?;
    let tmp_path = format!("{path}.tmp");
    if let Some(parent) = std::path::Path::new(path).parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&tmp_path, rendered).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// Reads new bytes appended to `file_path` since the last tracked position
/// for `(instance_id, log_kind)`, resetting to the start if the file's prefix
/// checksum no longer matches (truncation/rotation).
pub async fn read_new_bytes(
    store: &mut PositionStore,
    instance_id: &str,
    log_kind: &str,
    file_path: &str,
) -> Result<Vec<u8>, Error> {
    let k = key(instance_id, log_kind);
    let mut file = tokio::fs::File::open(file_path).await?;
    let mut prefix = vec![0u8; 256];
    let read = file.read(&mut prefix).await.unwrap_or(0);
    prefix.truncate(read);
    let checksum = checksum_prefix(&prefix);

    let start_offset = match store.records.get(&k) {
        Some(rec) if rec.prefix_checksum == checksum => rec.last_byte_offset,
        _ => 0,
    };

    let metadata = tokio::fs::metadata(file_path).await?;
    let total_len = metadata.len();
    if start_offset >= total_len {
        let last_line_number = store.records.get(&k).map(|r| r.last_line_number).unwrap_or(0);
        store.records.insert(
            k,
            PositionRecord {
                file_path: file_path.to_string(),
                last_byte_offset: total_len,
                last_line_number,
                last_read_timestamp: Utc::now(),
                prefix_checksum: checksum,
            },
        );
        return Ok(Vec::new());
    }

    let mut file = tokio::fs::File::open(file_path).await?;
    use tokio::io::{AsyncSeekExt, SeekFrom};
    file.seek(SeekFrom::Start(start_offset)).await?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).await?;

    let prev_lines = store.records.get(&k).map(|r| r.last_line_number).unwrap_or(0);
    let new_lines = buf.iter().filter(|&&b| b == b'\n').count() as u64;

    store.records.insert(
        k,
        PositionRecord {
            file_path: file_path.to_string(),
            last_byte_offset: total_len,
            last_line_number: prev_lines + new_lines,
            last_read_timestamp: Utc::now(),
            prefix_checksum: checksum,
        },
    );

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_new_bytes_picks_up_appended_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        tokio::fs::write(&path, b"line1\n").await.unwrap();

        let mut store = PositionStore::default();
        let first = read_new_bytes(&mut store, "inst-1", "usage", path.to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(first, b"line1\n");

        tokio::fs::write(&path, b"line1\nline2\n").await.unwrap();
        let second = read_new_bytes(&mut store, "inst-1", "usage", path.to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(second, b"line2\n");
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions.json");
        let mut store = PositionStore::default();
        store.records.insert(
            "inst-1:usage".to_string(),
            PositionRecord {
                file_path: "x".to_string(),
                last_byte_offset: 10,
                last_line_number: 1,
                last_read_timestamp: Utc::now(),
                prefix_checksum: 42,
            },
        );
        save(path.to_str().unwrap(), &store).await.unwrap();
        let loaded = load(path.to_str().unwrap()).await;
        assert_eq!(loaded.records.get("inst-1:usage").unwrap().last_byte_offset, 10);
    }
}
