//! Dump WAL command implementation.

use hfstore_core::{WalManager, WalRecord};
use hfstore_storage::FileBackend;
use serde::Serialize;
use std::path::Path;

/// Commit log record representation for output.
#[derive(Debug, Serialize)]
pub struct WalRecordInfo {
    /// Offset in the log file.
    pub offset: u64,
    /// Record type.
    pub record_type: String,
    /// Transaction id.
    pub tid: u64,
    /// Object id (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoid: Option<u64>,
    /// Chunk number (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_num: Option<u32>,
    /// Purged object ids (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purged: Option<Vec<u64>>,
    /// Payload size in bytes (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_size: Option<usize>,
}

impl WalRecordInfo {
    fn from_record(offset: u64, record: &WalRecord) -> Self {
        let mut info = Self {
            offset,
            record_type: format!("{:?}", record.record_type()),
            tid: record.tid().as_u64(),
            zoid: None,
            chunk_num: None,
            purged: None,
            payload_size: None,
        };
        match record {
            WalRecord::StoreObject { zoid, state, .. } => {
                info.zoid = Some(zoid.as_u64());
                info.payload_size = Some(state.as_ref().map_or(0, Vec::len));
            }
            WalRecord::PurgeChunks { zoids, .. } => {
                info.purged = Some(zoids.iter().map(|zoid| zoid.as_u64()).collect());
            }
            WalRecord::StoreChunk {
                zoid,
                chunk_num,
                chunk,
                ..
            } => {
                info.zoid = Some(zoid.as_u64());
                info.chunk_num = Some(*chunk_num);
                info.payload_size = Some(chunk.len());
            }
            WalRecord::Begin { .. } | WalRecord::Commit { .. } | WalRecord::Checkpoint { .. } => {}
        }
        info
    }
}

/// Runs the dump-wal command.
///
/// Reads the log file directly, without opening (and recovering) the store.
pub fn run(path: &Path, limit: Option<usize>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let wal_path = path.join("commit.wal");

    if !wal_path.exists() {
        return Err("Commit log not found".into());
    }

    let wal = WalManager::new(Box::new(FileBackend::open(&wal_path)?), false);
    let records = read_wal_records(&wal, limit)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            print_text_output(&records);
        }
    }

    Ok(())
}

fn read_wal_records(
    wal: &WalManager,
    limit: Option<usize>,
) -> Result<Vec<WalRecordInfo>, Box<dyn std::error::Error>> {
    let max_records = limit.unwrap_or(usize::MAX);
    let mut records = Vec::new();
    for item in wal.iter()?.take(max_records) {
        let (offset, record) = item?;
        records.push(WalRecordInfo::from_record(offset, &record));
    }
    Ok(records)
}

fn print_text_output(records: &[WalRecordInfo]) {
    println!("{:>10}  {:<12}  {:>8}  details", "offset", "type", "tid");
    for record in records {
        let mut details = Vec::new();
        if let Some(zoid) = record.zoid {
            details.push(format!("zoid={zoid}"));
        }
        if let Some(num) = record.chunk_num {
            details.push(format!("chunk={num}"));
        }
        if let Some(ref purged) = record.purged {
            details.push(format!("purge={purged:?}"));
        }
        if let Some(size) = record.payload_size {
            details.push(format!("bytes={size}"));
        }
        println!(
            "{:>10}  {:<12}  {:>8}  {}",
            record.offset,
            record.record_type,
            record.tid,
            details.join(" ")
        );
    }
    println!();
    println!("Total records: {}", records.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use hfstore_core::{ObjectId, TransactionId};
    use hfstore_storage::InMemoryBackend;

    #[test]
    fn describes_each_record() {
        let wal = WalManager::new(Box::new(InMemoryBackend::new()), false);
        let tid = TransactionId::new(3);
        wal.append_transaction(&[
            WalRecord::Begin { tid },
            WalRecord::PurgeChunks {
                tid,
                zoids: vec![ObjectId::new(4)],
            },
            WalRecord::StoreChunk {
                tid,
                zoid: ObjectId::new(4),
                chunk_num: 0,
                chunk: vec![0; 12],
            },
            WalRecord::Commit { tid },
        ])
        .unwrap();

        let all = read_wal_records(&wal, None).unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[1].purged, Some(vec![4]));
        assert_eq!(all[2].payload_size, Some(12));
        assert_eq!(all[2].record_type, "StoreChunk");
        assert!(all.iter().all(|r| r.tid == 3));

        assert_eq!(read_wal_records(&wal, Some(2)).unwrap().len(), 2);
    }
}
