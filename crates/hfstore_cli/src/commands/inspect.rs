//! Inspect command implementation.

use hfstore_core::ObjectStore;
use serde::Serialize;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Commit log size in bytes.
    pub wal_size: u64,
    /// Number of commit log records.
    pub wal_record_count: usize,
    /// Last finalized transaction id.
    pub last_tid: u64,
    /// Number of object-state rows.
    pub object_count: usize,
    /// Number of blob-chunk rows.
    pub chunk_count: usize,
    /// Objects with at least one chunk.
    pub blob_count: usize,
    /// Total bytes of object state.
    pub state_bytes: u64,
    /// Total bytes of blob chunks.
    pub chunk_bytes: u64,
    /// Per-object details (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objects: Option<Vec<ObjectInfo>>,
}

/// Details of one object.
#[derive(Debug, Serialize)]
pub struct ObjectInfo {
    /// Object id.
    pub zoid: u64,
    /// Transaction that last wrote the state.
    pub tid: u64,
    /// State size in bytes.
    pub size: u64,
    /// Number of blob chunks.
    pub chunks: usize,
    /// Blob size in bytes.
    pub blob_size: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, show_objects: bool, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = super::open_existing(path)?;
    let result = inspect(&store, path, show_objects)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Collects statistics from an open store.
pub fn inspect(
    store: &ObjectStore,
    path: &Path,
    show_objects: bool,
) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let wal_size = store.wal_size()?;
    let wal_record_count = store.wal_records()?.len();

    let tables = store.tables();
    let state_bytes = tables.objects.iter().map(|(_, row)| row.size).sum();
    let chunk_bytes = tables
        .chunks
        .iter()
        .map(|(_, _, row)| row.chunk.len() as u64)
        .sum();
    let mut blob_zoids: Vec<_> = tables.chunks.iter().map(|(zoid, _, _)| zoid).collect();
    blob_zoids.dedup();

    let objects = show_objects.then(|| {
        tables
            .objects
            .iter()
            .map(|(zoid, row)| {
                let chunks: Vec<_> = tables.chunks.chunks_for(zoid).collect();
                ObjectInfo {
                    zoid: zoid.as_u64(),
                    tid: row.tid.as_u64(),
                    size: row.size,
                    chunks: chunks.len(),
                    blob_size: chunks.iter().map(|(_, chunk)| chunk.chunk.len()).sum(),
                }
            })
            .collect()
    });

    Ok(InspectResult {
        path: path.display().to_string(),
        wal_size,
        wal_record_count,
        last_tid: store.last_tid().as_u64(),
        object_count: tables.objects.len(),
        chunk_count: tables.chunks.len(),
        blob_count: blob_zoids.len(),
        state_bytes,
        chunk_bytes,
        objects,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("Store: {}", result.path);
    println!();
    println!("Commit log:");
    println!("  Size:         {} bytes", result.wal_size);
    println!("  Records:      {}", result.wal_record_count);
    println!("  Last tid:     {}", result.last_tid);
    println!();
    println!("Tables:");
    println!("  Objects:      {} ({} bytes of state)", result.object_count, result.state_bytes);
    println!("  Blobs:        {}", result.blob_count);
    println!("  Chunks:       {} ({} bytes)", result.chunk_count, result.chunk_bytes);

    if let Some(ref objects) = result.objects {
        println!();
        println!("Objects:");
        for object in objects {
            println!(
                "  zoid {:>8}  tid {:>8}  state {:>8} bytes  blob {:>4} chunks / {} bytes",
                object.zoid, object.tid, object.size, object.chunks, object.blob_size
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hfstore_core::{Config, ObjectId};
    use tempfile::tempdir;

    #[test]
    fn reports_tables_and_log() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("store");
        let store = ObjectStore::open(&path, Config::default()).unwrap();
        let mut session = store.session();
        session.store_temp(ObjectId::new(1), Some(vec![0; 10]));
        session.store_chunk(ObjectId::new(1), 0, vec![1; 4]);
        session.store_chunk(ObjectId::new(1), 1, vec![2; 4]);
        session.store_temp(ObjectId::new(2), None);
        session.commit().unwrap();

        let result = inspect(&store, &path, true).unwrap();
        assert_eq!(result.last_tid, 1);
        assert_eq!(result.object_count, 2);
        assert_eq!(result.chunk_count, 2);
        assert_eq!(result.blob_count, 1);
        assert_eq!(result.state_bytes, 10);
        assert_eq!(result.chunk_bytes, 8);
        assert!(result.wal_record_count >= 5);

        let objects = result.objects.unwrap();
        assert_eq!(objects[0].chunks, 2);
        assert_eq!(objects[0].blob_size, 8);
        assert_eq!(objects[1].chunks, 0);
    }
}
