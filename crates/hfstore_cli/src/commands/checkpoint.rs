//! Checkpoint command implementation.

use std::path::Path;
use tracing::info;

/// Runs the checkpoint command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = super::open_existing(path)?;
    let before = store.wal_size()?;
    let tid = store.checkpoint()?;
    let after = store.wal_size()?;

    info!("Checkpoint of {:?} complete", path);
    println!("Checkpoint at tid {}", tid.as_u64());
    println!("  Commit log: {} -> {} bytes", before, after);
    Ok(())
}
