//! CLI command implementations.

pub mod checkpoint;
pub mod dump_wal;
pub mod inspect;
pub mod verify;

use hfstore_core::{Config, ObjectStore};
use std::path::Path;

/// Opens an existing store for maintenance; never creates one.
pub fn open_existing(path: &Path) -> Result<ObjectStore, Box<dyn std::error::Error>> {
    if !path.join("commit.wal").exists() {
        return Err(format!("No store found at {:?}", path).into());
    }
    let config = Config::default().create_if_missing(false);
    Ok(ObjectStore::open(path, config)?)
}
