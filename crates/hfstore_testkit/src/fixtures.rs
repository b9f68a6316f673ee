//! Test fixtures and store helpers.
//!
//! Provides convenience functions for setting up test stores
//! and common test scenarios.

use hfstore_core::{Config, ObjectStore};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: ObjectStore,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates a new in-memory test store.
    pub fn memory() -> Self {
        Self::memory_with_config(Config::default())
    }

    /// Creates a new in-memory test store with `config`.
    pub fn memory_with_config(config: Config) -> Self {
        Self {
            store: ObjectStore::open_in_memory_with_config(config)
                .expect("Failed to open in-memory store"),
            temp_dir: None,
        }
    }

    /// Creates a new directory-backed test store.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = ObjectStore::open(&temp_dir.path().join("store"), Config::default())
            .expect("Failed to open directory store");
        Self {
            store,
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the store directory if directory-backed, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().join("store"))
    }

    /// Closes the store and opens it again from its directory.
    ///
    /// Panics for in-memory stores.
    pub fn reopen(self) -> Self {
        let temp_dir = self.temp_dir.expect("Only directory stores can be reopened");
        drop(self.store);
        let store = ObjectStore::open(&temp_dir.path().join("store"), Config::default())
            .expect("Failed to reopen directory store");
        Self {
            store,
            temp_dir: Some(temp_dir),
        }
    }
}

impl std::ops::Deref for TestStore {
    type Target = ObjectStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs a test with a temporary in-memory store.
///
/// # Example
///
/// ```rust,ignore
/// use hfstore_testkit::with_temp_store;
///
/// #[test]
/// fn my_test() {
///     with_temp_store(|store| {
///         let mut session = store.session();
///         // ... stage and commit
///     });
/// }
/// ```
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&ObjectStore) -> R,
{
    let test_store = TestStore::memory();
    f(&test_store.store)
}

/// Runs a test with a temporary directory-backed store.
pub fn with_file_store<F, R>(f: F) -> R
where
    F: FnOnce(&ObjectStore, &Path) -> R,
{
    let test_store = TestStore::file();
    let path = test_store.path().expect("File store should have a path");
    f(&test_store.store, &path)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use hfstore_core::ObjectId;

    /// Creates a store with `object_count` objects, each committed in its
    /// own transaction with a blob of `chunks_per_object` chunks.
    pub fn populated_store(object_count: u64, chunks_per_object: u32) -> TestStore {
        let test_store = TestStore::memory();
        for i in 0..object_count {
            let zoid = ObjectId::new(i + 1);
            let mut session = test_store.session();
            session.store_temp(zoid, Some(format!("object {i}").into_bytes()));
            for num in 0..chunks_per_object {
                session.store_chunk(zoid, num, vec![num as u8; 16]);
            }
            session.commit().expect("Failed to commit object");
        }
        test_store
    }
}
