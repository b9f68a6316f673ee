//! Crash recovery testing for hfstore.
//!
//! Simulates crashes at various points of a commit and verifies that the
//! store recovers to exactly its last finalized state.
//!
//! ## Test Strategy
//!
//! 1. **Crash after commit** - finalized merges survive
//! 2. **Crash during the log write** - the torn merge is discarded
//! 3. **Failed flush** - the merge is rolled back and staging kept
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hfstore_testkit::crash::CrashRecoveryHarness;
//!
//! let mut harness = CrashRecoveryHarness::new();
//! assert!(harness.run_all().iter().all(|r| r.passed));
//! ```

use hfstore_core::{Config, CoreError, ObjectId, ObjectStore};
use hfstore_storage::{InMemoryBackend, StorageBackend, StorageError, StorageResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Result of a crash recovery test.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// Whether the test passed.
    pub passed: bool,
    /// Description of what was tested.
    pub description: String,
    /// Expected objects after recovery.
    pub expected_objects: usize,
    /// Actual objects after recovery.
    pub actual_objects: usize,
    /// Any error message.
    pub error: Option<String>,
}

impl CrashRecoveryResult {
    /// Creates a passing result.
    pub fn pass(description: &str, objects: usize) -> Self {
        Self {
            passed: true,
            description: description.to_string(),
            expected_objects: objects,
            actual_objects: objects,
            error: None,
        }
    }

    /// Creates a failing result.
    pub fn fail(description: &str, expected: usize, actual: usize, error: &str) -> Self {
        Self {
            passed: false,
            description: description.to_string(),
            expected_objects: expected,
            actual_objects: actual,
            error: Some(error.to_string()),
        }
    }
}

/// An in-memory backend whose bytes outlive the store using it.
///
/// Clones share the same bytes, so a test can drop a crashed store and
/// reopen a new one over whatever reached "disk".
#[derive(Debug, Clone, Default)]
pub struct SharedMemoryBackend {
    inner: Arc<Mutex<InMemoryBackend>>,
}

impl SharedMemoryBackend {
    /// Creates an empty shared backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the stored bytes.
    pub fn bytes(&self) -> Vec<u8> {
        self.inner.lock().data()
    }
}

impl StorageBackend for SharedMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.lock().read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        self.inner.lock().append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.lock().flush()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.inner.lock().sync()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.lock().size()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.inner.lock().truncate(new_size)
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        self.inner.lock().replace(data)
    }
}

/// Switches controlling a [`CrashableBackend`], shared with the test.
#[derive(Debug)]
pub struct CrashControl {
    crash_after_bytes: AtomicUsize,
    bytes_written: AtomicUsize,
    crashed: AtomicBool,
    fail_on_flush: AtomicBool,
}

impl CrashControl {
    fn new() -> Self {
        Self {
            crash_after_bytes: AtomicUsize::new(usize::MAX),
            bytes_written: AtomicUsize::new(0),
            crashed: AtomicBool::new(false),
            fail_on_flush: AtomicBool::new(false),
        }
    }

    /// Crashes once `bytes` more bytes have been appended.
    pub fn crash_after(&self, bytes: usize) {
        let written = self.bytes_written.load(Ordering::SeqCst);
        self.crash_after_bytes
            .store(written.saturating_add(bytes), Ordering::SeqCst);
    }

    /// Sets whether flush and sync should fail.
    pub fn set_fail_on_flush(&self, fail: bool) {
        self.fail_on_flush.store(fail, Ordering::SeqCst);
    }

    /// Resets the crash state.
    pub fn reset(&self) {
        self.crash_after_bytes.store(usize::MAX, Ordering::SeqCst);
        self.crashed.store(false, Ordering::SeqCst);
        self.fail_on_flush.store(false, Ordering::SeqCst);
    }

    /// Returns whether the backend has crashed.
    pub fn has_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    /// Bytes appended through the backend so far.
    pub fn bytes_written(&self) -> usize {
        self.bytes_written.load(Ordering::SeqCst)
    }
}

fn simulated(message: &str) -> StorageError {
    StorageError::Io(std::io::Error::other(message.to_string()))
}

/// A storage backend wrapper that can simulate crashes.
///
/// After a simulated crash every write fails, as if the process had died:
/// partial bytes stay behind for recovery to deal with.
pub struct CrashableBackend {
    inner: Box<dyn StorageBackend>,
    control: Arc<CrashControl>,
}

impl CrashableBackend {
    /// Creates a new crashable backend wrapping an inner backend.
    pub fn new(inner: Box<dyn StorageBackend>) -> Self {
        Self {
            inner,
            control: Arc::new(CrashControl::new()),
        }
    }

    /// Handle for steering the backend after it has been handed to a store.
    pub fn control(&self) -> Arc<CrashControl> {
        Arc::clone(&self.control)
    }

    fn ensure_alive(&self) -> StorageResult<()> {
        if self.control.has_crashed() {
            return Err(simulated("backend has crashed"));
        }
        Ok(())
    }
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        self.ensure_alive()?;
        let current = self.control.bytes_written.load(Ordering::SeqCst);
        let crash_threshold = self.control.crash_after_bytes.load(Ordering::SeqCst);

        // Check if this write will cross the crash threshold
        if current.saturating_add(bytes.len()) > crash_threshold {
            self.control.crashed.store(true, Ordering::SeqCst);
            let partial_len = crash_threshold.saturating_sub(current);
            if partial_len > 0 {
                self.inner.append(&bytes[..partial_len])?;
                self.control
                    .bytes_written
                    .fetch_add(partial_len, Ordering::SeqCst);
            }
            return Err(simulated("simulated crash during write"));
        }

        let offset = self.inner.append(bytes)?;
        self.control
            .bytes_written
            .fetch_add(bytes.len(), Ordering::SeqCst);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.ensure_alive()?;
        if self.control.fail_on_flush.load(Ordering::SeqCst) {
            return Err(simulated("simulated flush failure"));
        }
        self.inner.flush()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.ensure_alive()?;
        if self.control.fail_on_flush.load(Ordering::SeqCst) {
            return Err(simulated("simulated sync failure"));
        }
        self.inner.sync()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.ensure_alive()?;
        self.inner.truncate(new_size)
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        self.ensure_alive()?;
        self.inner.replace(data)
    }
}

/// Test harness for crash recovery scenarios.
#[derive(Debug, Default)]
pub struct CrashRecoveryHarness {
    /// Results of crash recovery tests.
    pub results: Vec<CrashRecoveryResult>,
}

impl CrashRecoveryHarness {
    /// Creates a new crash recovery harness.
    pub fn new() -> Self {
        Self::default()
    }

    fn open(disk: &SharedMemoryBackend) -> Result<(ObjectStore, Arc<CrashControl>), CoreError> {
        let backend = CrashableBackend::new(Box::new(disk.clone()));
        let control = backend.control();
        let store = ObjectStore::open_with_backend(Config::default(), Box::new(backend))?;
        Ok((store, control))
    }

    fn commit_objects(store: &ObjectStore, zoids: std::ops::Range<u64>) -> Result<(), CoreError> {
        for z in zoids {
            let mut session = store.session();
            session.store_temp(ObjectId::new(z), Some(vec![z as u8; 32]));
            session.upload_blob(ObjectId::new(z), &[z as u8; 100])?;
            session.commit()?;
        }
        Ok(())
    }

    fn record(
        &mut self,
        description: &str,
        expected: usize,
        outcome: Result<usize, CoreError>,
    ) -> CrashRecoveryResult {
        let result = match outcome {
            Ok(actual) if actual == expected => CrashRecoveryResult::pass(description, actual),
            Ok(actual) => {
                CrashRecoveryResult::fail(description, expected, actual, "object count differs")
            }
            Err(e) => CrashRecoveryResult::fail(description, expected, 0, &e.to_string()),
        };
        self.results.push(result.clone());
        result
    }

    /// Tests that finalized merges survive a crash.
    pub fn test_committed_data_survives(&mut self) -> CrashRecoveryResult {
        let disk = SharedMemoryBackend::new();
        let outcome = (|| -> Result<usize, CoreError> {
            let (store, _control) = Self::open(&disk)?;
            Self::commit_objects(&store, 1..11)?;
            drop(store);

            let (store, _control) = Self::open(&disk)?;
            let intact = (1..11u64)
                .filter(|&z| store.read_blob(ObjectId::new(z)) == Some(vec![z as u8; 100]))
                .count();
            Ok(intact)
        })();
        self.record("Finalized merges survive crash", 10, outcome)
    }

    /// Tests that a merge torn by a crash mid-write is discarded.
    pub fn test_torn_merge_discarded(&mut self) -> CrashRecoveryResult {
        let disk = SharedMemoryBackend::new();
        let outcome = (|| -> Result<usize, CoreError> {
            let (store, control) = Self::open(&disk)?;
            Self::commit_objects(&store, 1..4)?;
            let durable = disk.bytes().len();

            control.crash_after(40);
            let mut session = store.session();
            session.store_temp(ObjectId::new(1), Some(b"torn".to_vec()));
            session.upload_blob(ObjectId::new(99), &[7; 200])?;
            if session.commit().is_ok() {
                return Err(CoreError::invalid_operation("commit succeeded past the crash"));
            }
            drop(session);
            drop(store);
            if disk.bytes().len() != durable + 40 {
                return Err(CoreError::invalid_operation("crash left no partial bytes"));
            }

            let (store, _control) = Self::open(&disk)?;
            if disk.bytes().len() != durable {
                return Err(CoreError::invalid_operation("torn tail not truncated"));
            }
            if store.load(ObjectId::new(1)).and_then(|row| row.state) != Some(vec![1; 32]) {
                return Err(CoreError::invalid_operation("torn merge became visible"));
            }
            Ok(store.object_count())
        })();
        self.record("Torn merge discarded on recovery", 3, outcome)
    }

    /// Tests that a failed flush rolls the merge back and keeps staging.
    pub fn test_failed_flush_keeps_staging(&mut self) -> CrashRecoveryResult {
        let disk = SharedMemoryBackend::new();
        let outcome = (|| -> Result<usize, CoreError> {
            let (store, control) = Self::open(&disk)?;
            Self::commit_objects(&store, 1..3)?;

            control.set_fail_on_flush(true);
            let mut session = store.session();
            session.store_temp(ObjectId::new(5), Some(b"retry me".to_vec()));
            if session.commit().is_ok() {
                return Err(CoreError::invalid_operation("commit succeeded despite flush failure"));
            }
            if session.staging().states().len() != 1 || store.load(ObjectId::new(5)).is_some() {
                return Err(CoreError::invalid_operation("failed merge was not rolled back"));
            }

            control.reset();
            session.commit()?;
            drop(session);
            drop(store);

            let (store, _control) = Self::open(&disk)?;
            Ok(store.object_count())
        })();
        self.record("Failed flush rolls back and retries", 3, outcome)
    }

    /// Runs every scenario.
    pub fn run_all(&mut self) -> Vec<CrashRecoveryResult> {
        vec![
            self.test_committed_data_survives(),
            self.test_torn_merge_discarded(),
            self.test_failed_flush_keeps_staging(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crash_mid_append_writes_partial_bytes() {
        let disk = SharedMemoryBackend::new();
        let mut backend = CrashableBackend::new(Box::new(disk.clone()));
        let control = backend.control();

        backend.append(b"0123").unwrap();
        control.crash_after(2);
        assert!(backend.append(b"4567").is_err());
        assert!(control.has_crashed());
        assert_eq!(disk.bytes(), b"012345");
        assert!(backend.truncate(0).is_err());
    }

    #[test]
    fn committed_data_survives() {
        let result = CrashRecoveryHarness::new().test_committed_data_survives();
        assert!(result.passed, "{result:?}");
    }

    #[test]
    fn torn_merge_discarded() {
        let result = CrashRecoveryHarness::new().test_torn_merge_discarded();
        assert!(result.passed, "{result:?}");
    }

    #[test]
    fn failed_flush_keeps_staging() {
        let result = CrashRecoveryHarness::new().test_failed_flush_keeps_staging();
        assert!(result.passed, "{result:?}");
    }

    #[test]
    fn run_all_records_results() {
        let mut harness = CrashRecoveryHarness::new();
        let results = harness.run_all();
        assert_eq!(results.len(), 3);
        assert_eq!(harness.results.len(), 3);
        assert!(results.iter().all(|r| r.passed));
    }
}
