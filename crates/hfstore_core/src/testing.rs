//! Backends for unit tests.

use hfstore_storage::{InMemoryBackend, StorageBackend, StorageResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// In-memory backend whose bytes outlive the store using it.
///
/// Clones share the same bytes, so a test can drop a store and reopen a
/// new one over what it wrote. `fail_sync` makes every flush and sync fail.
#[derive(Clone, Default)]
pub(crate) struct SharedBackend {
    inner: Arc<Mutex<InMemoryBackend>>,
    fail_sync: Arc<AtomicBool>,
}

impl SharedBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_sync(&self, fail: bool) {
        self.fail_sync.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn bytes(&self) -> Vec<u8> {
        self.inner.lock().data()
    }

    pub(crate) fn set_bytes(&self, data: Vec<u8>) {
        *self.inner.lock() = InMemoryBackend::with_data(data);
    }

    pub(crate) fn boxed(&self) -> Box<dyn StorageBackend> {
        Box::new(self.clone())
    }

    fn check(&self) -> StorageResult<()> {
        if self.fail_sync.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("injected sync failure").into());
        }
        Ok(())
    }
}

impl StorageBackend for SharedBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.lock().read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        self.inner.lock().append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.check()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.check()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.lock().size()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.inner.lock().truncate(new_size)
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        self.check()?;
        self.inner.lock().replace(data)
    }
}
