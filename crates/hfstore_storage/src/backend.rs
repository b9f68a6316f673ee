//! The backend trait.

use crate::error::StorageResult;

/// An append-only byte store.
///
/// The commit log is the only writer. It appends whole encoded records,
/// flushes (or syncs) before a merge is reported as finalized, and on
/// checkpoint swaps the entire contents for a compacted image.
///
/// # Invariants
///
/// - `append` returns the offset the bytes were written at
/// - `read_at` returns exactly the bytes previously appended there
/// - after `sync` returns, appended bytes survive a process crash
/// - after `replace` returns, readers see either the old or the new
///   contents in full, never a mix
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Fails if the range extends past the current size or on I/O failure.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data` and returns the offset it was written at.
    ///
    /// # Errors
    ///
    /// Fails on I/O failure.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes to the operating system.
    ///
    /// # Errors
    ///
    /// Fails on I/O failure.
    fn flush(&mut self) -> StorageResult<()>;

    /// Makes all appended data and the file metadata durable.
    ///
    /// # Errors
    ///
    /// Fails on I/O failure.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current size in bytes; the next append lands here.
    ///
    /// # Errors
    ///
    /// Fails if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Drops every byte at or after `new_size`.
    ///
    /// Used to cut a torn record off the end of the log after recovery.
    ///
    /// # Errors
    ///
    /// Fails if `new_size` is larger than the current size or on I/O failure.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Atomically replaces the whole contents with `data`.
    ///
    /// # Errors
    ///
    /// Fails on I/O failure; the previous contents are then left intact.
    fn replace(&mut self, data: &[u8]) -> StorageResult<()>;
}
