//! Log writer.

use crate::error::{CoreError, CoreResult};
use crate::wal::record::{WalRecord, WAL_MAGIC, WAL_VERSION};
use crate::wal::{WalRecordIterator, CRC_SIZE, HEADER_SIZE};
use hfstore_storage::StorageBackend;
use parking_lot::Mutex;
use tracing::warn;

/// Appends transactions to the commit log and reads them back.
pub struct WalManager {
    backend: Mutex<Box<dyn StorageBackend>>,
    sync_on_commit: bool,
}

impl WalManager {
    /// Creates a log manager over `backend`.
    ///
    /// With `sync_on_commit` every transaction is synced to disk before
    /// [`WalManager::append_transaction`] returns; otherwise it is flushed.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> Self {
        Self {
            backend: Mutex::new(backend),
            sync_on_commit,
        }
    }

    /// Wraps one record in its envelope.
    ///
    /// # Errors
    ///
    /// Fails if the payload cannot be encoded.
    pub fn encode(record: &WalRecord) -> CoreResult<Vec<u8>> {
        let payload = record.encode_payload()?;
        let len = u32::try_from(payload.len())
            .map_err(|_| CoreError::invalid_operation("WAL record payload too large"))?;

        let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        data.extend_from_slice(&WAL_MAGIC);
        data.extend_from_slice(&WAL_VERSION.to_le_bytes());
        data.push(record.record_type().as_byte());
        data.extend_from_slice(&len.to_le_bytes());
        let header_crc = crc32c::crc32c(&data);
        data.extend_from_slice(&header_crc.to_le_bytes());
        data.extend_from_slice(&payload);
        let crc = crc32c::crc32c(&data);
        data.extend_from_slice(&crc.to_le_bytes());
        Ok(data)
    }

    fn encode_all(records: &[WalRecord]) -> CoreResult<Vec<u8>> {
        let mut data = Vec::new();
        for record in records {
            data.extend_from_slice(&Self::encode(record)?);
        }
        Ok(data)
    }

    /// Appends one record without forcing it to disk.
    ///
    /// # Errors
    ///
    /// Fails on encoding or storage errors.
    pub fn append(&self, record: &WalRecord) -> CoreResult<u64> {
        let data = Self::encode(record)?;
        Ok(self.backend.lock().append(&data)?)
    }

    /// Appends a whole transaction as one write and makes it durable.
    ///
    /// If the write or the flush fails, the log is cut back to where the
    /// transaction started so later appends do not land behind a torn
    /// record.
    ///
    /// # Errors
    ///
    /// Returns the storage error that stopped the append.
    pub fn append_transaction(&self, records: &[WalRecord]) -> CoreResult<u64> {
        let data = Self::encode_all(records)?;
        let mut backend = self.backend.lock();
        let start = backend.size()?;

        let written = backend.append(&data).and_then(|offset| {
            if self.sync_on_commit {
                backend.sync()?;
            } else {
                backend.flush()?;
            }
            Ok(offset)
        });

        match written {
            Ok(offset) => Ok(offset),
            Err(err) => {
                if let Err(cut) = backend.truncate(start) {
                    warn!(error = %cut, offset = start, "could not cut back failed WAL append");
                }
                Err(err.into())
            }
        }
    }

    /// Atomically replaces the log with `records`.
    ///
    /// # Errors
    ///
    /// Fails on encoding or storage errors; the old log then stays in place.
    pub fn replace(&self, records: &[WalRecord]) -> CoreResult<()> {
        let data = Self::encode_all(records)?;
        let mut backend = self.backend.lock();
        backend.replace(&data)?;
        backend.sync()?;
        Ok(())
    }

    /// Flushes pending writes.
    ///
    /// # Errors
    ///
    /// Fails on storage errors.
    pub fn flush(&self) -> CoreResult<()> {
        self.backend.lock().flush()?;
        Ok(())
    }

    /// Returns the current log size in bytes.
    ///
    /// # Errors
    ///
    /// Fails on storage errors.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.lock().size()?)
    }

    /// Cuts the log back to `offset`.
    ///
    /// # Errors
    ///
    /// Fails on storage errors.
    pub fn truncate(&self, offset: u64) -> CoreResult<()> {
        self.backend.lock().truncate(offset)?;
        Ok(())
    }

    /// Returns a streaming iterator over the log.
    ///
    /// The iterator holds the log lock until dropped.
    ///
    /// # Errors
    ///
    /// Fails if the log size cannot be read.
    pub fn iter(&self) -> CoreResult<WalRecordIterator<'_>> {
        WalRecordIterator::new(self.backend.lock(), 0)
    }

    /// Reads every record with its offset.
    ///
    /// # Errors
    ///
    /// Fails on corruption or storage errors.
    pub fn read_all(&self) -> CoreResult<Vec<(u64, WalRecord)>> {
        self.iter()?.collect()
    }
}

impl std::fmt::Debug for WalManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalManager")
            .field("sync_on_commit", &self.sync_on_commit)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ObjectId, TransactionId};
    use crate::testing::SharedBackend;
    use hfstore_storage::InMemoryBackend;

    fn txn(tid: u64) -> Vec<WalRecord> {
        let tid = TransactionId::new(tid);
        vec![
            WalRecord::Begin { tid },
            WalRecord::StoreObject {
                tid,
                zoid: ObjectId::new(1),
                state: Some(vec![1, 2, 3]),
            },
            WalRecord::Commit { tid },
        ]
    }

    #[test]
    fn append_transaction_then_read_back() {
        let wal = WalManager::new(Box::new(InMemoryBackend::new()), true);
        wal.append_transaction(&txn(1)).unwrap();
        wal.append_transaction(&txn(2)).unwrap();

        let records: Vec<_> = wal.read_all().unwrap().into_iter().map(|(_, r)| r).collect();
        assert_eq!(records.len(), 6);
        assert_eq!(records[3], WalRecord::Begin { tid: TransactionId::new(2) });
    }

    #[test]
    fn replace_swaps_log() {
        let wal = WalManager::new(Box::new(InMemoryBackend::new()), false);
        wal.append_transaction(&txn(1)).unwrap();
        wal.append_transaction(&txn(2)).unwrap();

        wal.replace(&txn(2)).unwrap();
        assert_eq!(wal.read_all().unwrap().len(), 3);
    }

    #[test]
    fn failed_sync_cuts_the_transaction_off() {
        let backend = SharedBackend::new();
        backend.fail_sync(true);
        let wal = WalManager::new(backend.boxed(), true);
        let err = wal.append_transaction(&txn(1)).unwrap_err();
        assert!(matches!(err, CoreError::Storage(_)));
        assert_eq!(wal.size().unwrap(), 0);
    }
}
