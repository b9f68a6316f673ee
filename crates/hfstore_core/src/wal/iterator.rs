//! Streaming log reader.

use crate::error::{CoreError, CoreResult};
use crate::wal::record::{WalRecord, WalRecordType, WAL_MAGIC, WAL_VERSION};
use crate::wal::{CRC_SIZE, HEADER_CRC_OFFSET, HEADER_SIZE};
use hfstore_storage::StorageBackend;
use parking_lot::MutexGuard;

/// Reads log records one at a time, holding the log lock while alive.
///
/// Yields `(offset, record)`. A torn record at the end of the log ends the
/// iteration cleanly; [`WalRecordIterator::position`] then points at the
/// first byte after the last complete record.
pub struct WalRecordIterator<'a> {
    backend: MutexGuard<'a, Box<dyn StorageBackend>>,
    total_size: u64,
    offset: u64,
    finished: bool,
}

impl<'a> WalRecordIterator<'a> {
    /// Starts reading at `start_offset`.
    ///
    /// # Errors
    ///
    /// Fails if the backend size cannot be read.
    pub fn new(
        backend: MutexGuard<'a, Box<dyn StorageBackend>>,
        start_offset: u64,
    ) -> CoreResult<Self> {
        let total_size = backend.size()?;
        Ok(Self {
            backend,
            total_size,
            offset: start_offset,
            finished: false,
        })
    }

    /// Offset just past the last complete record read so far.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.offset
    }

    /// Returns true if bytes remain after [`WalRecordIterator::position`]
    /// that do not form a complete record.
    #[must_use]
    pub fn has_torn_tail(&self) -> bool {
        self.finished && self.offset < self.total_size
    }

    fn read_next(&mut self) -> CoreResult<Option<(u64, WalRecord)>> {
        let remaining = self.total_size - self.offset;
        if remaining < HEADER_SIZE as u64 {
            return Ok(None);
        }

        let header = self.backend.read_at(self.offset, HEADER_SIZE)?;
        if header[0..4] != WAL_MAGIC {
            return Err(CoreError::wal_corruption(format!(
                "invalid magic at offset {}",
                self.offset
            )));
        }
        let (covered, stored) = header.split_at(HEADER_CRC_OFFSET);
        let expected = u32::from_le_bytes([stored[0], stored[1], stored[2], stored[3]]);
        let actual = crc32c::crc32c(covered);
        if expected != actual {
            return Err(CoreError::wal_corruption(format!(
                "header checksum mismatch at offset {} (expected {expected:#010x}, got {actual:#010x})",
                self.offset
            )));
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        if version > WAL_VERSION {
            return Err(CoreError::wal_corruption(format!(
                "unsupported WAL version {version} at offset {}",
                self.offset
            )));
        }
        let record_type = WalRecordType::from_byte(header[6]).ok_or_else(|| {
            CoreError::wal_corruption(format!(
                "unknown record type {} at offset {}",
                header[6], self.offset
            ))
        })?;
        let len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as u64;

        let record_size = HEADER_SIZE as u64 + len + CRC_SIZE as u64;
        if remaining < record_size {
            return Ok(None);
        }

        let body = self
            .backend
            .read_at(self.offset + HEADER_SIZE as u64, len as usize + CRC_SIZE)?;
        let (payload, crc_bytes) = body.split_at(len as usize);
        let expected = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        let actual = crc32c::crc32c_append(crc32c::crc32c(&header), payload);
        if expected != actual {
            return Err(CoreError::ChecksumMismatch { expected, actual });
        }

        let record = WalRecord::decode_payload(record_type, payload)?;
        let offset = self.offset;
        self.offset += record_size;
        Ok(Some((offset, record)))
    }
}

impl Iterator for WalRecordIterator<'_> {
    type Item = CoreResult<(u64, WalRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_next() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionId;
    use crate::wal::WalManager;
    use hfstore_storage::InMemoryBackend;
    use proptest::prelude::*;

    fn encoded(tid: u64) -> Vec<u8> {
        WalManager::encode(&WalRecord::Commit {
            tid: TransactionId::new(tid),
        })
        .unwrap()
    }

    fn manager(data: Vec<u8>) -> WalManager {
        WalManager::new(Box::new(InMemoryBackend::with_data(data)), false)
    }

    #[test]
    fn torn_tail_ends_iteration() {
        let mut data = encoded(1);
        let complete = data.len() as u64;
        data.extend_from_slice(&encoded(2)[..7]);

        let wal = manager(data);
        let mut iter = wal.iter().unwrap();
        assert!(iter.next().unwrap().is_ok());
        assert!(iter.next().is_none());
        assert_eq!(iter.position(), complete);
        assert!(iter.has_torn_tail());
    }

    #[test]
    fn flipped_bit_is_checksum_mismatch() {
        let mut data = encoded(1);
        data[HEADER_SIZE] ^= 0x01;
        let wal = manager(data);
        let result = wal.iter().unwrap().next().unwrap();
        assert!(matches!(result, Err(CoreError::ChecksumMismatch { .. })));
    }

    #[test]
    fn damaged_length_is_corruption_not_torn_tail() {
        let mut data = encoded(1);
        data.extend_from_slice(&encoded(2));
        data[7..11].copy_from_slice(&u32::MAX.to_le_bytes());

        let wal = manager(data);
        let mut iter = wal.iter().unwrap();
        let result = iter.next().unwrap();
        assert!(matches!(result, Err(CoreError::WalCorruption { .. })));
        assert!(iter.next().is_none());
        assert_eq!(iter.position(), 0);
    }

    #[test]
    fn torn_payload_behind_intact_header_ends_iteration() {
        let mut data = encoded(1);
        let complete = data.len() as u64;
        data.extend_from_slice(&encoded(2)[..HEADER_SIZE + 3]);

        let wal = manager(data);
        let mut iter = wal.iter().unwrap();
        assert!(iter.next().unwrap().is_ok());
        assert!(iter.next().is_none());
        assert_eq!(iter.position(), complete);
        assert!(iter.has_torn_tail());
    }

    #[test]
    fn bad_magic_is_corruption() {
        let mut data = encoded(1);
        data[0] = b'X';
        let wal = manager(data);
        let result = wal.iter().unwrap().next().unwrap();
        assert!(matches!(result, Err(CoreError::WalCorruption { .. })));
    }

    proptest! {
        #[test]
        fn damaged_byte_never_reads_as_clean_end(
            tids in prop::collection::vec(1u64..1_000, 1..6),
            position in any::<prop::sample::Index>(),
            mask in 1u8..=255,
        ) {
            let mut data = Vec::new();
            for tid in &tids {
                data.extend_from_slice(&encoded(*tid));
            }
            let at = position.index(data.len());
            data[at] ^= mask;

            let wal = manager(data);
            let results: Vec<_> = wal.iter().unwrap().collect();
            prop_assert!(results.iter().any(Result::is_err));
        }
    }

    #[test]
    fn empty_log_yields_nothing() {
        let wal = manager(Vec::new());
        let mut iter = wal.iter().unwrap();
        assert!(iter.next().is_none());
        assert!(!iter.has_torn_tail());
    }
}
