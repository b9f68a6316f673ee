//! Log record types and their payload encoding.

use crate::error::{CoreError, CoreResult};
use crate::types::{ChunkNum, ObjectId, TransactionId};

/// Magic bytes opening every log record.
pub const WAL_MAGIC: [u8; 4] = *b"HWAL";

/// Current log format version.
pub const WAL_VERSION: u16 = 1;

/// Type byte of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WalRecordType {
    /// Start of a committed transaction's records.
    Begin = 1,
    /// Object state upsert.
    StoreObject = 2,
    /// Chunk purge for a set of objects.
    PurgeChunks = 3,
    /// Chunk insert.
    StoreChunk = 4,
    /// End of a transaction's records.
    Commit = 5,
    /// Marks the log as a compacted snapshot.
    Checkpoint = 6,
}

impl WalRecordType {
    /// Converts a byte to a record type.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Begin),
            2 => Some(Self::StoreObject),
            3 => Some(Self::PurgeChunks),
            4 => Some(Self::StoreChunk),
            5 => Some(Self::Commit),
            6 => Some(Self::Checkpoint),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// One record of the commit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    /// Opens the records of transaction `tid`.
    Begin {
        /// Transaction id.
        tid: TransactionId,
    },

    /// Upserts `object_state(zoid)`.
    StoreObject {
        /// Tid stamped on the row.
        tid: TransactionId,
        /// Object id.
        zoid: ObjectId,
        /// New state, `None` for an object without state.
        state: Option<Vec<u8>>,
    },

    /// Deletes every chunk of the listed objects.
    PurgeChunks {
        /// Transaction id.
        tid: TransactionId,
        /// Distinct object ids, ascending.
        zoids: Vec<ObjectId>,
    },

    /// Inserts `blob_chunk(zoid, chunk_num)`.
    StoreChunk {
        /// Tid stamped on the row.
        tid: TransactionId,
        /// Object id.
        zoid: ObjectId,
        /// Chunk number.
        chunk_num: ChunkNum,
        /// Chunk bytes.
        chunk: Vec<u8>,
    },

    /// Closes the records of transaction `tid`.
    Commit {
        /// Transaction id.
        tid: TransactionId,
    },

    /// The records before this one are a snapshot as of `tid`.
    Checkpoint {
        /// Last committed tid at checkpoint time.
        tid: TransactionId,
    },
}

impl WalRecord {
    /// Largest byte payload a single record can carry.
    pub const MAX_PAYLOAD_SIZE: usize = u32::MAX as usize;

    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> WalRecordType {
        match self {
            Self::Begin { .. } => WalRecordType::Begin,
            Self::StoreObject { .. } => WalRecordType::StoreObject,
            Self::PurgeChunks { .. } => WalRecordType::PurgeChunks,
            Self::StoreChunk { .. } => WalRecordType::StoreChunk,
            Self::Commit { .. } => WalRecordType::Commit,
            Self::Checkpoint { .. } => WalRecordType::Checkpoint,
        }
    }

    /// Returns the tid carried by the record.
    #[must_use]
    pub fn tid(&self) -> TransactionId {
        match self {
            Self::Begin { tid }
            | Self::StoreObject { tid, .. }
            | Self::PurgeChunks { tid, .. }
            | Self::StoreChunk { tid, .. }
            | Self::Commit { tid }
            | Self::Checkpoint { tid } => *tid,
        }
    }

    /// Serializes the record payload (without envelope).
    ///
    /// # Errors
    ///
    /// Fails if a byte payload or the purge list is too long for its
    /// 4-byte length prefix.
    pub fn encode_payload(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.tid().as_u64().to_le_bytes());

        match self {
            Self::Begin { .. } | Self::Commit { .. } | Self::Checkpoint { .. } => {}

            Self::StoreObject { zoid, state, .. } => {
                buf.extend_from_slice(&zoid.as_u64().to_le_bytes());
                match state {
                    Some(bytes) => {
                        buf.push(1);
                        put_bytes(&mut buf, bytes)?;
                    }
                    None => buf.push(0),
                }
            }

            Self::PurgeChunks { zoids, .. } => {
                let count = u32::try_from(zoids.len())
                    .map_err(|_| CoreError::invalid_operation("purge list too long"))?;
                buf.extend_from_slice(&count.to_le_bytes());
                for zoid in zoids {
                    buf.extend_from_slice(&zoid.as_u64().to_le_bytes());
                }
            }

            Self::StoreChunk {
                zoid,
                chunk_num,
                chunk,
                ..
            } => {
                buf.extend_from_slice(&zoid.as_u64().to_le_bytes());
                buf.extend_from_slice(&chunk_num.to_le_bytes());
                put_bytes(&mut buf, chunk)?;
            }
        }

        Ok(buf)
    }

    /// Deserializes a record from its type and payload.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::WalCorruption`] if the payload is short or has
    /// trailing bytes.
    pub fn decode_payload(record_type: WalRecordType, payload: &[u8]) -> CoreResult<Self> {
        let mut reader = PayloadReader::new(payload);
        let tid = TransactionId::new(reader.u64()?);

        let record = match record_type {
            WalRecordType::Begin => Self::Begin { tid },
            WalRecordType::Commit => Self::Commit { tid },
            WalRecordType::Checkpoint => Self::Checkpoint { tid },

            WalRecordType::StoreObject => {
                let zoid = ObjectId::new(reader.u64()?);
                let state = match reader.u8()? {
                    0 => None,
                    1 => Some(reader.bytes()?),
                    flag => {
                        return Err(CoreError::wal_corruption(format!(
                            "invalid state flag {flag} in StoreObject record"
                        )))
                    }
                };
                Self::StoreObject { tid, zoid, state }
            }

            WalRecordType::PurgeChunks => {
                let count = reader.u32()? as usize;
                let mut zoids = Vec::with_capacity(count.min(payload.len() / 8));
                for _ in 0..count {
                    zoids.push(ObjectId::new(reader.u64()?));
                }
                Self::PurgeChunks { tid, zoids }
            }

            WalRecordType::StoreChunk => {
                let zoid = ObjectId::new(reader.u64()?);
                let chunk_num = reader.u32()?;
                let chunk = reader.bytes()?;
                Self::StoreChunk {
                    tid,
                    zoid,
                    chunk_num,
                    chunk,
                }
            }
        };

        reader.finish(record_type)?;
        Ok(record)
    }
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> CoreResult<()> {
    let len = u32::try_from(bytes.len()).map_err(|_| {
        CoreError::invalid_operation(format!(
            "payload of {} bytes exceeds the {} byte record limit",
            bytes.len(),
            WalRecord::MAX_PAYLOAD_SIZE
        ))
    })?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

struct PayloadReader<'a> {
    payload: &'a [u8],
    cursor: usize,
}

impl<'a> PayloadReader<'a> {
    fn new(payload: &'a [u8]) -> Self {
        Self { payload, cursor: 0 }
    }

    fn take(&mut self, len: usize) -> CoreResult<&'a [u8]> {
        let end = self
            .cursor
            .checked_add(len)
            .filter(|end| *end <= self.payload.len())
            .ok_or_else(|| CoreError::wal_corruption("unexpected end of payload"))?;
        let slice = &self.payload[self.cursor..end];
        self.cursor = end;
        Ok(slice)
    }

    fn u8(&mut self) -> CoreResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> CoreResult<u32> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(bytes))
    }

    fn u64(&mut self) -> CoreResult<u64> {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(bytes))
    }

    fn bytes(&mut self) -> CoreResult<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn finish(&self, record_type: WalRecordType) -> CoreResult<()> {
        if self.cursor != self.payload.len() {
            return Err(CoreError::wal_corruption(format!(
                "trailing bytes in {record_type:?} record: expected {} bytes, got {}",
                self.cursor,
                self.payload.len()
            )));
        }
        Ok(())
    }
}
