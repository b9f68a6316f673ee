//! Commit log for durability and crash recovery.
//!
//! A merge becomes durable when its records reach the log: `Begin`, one
//! `StoreObject` per merged state, one `PurgeChunks` naming the objects
//! whose chunks are replaced, one `StoreChunk` per inserted chunk, and a
//! closing `Commit`. The whole transaction is appended as one write and
//! then flushed (or synced) before the permanent tables change.
//!
//! ## Record Format
//!
//! ```text
//! | magic (4) | version (2) | type (1) | length (4) | header crc32c (4) | payload (N) | crc32c (4) |
//! ```
//!
//! The header checksum covers the first 11 bytes, so a damaged length is
//! caught before it is used. The trailing checksum covers everything before
//! it.
//!
//! ## Recovery Policy
//!
//! - A truncated header or payload at the end of the log is a torn write:
//!   replay stops there and the tail is cut off. Only a header whose own
//!   checksum holds can declare a record torn.
//! - Records of a transaction without its `Commit` are discarded.
//! - Bad magic, an unknown type, an unsupported version or either checksum
//!   failing is corruption and fails the open.

mod iterator;
mod record;
mod writer;

pub use iterator::WalRecordIterator;
pub use record::{WalRecord, WalRecordType, WAL_MAGIC, WAL_VERSION};
pub use writer::WalManager;

/// Header size: magic (4) + version (2) + type (1) + length (4) + crc (4).
pub(crate) const HEADER_SIZE: usize = 15;

/// Header bytes covered by the header checksum.
pub(crate) const HEADER_CRC_OFFSET: usize = 11;

/// Trailing checksum size.
pub(crate) const CRC_SIZE: usize = 4;
