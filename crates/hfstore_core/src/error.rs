//! Error types for hfstore core.

use crate::types::{ChunkNum, ObjectId, TransactionId};
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Broad class of a [`CoreError`], as seen by a commit orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The commit lock or a row lock could not be obtained in time.
    LockAcquisition,
    /// A staged row or a supplied tid is invalid.
    Integrity,
    /// Reading or writing durable storage failed.
    Storage,
    /// The API was used in a state that does not allow the call.
    Usage,
}

/// Errors that can occur in hfstore core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] hfstore_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A lock wait ran past its timeout.
    #[error("timed out acquiring {resource}")]
    LockTimeout {
        /// What was being locked.
        resource: String,
    },

    /// A staged row violates a storage constraint.
    #[error("integrity violation: {message}")]
    IntegrityViolation {
        /// Description of the violation.
        message: String,
    },

    /// A caller-supplied tid does not advance the committed history.
    #[error("transaction id {candidate} must be greater than last committed {last}")]
    InvalidTid {
        /// The tid the caller asked for.
        candidate: TransactionId,
        /// The last committed tid.
        last: TransactionId,
    },

    /// The commit log is corrupted or invalid.
    #[error("WAL corruption: {message}")]
    WalCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch in a log record.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },

    /// Another process holds the store directory.
    #[error("store locked: another process has exclusive access")]
    StoreLocked,

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a lock timeout error.
    pub fn lock_timeout(resource: impl Into<String>) -> Self {
        Self::LockTimeout {
            resource: resource.into(),
        }
    }

    /// Creates an integrity violation error.
    pub fn integrity_violation(message: impl Into<String>) -> Self {
        Self::IntegrityViolation {
            message: message.into(),
        }
    }

    /// Creates the integrity violation raised when a chunk row already exists.
    pub fn duplicate_chunk(zoid: ObjectId, chunk_num: ChunkNum) -> Self {
        Self::integrity_violation(format!(
            "duplicate blob chunk {chunk_num} for {zoid}"
        ))
    }

    /// Creates a WAL corruption error.
    pub fn wal_corruption(message: impl Into<String>) -> Self {
        Self::WalCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Classifies the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LockTimeout { .. } => ErrorKind::LockAcquisition,
            Self::IntegrityViolation { .. } | Self::InvalidTid { .. } => ErrorKind::Integrity,
            Self::Storage(_)
            | Self::Io(_)
            | Self::WalCorruption { .. }
            | Self::ChecksumMismatch { .. } => ErrorKind::Storage,
            Self::StoreLocked | Self::InvalidOperation { .. } => ErrorKind::Usage,
        }
    }

    /// Whether resubmitting the whole transaction may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::LockAcquisition
    }
}
