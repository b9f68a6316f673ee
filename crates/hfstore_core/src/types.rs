//! Core identifiers.

use std::fmt;
use uuid::Uuid;

/// Identifier of a committed transaction (a "tid").
///
/// Tids are strictly increasing across committed transactions and never
/// reused. `TransactionId::NONE` (zero) stands for "nothing committed yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// The tid before the first commit.
    pub const NONE: Self = Self(0);

    /// Creates a transaction id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the tid following this one, or `None` on overflow.
    #[must_use]
    pub const fn checked_next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(next) => Some(Self(next)),
            None => None,
        }
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tid:{}", self.0)
    }
}

/// Identifier of a persistent object (a "zoid").
///
/// Ascending `ObjectId` order is the order every session takes row locks in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub u64);

impl ObjectId {
    /// Creates an object id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "zoid:{}", self.0)
    }
}

/// Sequence number of one chunk within an object's blob, starting at 0.
pub type ChunkNum = u32;

/// Identifier of a session (one client connection).
///
/// Sessions own their staging area and the row locks taken by their merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Creates a fresh random session id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tid_ordering_and_next() {
        let t = TransactionId::new(41);
        assert!(TransactionId::NONE < t);
        assert_eq!(t.checked_next(), Some(TransactionId::new(42)));
        assert_eq!(TransactionId::new(u64::MAX).checked_next(), None);
    }

    #[test]
    fn display_formats() {
        assert_eq!(TransactionId::new(42).to_string(), "tid:42");
        assert_eq!(ObjectId::new(7).to_string(), "zoid:7");
    }

    #[test]
    fn session_ids_are_distinct() {
        assert_ne!(SessionId::new(), SessionId::new());
    }
}
