//! The serializing commit lock.

use crate::error::{CoreError, CoreResult};
use parking_lot::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// Process-wide lock held from tid selection until the merge is finalized
/// or rolled back.
#[derive(Debug, Default)]
pub struct CommitLock {
    mutex: Mutex<()>,
}

impl CommitLock {
    /// Creates an unlocked commit lock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits up to `timeout` for the lock.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LockTimeout`] if the lock is still held by
    /// another committer when the timeout expires.
    pub fn acquire(&self, timeout: Duration) -> CoreResult<CommitLockGuard<'_>> {
        let started = Instant::now();
        let guard = self
            .mutex
            .try_lock_for(timeout)
            .ok_or_else(|| CoreError::lock_timeout("commit lock"))?;
        debug!(waited_us = started.elapsed().as_micros() as u64, "commit lock acquired");
        Ok(CommitLockGuard {
            _guard: guard,
            acquired_at: Instant::now(),
        })
    }

    /// Returns true if some committer currently holds the lock.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.mutex.is_locked()
    }
}

/// Proof that the commit lock is held. Releases it when dropped.
#[derive(Debug)]
pub struct CommitLockGuard<'a> {
    _guard: MutexGuard<'a, ()>,
    acquired_at: Instant,
}

impl CommitLockGuard<'_> {
    /// How long the lock has been held.
    #[must_use]
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

impl Drop for CommitLockGuard<'_> {
    fn drop(&mut self) {
        debug!(held_us = self.held_for().as_micros() as u64, "commit lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_releases_on_drop() {
        let lock = CommitLock::new();
        {
            let _guard = lock.acquire(Duration::from_millis(10)).unwrap();
            assert!(lock.is_locked());
        }
        assert!(!lock.is_locked());
    }

    #[test]
    fn second_acquire_times_out() {
        let lock = CommitLock::new();
        let _held = lock.acquire(Duration::from_millis(10)).unwrap();

        let err = lock.acquire(Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, CoreError::LockTimeout { .. }));
        assert!(err.is_retryable());
    }
}
