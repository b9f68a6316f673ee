//! Store configuration.

use std::time::Duration;

/// Configuration for opening an object store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the store directory if it doesn't exist.
    pub create_if_missing: bool,

    /// How long a committer waits for the commit lock.
    pub commit_lock_timeout: Duration,

    /// How long a merge waits for one object's row lock.
    pub row_lock_timeout: Duration,

    /// Whether finalization syncs the commit log (rather than only flushing it).
    pub sync_on_commit: bool,

    /// Chunk size used when `upload_blob` splits a payload.
    pub blob_chunk_size: usize,

    /// Largest chunk the merge accepts; bigger staged chunks are rejected.
    pub max_chunk_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            commit_lock_timeout: Duration::from_secs(30),
            row_lock_timeout: Duration::from_secs(10),
            sync_on_commit: true,
            blob_chunk_size: 1024 * 1024,    // 1 MB
            max_chunk_size: 16 * 1024 * 1024, // 16 MB
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the store directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets the commit lock timeout.
    #[must_use]
    pub const fn commit_lock_timeout(mut self, timeout: Duration) -> Self {
        self.commit_lock_timeout = timeout;
        self
    }

    /// Sets the row lock timeout.
    #[must_use]
    pub const fn row_lock_timeout(mut self, timeout: Duration) -> Self {
        self.row_lock_timeout = timeout;
        self
    }

    /// Sets whether to sync the commit log on every finalization.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the chunk size used by `upload_blob`.
    #[must_use]
    pub const fn blob_chunk_size(mut self, size: usize) -> Self {
        self.blob_chunk_size = size;
        self
    }

    /// Sets the largest accepted chunk.
    #[must_use]
    pub const fn max_chunk_size(mut self, size: usize) -> Self {
        self.max_chunk_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.create_if_missing);
        assert!(config.sync_on_commit);
        assert_eq!(config.commit_lock_timeout, Duration::from_secs(30));
        assert!(config.blob_chunk_size <= config.max_chunk_size);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .row_lock_timeout(Duration::from_millis(50))
            .blob_chunk_size(4)
            .sync_on_commit(false);

        assert_eq!(config.row_lock_timeout, Duration::from_millis(50));
        assert_eq!(config.blob_chunk_size, 4);
        assert!(!config.sync_on_commit);
    }
}
