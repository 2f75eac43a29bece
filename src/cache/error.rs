//! Error types for the cache layer.

use thiserror::Error;

/// Errors raised by the cache store and coordinator.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The network failed and no cached fallback exists for the key.
    ///
    /// This is a structured, expected outcome - the query layer turns it
    /// into a degraded result, never a crash.
    #[error("offline and not cached: '{key}'")]
    OfflineUnavailable {
        /// The cache key that had no stored entry.
        key: String,
    },

    /// The underlying cache database failed.
    #[error("cache store error: {0}")]
    Db(#[from] sqlx::Error),

    /// A stored timestamp column did not parse back as RFC3339.
    #[error("corrupt cache entry '{key}': bad timestamp '{value}'")]
    CorruptTimestamp {
        /// The cache key whose row is corrupt.
        key: String,
        /// The unparseable column value.
        value: String,
    },
}

impl CacheError {
    /// Creates an [`CacheError::OfflineUnavailable`].
    pub fn offline_unavailable(key: impl Into<String>) -> Self {
        Self::OfflineUnavailable { key: key.into() }
    }
}
