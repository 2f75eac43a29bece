//! Cache entry model.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Where the bytes of a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Served from a live network response.
    Network,
    /// Served from the cache store.
    Cache,
}

impl Origin {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Cache => "cache",
        }
    }
}

/// The stored bytes of a previously fetched resource.
///
/// Entries are superseded by whole-row replacement on every successful
/// network refresh, never mutated; a cache hit always returns the most
/// recently stored entry for its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Resource identity (dataset/partition id, or request URL).
    pub key: String,
    /// The cached payload bytes, verbatim.
    pub body: Vec<u8>,
    /// When the bytes were retrieved from the network.
    pub stored_at: OffsetDateTime,
    /// Upstream `Last-Modified`, when the producer sent one.
    pub last_modified: Option<OffsetDateTime>,
}
