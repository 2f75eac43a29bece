//! SQLite-backed cache store, namespaced by a generation tag.
//!
//! One namespace (the current generation) is read and written; namespaces
//! left behind by previous versions are purged wholesale on startup. A put
//! replaces the entire row, so readers never observe a half-written entry.

use sqlx::Row;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, instrument};

use super::entry::CacheEntry;
use super::error::CacheError;
use crate::db::Database;

/// Result type for cache store operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Durable cache keyed by `(generation namespace, resource identity)`.
#[derive(Debug, Clone)]
pub struct CacheStore {
    db: Database,
    namespace: String,
}

impl CacheStore {
    /// Creates a store bound to the given generation namespace.
    #[must_use]
    pub fn new(db: Database, namespace: impl Into<String>) -> Self {
        Self {
            db,
            namespace: namespace.into(),
        }
    }

    /// The generation namespace this store reads and writes.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Looks up the most recently stored entry for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Db`] on query failure, or
    /// [`CacheError::CorruptTimestamp`] when a stored timestamp column no
    /// longer parses.
    #[instrument(skip(self))]
    pub async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let row = sqlx::query(
            r"SELECT body, stored_at, last_modified
              FROM cache_entries
              WHERE namespace = ? AND key = ?",
        )
        .bind(&self.namespace)
        .bind(key)
        .fetch_optional(self.db.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let body: Vec<u8> = row.get("body");
        let stored_at: String = row.get("stored_at");
        let last_modified: Option<String> = row.get("last_modified");

        let stored_at = parse_stored_timestamp(key, &stored_at)?;
        let last_modified = match last_modified {
            Some(value) => Some(parse_stored_timestamp(key, &value)?),
            None => None,
        };

        Ok(Some(CacheEntry {
            key: key.to_owned(),
            body,
            stored_at,
            last_modified,
        }))
    }

    /// Stores (or supersedes) the entry for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Db`] on write failure.
    #[instrument(skip(self, body), fields(bytes = body.len()))]
    pub async fn put(
        &self,
        key: &str,
        body: &[u8],
        stored_at: OffsetDateTime,
        last_modified: Option<OffsetDateTime>,
    ) -> Result<()> {
        sqlx::query(
            r"INSERT OR REPLACE INTO cache_entries (namespace, key, body, stored_at, last_modified)
              VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&self.namespace)
        .bind(key)
        .bind(body)
        .bind(format_timestamp(stored_at))
        .bind(last_modified.map(format_timestamp))
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    /// Deletes every entry whose namespace differs from the current
    /// generation. Returns the number of rows removed.
    ///
    /// Housekeeping only: correctness never depends on old generations
    /// being gone, this just bounds growth across version upgrades.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Db`] on write failure.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub async fn purge_stale_generations(&self) -> Result<u64> {
        let result = sqlx::query(r"DELETE FROM cache_entries WHERE namespace != ?")
            .bind(&self.namespace)
            .execute(self.db.pool())
            .await?;

        let purged = result.rows_affected();
        if purged > 0 {
            debug!(purged, "purged stale cache generations");
        }
        Ok(purged)
    }
}

fn format_timestamp(ts: OffsetDateTime) -> String {
    // RFC3339 formatting of a UTC timestamp cannot fail; fall back to the
    // debug form rather than panicking in the I/O path.
    ts.format(&Rfc3339).unwrap_or_else(|_| format!("{ts:?}"))
}

fn parse_stored_timestamp(key: &str, value: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339).map_err(|_| CacheError::CorruptTimestamp {
        key: key.to_owned(),
        value: value.to_owned(),
    })
}
