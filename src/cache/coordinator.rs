//! Boundary interceptor between consumers and the network.
//!
//! Every outbound fetch goes through the [`CacheCoordinator`], which applies
//! a per-category policy, writes successful responses through to the store,
//! and serves cached bytes when the network fails. Fallbacks are annotated
//! in a stable envelope ([`Fetched`]) - payload bytes are never rewritten to
//! carry offline metadata.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, instrument, warn};
use url::Url;

use super::entry::Origin;
use super::error::CacheError;
use super::store::CacheStore;
use crate::fetch::{
    FetchError, RetryDecision, RetryPolicy, Transport, TransportResponse, classify_failure,
};

/// Request category, selecting the caching policy applied at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestCategory {
    /// Static assets.
    Static,
    /// Third-party upstream API calls.
    Api,
    /// Manifest and partition payloads.
    Data,
}

impl RequestCategory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Api => "api",
            Self::Data => "data",
        }
    }

    /// The caching strategy for this category.
    ///
    /// All three currently resolve to network-first; categories stay
    /// distinct because they are logged separately and their policies are
    /// expected to diverge independently.
    #[must_use]
    pub const fn policy(self) -> CachePolicy {
        match self {
            Self::Static | Self::Api | Self::Data => CachePolicy::NetworkFirst,
        }
    }
}

/// Caching strategy at the network boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Try the network; fall back to the cache on failure.
    NetworkFirst,
    /// Serve the cache when present, go to the network only on a miss.
    ///
    /// For immutable resources (closed partitions): a hit is final, no
    /// revalidation traffic is generated.
    CacheFirst,
    /// Serve the cache when present and refresh it in the background;
    /// go to the network only on a miss.
    CacheFirstRevalidate,
}

/// A served response: payload bytes plus serving metadata.
///
/// This envelope is the stable surface downstream consumers read offline
/// status from; the payload itself is never mutated to carry it.
#[derive(Debug, Clone)]
pub struct Fetched {
    /// The payload bytes, verbatim from network or cache.
    pub body: Vec<u8>,
    /// Where the bytes came from.
    pub origin: Origin,
    /// When the bytes were originally retrieved from the network.
    pub stored_at: OffsetDateTime,
    /// Set when this response is a cache fallback after a network failure;
    /// carries the moment the failure was observed.
    pub offline_since: Option<OffsetDateTime>,
}

impl Fetched {
    /// `true` when this response was served from cache because the network
    /// failed.
    #[must_use]
    pub const fn offline(&self) -> bool {
        self.offline_since.is_some()
    }
}

/// Network-boundary interceptor with durable cache fallback.
///
/// One instance per application run; explicitly constructed and passed
/// around, never ambient global state.
pub struct CacheCoordinator {
    transport: Arc<dyn Transport>,
    store: CacheStore,
    retry: RetryPolicy,
}

impl CacheCoordinator {
    /// Creates a coordinator over the given transport and store.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, store: CacheStore, retry: RetryPolicy) -> Self {
        Self {
            transport,
            store,
            retry,
        }
    }

    /// Deletes cache namespaces left behind by previous generations.
    ///
    /// Called once on startup, before serving requests.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Db`] on store failure.
    pub async fn purge_stale_generations(&self) -> Result<u64, CacheError> {
        self.store.purge_stale_generations().await
    }

    /// Fetches `url` under the policy of `category`, keyed by `key`.
    ///
    /// Every successful network response unconditionally supersedes the
    /// stored entry for `key`, regardless of category.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::OfflineUnavailable`] when the network fails and
    /// nothing is cached, or [`CacheError::Db`] on store failure.
    #[instrument(skip(self, url), fields(category = category.as_str(), url = %url))]
    pub async fn fetch(
        &self,
        category: RequestCategory,
        key: &str,
        url: &Url,
    ) -> Result<Fetched, CacheError> {
        self.fetch_with_policy(category.policy(), key, url).await
    }

    /// Fetches `url` under an explicit policy, overriding the category
    /// default. The partition fetcher uses this to serve immutable closed
    /// partitions cache-first while keeping the open partition network-first.
    ///
    /// # Errors
    ///
    /// Same contract as [`CacheCoordinator::fetch`].
    pub async fn fetch_with_policy(
        &self,
        policy: CachePolicy,
        key: &str,
        url: &Url,
    ) -> Result<Fetched, CacheError> {
        match policy {
            CachePolicy::NetworkFirst => self.network_first(key, url).await,
            CachePolicy::CacheFirst => self.cache_first(key, url, false).await,
            CachePolicy::CacheFirstRevalidate => self.cache_first(key, url, true).await,
        }
    }

    async fn network_first(&self, key: &str, url: &Url) -> Result<Fetched, CacheError> {
        match self.try_network(url).await {
            Ok(response) => Ok(self.store_through(key, response).await),
            Err(err) => {
                warn!(error = %err, "network fetch failed, trying cache fallback");
                let now = OffsetDateTime::now_utc();
                match self.store.get(key).await? {
                    Some(entry) => {
                        debug!(stored_at = %entry.stored_at, "serving cached fallback");
                        Ok(Fetched {
                            body: entry.body,
                            origin: Origin::Cache,
                            stored_at: entry.stored_at,
                            offline_since: Some(now),
                        })
                    }
                    None => Err(CacheError::offline_unavailable(key)),
                }
            }
        }
    }

    async fn cache_first(
        &self,
        key: &str,
        url: &Url,
        revalidate: bool,
    ) -> Result<Fetched, CacheError> {
        if let Some(entry) = self.store.get(key).await? {
            if revalidate {
                self.spawn_revalidation(key.to_owned(), url.clone());
            }
            return Ok(Fetched {
                body: entry.body,
                origin: Origin::Cache,
                stored_at: entry.stored_at,
                offline_since: None,
            });
        }
        self.network_first(key, url).await
    }

    /// Refreshes the stored entry for `key` without blocking the caller.
    /// Failures are logged and dropped; the caller already has a response.
    fn spawn_revalidation(&self, key: String, url: Url) {
        let transport = Arc::clone(&self.transport);
        let store = self.store.clone();
        tokio::spawn(async move {
            match transport.get(&url).await {
                Ok(response) => {
                    let now = OffsetDateTime::now_utc();
                    if let Err(err) = store
                        .put(&key, &response.body, now, response.last_modified)
                        .await
                    {
                        warn!(key, error = %err, "revalidation store failed");
                    }
                }
                Err(err) => debug!(key, error = %err, "revalidation fetch failed"),
            }
        });
    }

    /// Writes a successful network response through to the store and wraps
    /// it for the caller. A store failure is logged, not propagated - the
    /// caller still gets the live bytes.
    async fn store_through(&self, key: &str, response: TransportResponse) -> Fetched {
        let now = OffsetDateTime::now_utc();
        if let Err(err) = self
            .store
            .put(key, &response.body, now, response.last_modified)
            .await
        {
            warn!(key, error = %err, "cache write-through failed");
        }
        Fetched {
            body: response.body,
            origin: Origin::Network,
            stored_at: now,
            offline_since: None,
        }
    }

    /// Attempts the network, retrying transient failures per the policy.
    async fn try_network(&self, url: &Url) -> Result<TransportResponse, FetchError> {
        let mut attempt = 1u32;
        loop {
            match self.transport.get(url).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    let kind = classify_failure(&err);
                    match self.retry.should_retry(kind, attempt) {
                        RetryDecision::Retry { delay, attempt: next } => {
                            warn!(error = %err, next_attempt = next, "retrying fetch");
                            tokio::time::sleep(delay).await;
                            attempt = next;
                        }
                        RetryDecision::DoNotRetry { reason } => {
                            debug!(error = %err, reason, "giving up on network");
                            return Err(err);
                        }
                    }
                }
            }
        }
    }
}
