//! The query boundary exposed to consumers.
//!
//! [`QueryEngine`] ties the core together: a range query is resolved against
//! the manifest snapshot, its partitions are fetched through the cache
//! coordinator (fanned out, coalesced), the batches are merged and trimmed,
//! and the result carries a freshness label plus offline and partial-coverage
//! markers. The engine always returns a complete [`RangeResult`] object;
//! only `DatasetNotFound` and a manifest gap are hard failures.
//!
//! Consumers that want refreshed data without polling register a
//! [`Subscription`]; the reconciliation scheduler re-delivers results
//! through it when newer data lands.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::cache::{CacheCoordinator, CacheError, RequestCategory};
use crate::fetch::{PartitionFailure, PartitionFetcher};
use crate::freshness::{FreshnessStatus, classify};
use crate::manifest::{CalendarDate, DatasetId, Manifest, ManifestError, ManifestStore};
use crate::merge::{Record, merge_batches};
use crate::resolve::{DateRange, GapError, resolve};

/// Buffered updates per subscription; slow consumers drop updates rather
/// than block the publisher.
const SUBSCRIPTION_BUFFER: usize = 8;

/// A transient range query: consumed once, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeQuery {
    /// Dataset to read.
    pub dataset: DatasetId,
    /// First day (inclusive).
    pub start: CalendarDate,
    /// First day past the range (exclusive).
    pub end: CalendarDate,
}

/// Hard failures of a whole range query.
///
/// Everything else (per-partition failures, offline fallbacks, clipping)
/// degrades into the [`RangeResult`] instead of failing the query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The dataset was never registered or has no manifest yet.
    #[error("dataset '{0}' is not registered")]
    DatasetNotFound(DatasetId),

    /// The manifest's contiguity invariant is violated inside the
    /// requested range.
    #[error(transparent)]
    Gap(#[from] GapError),
}

/// Errors from registering a dataset or refreshing its manifest.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// The manifest document could not be fetched, even from cache.
    #[error("manifest fetch failed: {0}")]
    Fetch(#[from] CacheError),

    /// The fetched manifest did not parse or validate.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Outcome of a manifest refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestRefresh {
    /// Whether a newer manifest generation was installed.
    pub advanced: bool,
    /// Whether the manifest was served from cache after a network failure.
    pub offline: bool,
}

/// The complete answer to a range query.
///
/// Always produced, even in total failure; the `errors` field carries
/// whatever went wrong at partition granularity.
#[derive(Debug, Clone, Serialize)]
pub struct RangeResult {
    /// Dataset queried.
    pub dataset: DatasetId,
    /// Merged records in non-decreasing date order, trimmed to the request.
    pub records: Vec<Record>,
    /// Staleness of the stalest contributing cache entry; network-served
    /// batches count as age zero.
    pub freshness: FreshnessStatus,
    /// The range the caller asked for.
    pub requested: DateRange,
    /// The range actually covered after clipping.
    pub covered: DateRange,
    /// `true` when clipping or partition failures left part of the request
    /// unserved.
    pub partial_coverage: bool,
    /// `true` when any contributing batch was an offline cache fallback.
    pub offline: bool,
    /// Earliest observed network failure among offline-served batches.
    #[serde(with = "time::serde::rfc3339::option")]
    pub offline_since: Option<OffsetDateTime>,
    /// Per-partition failures, empty on a clean result.
    pub errors: Vec<PartitionFailure>,
}

/// A registered subscription delivering refreshed results.
///
/// Dropping the subscription (or calling nothing) is enough to
/// unsubscribe: the engine prunes closed channels on the next publish.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    query: RangeQuery,
    receiver: mpsc::Receiver<RangeResult>,
}

impl Subscription {
    /// The subscription's identity, usable with
    /// [`QueryEngine::unsubscribe`].
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// The range this subscription watches.
    #[must_use]
    pub fn query(&self) -> &RangeQuery {
        &self.query
    }

    /// Waits for the next refreshed result; `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<RangeResult> {
        self.receiver.recv().await
    }
}

#[derive(Debug)]
struct SubscriptionEntry {
    query: RangeQuery,
    sender: mpsc::Sender<RangeResult>,
}

/// Facade over the manifest store, resolver, fetcher, merger, and cache.
pub struct QueryEngine {
    store: ManifestStore,
    cache: Arc<CacheCoordinator>,
    fetcher: PartitionFetcher,
    subscriptions: Mutex<HashMap<u64, SubscriptionEntry>>,
    next_subscription: AtomicU64,
}

impl QueryEngine {
    /// Creates an engine over the given cache coordinator.
    #[must_use]
    pub fn new(cache: Arc<CacheCoordinator>) -> Self {
        Self {
            store: ManifestStore::new(),
            fetcher: PartitionFetcher::new(Arc::clone(&cache)),
            cache,
            subscriptions: Mutex::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// Registers a dataset and performs its initial manifest refresh.
    ///
    /// # Errors
    ///
    /// Returns [`RefreshError`] when the manifest cannot be fetched or does
    /// not validate; the registration itself is kept, so a later refresh
    /// can still succeed.
    #[instrument(skip(self, manifest_url), fields(dataset = %dataset, url = %manifest_url))]
    pub async fn register_dataset(
        &self,
        dataset: DatasetId,
        manifest_url: Url,
    ) -> Result<(), RefreshError> {
        self.store.register(dataset.clone(), manifest_url);
        self.refresh_manifest(&dataset).await?;
        Ok(())
    }

    /// Re-fetches the manifest for `dataset` and installs it if its
    /// generation advanced.
    ///
    /// # Errors
    ///
    /// Returns [`RefreshError`] when the dataset is unknown, the manifest
    /// cannot be fetched even from cache, or the document fails validation.
    #[instrument(skip(self), fields(dataset = %dataset))]
    pub async fn refresh_manifest(&self, dataset: &DatasetId) -> Result<ManifestRefresh, RefreshError> {
        let url = self.store.manifest_url(dataset)?;
        let key = format!("{dataset}/manifest");
        let served = self.cache.fetch(RequestCategory::Data, &key, &url).await?;
        let manifest = Manifest::parse(&served.body)?;

        let advanced = match self.store.manifest(dataset) {
            Ok(current) => manifest.generated_at > current.generated_at,
            Err(_) => true,
        };

        if advanced {
            info!(generated_at = %manifest.generated_at, "manifest generation advanced");
            self.store.replace(dataset, manifest)?;
        } else {
            debug!("manifest unchanged");
        }

        Ok(ManifestRefresh {
            advanced,
            offline: served.offline(),
        })
    }

    /// Datasets currently registered.
    #[must_use]
    pub fn datasets(&self) -> Vec<DatasetId> {
        self.store.datasets()
    }

    /// Snapshot of the current manifest for `dataset`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::DatasetNotFound`] when the dataset is unknown
    /// or has no manifest installed yet.
    pub fn manifest(&self, dataset: &DatasetId) -> Result<Arc<Manifest>, QueryError> {
        self.store
            .manifest(dataset)
            .map_err(|_| QueryError::DatasetNotFound(dataset.clone()))
    }

    /// The cache coordinator this engine fetches through.
    #[must_use]
    pub fn cache(&self) -> Arc<CacheCoordinator> {
        Arc::clone(&self.cache)
    }

    /// Answers a range query.
    ///
    /// Partition failures and offline fallbacks degrade into the result;
    /// the query only hard-fails when the dataset is unknown or the
    /// manifest has a gap inside the requested range.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::DatasetNotFound`] or [`QueryError::Gap`].
    #[instrument(skip(self), fields(dataset = %dataset, start = %start, end = %end))]
    pub async fn query_range(
        &self,
        dataset: &DatasetId,
        start: CalendarDate,
        end: CalendarDate,
    ) -> Result<RangeResult, QueryError> {
        let manifest = self
            .store
            .manifest(dataset)
            .map_err(|_| QueryError::DatasetNotFound(dataset.clone()))?;
        let base = self
            .store
            .manifest_url(dataset)
            .map_err(|_| QueryError::DatasetNotFound(dataset.clone()))?;

        let resolution = resolve(&manifest, start, end)?;
        let outcome = self.fetcher.fetch_all(&resolution, &base, manifest.end).await;

        let records = merge_batches(&outcome.batches, start, end);

        let now = OffsetDateTime::now_utc();
        let freshness = outcome
            .batches
            .iter()
            .map(|batch| classify(batch.stored_at, now))
            .max()
            .unwrap_or(FreshnessStatus::Fresh);
        let offline_since = outcome
            .batches
            .iter()
            .filter_map(|batch| batch.offline_since)
            .min();
        let partial_coverage = resolution.partial_coverage() || !outcome.failures.is_empty();

        if !outcome.failures.is_empty() {
            warn!(
                failed = outcome.failures.len(),
                fetched = outcome.batches.len(),
                "serving partial result"
            );
        }

        Ok(RangeResult {
            dataset: dataset.clone(),
            records,
            freshness,
            requested: resolution.requested,
            covered: resolution.covered,
            partial_coverage,
            offline: offline_since.is_some(),
            offline_since,
            errors: outcome.failures,
        })
    }

    /// Registers a subscription for `[start, end)` of `dataset`.
    ///
    /// The reconciliation scheduler re-delivers a fresh [`RangeResult`]
    /// through the returned handle whenever newer data lands in a window
    /// intersecting the subscribed range.
    #[must_use]
    pub fn subscribe(&self, dataset: DatasetId, start: CalendarDate, end: CalendarDate) -> Subscription {
        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        let query = RangeQuery {
            dataset,
            start,
            end,
        };
        self.subscriptions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(
                id,
                SubscriptionEntry {
                    query: query.clone(),
                    sender,
                },
            );
        Subscription {
            id,
            query,
            receiver,
        }
    }

    /// Removes a subscription by id. Dropped receivers are also pruned
    /// automatically on the next publish.
    pub fn unsubscribe(&self, id: u64) {
        self.subscriptions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&id);
    }

    /// Re-fetches partitions of `dataset` covering `window` and pushes
    /// refreshed results to every subscription intersecting it.
    ///
    /// Returns the number of subscriptions notified.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] when the dataset vanished or the manifest has
    /// a gap inside the window.
    #[instrument(skip(self), fields(dataset = %dataset, window = %window))]
    pub async fn refresh_window(
        &self,
        dataset: &DatasetId,
        window: DateRange,
    ) -> Result<usize, QueryError> {
        // Warm the window first so the cache holds the refreshed bytes even
        // when nobody is subscribed.
        let _ = self.query_range(dataset, window.start, window.end).await?;

        let interested: Vec<(u64, RangeQuery)> = {
            let subscriptions = self
                .subscriptions
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            subscriptions
                .iter()
                .filter(|(_, entry)| {
                    entry.query.dataset == *dataset
                        && entry.query.start < window.end
                        && entry.query.end > window.start
                })
                .map(|(id, entry)| (*id, entry.query.clone()))
                .collect()
        };

        let mut notified = 0;
        for (id, query) in interested {
            match self.query_range(dataset, query.start, query.end).await {
                Ok(result) => {
                    let closed = {
                        let subscriptions = self
                            .subscriptions
                            .lock()
                            .unwrap_or_else(std::sync::PoisonError::into_inner);
                        match subscriptions.get(&id) {
                            Some(entry) => entry.sender.try_send(result).is_err()
                                && entry.sender.is_closed(),
                            None => false,
                        }
                    };
                    if closed {
                        debug!(subscription = id, "pruning closed subscription");
                        self.unsubscribe(id);
                    } else {
                        notified += 1;
                    }
                }
                Err(err) => warn!(subscription = id, error = %err, "refresh query failed"),
            }
        }
        Ok(notified)
    }
}
