//! Coalescing partition fetcher with fan-out support.
//!
//! Concurrent fetches of the same partition id share one in-flight network
//! operation: the first caller installs a [`Shared`] future in the in-flight
//! map, later callers attach to it, and every caller receives the same
//! eventual result. Dropping one caller's handle does not cancel the fetch
//! for the others; only when the last handle goes away is the operation
//! abandoned.
//!
//! Per-partition failures stay per-partition: a five-partition fan-out with
//! one failure yields four batches plus one reported failure, never an
//! all-or-nothing abort.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared, join_all};
use serde::Serialize;
use tracing::{debug, instrument};
use url::Url;

use super::error::FetchError;
use super::retry::{FailureKind, classify_failure};
use crate::cache::{CacheCoordinator, CacheError, CachePolicy};
use crate::manifest::{CalendarDate, Partition, PartitionId};
use crate::merge::{Record, RecordBatch};
use crate::resolve::Resolution;

/// A per-partition fetch failure, cloneable so every coalesced caller can
/// receive it and serializable for aggregation into query results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionFailure {
    /// The partition that failed.
    pub partition: PartitionId,
    /// Rendered failure message.
    pub error: String,
    /// Whether a later attempt could plausibly succeed.
    pub retryable: bool,
}

impl PartitionFailure {
    fn from_fetch(partition: &PartitionId, error: &FetchError) -> Self {
        Self {
            partition: partition.clone(),
            error: error.to_string(),
            retryable: classify_failure(error) != FailureKind::Permanent,
        }
    }

    fn from_cache(partition: &PartitionId, error: &CacheError) -> Self {
        Self {
            partition: partition.clone(),
            error: error.to_string(),
            // Connectivity may return; corrupt rows and db failures won't
            // fix themselves on retry.
            retryable: matches!(error, CacheError::OfflineUnavailable { .. }),
        }
    }
}

/// Outcome of fetching all partitions of a resolution.
#[derive(Debug)]
pub struct FetchOutcome {
    /// Successful batches, still in partition (chronological) order.
    pub batches: Vec<RecordBatch>,
    /// Per-partition failures.
    pub failures: Vec<PartitionFailure>,
}

type SharedFetch = Shared<BoxFuture<'static, Result<RecordBatch, PartitionFailure>>>;

/// Fetches partition payloads through the cache coordinator, coalescing
/// concurrent requests for the same partition id.
pub struct PartitionFetcher {
    cache: Arc<CacheCoordinator>,
    in_flight: DashMap<PartitionId, SharedFetch>,
}

impl PartitionFetcher {
    /// Creates a fetcher over the given coordinator.
    #[must_use]
    pub fn new(cache: Arc<CacheCoordinator>) -> Self {
        Self {
            cache,
            in_flight: DashMap::new(),
        }
    }

    /// Fetches one partition's records, attaching to an in-flight fetch for
    /// the same partition id when one exists.
    ///
    /// `policy` selects the caching strategy; pass
    /// [`CachePolicy::CacheFirst`] for closed (immutable) partitions and
    /// [`CachePolicy::NetworkFirst`] for the open one.
    ///
    /// # Errors
    ///
    /// Returns a [`PartitionFailure`] describing the network, cache, or
    /// parse failure. Failures are per-partition; callers aggregate them.
    #[instrument(skip(self, partition, base), fields(partition = %partition.id))]
    pub async fn fetch(
        &self,
        partition: &Partition,
        base: &Url,
        policy: CachePolicy,
    ) -> Result<RecordBatch, PartitionFailure> {
        // Insert-if-absent: the entry guard is held only to install the
        // shared future, never across an await.
        let shared = match self.in_flight.entry(partition.id.clone()) {
            Entry::Occupied(occupied) => {
                debug!("attaching to in-flight fetch");
                occupied.get().clone()
            }
            Entry::Vacant(vacant) => {
                let future = fetch_partition(
                    Arc::clone(&self.cache),
                    partition.clone(),
                    base.clone(),
                    policy,
                )
                .boxed()
                .shared();
                vacant.insert(future.clone());
                future
            }
        };

        let result = shared.clone().await;

        // Drop the map entry once settled, but only if it is still ours -
        // a fresh fetch for the same id may have been installed since.
        self.in_flight
            .remove_if(&partition.id, |_, existing| existing.ptr_eq(&shared));

        result
    }

    /// Fetches every partition of a resolution concurrently.
    ///
    /// `open_edge` is the manifest's overall coverage end: a partition
    /// reaching it is the open partition and is fetched network-first, all
    /// earlier (closed, immutable) partitions are served cache-first and
    /// only hit the network on a cache miss.
    ///
    /// All batches are buffered before returning; output order matches the
    /// resolution's partition order regardless of completion order.
    pub async fn fetch_all(
        &self,
        resolution: &Resolution,
        base: &Url,
        open_edge: CalendarDate,
    ) -> FetchOutcome {
        let results = join_all(resolution.partitions.iter().map(|partition| {
            let policy = if partition.end >= open_edge {
                CachePolicy::NetworkFirst
            } else {
                CachePolicy::CacheFirst
            };
            self.fetch(partition, base, policy)
        }))
        .await;

        let mut batches = Vec::new();
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(batch) => batches.push(batch),
                Err(failure) => failures.push(failure),
            }
        }
        FetchOutcome { batches, failures }
    }
}

/// The actual fetch path behind the in-flight map: resolve the file URL, go
/// through the cache coordinator, parse the record array.
async fn fetch_partition(
    cache: Arc<CacheCoordinator>,
    partition: Partition,
    base: Url,
    policy: CachePolicy,
) -> Result<RecordBatch, PartitionFailure> {
    let url = base.join(&partition.file).map_err(|_| {
        PartitionFailure::from_fetch(
            &partition.id,
            &FetchError::invalid_url(&partition.file, base.as_str()),
        )
    })?;

    let key = format!("{}/{}", partition.dataset, partition.id);
    let served = cache
        .fetch_with_policy(policy, &key, &url)
        .await
        .map_err(|err| PartitionFailure::from_cache(&partition.id, &err))?;

    let records: Vec<Record> = serde_json::from_slice(&served.body).map_err(|err| {
        PartitionFailure::from_fetch(
            &partition.id,
            &FetchError::malformed(url.as_str(), err),
        )
    })?;

    Ok(RecordBatch {
        partition: partition.id,
        records,
        stored_at: served.stored_at,
        offline_since: served.offline_since,
    })
}
