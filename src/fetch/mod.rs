//! Network retrieval: transport boundary, retry policy, and the coalescing
//! partition fetcher.
//!
//! All network I/O in the crate flows through the [`Transport`] trait;
//! production code uses [`HttpTransport`], tests substitute scripted
//! implementations. The [`PartitionFetcher`] sits above the cache
//! coordinator and deduplicates concurrent requests for the same partition.

mod error;
mod fetcher;
mod retry;
mod transport;

pub use error::FetchError;
pub use fetcher::{FetchOutcome, PartitionFailure, PartitionFetcher};
pub use retry::{DEFAULT_MAX_ATTEMPTS, FailureKind, RetryDecision, RetryPolicy, classify_failure};
pub use transport::{HttpTransport, Transport, TransportResponse};
