//! Offline-capable caching at the network boundary.
//!
//! The cache layer has three parts:
//! - [`CacheEntry`] / [`Origin`] - the stored-bytes model
//! - [`CacheStore`] - durable SQLite store, namespaced by generation tag
//! - [`CacheCoordinator`] - the boundary interceptor applying per-category
//!   policies and annotating fallbacks with offline metadata
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use timeshard_core::cache::{CacheCoordinator, CacheStore, RequestCategory};
//! use timeshard_core::fetch::{HttpTransport, RetryPolicy};
//! use timeshard_core::Database;
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(std::path::Path::new("cache.db")).await?;
//! let coordinator = CacheCoordinator::new(
//!     Arc::new(HttpTransport::new()),
//!     CacheStore::new(db, "timeshard-v1"),
//!     RetryPolicy::default(),
//! );
//! coordinator.purge_stale_generations().await?;
//!
//! let url = Url::parse("https://data.example.org/casualties/manifest.json")?;
//! let served = coordinator.fetch(RequestCategory::Data, url.as_str(), &url).await?;
//! println!("{} bytes, offline: {}", served.body.len(), served.offline());
//! # Ok(())
//! # }
//! ```

mod coordinator;
mod entry;
mod error;
mod store;

pub use coordinator::{CacheCoordinator, CachePolicy, Fetched, RequestCategory};
pub use entry::{CacheEntry, Origin};
pub use error::CacheError;
pub use store::CacheStore;
