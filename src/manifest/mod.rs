//! Manifest catalog: data model and the in-process manifest store.
//!
//! Each dataset has exactly one [`Manifest`] describing its partitions. The
//! [`ManifestStore`] hands out `Arc` snapshots and replaces manifests
//! atomically - a reader holding a snapshot is unaffected by a concurrent
//! replacement, and no partial-update operation exists, so a torn partition
//! list can never be observed.
//!
//! # Example
//!
//! ```
//! use timeshard_core::manifest::{DatasetId, ManifestStore};
//! use url::Url;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = ManifestStore::new();
//! let dataset = DatasetId::new("casualties")?;
//! let url = Url::parse("https://data.example.org/casualties/manifest.json")?;
//! store.register(dataset.clone(), url);
//!
//! // No manifest installed yet - lookups report the dataset as not found
//! // until the first refresh completes.
//! assert!(store.manifest(&dataset).is_err());
//! # Ok(())
//! # }
//! ```

mod error;
mod model;

pub use error::ManifestError;
pub use model::{CalendarDate, DatasetId, Manifest, Partition, PartitionId};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, instrument};
use url::Url;

/// Result type for manifest store operations.
pub type Result<T> = std::result::Result<T, ManifestError>;

/// Per-dataset registration state.
#[derive(Debug, Clone)]
struct DatasetEntry {
    manifest_url: Url,
    manifest: Option<Arc<Manifest>>,
}

/// In-process catalog of registered datasets and their current manifests.
///
/// Single-writer by convention (the reconciliation path), many readers. The
/// inner lock is only held for map operations, never across an await point.
#[derive(Debug, Default)]
pub struct ManifestStore {
    inner: RwLock<HashMap<DatasetId, DatasetEntry>>,
}

impl ManifestStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a dataset with the URL of its manifest resource.
    ///
    /// Re-registering an already-known dataset updates the manifest URL and
    /// keeps the installed manifest, if any.
    #[instrument(skip(self), fields(dataset = %dataset))]
    pub fn register(&self, dataset: DatasetId, manifest_url: Url) {
        let mut inner = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner
            .entry(dataset)
            .and_modify(|entry| entry.manifest_url = manifest_url.clone())
            .or_insert(DatasetEntry {
                manifest_url,
                manifest: None,
            });
    }

    /// Returns a snapshot of the current manifest for `dataset`.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::DatasetNotFound`] when the dataset was never
    /// registered or no manifest has been installed yet.
    pub fn manifest(&self, dataset: &DatasetId) -> Result<Arc<Manifest>> {
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner
            .get(dataset)
            .and_then(|entry| entry.manifest.clone())
            .ok_or_else(|| ManifestError::DatasetNotFound(dataset.clone()))
    }

    /// Returns the registered manifest URL for `dataset`.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::DatasetNotFound`] when the dataset was never
    /// registered.
    pub fn manifest_url(&self, dataset: &DatasetId) -> Result<Url> {
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner
            .get(dataset)
            .map(|entry| entry.manifest_url.clone())
            .ok_or_else(|| ManifestError::DatasetNotFound(dataset.clone()))
    }

    /// Atomically installs `manifest` as the current manifest for `dataset`.
    ///
    /// The previous manifest instance is dropped; in-flight readers keep
    /// their own snapshots.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::DatasetNotFound`] when the dataset was never
    /// registered, or a validation error when the manifest is structurally
    /// invalid.
    #[instrument(skip(self, manifest), fields(dataset = %dataset))]
    pub fn replace(&self, dataset: &DatasetId, manifest: Manifest) -> Result<()> {
        manifest.validate()?;
        let mut inner = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        let entry = inner
            .get_mut(dataset)
            .ok_or_else(|| ManifestError::DatasetNotFound(dataset.clone()))?;
        debug!(
            partitions = manifest.partitions.len(),
            generated_at = %manifest.generated_at,
            "installing manifest"
        );
        entry.manifest = Some(Arc::new(manifest));
        Ok(())
    }

    /// Returns all registered dataset identifiers.
    #[must_use]
    pub fn datasets(&self) -> Vec<DatasetId> {
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.keys().cloned().collect()
    }
}
