//! Error types for manifest parsing, validation, and the manifest store.

use thiserror::Error;

use super::model::{DatasetId, PartitionId};

/// Errors raised by manifest handling.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The dataset was never registered, or no manifest has been installed
    /// for it yet.
    #[error("dataset '{0}' is not registered")]
    DatasetNotFound(DatasetId),

    /// A dataset identifier failed validation.
    #[error("invalid dataset id '{value}': {reason}")]
    InvalidDatasetId {
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A partition identifier failed validation.
    #[error("invalid partition id: {reason}")]
    InvalidPartitionId {
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A date field did not parse as `YYYY-MM-DD`.
    #[error("invalid calendar date '{value}', expected YYYY-MM-DD")]
    InvalidDate {
        /// The rejected value.
        value: String,
    },

    /// The manifest document did not deserialize.
    #[error("malformed manifest document: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Partitions are not sorted by start date.
    #[error("manifest partitions are not sorted by start date: '{prev}' precedes '{next}'")]
    Unordered {
        /// The earlier entry in document order.
        prev: PartitionId,
        /// The out-of-order entry.
        next: PartitionId,
    },

    /// Two partitions claim overlapping coverage.
    #[error("manifest partitions '{prev}' and '{next}' have overlapping coverage")]
    Overlap {
        /// The earlier partition.
        prev: PartitionId,
        /// The overlapping successor.
        next: PartitionId,
    },

    /// A partition's coverage interval is empty or inverted.
    #[error("partition '{id}' has empty coverage (start >= end)")]
    EmptyCoverage {
        /// The offending partition.
        id: PartitionId,
    },

    /// A partition belongs to a different dataset than its manifest.
    #[error("partition '{id}' belongs to dataset '{found}', expected '{expected}'")]
    ForeignPartition {
        /// The offending partition.
        id: PartitionId,
        /// The manifest's dataset.
        expected: DatasetId,
        /// The partition's dataset.
        found: DatasetId,
    },
}

impl ManifestError {
    /// Creates an [`ManifestError::InvalidDatasetId`].
    pub fn invalid_dataset_id(value: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidDatasetId {
            value: value.into(),
            reason,
        }
    }
}
