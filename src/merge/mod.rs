//! Record model and the merger/trimmer for fetched partition batches.
//!
//! Batches arrive in partition order (chronological by construction) but a
//! partition file is not guaranteed to be internally sorted, so the merger
//! concatenates, stable-sorts by record date, and trims to the exact
//! requested half-open range. Merging the same inputs twice yields identical
//! output.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::manifest::{CalendarDate, PartitionId};

/// One time-series record.
///
/// Only the date field is typed; everything else the producer ships is
/// carried through untouched as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// The day this record describes.
    pub date: CalendarDate,
    /// Producer-defined fields, passed through verbatim.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Records of one fetched partition, plus how they were served.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    /// Partition the records came from.
    pub partition: PartitionId,
    /// Records in file order (not necessarily sorted).
    pub records: Vec<Record>,
    /// When the serving bytes were retrieved from the network.
    pub stored_at: OffsetDateTime,
    /// Set when the batch was served from cache after a network failure.
    pub offline_since: Option<OffsetDateTime>,
}

impl RecordBatch {
    /// `true` when the batch was served from cache as an offline fallback.
    #[must_use]
    pub const fn offline(&self) -> bool {
        self.offline_since.is_some()
    }
}

/// Merges batches into a single chronological record sequence trimmed to
/// `[start, end)`.
///
/// `batches` must be ordered by partition start date; the caller gets this
/// for free from the resolver, and the fetch fan-out preserves it regardless
/// of completion order. The sort is stable, so records sharing a date keep
/// their partition-file order.
#[must_use]
pub fn merge_batches(batches: &[RecordBatch], start: CalendarDate, end: CalendarDate) -> Vec<Record> {
    let mut records: Vec<Record> = batches
        .iter()
        .flat_map(|batch| batch.records.iter().cloned())
        .collect();
    records.sort_by_key(|record| record.date);
    records.retain(|record| record.date >= start && record.date < end);
    records
}
