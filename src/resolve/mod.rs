//! Pure resolution of date-range queries to partition lists.
//!
//! [`resolve`] maps `(manifest, start, end)` to the minimal ordered set of
//! partitions covering the requested range. Interval semantics are half-open
//! throughout: a boundary day shared by two adjacent partitions belongs to
//! the later one.
//!
//! Requests extending past the manifest's coverage are clipped silently -
//! the caller decides how to present partial coverage, the resolver just
//! reports the range it actually used. A hole *inside* the requested range,
//! however, is an invariant violation of the manifest and raises
//! [`GapError`] naming the missing interval; the resolver never silently
//! skips data.

use std::fmt::{Display, Formatter};

use serde::Serialize;
use thiserror::Error;

use crate::manifest::{CalendarDate, DatasetId, Manifest, Partition};

/// A manifest coverage hole discovered while resolving a range.
///
/// Recoverable only by correcting the manifest upstream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("manifest for '{dataset}' has a coverage gap: [{missing_start}, {missing_end}) is not covered by any partition")]
pub struct GapError {
    /// Dataset whose manifest violated the contiguity invariant.
    pub dataset: DatasetId,
    /// First missing day (inclusive).
    pub missing_start: CalendarDate,
    /// First covered day after the hole (exclusive).
    pub missing_end: CalendarDate,
}

/// Outcome of resolving a range query against a manifest snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Partitions covering the clipped range, in chronological order.
    pub partitions: Vec<Partition>,
    /// The range the caller asked for.
    pub requested: DateRange,
    /// The range actually covered after clipping to the manifest.
    pub covered: DateRange,
}

impl Resolution {
    /// `true` when clipping shrank the requested range.
    #[must_use]
    pub fn partial_coverage(&self) -> bool {
        self.covered != self.requested
    }

    /// `true` when nothing of the requested range is covered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }
}

/// A half-open `[start, end)` interval of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    /// First day (inclusive).
    pub start: CalendarDate,
    /// First day past the range (exclusive).
    pub end: CalendarDate,
}

impl DateRange {
    /// Creates a range; `start >= end` yields an empty range.
    #[must_use]
    pub const fn new(start: CalendarDate, end: CalendarDate) -> Self {
        Self { start, end }
    }

    /// `true` when the range covers no days.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

impl Display for DateRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Resolves `[start, end)` against a manifest snapshot.
///
/// Returns the ordered partitions whose coverage intersects the requested
/// range, together with the clipped range actually used. An empty request
/// (`start >= end`) or a request entirely outside the manifest's coverage
/// resolves to an empty partition list, not an error.
///
/// # Errors
///
/// Returns [`GapError`] when consecutive resolved partitions are not
/// contiguous, identifying the exact missing interval.
pub fn resolve(
    manifest: &Manifest,
    start: CalendarDate,
    end: CalendarDate,
) -> Result<Resolution, GapError> {
    let requested = DateRange::new(start, end);

    if requested.is_empty() || manifest.partitions.is_empty() {
        return Ok(Resolution {
            partitions: Vec::new(),
            requested,
            covered: DateRange::new(start, start),
        });
    }

    // First partition whose coverage end is past the requested start.
    // partition_point relies on the manifest's sorted-by-start invariant;
    // ends are monotonic because partitions must not overlap.
    let first = manifest.partitions.partition_point(|p| p.end <= start);

    let mut partitions: Vec<Partition> = Vec::new();
    for partition in &manifest.partitions[first..] {
        if partition.start >= end {
            break;
        }
        if let Some(prev) = partitions.last() {
            if partition.start > prev.end {
                return Err(GapError {
                    dataset: manifest.dataset.clone(),
                    missing_start: prev.end,
                    missing_end: partition.start,
                });
            }
        }
        partitions.push(partition.clone());
    }

    let covered = match (partitions.first(), partitions.last()) {
        (Some(first), Some(last)) => {
            DateRange::new(start.max(first.start), end.min(last.end))
        }
        // Nothing intersects: the request lies entirely outside coverage.
        _ => DateRange::new(start, start),
    };

    Ok(Resolution {
        partitions,
        requested,
        covered,
    })
}
