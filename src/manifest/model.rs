//! Manifest data model: dataset identifiers, calendar dates, partitions.
//!
//! A [`Manifest`] is the authoritative catalog of one dataset's partitions.
//! It is produced by an external process, fetched as a JSON document, and
//! replaced wholesale - the core never patches a manifest in place.

use std::fmt::{Display, Formatter};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

use super::error::ManifestError;

/// Maximum length for dataset identifiers.
const MAX_DATASET_ID_LEN: usize = 64;

/// Serialized form of [`CalendarDate`]: `YYYY-MM-DD`.
const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Identifier of a logical time series (e.g. `casualties`).
///
/// Lowercase ASCII letters, digits, `-` and `_`; must start with a letter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatasetId(String);

impl DatasetId {
    /// Validates and constructs a dataset identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::InvalidDatasetId`] when the value is empty,
    /// too long, or contains characters outside `[a-z0-9_-]`.
    pub fn new(value: impl Into<String>) -> Result<Self, ManifestError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ManifestError::invalid_dataset_id(value, "must not be empty"));
        }
        if value.len() > MAX_DATASET_ID_LEN {
            return Err(ManifestError::invalid_dataset_id(value, "too long"));
        }
        if !value.chars().next().is_some_and(|ch| ch.is_ascii_lowercase()) {
            return Err(ManifestError::invalid_dataset_id(
                value,
                "must start with a lowercase ASCII letter",
            ));
        }
        if !value
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_')
        {
            return Err(ManifestError::invalid_dataset_id(
                value,
                "allowed characters are a-z, 0-9, '-' and '_'",
            ));
        }
        Ok(Self(value))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DatasetId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for DatasetId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for DatasetId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::new(value).map_err(D::Error::custom)
    }
}

/// Identifier of a single partition within a dataset (e.g. `2023-q4`, `current`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionId(String);

impl PartitionId {
    /// Validates and constructs a partition identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::InvalidPartitionId`] when the value is empty
    /// or contains whitespace.
    pub fn new(value: impl Into<String>) -> Result<Self, ManifestError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ManifestError::InvalidPartitionId {
                reason: "must not be empty",
            });
        }
        if value.chars().any(char::is_whitespace) {
            return Err(ManifestError::InvalidPartitionId {
                reason: "must not contain whitespace",
            });
        }
        Ok(Self(value))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PartitionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for PartitionId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for PartitionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::new(value).map_err(D::Error::custom)
    }
}

/// Calendar day in the proleptic Gregorian calendar, serialized `YYYY-MM-DD`.
///
/// Partition coverage and record dates are expressed as half-open intervals
/// `[start, end)` of calendar days: the start day belongs to the interval,
/// the end day does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CalendarDate(time::Date);

impl CalendarDate {
    /// Parses a `YYYY-MM-DD` string.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::InvalidDate`] when the input does not parse
    /// as a calendar day.
    pub fn parse(input: &str) -> Result<Self, ManifestError> {
        time::Date::parse(input, DATE_FORMAT)
            .map(Self)
            .map_err(|_| ManifestError::InvalidDate {
                value: input.to_owned(),
            })
    }

    /// Wraps an already-validated [`time::Date`].
    #[must_use]
    pub const fn from_date(date: time::Date) -> Self {
        Self(date)
    }

    /// Returns the underlying [`time::Date`].
    #[must_use]
    pub const fn into_date(self) -> time::Date {
        self.0
    }

    /// The calendar day containing the given instant (UTC).
    #[must_use]
    pub fn from_timestamp(ts: OffsetDateTime) -> Self {
        Self(ts.date())
    }

    /// Returns this date moved back by `days`, saturating at the calendar
    /// range boundary.
    #[must_use]
    pub fn minus_days(self, days: u32) -> Self {
        self.0
            .checked_sub(time::Duration::days(i64::from(days)))
            .map_or(self, Self)
    }

    /// Returns this date moved forward by `days`, saturating at the
    /// calendar range boundary.
    #[must_use]
    pub fn plus_days(self, days: u32) -> Self {
        self.0
            .checked_add(time::Duration::days(i64::from(days)))
            .map_or(self, Self)
    }
}

impl Display for CalendarDate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0.format(DATE_FORMAT) {
            Ok(formatted) => f.write_str(&formatted),
            Err(_) => Err(std::fmt::Error),
        }
    }
}

impl Serialize for CalendarDate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for CalendarDate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(D::Error::custom)
    }
}

/// An immutable, date-bounded slice of a dataset's timeline.
///
/// Coverage is the half-open interval `[start, end)`. Partitions in a
/// manifest are totally ordered by `start` and must not overlap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partition {
    /// Partition identifier, unique within the dataset.
    pub id: PartitionId,
    /// Owning dataset.
    pub dataset: DatasetId,
    /// First covered day (inclusive).
    pub start: CalendarDate,
    /// First day past the coverage (exclusive).
    pub end: CalendarDate,
    /// Approximate number of records in the partition file.
    pub record_count: u64,
    /// Location of the partition payload, relative to the manifest URL or
    /// absolute.
    pub file: String,
    /// Last-modified timestamp recorded by the manifest producer.
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified: OffsetDateTime,
}

impl Partition {
    /// Returns `true` when the partition's coverage intersects `[start, end)`.
    #[must_use]
    pub fn covers_any_of(&self, start: CalendarDate, end: CalendarDate) -> bool {
        self.start < end && self.end > start
    }
}

/// The authoritative catalog of one dataset's partitions and coverage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Dataset this manifest describes.
    pub dataset: DatasetId,
    /// First covered day across all partitions (inclusive).
    pub start: CalendarDate,
    /// First day past the full coverage (exclusive).
    pub end: CalendarDate,
    /// When the manifest was generated upstream.
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    /// Human-readable description of the upstream source.
    #[serde(default)]
    pub source: Option<String>,
    /// Partitions ordered by start date.
    pub partitions: Vec<Partition>,
}

impl Manifest {
    /// Parses and validates a manifest document.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Malformed`] when the bytes are not a valid
    /// manifest document, or a structural error when partition ordering is
    /// violated (see [`Manifest::validate`]).
    pub fn parse(bytes: &[u8]) -> Result<Self, ManifestError> {
        let manifest: Self = serde_json::from_slice(bytes)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validates structural invariants the resolver depends on.
    ///
    /// Partitions must be sorted by start date, non-overlapping, non-empty,
    /// and belong to this manifest's dataset. Coverage *gaps* are legal here:
    /// they are detected and reported by the resolver for the ranges that
    /// actually touch them.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::EmptyCoverage`], [`ManifestError::ForeignPartition`],
    /// [`ManifestError::Unordered`] or [`ManifestError::Overlap`].
    pub fn validate(&self) -> Result<(), ManifestError> {
        for partition in &self.partitions {
            if partition.start >= partition.end {
                return Err(ManifestError::EmptyCoverage {
                    id: partition.id.clone(),
                });
            }
            if partition.dataset != self.dataset {
                return Err(ManifestError::ForeignPartition {
                    id: partition.id.clone(),
                    expected: self.dataset.clone(),
                    found: partition.dataset.clone(),
                });
            }
        }

        for pair in self.partitions.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.start < prev.start {
                return Err(ManifestError::Unordered {
                    prev: prev.id.clone(),
                    next: next.id.clone(),
                });
            }
            if next.start < prev.end {
                return Err(ManifestError::Overlap {
                    prev: prev.id.clone(),
                    next: next.id.clone(),
                });
            }
        }

        Ok(())
    }
}
