//! Staleness classification for retrieved or cached data.
//!
//! Freshness is derived on every read from the age of the data; it is never
//! stored. Thresholds are fixed: under an hour is fresh, under a day recent,
//! under a week stale, anything older outdated. Negative ages (clock skew
//! between producer and consumer) classify as fresh.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// Age below which data is [`FreshnessStatus::Fresh`].
const FRESH_LIMIT: Duration = Duration::hours(1);

/// Age below which data is [`FreshnessStatus::Recent`].
const RECENT_LIMIT: Duration = Duration::hours(24);

/// Age below which data is [`FreshnessStatus::Stale`]; at or past this it is
/// [`FreshnessStatus::Outdated`].
const STALE_LIMIT: Duration = Duration::days(7);

/// Derived staleness classification of a piece of data.
///
/// Ordered from freshest to stalest, so comparisons express "more stale
/// than" directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessStatus {
    /// Retrieved within the last hour.
    Fresh,
    /// Retrieved within the last day.
    Recent,
    /// Retrieved within the last week.
    Stale,
    /// Older than a week.
    Outdated,
}

impl FreshnessStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Recent => "recent",
            Self::Stale => "stale",
            Self::Outdated => "outdated",
        }
    }

    /// Presentation hint: stale and outdated data should draw attention
    /// (badge pulse or similar). The rendering itself is not this crate's
    /// concern.
    #[must_use]
    pub const fn needs_attention(self) -> bool {
        matches!(self, Self::Stale | Self::Outdated)
    }
}

impl Display for FreshnessStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies data retrieved at `stored_at`, as seen from `now`.
///
/// Total over all ages, including negative ones.
#[must_use]
pub fn classify(stored_at: OffsetDateTime, now: OffsetDateTime) -> FreshnessStatus {
    let age = now - stored_at;
    if age < FRESH_LIMIT {
        FreshnessStatus::Fresh
    } else if age < RECENT_LIMIT {
        FreshnessStatus::Recent
    } else if age < STALE_LIMIT {
        FreshnessStatus::Stale
    } else {
        FreshnessStatus::Outdated
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2024-04-01 12:00:00 UTC);

    #[test]
    fn classifies_spec_ages() {
        assert_eq!(classify(NOW - Duration::minutes(30), NOW), FreshnessStatus::Fresh);
        assert_eq!(classify(NOW - Duration::hours(10), NOW), FreshnessStatus::Recent);
        assert_eq!(classify(NOW - Duration::days(3), NOW), FreshnessStatus::Stale);
        assert_eq!(classify(NOW - Duration::days(10), NOW), FreshnessStatus::Outdated);
    }

    #[test]
    fn boundaries_are_exclusive_on_the_fresh_side() {
        assert_eq!(classify(NOW - Duration::hours(1), NOW), FreshnessStatus::Recent);
        assert_eq!(classify(NOW - Duration::hours(24), NOW), FreshnessStatus::Stale);
        assert_eq!(classify(NOW - Duration::days(7), NOW), FreshnessStatus::Outdated);
    }

    #[test]
    fn negative_age_is_fresh() {
        // Producer clock ahead of ours.
        assert_eq!(classify(NOW + Duration::hours(5), NOW), FreshnessStatus::Fresh);
    }

    #[test]
    fn classification_is_monotonic_in_age() {
        let ages_minutes = [0i64, 30, 59, 60, 600, 1439, 1440, 4320, 10079, 10080, 14400];
        let mut last = FreshnessStatus::Fresh;
        for minutes in ages_minutes {
            let status = classify(NOW - Duration::minutes(minutes), NOW);
            assert!(
                status >= last,
                "older data classified fresher: {minutes}min -> {status}, previous {last}"
            );
            last = status;
        }
    }

    #[test]
    fn attention_flag_covers_stale_and_outdated() {
        assert!(!FreshnessStatus::Fresh.needs_attention());
        assert!(!FreshnessStatus::Recent.needs_attention());
        assert!(FreshnessStatus::Stale.needs_attention());
        assert!(FreshnessStatus::Outdated.needs_attention());
    }
}
