//! Retry policy for transient fetch failures.
//!
//! A failed fetch is classified into a [`FailureKind`]; the [`RetryPolicy`]
//! decides whether to retry and computes an exponential backoff delay with
//! jitter. Permanent failures (client errors, malformed payloads) are never
//! retried - they fall straight through to the cache fallback path.

use std::time::Duration;

use rand::Rng;
use tracing::debug;

use super::error::FetchError;

/// Default maximum attempts, including the initial one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Default base delay for the first retry.
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Default maximum delay cap.
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(8);

/// Default backoff multiplier (doubles each attempt).
const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Maximum jitter added to delays.
const MAX_JITTER: Duration = Duration::from_millis(250);

/// Classification of fetch failure types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: timeout, connection refused, 5xx server errors.
    Transient,

    /// Server rate limiting (HTTP 429). Retried with backoff.
    RateLimited,

    /// Failure that won't succeed regardless of retries.
    ///
    /// Examples: 404 Not Found, malformed payload, unresolvable URL.
    Permanent,
}

/// Classifies a fetch error for retry purposes.
#[must_use]
pub fn classify_failure(error: &FetchError) -> FailureKind {
    match error {
        FetchError::Network { .. } | FetchError::Timeout { .. } => FailureKind::Transient,
        FetchError::HttpStatus { status, .. } => match status {
            429 => FailureKind::RateLimited,
            500..=599 => FailureKind::Transient,
            _ => FailureKind::Permanent,
        },
        FetchError::Malformed { .. } | FetchError::InvalidUrl { .. } => FailureKind::Permanent,
    }
}

/// Decision on whether to retry a failed fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Configuration for retry behavior with exponential backoff.
///
/// # Delay Calculation
///
/// ```text
/// delay = min(base_delay * multiplier^(attempt - 1), max_delay) + jitter
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Base delay for the first retry.
    base_delay: Duration,

    /// Maximum delay cap.
    max_delay: Duration,

    /// Multiplier applied each attempt (typically 2.0 for doubling).
    backoff_multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Creates a retry policy with custom settings.
    ///
    /// `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// A policy that never retries; every failure falls through immediately.
    #[must_use]
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO, 1.0)
    }

    /// Decides whether attempt `attempt` (1-indexed, the one that just
    /// failed) should be followed by another.
    #[must_use]
    pub fn should_retry(&self, kind: FailureKind, attempt: u32) -> RetryDecision {
        if kind == FailureKind::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure".to_owned(),
            };
        }
        if attempt >= self.max_attempts {
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) reached", self.max_attempts),
            };
        }

        let next_attempt = attempt + 1;
        let delay = self.delay_for_attempt(attempt);
        debug!(?delay, attempt = next_attempt, "scheduling retry");
        RetryDecision::Retry {
            delay,
            attempt: next_attempt,
        }
    }

    /// Computes the backoff delay after `attempt` failures, with jitter.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let factor = self.backoff_multiplier.powi(exponent as i32);
        let base_ms = self.base_delay.as_millis() as f32 * factor;
        let capped = Duration::from_millis(base_ms as u64).min(self.max_delay);

        let jitter_ms = rand::thread_rng().gen_range(0..=MAX_JITTER.as_millis() as u64);
        capped + Duration::from_millis(jitter_ms)
    }
}
