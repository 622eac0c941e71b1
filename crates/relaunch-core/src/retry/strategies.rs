//! Backoff calculation and retry predicates

use crate::types::{RetryPolicy, RetryStrategy};
use rand::Rng;
use std::io;
use std::time::Duration;

/// Delay to wait after the given (1-indexed) failed attempt
///
/// The base delay is capped at `max_delay_ms`; jitter then adds up to 25%.
///
/// ```rust
/// use relaunch_core::retry::calculate_delay;
/// use relaunch_core::types::{RetryPolicy, RetryStrategy};
///
/// let policy = RetryPolicy {
///     max_attempts: 3,
///     strategy: RetryStrategy::ExponentialBackoff,
///     backoff_multiplier: 2.0,
///     initial_delay_ms: 1000,
///     max_delay_ms: 30000,
/// };
///
/// assert_eq!(calculate_delay(&policy, 1, false).as_millis(), 1000);
/// assert_eq!(calculate_delay(&policy, 2, false).as_millis(), 2000);
/// ```
pub fn calculate_delay(policy: &RetryPolicy, attempt: u32, jitter: bool) -> Duration {
    let attempt_index = attempt.saturating_sub(1);

    let base_delay_ms = match policy.strategy {
        RetryStrategy::None => 0,
        RetryStrategy::FixedDelay => policy.initial_delay_ms,
        RetryStrategy::ExponentialBackoff => {
            let multiplier = policy.backoff_multiplier.powf(attempt_index as f64);
            (policy.initial_delay_ms as f64 * multiplier) as u64
        }
        RetryStrategy::LinearBackoff => {
            policy.initial_delay_ms.saturating_mul(attempt_index as u64 + 1)
        }
    };

    let capped_delay_ms = base_delay_ms.min(policy.max_delay_ms);

    let final_delay_ms = if jitter && capped_delay_ms > 0 {
        let jitter_range = capped_delay_ms / 4;
        capped_delay_ms + rand::rng().random_range(0..=jitter_range)
    } else {
        capped_delay_ms
    };

    Duration::from_millis(final_delay_ms)
}

/// Decides whether an error deserves another attempt
pub trait RetryPredicate<E: ?Sized>: Send + Sync {
    fn should_retry(&self, error: &E) -> bool;
}

/// Retries every error
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl<E: ?Sized> RetryPredicate<E> for AlwaysRetry {
    fn should_retry(&self, _error: &E) -> bool {
        true
    }
}

/// Retries I/O errors that can clear up on their own
///
/// A file that is still mapped by an exiting process surfaces as
/// `PermissionDenied` on Windows and as `ResourceBusy`/`Other` elsewhere, so
/// only errors that can never succeed on a second try are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransientIoPredicate;

impl RetryPredicate<io::Error> for TransientIoPredicate {
    fn should_retry(&self, error: &io::Error) -> bool {
        !matches!(
            error.kind(),
            io::ErrorKind::NotFound
                | io::ErrorKind::InvalidInput
                | io::ErrorKind::InvalidData
                | io::ErrorKind::Unsupported
        )
    }
}

/// Errors that may carry an HTTP status
pub trait HttpStatusError {
    fn status_code(&self) -> Option<u16>;
}

/// Retries transport failures and the listed HTTP statuses
#[derive(Debug, Clone)]
pub struct HttpStatusPredicate {
    retryable_codes: Vec<u16>,
}

impl HttpStatusPredicate {
    /// 408, 425, 429, 500, 502, 503, 504
    pub fn default_http() -> Self {
        Self {
            retryable_codes: vec![408, 425, 429, 500, 502, 503, 504],
        }
    }

    pub fn with_codes(codes: Vec<u16>) -> Self {
        Self {
            retryable_codes: codes,
        }
    }

    pub fn is_retryable_code(&self, code: u16) -> bool {
        self.retryable_codes.contains(&code)
    }
}

impl<E: HttpStatusError> RetryPredicate<E> for HttpStatusPredicate {
    fn should_retry(&self, error: &E) -> bool {
        // no status means the request never completed
        error
            .status_code()
            .map(|code| self.is_retryable_code(code))
            .unwrap_or(true)
    }
}
