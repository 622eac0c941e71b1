//! Errors produced by the retry engine

use std::time::Duration;
use thiserror::Error;

/// Why a retried operation ultimately failed
///
/// Generic over `E`, the error type of the operation being retried.
#[derive(Debug, Error)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// Every attempt allowed by the policy failed
    #[error("gave up after {attempts} attempts over {:.2}s: {source}", .elapsed.as_secs_f64())]
    Exhausted {
        attempts: u32,
        #[source]
        source: E,
        elapsed: Duration,
    },

    /// The predicate classified the error as permanent
    #[error("non-retryable failure on attempt {attempt}: {source}")]
    NonRetryable {
        attempt: u32,
        #[source]
        source: E,
    },

    /// The policy allowed zero attempts, so the operation never ran
    #[error("retry policy allows no attempts")]
    NoAttempts,
}

impl<E> RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// Number of attempts that were made
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::NonRetryable { attempt, .. } => *attempt,
            RetryError::NoAttempts => 0,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    pub fn is_non_retryable(&self) -> bool {
        matches!(self, RetryError::NonRetryable { .. })
    }

    /// The error from the last attempt, if any attempt ran
    pub fn into_source(self) -> Option<E> {
        match self {
            RetryError::Exhausted { source, .. } | RetryError::NonRetryable { source, .. } => {
                Some(source)
            }
            RetryError::NoAttempts => None,
        }
    }

    /// Borrow the error from the last attempt
    pub fn last_error(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { source, .. } | RetryError::NonRetryable { source, .. } => {
                Some(source)
            }
            RetryError::NoAttempts => None,
        }
    }
}
