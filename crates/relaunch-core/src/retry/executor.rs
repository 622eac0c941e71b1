//! Retry executor

use std::future::Future;
use std::time::Instant;

use crate::types::RetryPolicy;

use super::error::RetryError;
use super::observer::{NoOpObserver, RetryObserver};
use super::strategies::{calculate_delay, AlwaysRetry, RetryPredicate};

/// Executes a fallible async operation according to a [`RetryPolicy`]
///
/// The predicate decides which errors are worth another attempt and the
/// observer is told about each attempt. Jitter is on by default.
///
/// ```rust
/// use relaunch_core::retry::{RetryExecutor, TracingObserver, TransientIoPredicate};
/// use relaunch_core::types::RetryPolicy;
///
/// let executor = RetryExecutor::new(RetryPolicy::copy_default())
///     .with_predicate(TransientIoPredicate)
///     .with_observer(TracingObserver::new("copy"))
///     .with_jitter(false);
/// ```
pub struct RetryExecutor<P = AlwaysRetry, O = NoOpObserver> {
    policy: RetryPolicy,
    predicate: P,
    observer: O,
    jitter: bool,
}

impl RetryExecutor<AlwaysRetry, NoOpObserver> {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            predicate: AlwaysRetry,
            observer: NoOpObserver,
            jitter: true,
        }
    }
}

impl<P, O> RetryExecutor<P, O> {
    /// Replace the predicate that classifies errors
    pub fn with_predicate<P2>(self, predicate: P2) -> RetryExecutor<P2, O> {
        RetryExecutor {
            policy: self.policy,
            predicate,
            observer: self.observer,
            jitter: self.jitter,
        }
    }

    /// Replace the attempt observer
    pub fn with_observer<O2>(self, observer: O2) -> RetryExecutor<P, O2> {
        RetryExecutor {
            policy: self.policy,
            predicate: self.predicate,
            observer,
            jitter: self.jitter,
        }
    }

    /// Enable or disable up to 25% random jitter on each delay
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl<P, O> RetryExecutor<P, O>
where
    O: RetryObserver,
{
    /// Run `op` until it succeeds, the predicate rejects an error, or the
    /// policy's attempt budget is spent
    pub async fn execute<F, Fut, T, E>(&self, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + 'static,
        P: RetryPredicate<E>,
    {
        let start = Instant::now();
        let max_attempts = self.policy.max_attempts;

        for attempt in 1..=max_attempts {
            self.observer.on_attempt_start(attempt, max_attempts);

            let err = match op().await {
                Ok(value) => {
                    self.observer.on_success(attempt, start.elapsed());
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !self.predicate.should_retry(&err) {
                self.observer.on_cancelled(attempt, &err);
                return Err(RetryError::NonRetryable {
                    attempt,
                    source: err,
                });
            }

            if attempt == max_attempts {
                self.observer.on_exhausted(attempt, &err);
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    source: err,
                    elapsed: start.elapsed(),
                });
            }

            let delay = calculate_delay(&self.policy, attempt, self.jitter);
            self.observer.on_attempt_failed(attempt, &err, delay);

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        Err(RetryError::NoAttempts)
    }
}
