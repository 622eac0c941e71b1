//! Policy-driven retry engine
//!
//! Every retrying stage of an update (asset download, file copy over a
//! possibly locked target, directory swap) runs through [`RetryExecutor`]
//! with a [`RetryPolicy`](crate::types::RetryPolicy) taken from the runtime
//! configuration, so the attempt counts and delays are tunable without code
//! changes.
//!
//! ```rust,no_run
//! use relaunch_core::retry::{RetryError, RetryExecutor, TransientIoPredicate};
//! use relaunch_core::types::RetryPolicy;
//!
//! async fn example() -> Result<u64, RetryError<std::io::Error>> {
//!     RetryExecutor::new(RetryPolicy::copy_default())
//!         .with_predicate(TransientIoPredicate)
//!         .execute(|| async { std::fs::copy("a", "b") })
//!         .await
//! }
//! ```

mod error;
mod executor;
mod observer;
mod strategies;

pub use error::RetryError;
pub use executor::RetryExecutor;
pub use observer::{NoOpObserver, RetryObserver, TracingObserver};
pub use strategies::{
    calculate_delay, AlwaysRetry, HttpStatusError, HttpStatusPredicate,
    RetryPredicate, TransientIoPredicate,
};
