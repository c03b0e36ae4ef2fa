//! Retry with exponential backoff and randomized request pacing
//!
//! [`retry`] wraps any fallible async operation over some mutable state.
//! The operation is re-run until it succeeds or the policy's attempts are
//! used up, sleeping `initial_delay`, `initial_delay * factor`, ... between
//! attempts. The last error is returned when every attempt failed.
//!
//! | Setting | Default |
//! |---------|---------|
//! | Attempts | 3 |
//! | First delay | 2s |
//! | Backoff factor | x2 |

use crate::ScrapeError;
use rand::Rng;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Boxed future borrowing the retried state for `'a`
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Attempt count and backoff schedule
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            initial_delay,
            backoff_factor,
        }
    }

    /// The sleeps between consecutive attempts (one fewer than attempts)
    pub fn delays(&self) -> Vec<Duration> {
        let mut delays = Vec::new();
        let mut delay = self.initial_delay;
        for _ in 1..self.max_attempts.max(1) {
            delays.push(delay);
            delay = delay.mul_f64(self.backoff_factor);
        }
        delays
    }
}

/// Runs `op` against `state` until it succeeds or the policy gives up
///
/// Every error is treated as retryable.
///
/// # Example
///
/// ```
/// use homescrape::retry::{retry, RetryPolicy};
/// use std::time::Duration;
///
/// # tokio_test_block(async {
/// let policy = RetryPolicy::new(2, Duration::from_millis(1), 2.0);
/// let mut calls = 0;
/// let result = retry(&policy, &mut calls, |calls| {
///     Box::pin(async move {
///         *calls += 1;
///         if *calls < 2 {
///             Err(homescrape::ScrapeError::NoSession)
///         } else {
///             Ok(*calls)
///         }
///     })
/// })
/// .await;
/// assert_eq!(result.unwrap(), 2);
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Runtime::new().unwrap().block_on(f)
/// # }
/// ```
pub async fn retry<S, T, F>(policy: &RetryPolicy, state: &mut S, mut op: F) -> Result<T, ScrapeError>
where
    S: ?Sized + Send,
    T: Send,
    F: for<'a> FnMut(&'a mut S) -> BoxFuture<'a, Result<T, ScrapeError>> + Send,
{
    let attempts = policy.max_attempts.max(1);
    let mut delays = policy.delays().into_iter();
    let mut attempt = 1;

    loop {
        match op(&mut *state).await {
            Ok(value) => return Ok(value),
            Err(e) => match delays.next() {
                Some(delay) => {
                    tracing::warn!(
                        "Attempt {}/{} failed: {}; retrying in {:?}",
                        attempt,
                        attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => {
                    tracing::error!("All {} attempts failed: {}", attempts, e);
                    return Err(e);
                }
            },
        }
    }
}

/// Sleeps for a random duration in `min..=max`
///
/// Used between page loads and listings so request timing is not uniform.
pub async fn random_delay(min: Duration, max: Duration) {
    let delay = if max > min {
        rand::thread_rng().gen_range(min..=max)
    } else {
        min
    };
    tokio::time::sleep(delay).await;
}
