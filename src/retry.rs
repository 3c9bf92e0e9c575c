//! Retry logic with exponential backoff
//!
//! Used by the retry worker to re-submit torrents whose first submission failed with a
//! transient error. Implements exponential backoff with optional jitter so that a download
//! client recovering from an outage is not hit by every failed batch at once.
//!
//! # Example
//!
//! ```no_run
//! use bangumi_dispatch::retry::{IsRetryable, retry_with_backoff};
//! use bangumi_dispatch::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! let result = retry_with_backoff(&config, || async {
//!     Ok::<_, MyError>(())
//! })
//! .await
//! .map_err(|failure| failure.error)?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{DispatchError, Error};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, connection resets, client busy) should return `true`.
/// Permanent failures (bad credentials, rejected torrent, corrupt data) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for DispatchError {
    fn is_retryable(&self) -> bool {
        match self {
            DispatchError::Transient(_) => true,
            // Credentials will not fix themselves between attempts
            DispatchError::Unauthorized(_) => false,
            DispatchError::Rejected(_) => false,
        }
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Dispatch(e) => e.is_retryable(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            // SQLite reports lock contention as a transient busy error
            Error::Sqlx(sqlx::Error::PoolTimedOut) => true,
            Error::Persistence { message, .. } => {
                message.contains("locked") || message.contains("busy")
            }
            Error::Config { .. }
            | Error::Database(_)
            | Error::Sqlx(_)
            | Error::QueueFull { .. }
            | Error::ShuttingDown
            | Error::Serialization(_)
            | Error::Other(_) => false,
        }
    }
}

/// Error returned once retrying stops
#[derive(Debug)]
pub struct RetryFailure<E> {
    /// Error from the last attempt
    pub error: E,
    /// Number of attempts made, including the first
    pub attempts: u32,
}

/// Execute an async operation with exponential backoff retry logic
///
/// The operation runs once immediately and is retried up to `config.max_attempts` more
/// times while it fails with a retryable error.
///
/// # Returns
///
/// The successful result, or the last error together with the number of attempts made.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, RetryFailure<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(backoff_delay(config, delay)).await;

                let next_delay =
                    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next_delay.min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(error = %e, "Operation failed with non-retryable error");
                }
                return Err(RetryFailure {
                    error: e,
                    attempts: attempt + 1,
                });
            }
        }
    }
}

/// Delay to actually sleep for, with jitter applied when enabled
pub(crate) fn backoff_delay(config: &RetryConfig, delay: Duration) -> Duration {
    if config.jitter {
        add_jitter(delay)
    } else {
        delay
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The result is uniformly distributed between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    let jittered_secs = delay.as_secs_f64() * (1.0 + jitter_factor);
    Duration::from_secs_f64(jittered_secs)
}
