//! Bounded backoff for transient transport failures
//!
//! A [`Backoff`] is the retry schedule of a single request: it decides whether a
//! failure is worth another attempt and how long to wait first. Rate-limit
//! responses never consult it; the fetcher waits for the quota reset on its own
//! and those waits do not use up attempts. HTTP error statuses are permanent.
//!
//! # Example
//!
//! ```
//! use issue_archive::config::RetryConfig;
//! use issue_archive::retry::{Backoff, IsRetryable};
//!
//! struct Flaky;
//!
//! impl IsRetryable for Flaky {
//!     fn is_retryable(&self) -> bool {
//!         true
//!     }
//! }
//!
//! let config = RetryConfig { max_attempts: 2, jitter: false, ..RetryConfig::default() };
//! let mut backoff = Backoff::new(&config);
//! assert!(backoff.next_delay(&Flaky).is_some());
//! assert!(backoff.next_delay(&Flaky).is_some());
//! assert!(backoff.next_delay(&Flaky).is_none());
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, refused or reset connections, truncated bodies)
/// should return `true`. Permanent failures should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => e.is_timeout() || e.is_connect() || e.is_body(),
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
            // Surfaced with status and reason, never retried
            Error::Http { .. } => false,
            // Attacker-influenced links must not be retried into
            Error::OriginMismatch { .. } => false,
            Error::Database(_) | Error::Sqlx(_) => false,
            Error::Config { .. } => false,
            Error::InvalidUrl(_) => false,
            Error::Serialization(_) => false,
            Error::Archive(_) => false,
            Error::UnsafePath { .. } | Error::DuplicatePath(_) => false,
        }
    }
}

/// Exponential backoff state for one request
#[derive(Debug)]
pub struct Backoff<'a> {
    config: &'a RetryConfig,
    retries: u32,
    delay: Duration,
}

impl<'a> Backoff<'a> {
    /// Start a fresh schedule
    pub fn new(config: &'a RetryConfig) -> Self {
        Self {
            config,
            retries: 0,
            delay: config.initial_delay,
        }
    }

    /// Retries granted so far
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// How long to wait before retrying after `error`
    ///
    /// `None` when the error is permanent or `max_attempts` retries are spent.
    /// Each granted retry doubles (by `backoff_multiplier`) the next base delay,
    /// capped at `max_delay`.
    pub fn next_delay<E: IsRetryable>(&mut self, error: &E) -> Option<Duration> {
        if !error.is_retryable() || self.retries >= self.config.max_attempts {
            return None;
        }
        self.retries += 1;

        let wait = if self.config.jitter {
            add_jitter(self.delay)
        } else {
            self.delay
        };
        let next = Duration::from_secs_f64(self.delay.as_secs_f64() * self.config.backoff_multiplier);
        self.delay = next.min(self.config.max_delay);
        Some(wait)
    }
}

/// Add random jitter to a delay
///
/// The result is uniformly distributed between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
