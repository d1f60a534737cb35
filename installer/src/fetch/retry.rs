//! Bounded retry with exponential backoff.
//!
//! Only errors for which [`InstallerError::is_retryable`] holds are retried;
//! everything else is returned on first occurrence.

use crate::error::{InstallerError, Result};
use log::warn;
use std::time::Duration;

/// Upper bound on a single backoff delay.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// How many times to attempt an operation and how long to wait in between.
///
/// # Examples
///
/// ```
/// use formula_installer::fetch::retry::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(3, Duration::from_millis(500));
/// assert_eq!(policy.delay_before(2), Duration::from_millis(500));
/// assert_eq!(policy.delay_before(3), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    initial_backoff: Duration,
}

impl RetryPolicy {
    /// Create a policy; an attempt count of zero is treated as one.
    #[must_use]
    pub const fn new(attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            attempts: if attempts == 0 { 1 } else { attempts },
            initial_backoff,
        }
    }

    /// A policy that runs the operation exactly once.
    #[must_use]
    pub const fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Total number of attempts.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay to wait before the 1-based `attempt`.
    ///
    /// The first attempt runs immediately; each later one doubles the delay,
    /// capped at thirty seconds.
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 1_u32.checked_shl(attempt - 2).unwrap_or(u32::MAX);
        self.initial_backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempts are exhausted.
    ///
    /// `operation` receives the 1-based attempt number. `sleep` is called
    /// with each backoff delay.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or the last retryable one once
    /// every attempt has failed.
    pub fn run<T>(
        &self,
        mut operation: impl FnMut(u32) -> Result<T>,
        sleep: &dyn Fn(Duration),
    ) -> Result<T> {
        let mut attempt = 1;
        loop {
            match operation(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if should_retry(&err, attempt, self.attempts) => {
                    attempt += 1;
                    let delay = self.delay_before(attempt);
                    warn!(
                        "{err}; retrying in {}ms (attempt {attempt} of {})",
                        delay.as_millis(),
                        self.attempts
                    );
                    sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

const fn should_retry(err: &InstallerError, attempt: u32, attempts: u32) -> bool {
    err.is_retryable() && attempt < attempts
}
