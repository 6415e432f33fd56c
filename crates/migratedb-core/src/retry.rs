//! Bounded retry with fixed or exponential backoff.

use crate::error::{Error, Result};
use std::time::Duration;
use tracing::warn;

/// Retries used when creating the schema history table.
pub const CREATE_RETRIES: u32 = 10;

/// Pause between schema history creation attempts.
pub const CREATE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// How often and how long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Double the delay after every retry.
    pub exponential: bool,
}

impl RetryPolicy {
    /// The same delay between every attempt.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay: delay,
            max_delay: delay,
            exponential: false,
        }
    }

    /// Start at one second and double up to `max_delay`.
    pub fn exponential(max_retries: u32, max_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_secs(1).min(max_delay),
            max_delay,
            exponential: true,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        if !self.exponential {
            return self.initial_delay.min(self.max_delay);
        }
        let shift = retry.saturating_sub(1).min(16);
        let factor = 1_u32.checked_shl(shift).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the policy gives up.
///
/// `retryable` decides which errors are worth another attempt; everything
/// else is returned immediately.
pub fn retry<T, F, P>(what: &str, policy: RetryPolicy, retryable: P, mut op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
    P: Fn(&Error) -> bool,
{
    let mut retries = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) => {
                if retries >= policy.max_retries || !retryable(&err) {
                    return Err(err);
                }
                retries += 1;
                let delay = policy.delay_for(retries);
                warn!(
                    operation = what,
                    retry = retries,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying"
                );
                std::thread::sleep(delay);
            }
        }
    }
}

/// Retry any failure with a fixed delay.
pub fn with_fixed_backoff<T, F>(what: &str, retries: u32, delay: Duration, op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    retry(what, RetryPolicy::fixed(retries, delay), |_| true, op)
}

/// Retry transient failures with exponential backoff bounded by `max_delay`.
pub fn with_exponential_backoff<T, F>(what: &str, retries: u32, max_delay: Duration, op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    retry(
        what,
        RetryPolicy::exponential(retries, max_delay),
        Error::is_transient,
        op,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient() -> Error {
        Error::History {
            table: "history".to_string(),
            message: "busy".to_string(),
        }
    }

    #[test]
    fn test_exponential_delays_are_capped() {
        let policy = RetryPolicy::exponential(10, Duration::from_secs(5));
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(5));
        assert_eq!(policy.delay_for(40), Duration::from_secs(5));
    }

    #[test]
    fn test_fixed_delay() {
        let policy = RetryPolicy::fixed(CREATE_RETRIES, CREATE_RETRY_DELAY);
        assert_eq!(policy.delay_for(1), CREATE_RETRY_DELAY);
        assert_eq!(policy.delay_for(9), CREATE_RETRY_DELAY);
    }

    #[test]
    fn test_retry_until_success() {
        let mut calls = 0;
        let result = with_fixed_backoff("create", 3, Duration::ZERO, || {
            calls += 1;
            if calls < 3 {
                Err(transient())
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_retry_gives_up() {
        let mut calls = 0;
        let result: Result<()> = with_fixed_backoff("create", 2, Duration::ZERO, || {
            calls += 1;
            Err(transient())
        });
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_permanent_errors_are_not_retried() {
        let mut calls = 0;
        let result: Result<()> = with_exponential_backoff("connect", 5, Duration::ZERO, || {
            calls += 1;
            Err(Error::TargetVersionNotFound {
                target: "3".to_string(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
