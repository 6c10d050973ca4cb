//! Retry policy: exponential backoff with additive jitter and the
//! non-retriable error allowlist.
//!
//! The retry loop itself lives in [`ResilientExecutor::with_retry`] since it
//! needs the executor's notifier, connectivity probe and cancellation token.
//!
//! [`ResilientExecutor::with_retry`]: crate::resilience::ResilientExecutor::with_retry

use std::time::Duration;

use rand::Rng;

use crate::error::{ConfigError, RemoteError};

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Error codes that are never retried.
const NON_RETRIABLE_CODES: &[&str] = &[
    "PGRST116",
    "404",
    "NOT_FOUND",
    "401",
    "UNAUTHORIZED",
    "403",
    "FORBIDDEN",
    "ABORTED",
    "ABORT_ERR",
];

/// Message fragments (lowercase) that are never retried.
const NON_RETRIABLE_MESSAGES: &[&str] = &[
    "not found",
    "no rows",
    "unauthorized",
    "forbidden",
    "permission denied",
    "aborted",
];

// == Retry Config ==
/// Backoff settings for one call site or executor.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry (before jitter)
    pub base_delay: Duration,
    /// Upper bound of the exponential part of the delay
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Upper bound of the random delay added to every backoff
    pub max_jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            backoff_multiplier: 2.0,
            max_jitter: Duration::from_millis(1000),
        }
    }
}

impl RetryConfig {
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Sets the jitter bound; `Duration::ZERO` disables jitter.
    pub fn max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "backoff_multiplier must be a finite value >= 1".to_string(),
            ));
        }
        if self.base_delay > self.max_delay {
            return Err(ConfigError::Invalid(
                "base_delay must not exceed max_delay".to_string(),
            ));
        }
        Ok(())
    }

    // == Backoff ==
    /// Exponential part of the delay before retry `attempt` (0-based):
    /// `min(base_delay * multiplier^attempt, max_delay)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let factor = self.backoff_multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let nanos = (self.base_delay.as_nanos() as f64 * factor).round();

        if nanos.is_nan() || nanos >= self.max_delay.as_nanos() as f64 {
            return self.max_delay;
        }
        if nanos < u64::MAX as f64 {
            Duration::from_nanos(nanos as u64)
        } else {
            Duration::from_secs_f64(nanos / NANOS_PER_SEC)
        }
    }

    /// Backoff plus a uniform random jitter in `[0, max_jitter]`.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let jitter_nanos = u64::try_from(self.max_jitter.as_nanos()).unwrap_or(u64::MAX);
        let jitter = if jitter_nanos > 0 {
            rand::thread_rng().gen_range(0..=jitter_nanos)
        } else {
            0
        };
        self.backoff_delay(attempt)
            .saturating_add(Duration::from_nanos(jitter))
    }

    /// Worst-case time spent sleeping between attempts.
    pub fn worst_case_delay(&self) -> Duration {
        (0..self.max_retries).fold(Duration::ZERO, |total, attempt| {
            total
                .saturating_add(self.backoff_delay(attempt))
                .saturating_add(self.max_jitter)
        })
    }
}

// == Classification ==
/// Returns true if `error` belongs to the non-retriable allowlist
/// (not found, unauthorized, forbidden, aborted).
pub fn is_non_retriable(error: &RemoteError) -> bool {
    if let Some(code) = error.code.as_deref() {
        if NON_RETRIABLE_CODES
            .iter()
            .any(|c| c.eq_ignore_ascii_case(code))
        {
            return true;
        }
    }

    let message = error.message.to_lowercase();
    NON_RETRIABLE_MESSAGES
        .iter()
        .any(|fragment| message.contains(fragment))
}
