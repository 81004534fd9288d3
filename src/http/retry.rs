//! Retry policy for transient server failures.

use reqwest::StatusCode;
use std::time::Duration;

/// Delay between the original attempt and its retry, in milliseconds.
pub const RETRY_DELAY_MS: u64 = 1000;

/// Number of times a logical request may be re-issued.
pub const MAX_RETRIES: usize = 1;

/// Lowest status code treated as a transient server failure.
pub const RETRYABLE_STATUS_THRESHOLD: u16 = 500;

/// Decides whether a received response earns another attempt.
///
/// Only responses are considered: a request that never got a response is
/// surfaced immediately as a network error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    pub max_retries: usize,
    pub status_threshold: u16,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(RETRY_DELAY_MS),
            max_retries: MAX_RETRIES,
            status_threshold: RETRYABLE_STATUS_THRESHOLD,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn is_retryable_status(&self, status: StatusCode) -> bool {
        status.as_u16() >= self.status_threshold
    }

    /// Starts tracking a new logical request.
    pub(crate) fn attempt(&self) -> RetryState<'_> {
        RetryState {
            policy: self,
            retries: 0,
        }
    }
}

/// Per-request retry bookkeeping.
pub(crate) struct RetryState<'a> {
    policy: &'a RetryPolicy,
    retries: usize,
}

impl RetryState<'_> {
    /// Returns true and consumes one retry when `status` qualifies and the
    /// request has retries left.
    pub(crate) fn should_retry(&mut self, status: StatusCode) -> bool {
        if !self.policy.is_retryable_status(status) || self.retries >= self.policy.max_retries {
            return false;
        }
        self.retries += 1;
        true
    }

    pub(crate) fn retried(&self) -> bool {
        self.retries > 0
    }

    pub(crate) fn delay(&self) -> Duration {
        self.policy.delay
    }
}
