//! Retry strategies for processes that fail the compatibility check.
//!
//! A process whose executable matches but whose memory is not (yet) readable
//! may be loading, or may be a different program with the same name. The
//! watcher retries it a bounded number of times and then ignores its pid.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::timing;

/// Decides whether and when to retry after a failed attempt.
pub trait RetryStrategy: Send + Sync + fmt::Debug {
    /// Delay before retry number `retry` (1-based), `None` once exhausted.
    fn delay_for(&self, retry: u32) -> Option<Duration>;

    /// Upper bound on retries.
    fn max_retries(&self) -> u32;
}

/// The same delay before every retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay {
    pub delay: Duration,
    pub max_retries: u32,
}

impl FixedDelay {
    pub fn new(delay: Duration, max_retries: u32) -> Self {
        Self { delay, max_retries }
    }
}

impl RetryStrategy for FixedDelay {
    fn delay_for(&self, retry: u32) -> Option<Duration> {
        (retry >= 1 && retry <= self.max_retries).then_some(self.delay)
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

/// Doubling delay, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub max: Duration,
    pub max_retries: u32,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration, max_retries: u32) -> Self {
        Self {
            initial,
            max,
            max_retries,
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(
            timing::RETRY_INITIAL_DELAY,
            timing::RETRY_MAX_DELAY,
            timing::MAX_COMPATIBILITY_RETRIES,
        )
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn delay_for(&self, retry: u32) -> Option<Duration> {
        if retry == 0 || retry > self.max_retries {
            return None;
        }
        let factor = 1u32.checked_shl(retry - 1).unwrap_or(u32::MAX);
        Some(self.initial.saturating_mul(factor).min(self.max))
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

/// Give up after the first failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NoRetry;

impl RetryStrategy for NoRetry {
    fn delay_for(&self, _retry: u32) -> Option<Duration> {
        None
    }

    fn max_retries(&self) -> u32 {
        0
    }
}

/// Serializable choice of [`RetryStrategy`], as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RetryPolicy {
    Fixed {
        delay_ms: u64,
        max_retries: u32,
    },
    Exponential {
        initial_ms: u64,
        max_ms: u64,
        max_retries: u32,
    },
    Never,
}

impl RetryPolicy {
    pub fn strategy(&self) -> Box<dyn RetryStrategy> {
        match *self {
            RetryPolicy::Fixed {
                delay_ms,
                max_retries,
            } => Box::new(FixedDelay::new(Duration::from_millis(delay_ms), max_retries)),
            RetryPolicy::Exponential {
                initial_ms,
                max_ms,
                max_retries,
            } => Box::new(ExponentialBackoff::new(
                Duration::from_millis(initial_ms),
                Duration::from_millis(max_ms),
                max_retries,
            )),
            RetryPolicy::Never => Box::new(NoRetry),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::Exponential {
            initial_ms: timing::RETRY_INITIAL_DELAY.as_millis() as u64,
            max_ms: timing::RETRY_MAX_DELAY.as_millis() as u64,
            max_retries: timing::MAX_COMPATIBILITY_RETRIES,
        }
    }
}
