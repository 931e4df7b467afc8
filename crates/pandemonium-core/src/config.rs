//! Session configuration.
//!
//! ```ignore
//! use pandemonium_core::config::SessionConfig;
//!
//! let config = SessionConfig::builder()
//!     .spawn_interval(Duration::from_secs(10))
//!     .build();
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Default tick intervals and limits.
pub mod timing {
    use std::time::Duration;

    /// Interval between process scans while no game is attached
    pub const SCAN_INTERVAL: Duration = Duration::from_secs(5);

    /// Interval between game-state polls while attached
    pub const STATE_POLL_INTERVAL: Duration = Duration::from_millis(500);

    /// Unpaused play time between two spawn decisions
    pub const SPAWN_INTERVAL: Duration = Duration::from_secs(20);

    /// Candidate draws per spawn decision
    pub const MAX_SPAWN_ATTEMPTS: u32 = 5;

    /// First delay before re-checking a process that failed the compatibility check
    pub const RETRY_INITIAL_DELAY: Duration = Duration::from_secs(5);

    pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(60);

    pub const MAX_COMPATIBILITY_RETRIES: u32 = 5;
}

/// Timing and retry settings for a race session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    #[serde(rename = "scan_interval_ms", with = "millis")]
    pub scan_interval: Duration,
    #[serde(rename = "state_poll_interval_ms", with = "millis")]
    pub state_poll_interval: Duration,
    #[serde(rename = "spawn_interval_ms", with = "millis")]
    pub spawn_interval: Duration,
    pub max_spawn_attempts: u32,
    /// Policy for processes that match by name but fail the compatibility check
    pub retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scan_interval: timing::SCAN_INTERVAL,
            state_poll_interval: timing::STATE_POLL_INTERVAL,
            spawn_interval: timing::SPAWN_INTERVAL,
            max_spawn_attempts: timing::MAX_SPAWN_ATTEMPTS,
            retry: RetryPolicy::default(),
        }
    }
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }
}

/// Builder for [`SessionConfig`]; unset fields keep their defaults.
#[derive(Debug, Clone, Default)]
pub struct SessionConfigBuilder {
    scan_interval: Option<Duration>,
    state_poll_interval: Option<Duration>,
    spawn_interval: Option<Duration>,
    max_spawn_attempts: Option<u32>,
    retry: Option<RetryPolicy>,
}

impl SessionConfigBuilder {
    pub fn scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = Some(interval);
        self
    }

    pub fn state_poll_interval(mut self, interval: Duration) -> Self {
        self.state_poll_interval = Some(interval);
        self
    }

    pub fn spawn_interval(mut self, interval: Duration) -> Self {
        self.spawn_interval = Some(interval);
        self
    }

    pub fn max_spawn_attempts(mut self, attempts: u32) -> Self {
        self.max_spawn_attempts = Some(attempts);
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn build(self) -> SessionConfig {
        let default = SessionConfig::default();
        SessionConfig {
            scan_interval: self.scan_interval.unwrap_or(default.scan_interval),
            state_poll_interval: self
                .state_poll_interval
                .unwrap_or(default.state_poll_interval),
            spawn_interval: self.spawn_interval.unwrap_or(default.spawn_interval),
            max_spawn_attempts: self.max_spawn_attempts.unwrap_or(default.max_spawn_attempts),
            retry: self.retry.unwrap_or(default.retry),
        }
    }
}

/// Durations as whole milliseconds.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
