//! Scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected scheduler settings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be greater than zero")]
    ZeroInterval { name: &'static str },

    #[error("clear interval ({clear:?}) must be longer than request interval ({request:?})")]
    ClearNotLongerThanRequest { request: Duration, clear: Duration },
}

/// Timing of the scheduler's periodic work.
///
/// Deserializes from JSON with every field optional:
///
/// ```
/// use std::time::Duration;
/// use rtcache::background::SchedulerConfig;
///
/// let config: SchedulerConfig = serde_json::from_str(r#"{"clear_interval_ms": 10000}"#).unwrap();
/// assert_eq!(config.request_interval(), Duration::from_secs(1));
/// assert_eq!(config.clear_interval(), Duration::from_secs(10));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Period between issued requests, in milliseconds.
    #[serde(default = "default_request_interval_ms")]
    pub request_interval_ms: u64,
    /// Period between full cache clears, in milliseconds.
    #[serde(default = "default_clear_interval_ms")]
    pub clear_interval_ms: u64,
    /// Overall deadline for one request including its body, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_interval_ms() -> u64 {
    1_000
}

fn default_clear_interval_ms() -> u64 {
    5_000
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            request_interval_ms: default_request_interval_ms(),
            clear_interval_ms: default_clear_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl SchedulerConfig {
    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }

    pub fn clear_interval(&self) -> Duration {
        Duration::from_millis(self.clear_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Checks that all periods are non-zero and that clears are rarer than
    /// requests, so most requests between two clears are cache hits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("request_interval_ms", self.request_interval_ms),
            ("clear_interval_ms", self.clear_interval_ms),
            ("request_timeout_ms", self.request_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroInterval { name });
            }
        }
        if self.clear_interval_ms <= self.request_interval_ms {
            return Err(ConfigError::ClearNotLongerThanRequest {
                request: self.request_interval(),
                clear: self.clear_interval(),
            });
        }
        Ok(())
    }
}
