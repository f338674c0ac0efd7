//! Configuration types
//!
//! Timing budgets for the synchronization layer. Loaded from environment
//! variables with defaults matching the dashboard's interactive budgets.

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Hard budget for the initial session request.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(2);
/// Abort budget for a profile request.
pub const DEFAULT_PROFILE_TIMEOUT: Duration = Duration::from_secs(3);
/// How long a fetched profile is reused for the same user.
pub const DEFAULT_PROFILE_TTL: Duration = Duration::from_secs(30);
/// How long a fetched metrics dataset is served from cache.
pub const DEFAULT_DATASET_TTL: Duration = Duration::from_secs(15 * 60);
/// Budget for a single ad-platform metrics request.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(20);
/// Buffered notifications per broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Synchronization layer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub session_timeout: Duration,
    pub profile_timeout: Duration,
    pub profile_ttl: Duration,
    pub dataset_ttl: Duration,
    pub fetch_timeout: Duration,
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            profile_timeout: DEFAULT_PROFILE_TIMEOUT,
            profile_ttl: DEFAULT_PROFILE_TTL,
            dataset_ttl: DEFAULT_DATASET_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create SyncConfig from environment variables.
    ///
    /// Environment variables:
    /// - `ADPULSE_SESSION_TIMEOUT_MS`: session request budget (default: 2000)
    /// - `ADPULSE_PROFILE_TIMEOUT_MS`: profile request budget (default: 3000)
    /// - `ADPULSE_PROFILE_TTL_SECS`: profile cache lifetime (default: 30)
    /// - `ADPULSE_DATASET_TTL_SECS`: metrics cache lifetime (default: 900)
    /// - `ADPULSE_FETCH_TIMEOUT_MS`: metrics request budget (default: 20000)
    /// - `ADPULSE_EVENT_CAPACITY`: broadcast buffer size (default: 64)
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            session_timeout: env_millis("ADPULSE_SESSION_TIMEOUT_MS")
                .unwrap_or(defaults.session_timeout),
            profile_timeout: env_millis("ADPULSE_PROFILE_TIMEOUT_MS")
                .unwrap_or(defaults.profile_timeout),
            profile_ttl: env_secs("ADPULSE_PROFILE_TTL_SECS").unwrap_or(defaults.profile_ttl),
            dataset_ttl: env_secs("ADPULSE_DATASET_TTL_SECS").unwrap_or(defaults.dataset_ttl),
            fetch_timeout: env_millis("ADPULSE_FETCH_TIMEOUT_MS")
                .unwrap_or(defaults.fetch_timeout),
            event_capacity: std::env::var("ADPULSE_EVENT_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.event_capacity),
        }
    }

    pub fn with_session_timeout(mut self, duration: Duration) -> Self {
        self.session_timeout = duration;
        self
    }

    pub fn with_profile_timeout(mut self, duration: Duration) -> Self {
        self.profile_timeout = duration;
        self
    }

    pub fn with_profile_ttl(mut self, ttl: Duration) -> Self {
        self.profile_ttl = ttl;
        self
    }

    pub fn with_dataset_ttl(mut self, ttl: Duration) -> Self {
        self.dataset_ttl = ttl;
        self
    }

    pub fn with_fetch_timeout(mut self, duration: Duration) -> Self {
        self.fetch_timeout = duration;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Validate the configuration.
    ///
    /// Every duration and the event capacity must be non-zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("session_timeout", self.session_timeout),
            ("profile_timeout", self.profile_timeout),
            ("profile_ttl", self.profile_ttl),
            ("dataset_ttl", self.dataset_ttl),
            ("fetch_timeout", self.fetch_timeout),
        ];
        for (field, value) in durations {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: format!("{:?}", value),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if self.event_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "event_capacity".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

fn env_secs(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}
