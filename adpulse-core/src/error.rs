//! Error types for AdPulse operations

use std::time::Duration;
use thiserror::Error;

/// Failures of an asynchronous fetch (session, profile or metrics).
///
/// `Clone` because one coalesced outcome is delivered to every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("{operation} timed out after {budget:?}")]
    Timeout { operation: String, budget: Duration },

    #[error("{operation} was aborted")]
    Aborted { operation: String },

    #[error("Upstream {provider} failed: {message}")]
    Upstream { provider: String, message: String },
}

impl FetchError {
    pub fn timeout(operation: impl Into<String>, budget: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            budget,
        }
    }

    pub fn aborted(operation: impl Into<String>) -> Self {
        Self::Aborted {
            operation: operation.into(),
        }
    }

    pub fn upstream(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Timeouts and aborts resolve to a safe default locally and are never
    /// surfaced to the UI as errors.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Aborted { .. })
    }

    /// Upstream failures are surfaced with a retry affordance.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream { .. })
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all AdPulse errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdPulseError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Telemetry error: {reason}")]
    Telemetry { reason: String },
}

impl AdPulseError {
    /// The fetch error, if this is one.
    pub fn as_fetch(&self) -> Option<&FetchError> {
        match self {
            Self::Fetch(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type alias for AdPulse operations.
pub type AdPulseResult<T> = Result<T, AdPulseError>;

// =============================================================================
// TESTS
// =============================================================================
