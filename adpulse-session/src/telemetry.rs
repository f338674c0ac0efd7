//! Tracing subscriber initialization.
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` and a fmt
//! layer, JSON or human-readable.

use adpulse_core::{AdPulseError, AdPulseResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "adpulse_cache=info,adpulse_session=info,warn";

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// `EnvFilter` directives
    pub filter: String,
    /// Emit JSON lines instead of pretty output
    pub json: bool,
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            json: false,
            service_name: "adpulse".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Read `ADPULSE_LOG` and `ADPULSE_LOG_JSON`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            filter: std::env::var("ADPULSE_LOG").unwrap_or(defaults.filter),
            json: std::env::var("ADPULSE_LOG_JSON")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(defaults.json),
            service_name: std::env::var("ADPULSE_SERVICE_NAME").unwrap_or(defaults.service_name),
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

/// Install the global subscriber. Call once at startup.
pub fn init_tracing(config: &TelemetryConfig) -> AdPulseResult<()> {
    let env_filter = EnvFilter::try_new(&config.filter).map_err(|e| AdPulseError::Telemetry {
        reason: format!("Invalid log filter {:?}: {}", config.filter, e),
    })?;

    let json_layer = config.json.then(|| fmt::layer().json());
    let pretty_layer = (!config.json).then(|| fmt::layer().pretty());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()
        .map_err(|e| AdPulseError::Telemetry {
            reason: format!("Failed to init subscriber: {}", e),
        })?;

    tracing::info!(
        service_name = config.service_name,
        json = config.json,
        "Telemetry initialized"
    );
    Ok(())
}
