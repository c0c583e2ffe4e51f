//! Tracing setup for processes embedding strand.
//!
//! # Usage
//!
//! ```ignore
//! use strand_common::telemetry::{self, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env("particle-host");
//! telemetry::init(config);
//! tracing::info!("host started");
//! ```

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::SyncConfig;

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to the startup event.
    pub service_name: String,
    /// Console filter used when `RUST_LOG` is unset.
    pub console_level: String,
}

impl TelemetryConfig {
    /// Debug level in debug builds, info otherwise. `RUST_LOG` overrides both.
    pub fn from_env(service_name: impl Into<String>) -> Self {
        let console_level = if cfg!(debug_assertions) {
            Level::DEBUG
        } else {
            Level::INFO
        };

        Self {
            service_name: service_name.into(),
            console_level: console_level.as_str().to_lowercase(),
        }
    }

    pub fn from_sync_config(service_name: impl Into<String>, config: &SyncConfig) -> Self {
        Self {
            service_name: service_name.into(),
            console_level: config.log_level.to_string(),
        }
    }
}

/// Install the global tracing subscriber.
///
/// Returns false if a subscriber was already installed, which is expected
/// when several tests in one binary initialise telemetry.
pub fn init(config: TelemetryConfig) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.console_level));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .with_filter(env_filter);

    let installed = tracing_subscriber::registry()
        .with(console_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(service = %config.service_name, "telemetry initialized");
    }
    installed
}
