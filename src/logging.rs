//! Stdout logging for the `kvstate` binary.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the host. `RUST_LOG` overrides the configured level.

use serde::Deserialize;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Builds the filter: `RUST_LOG` if set, otherwise `default_level`.
pub fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Installs the global subscriber. Later calls are ignored.
pub fn init(default_level: &str, format: LogFormat) {
    let registry = tracing_subscriber::registry().with(filter(default_level));

    let result = match format {
        LogFormat::Text => registry.with(fmt::layer()).try_init(),
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
    };

    if result.is_err() {
        tracing::debug!("Global subscriber already installed");
    }
}
