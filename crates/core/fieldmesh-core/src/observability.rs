//! Tracing subscriber setup.
//!
//! Library crates only emit `tracing` events; binaries call [`init_tracing`] once.

use crate::{FieldMeshError, FieldMeshResult};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default filter directive, overridden by `RUST_LOG` when set
    pub log_level: String,
    /// Emit newline-delimited JSON instead of human readable lines
    pub json: bool,
    /// Include the event target (module path) in each line
    pub with_target: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
            with_target: true,
        }
    }
}

/// Install the global tracing subscriber.
///
/// Returns an error if a global subscriber was already installed.
pub fn init_tracing(config: &ObservabilityConfig) -> FieldMeshResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| FieldMeshError::config(format!("Invalid log filter: {e}")))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| FieldMeshError::internal(format!("Failed to install subscriber: {e}")))
}
