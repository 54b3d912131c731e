//! Error types shared across the FieldMesh workspace.
//!
//! Each crate keeps its own `thiserror` enum and converts into [`FieldMeshError`]
//! at API boundaries that mix several crates.

use std::fmt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The umbrella error type for FieldMesh.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldMeshError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Network and transport errors
    #[error("Network error: {0}")]
    Network(String),

    /// Wire protocol violations
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Replicated state errors
    #[error("Replication error: {0}")]
    Replication(String),

    /// Invalid input parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The engine is not in a state that accepts the request
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Internal system errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FieldMeshError {
    /// Create a new configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Self::Configuration(msg.to_string())
    }

    /// Create a new network error
    pub fn network<T: fmt::Display>(msg: T) -> Self {
        Self::Network(msg.to_string())
    }

    /// Create a new protocol error
    pub fn protocol<T: fmt::Display>(msg: T) -> Self {
        Self::Protocol(msg.to_string())
    }

    /// Create a new invalid input error
    pub fn invalid_input<T: fmt::Display>(msg: T) -> Self {
        Self::InvalidInput(msg.to_string())
    }

    /// Create a new internal error
    pub fn internal<T: fmt::Display>(msg: T) -> Self {
        Self::Internal(msg.to_string())
    }

    /// Check if retrying the failed operation can succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Internal(_))
    }
}

/// Result type alias for FieldMesh operations
pub type FieldMeshResult<T> = Result<T, FieldMeshError>;

impl From<std::io::Error> for FieldMeshError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for FieldMeshError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for FieldMeshError {
    fn from(err: toml::de::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}
