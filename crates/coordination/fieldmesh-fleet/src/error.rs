//! Error types for fleet coordination

use crate::state::VehicleCoordinationState;
use fieldmesh_core::FieldMeshError;
use thiserror::Error;

/// Result type for fleet operations
pub type FleetResult<T> = std::result::Result<T, FleetError>;

/// Errors that can occur during fleet coordination
#[derive(Debug, Error)]
pub enum FleetError {
    /// Operation not allowed in the current state
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        state: VehicleCoordinationState,
        operation: &'static str,
    },

    /// Malformed or unknown protocol message
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The node task is no longer running
    #[error("Fleet node stopped")]
    NodeStopped,

    /// Networking failure
    #[error(transparent)]
    Net(#[from] fieldmesh_net::NetError),

    /// Replicated state failure
    #[error(transparent)]
    Crdt(#[from] fieldmesh_crdt::CrdtError),
}

impl From<serde_json::Error> for FleetError {
    fn from(err: serde_json::Error) -> Self {
        FleetError::Protocol(err.to_string())
    }
}

impl From<FieldMeshError> for FleetError {
    fn from(err: FieldMeshError) -> Self {
        match err {
            FieldMeshError::Configuration(msg) => FleetError::Configuration(msg),
            FieldMeshError::Protocol(msg) | FieldMeshError::InvalidInput(msg) => {
                FleetError::Protocol(msg)
            }
            other => FleetError::Configuration(other.to_string()),
        }
    }
}

impl From<FleetError> for FieldMeshError {
    fn from(err: FleetError) -> Self {
        match err {
            FleetError::InvalidState { .. } => FieldMeshError::InvalidState(err.to_string()),
            FleetError::Protocol(msg) => FieldMeshError::Protocol(msg),
            FleetError::Configuration(msg) => FieldMeshError::Configuration(msg),
            FleetError::NodeStopped => FieldMeshError::Internal(err.to_string()),
            FleetError::Net(e) => e.into(),
            FleetError::Crdt(e) => e.into(),
        }
    }
}
