//! Error types for the networking layer.

use fieldmesh_core::FieldMeshError;
use thiserror::Error;

/// Type alias for Results in this crate.
pub type Result<T> = std::result::Result<T, NetError>;

/// Main error type for networking operations.
#[derive(Error, Debug)]
pub enum NetError {
    /// Transport-related errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A datagram could not be encoded or decoded
    #[error("Frame error: {0}")]
    Frame(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Immediate refusal by a raw transport.
///
/// Loss in flight is never reported; these only cover datagrams the transport
/// could not even hand to the medium.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Unknown peer: {0}")]
    UnknownPeer(String),

    #[error("Payload of {0} bytes exceeds the datagram limit")]
    PayloadTooLarge(usize),

    #[error("Transport busy, datagram not queued")]
    Busy,

    #[error("Transport closed")]
    Closed,

    #[error("UDP error: {0}")]
    Udp(String),
}

impl From<serde_json::Error> for NetError {
    fn from(err: serde_json::Error) -> Self {
        NetError::Frame(err.to_string())
    }
}

impl From<NetError> for FieldMeshError {
    fn from(err: NetError) -> Self {
        match err {
            NetError::Frame(msg) => FieldMeshError::Protocol(msg),
            NetError::Configuration(msg) => FieldMeshError::Configuration(msg),
            other => FieldMeshError::Network(other.to_string()),
        }
    }
}
