//! Error types for CRDT operations

use thiserror::Error;

/// CRDT operation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CrdtError {
    /// A claim record is internally inconsistent
    #[error("Invalid claim record for section {section_id}: {reason}")]
    InvalidRecord { section_id: String, reason: String },

    /// Snapshot key and embedded section id disagree
    #[error("Snapshot key {key} does not match record section {section_id}")]
    SectionMismatch { key: String, section_id: String },

    /// Encoding or decoding failed
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for CrdtError {
    fn from(err: serde_json::Error) -> Self {
        CrdtError::SerializationError(err.to_string())
    }
}

impl From<CrdtError> for fieldmesh_core::FieldMeshError {
    fn from(err: CrdtError) -> Self {
        match err {
            CrdtError::SerializationError(msg) => Self::Serialization(msg),
            other => Self::Replication(other.to_string()),
        }
    }
}

/// Result type for CRDT operations
pub type Result<T> = std::result::Result<T, CrdtError>;
