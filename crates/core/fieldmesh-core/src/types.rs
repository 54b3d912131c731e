//! Identifiers shared by every FieldMesh crate.

use crate::{FieldMeshError, FieldMeshResult};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Owner marker used on the wire for a section nobody holds.
pub const UNCLAIMED: &str = "unclaimed";

/// Longest vehicle id accepted by [`VehicleId::parse`].
pub const MAX_VEHICLE_ID_LEN: usize = 64;

/// Fleet-wide identity of one vehicle.
///
/// Ordering is plain lexicographic byte order of the underlying string, which is
/// what replicas use when they need a deterministic tie-break.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(String);

impl VehicleId {
    /// Parse and validate a vehicle id.
    ///
    /// Rejects empty ids, ids longer than [`MAX_VEHICLE_ID_LEN`], ids containing
    /// whitespace or control characters, and the reserved [`UNCLAIMED`] marker.
    pub fn parse(id: impl Into<String>) -> FieldMeshResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(FieldMeshError::invalid_input("vehicle id must not be empty"));
        }
        if id.len() > MAX_VEHICLE_ID_LEN {
            return Err(FieldMeshError::invalid_input(format!(
                "vehicle id longer than {MAX_VEHICLE_ID_LEN} bytes"
            )));
        }
        if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(FieldMeshError::invalid_input(format!(
                "vehicle id {id:?} contains whitespace or control characters"
            )));
        }
        if id == UNCLAIMED {
            return Err(FieldMeshError::invalid_input("vehicle id \"unclaimed\" is reserved"));
        }
        Ok(Self(id))
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the inner string
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VehicleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for VehicleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for VehicleId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_ids() {
        let id = VehicleId::parse("tractor-07").unwrap();
        assert_eq!(id.as_str(), "tractor-07");
        assert_eq!(id.to_string(), "tractor-07");
    }

    #[test]
    fn test_parse_rejects_invalid_ids() {
        assert!(VehicleId::parse("").is_err());
        assert!(VehicleId::parse("has space").is_err());
        assert!(VehicleId::parse(UNCLAIMED).is_err());
        assert!(VehicleId::parse("x".repeat(MAX_VEHICLE_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_lexicographic_ordering() {
        let a = VehicleId::from("tractor-a");
        let b = VehicleId::from("tractor-b");
        assert!(a < b);
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = VehicleId::from("harvester-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"harvester-1\"");
        let back: VehicleId = serde_json::from_str("\"harvester-1\"").unwrap();
        assert_eq!(back, id);
    }
}
