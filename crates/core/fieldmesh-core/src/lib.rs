//! # FieldMesh Core
//!
//! Shared building blocks for every FieldMesh crate:
//!
//! - **Identifiers**: [`VehicleId`], the fleet-wide vehicle identity
//! - **Error Handling**: [`FieldMeshError`] and the [`FieldMeshResult`] alias
//! - **Configuration**: file + environment loading for serde config structs
//! - **Observability**: `tracing` subscriber installation
//!
//! ## Quick Start
//!
//! ```rust
//! use fieldmesh_core::{FieldMeshResult, VehicleId};
//!
//! fn vehicle() -> FieldMeshResult<VehicleId> {
//!     VehicleId::parse("tractor-07")
//! }
//! ```

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod observability;
pub mod types;

pub use config::{load_config, ConfigFormat, Validatable};
pub use error::{FieldMeshError, FieldMeshResult};
pub use observability::{init_tracing, ObservabilityConfig};
pub use types::{VehicleId, UNCLAIMED};

/// Version information for the FieldMesh Core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name of the FieldMesh Core library
pub const NAME: &str = env!("CARGO_PKG_NAME");
