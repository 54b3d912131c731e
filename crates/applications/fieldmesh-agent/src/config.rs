//! Agent configuration file

use fieldmesh_core::{load_config, FieldMeshResult, Validatable};
use fieldmesh_fleet::FleetConfig;
use fieldmesh_net::UdpConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything one vehicle agent needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub fleet: FleetConfig,
    pub udp: UdpConfig,
}

impl AgentConfig {
    /// Load and validate a TOML or JSON file
    pub fn load(path: impl AsRef<Path>) -> FieldMeshResult<Self> {
        let config: Self = load_config(path)?;
        config.validate()?;
        Ok(config)
    }
}

impl Validatable for AgentConfig {
    fn validate(&self) -> FieldMeshResult<()> {
        self.fleet.validate()?;
        self.udp.validate()
    }
}
