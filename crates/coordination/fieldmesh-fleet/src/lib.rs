//! # FieldMesh Fleet
//!
//! Decentralized coordination for a fleet of autonomous field vehicles.
//!
//! Each vehicle runs a [`FleetCoordinationEngine`] that:
//!
//! - claims and releases work sections through a replicated, conflict-free
//!   allocation map ordered by vector clocks
//! - tracks peers through periodic heartbeats
//! - propagates emergency stops at the highest delivery priority
//! - records leader election votes
//! - follows a small state machine (see [`VehicleCoordinationState`])
//!
//! The engine is synchronous. [`FleetNode`] runs it on a tokio task and hands out
//! clonable [`FleetHandle`]s.
//!
//! ## Example
//!
//! ```rust
//! use fieldmesh_fleet::{FleetConfig, FleetCoordinationEngine, VehicleCoordinationState};
//! use fieldmesh_net::MemoryNetwork;
//! use std::sync::Arc;
//!
//! let network = MemoryNetwork::new();
//! let (transport, _inbound) = network.register("tractor-a".into());
//! let mut engine = FleetCoordinationEngine::new(FleetConfig::new("tractor-a"), Arc::new(transport))?;
//!
//! engine.start()?;
//! assert!(engine.claim_section("north-40"));
//! assert_eq!(engine.get_current_state(), VehicleCoordinationState::Working);
//! # Ok::<(), fieldmesh_fleet::FleetError>(())
//! ```

pub mod config;
pub mod election;
pub mod engine;
pub mod error;
pub mod node;
pub mod observability;
pub mod protocol;
pub mod state;
pub mod status;

pub use config::{FleetConfig, MessageClass};
pub use election::ElectionTally;
pub use engine::{
    EmergencyCallback, EmergencyEvent, FleetCoordinationEngine, StateChangeCallback, Telemetry,
};
pub use error::{FleetError, FleetResult};
pub use node::{FleetHandle, FleetNode};
pub use protocol::{
    Heartbeat, MessagePayload, MessageType, Position, ProtocolMessage, DEPARTING_STATUS,
};
pub use state::VehicleCoordinationState;
pub use status::{FleetStatusTable, PeerStatus};
