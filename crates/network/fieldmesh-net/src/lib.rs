//! # FieldMesh Net
//!
//! Messaging for vehicles sharing a lossy, low-bandwidth radio link.
//!
//! ## Features
//!
//! - **Framing**: every datagram is a JSON [`Frame`] carrying data or an ack
//! - **Transports**: [`RawTransport`] with an in-memory medium for simulation and a
//!   UDP implementation for deployment
//! - **Guaranteed delivery**: [`MessageDeliveryTracker`] retries with exponential
//!   backoff, services emergency traffic first and suppresses duplicates
//!
//! ## Example
//!
//! ```rust
//! use fieldmesh_net::{
//!     DeliveryConfig, Destination, MemoryNetwork, MessageDeliveryTracker, SendOptions,
//! };
//! use std::sync::Arc;
//!
//! let network = MemoryNetwork::new();
//! let (transport, _inbound) = network.register("tractor-a".into());
//! let mut tracker =
//!     MessageDeliveryTracker::new("tractor-a".into(), Arc::new(transport), DeliveryConfig::default());
//!
//! tracker.send(
//!     Destination::Broadcast,
//!     serde_json::json!({"msg_type": "HEARTBEAT"}),
//!     SendOptions::unacked(5),
//!     None,
//! );
//! tracker.tick();
//! ```

pub mod config;
pub mod delivery;
pub mod error;
pub mod frame;
pub mod observability;
pub mod transport;

pub use config::{DeliveryConfig, UdpConfig};
pub use delivery::{
    instant_after, DeliveryCallback, DeliveryStatus, InboundMessage, MessageDeliveryTracker,
    SendOptions, TrackerStats, EMERGENCY_PRIORITY,
};
pub use error::{NetError, Result, TransportError};
pub use frame::{Frame, FrameBody, MessageId};
pub use transport::{Destination, MemoryNetwork, MemoryTransport, RawTransport, UdpTransport};
