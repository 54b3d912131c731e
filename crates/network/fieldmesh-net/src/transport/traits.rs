//! Transport traits and abstractions.

use crate::error::TransportError;
use fieldmesh_core::VehicleId;
use std::fmt;

/// Where a datagram goes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destination {
    /// A single peer
    Peer(VehicleId),
    /// Every vehicle in radio range
    Broadcast,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Peer(id) => write!(f, "peer:{id}"),
            Destination::Broadcast => f.write_str("broadcast"),
        }
    }
}

/// Unreliable send primitive.
///
/// `send_raw` must not block: it either hands the datagram to the medium or
/// refuses it immediately. Inbound datagrams are pushed by each implementation into
/// the channel it was created with.
pub trait RawTransport: Send + Sync {
    /// Hands one datagram to the medium.
    fn send_raw(&self, bytes: &[u8], destination: &Destination) -> Result<(), TransportError>;

    /// Peers this transport can address directly.
    fn known_peers(&self) -> Vec<VehicleId> {
        Vec::new()
    }
}
