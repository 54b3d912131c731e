//! Raw datagram transports.
//!
//! A transport only moves bytes: delivery is best-effort, lossy and may reorder.
//! Reliability lives in [`crate::delivery`].

pub mod memory;
pub mod traits;
pub mod udp;

pub use memory::{MemoryNetwork, MemoryNetworkStats, MemoryTransport};
pub use traits::{Destination, RawTransport};
pub use udp::UdpTransport;
