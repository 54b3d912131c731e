//! Guaranteed, prioritized delivery on top of a [`RawTransport`](crate::transport::RawTransport).

pub mod dedup;
pub mod message;
pub mod tracker;

pub use dedup::DedupWindow;
pub use message::{
    DeliveryCallback, DeliveryState, DeliveryStatus, InboundMessage, ReliableMessage,
    SendOptions, TrackerStats, EMERGENCY_PRIORITY,
};
pub use tracker::{instant_after, MessageDeliveryTracker};
