//! Tracked message types.

use crate::frame::MessageId;
use crate::transport::Destination;
use fieldmesh_core::VehicleId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Priority of emergency traffic. Never evicted.
pub const EMERGENCY_PRIORITY: u8 = 0;

/// Final outcome reported to a delivery callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Acked by the receiver, or accepted by the transport for fire-and-forget sends
    Delivered,
    /// Retries or deadline exhausted, or evicted
    Failed,
}

/// Lifecycle of a tracked message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryState {
    /// Waiting for transmission or ack
    Pending,
    /// Confirmed
    Acknowledged,
    /// Given up
    Failed,
}

/// Completion handler, invoked exactly once unless the message is cancelled.
pub type DeliveryCallback = Box<dyn FnOnce(MessageId, DeliveryStatus) + Send>;

/// Per-message delivery parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    /// 0 is the highest (emergency) class
    pub priority: u8,
    /// Whether the receiver must ack
    pub requires_ack: bool,
    /// Retransmissions allowed after the first transmission
    pub max_retries: u32,
    /// Initial wait between transmissions
    pub retry_interval: Duration,
    /// Overall deadline measured from the send call
    pub timeout: Duration,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            priority: 5,
            requires_ack: true,
            max_retries: 3,
            retry_interval: Duration::from_millis(500),
            timeout: Duration::from_secs(10),
        }
    }
}

impl SendOptions {
    /// Fire-and-forget send at `priority`.
    pub fn unacked(priority: u8) -> Self {
        Self {
            priority,
            requires_ack: false,
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// One outstanding message.
pub struct ReliableMessage {
    /// Message id, shared by every retransmission
    pub message_id: MessageId,
    /// Where the message goes
    pub destination: Destination,
    /// Encoded frame, reused for every transmission
    pub frame: Vec<u8>,
    /// Priority class
    pub priority: u8,
    /// Whether an ack is awaited
    pub requires_ack: bool,
    /// Timer firings after the first transmission
    pub retry_count: u32,
    /// Retries allowed
    pub max_retries: u32,
    /// Wait before the next timer firing
    pub retry_interval: Duration,
    /// Absolute give-up time
    pub deadline: Instant,
    /// Lifecycle state
    pub delivery_state: DeliveryState,
    /// Frames handed to the transport so far
    pub transmissions: u32,
    pub(crate) next_due: Instant,
    pub(crate) seq: u64,
    pub(crate) ready: bool,
    pub(crate) on_delivery: Option<DeliveryCallback>,
}

impl fmt::Debug for ReliableMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReliableMessage")
            .field("message_id", &self.message_id)
            .field("destination", &self.destination)
            .field("priority", &self.priority)
            .field("requires_ack", &self.requires_ack)
            .field("retry_count", &self.retry_count)
            .field("max_retries", &self.max_retries)
            .field("retry_interval", &self.retry_interval)
            .field("delivery_state", &self.delivery_state)
            .field("transmissions", &self.transmissions)
            .finish_non_exhaustive()
    }
}

/// Data frame accepted by the receive path for the first time.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Frame id
    pub message_id: MessageId,
    /// Sending vehicle
    pub sender: VehicleId,
    /// Payload for the layer above
    pub payload: serde_json::Value,
}

/// Tracker counters since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    /// Messages currently tracked
    pub tracked: usize,
    /// Frames handed to the transport
    pub frames_sent: u64,
    /// Retransmissions
    pub retransmissions: u64,
    /// Transport refusals
    pub refused: u64,
    /// Delivered completions
    pub delivered: u64,
    /// Failed completions, evictions included
    pub failed: u64,
    /// Evictions
    pub evicted: u64,
    /// Matched acks
    pub acks_received: u64,
    /// Inbound duplicates suppressed
    pub duplicates_dropped: u64,
    /// Cancelled messages
    pub cancelled: u64,
}
