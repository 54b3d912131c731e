//! Metric names and descriptions for the networking layer.
//!
//! The crate only records through the `metrics` facade; installing an exporter is
//! up to the host process.

use metrics::{describe_counter, describe_gauge};

/// Data frames handed to a transport, first transmissions and retries
pub const FRAMES_SENT: &str = "fieldmesh_net_frames_sent_total";
/// Retransmissions after a missing ack
pub const RETRANSMISSIONS: &str = "fieldmesh_net_retransmissions_total";
/// Datagrams the transport refused outright
pub const TRANSPORT_REFUSALS: &str = "fieldmesh_net_transport_refusals_total";
/// Messages confirmed delivered
pub const DELIVERED: &str = "fieldmesh_net_messages_delivered_total";
/// Messages given up on
pub const FAILED: &str = "fieldmesh_net_messages_failed_total";
/// Messages pushed out by the capacity limit
pub const EVICTED: &str = "fieldmesh_net_messages_evicted_total";
/// Acks matched to a tracked message
pub const ACKS_RECEIVED: &str = "fieldmesh_net_acks_received_total";
/// Inbound data frames suppressed as duplicates
pub const DUPLICATES_DROPPED: &str = "fieldmesh_net_duplicates_dropped_total";
/// Inbound datagrams that failed to decode
pub const MALFORMED_FRAMES: &str = "fieldmesh_net_malformed_frames_total";
/// Messages currently tracked
pub const TRACKED_MESSAGES: &str = "fieldmesh_net_tracked_messages";

/// Registers descriptions for every metric above.
pub fn describe_metrics() {
    describe_counter!(FRAMES_SENT, "Data frames handed to a transport");
    describe_counter!(RETRANSMISSIONS, "Retransmissions after a missing ack");
    describe_counter!(TRANSPORT_REFUSALS, "Datagrams refused by the transport");
    describe_counter!(DELIVERED, "Messages confirmed delivered");
    describe_counter!(FAILED, "Messages that exhausted retries or deadline");
    describe_counter!(EVICTED, "Messages evicted by the capacity limit");
    describe_counter!(ACKS_RECEIVED, "Acks matched to a tracked message");
    describe_counter!(DUPLICATES_DROPPED, "Inbound duplicates suppressed");
    describe_counter!(MALFORMED_FRAMES, "Inbound datagrams that failed to decode");
    describe_gauge!(TRACKED_MESSAGES, "Messages currently tracked");
}
