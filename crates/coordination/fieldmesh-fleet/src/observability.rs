//! Metric names emitted by the coordination engine

use metrics::{describe_counter, describe_gauge};

/// State machine transitions, labelled `from` and `to`
pub const STATE_TRANSITIONS: &str = "fieldmesh_fleet_state_transitions_total";
/// Protocol messages handed to the tracker, labelled `msg_type`
pub const MESSAGES_SENT: &str = "fieldmesh_fleet_messages_sent_total";
/// Protocol messages dispatched, labelled `msg_type`
pub const MESSAGES_RECEIVED: &str = "fieldmesh_fleet_messages_received_total";
/// Inbound payloads dropped as malformed or unknown
pub const MESSAGES_DROPPED: &str = "fieldmesh_fleet_messages_dropped_total";
/// Emergency stops entered, labelled `origin`
pub const EMERGENCY_STOPS: &str = "fieldmesh_fleet_emergency_stops_total";
/// Sections owned locally
pub const OWNED_SECTIONS: &str = "fieldmesh_fleet_owned_sections";
/// Peers in the status table
pub const KNOWN_PEERS: &str = "fieldmesh_fleet_known_peers";

/// Register descriptions with the installed recorder
pub fn describe_metrics() {
    describe_counter!(STATE_TRANSITIONS, "Coordination state transitions");
    describe_counter!(MESSAGES_SENT, "Protocol messages queued for delivery");
    describe_counter!(MESSAGES_RECEIVED, "Protocol messages processed");
    describe_counter!(MESSAGES_DROPPED, "Inbound payloads dropped");
    describe_counter!(EMERGENCY_STOPS, "Emergency stops entered");
    describe_gauge!(OWNED_SECTIONS, "Work sections owned by this vehicle");
    describe_gauge!(KNOWN_PEERS, "Peers with a live heartbeat");
    fieldmesh_net::observability::describe_metrics();
}
