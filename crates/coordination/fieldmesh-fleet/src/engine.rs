//! Per-vehicle fleet coordination engine
//!
//! The engine owns everything one vehicle knows about the fleet: its vector clock,
//! its replica of the field allocation, the peer status table and the delivery
//! tracker. All methods take `&mut self` and never block; callers serialize access,
//! usually through [`FleetNode`](crate::node::FleetNode).
//!
//! Every time-dependent method has an `*_at(now)` variant so that simulations and
//! tests can drive the engine deterministically.

use crate::config::FleetConfig;
use crate::election::ElectionTally;
use crate::error::{FleetError, FleetResult};
use crate::observability as obs;
use crate::protocol::{
    Heartbeat, MessagePayload, Position, ProtocolMessage, DEPARTING_STATUS,
};
use crate::state::VehicleCoordinationState;
use crate::status::{FleetStatusTable, PeerStatus};
use fieldmesh_core::{Validatable, VehicleId};
use fieldmesh_crdt::{
    AllocationSnapshot, ClaimAction, FieldAllocationCrdt, MergeReport, VectorClock,
    WorkSectionClaim,
};
use fieldmesh_net::{
    instant_after, DeliveryCallback, DeliveryStatus, Destination, MessageDeliveryTracker,
    MessageId, RawTransport, SendOptions, TrackerStats,
};
use metrics::{counter, gauge};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Emergency stamps remembered per sender for callback dedup
const EMERGENCY_HISTORY: usize = 32;

/// Called with `(from, to)` on every state transition
pub type StateChangeCallback =
    Box<dyn Fn(VehicleCoordinationState, VehicleCoordinationState) + Send>;

/// Called once per distinct emergency stop received from a peer
pub type EmergencyCallback = Box<dyn Fn(&EmergencyEvent) + Send>;

/// An emergency stop received from the fleet
#[derive(Debug, Clone, PartialEq)]
pub struct EmergencyEvent {
    /// Vehicle that raised the stop
    pub source: VehicleId,
    pub reason_code: u32,
    pub source_position: Position,
    /// Sender's clock when it raised the stop
    pub vector_clock: VectorClock,
}

/// Application-supplied vehicle status carried by heartbeats
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Telemetry {
    pub position: Position,
    /// Ground speed in m/s
    pub speed: f64,
    /// Self-assessed health in `[0, 1]`
    pub health: f64,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self {
            position: Position::default(),
            speed: 0.0,
            health: 1.0,
        }
    }
}

/// Coordination engine for one vehicle
pub struct FleetCoordinationEngine {
    config: FleetConfig,
    local_id: VehicleId,
    state: VehicleCoordinationState,
    clock: VectorClock,
    allocation: FieldAllocationCrdt,
    status: FleetStatusTable,
    tracker: MessageDeliveryTracker,
    elections: ElectionTally,
    telemetry: Telemetry,
    next_heartbeat: Option<Instant>,
    /// Stamps of emergency stops already reported, per sender
    emergencies_seen: BTreeMap<VehicleId, VecDeque<VectorClock>>,
    state_listeners: Vec<StateChangeCallback>,
    emergency_listeners: Vec<EmergencyCallback>,
}

impl FleetCoordinationEngine {
    /// Create a disconnected engine sending through `transport`
    pub fn new(config: FleetConfig, transport: Arc<dyn RawTransport>) -> FleetResult<Self> {
        config.validate()?;

        let local_id = config.vehicle_id.clone();
        let tracker = MessageDeliveryTracker::new(local_id.clone(), transport, config.delivery.clone());
        info!(vehicle = %local_id, "Fleet coordination engine created");

        Ok(Self {
            config,
            local_id,
            state: VehicleCoordinationState::Disconnected,
            clock: VectorClock::new(),
            allocation: FieldAllocationCrdt::new(),
            status: FleetStatusTable::new(),
            tracker,
            elections: ElectionTally::new(),
            telemetry: Telemetry::default(),
            next_heartbeat: None,
            emergencies_seen: BTreeMap::new(),
            state_listeners: Vec::new(),
            emergency_listeners: Vec::new(),
        })
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Join the fleet: DISCONNECTED -> IDLE
    pub fn start(&mut self) -> FleetResult<()> {
        self.start_at(Instant::now())
    }

    pub fn start_at(&mut self, now: Instant) -> FleetResult<()> {
        if self.state != VehicleCoordinationState::Disconnected {
            return Err(self.invalid("start"));
        }

        self.transition(VehicleCoordinationState::Idle);
        self.next_heartbeat = Some(now);

        if self.config.sync_on_start {
            let destinations = self.fanout_destinations();
            let options = self.config.sync.send_options();
            self.send_message(now, MessagePayload::StateSyncRequest, &destinations, options);
        }
        info!(vehicle = %self.local_id, "Joined fleet");
        Ok(())
    }

    /// Leave the fleet with a best-effort departure notice: -> DISCONNECTED
    ///
    /// Stopping a disconnected engine does nothing. An emergency stop can only be
    /// left through [`on_manual_reset`](Self::on_manual_reset).
    pub fn stop(&mut self) -> FleetResult<()> {
        self.stop_at(Instant::now())
    }

    pub fn stop_at(&mut self, now: Instant) -> FleetResult<()> {
        match self.state {
            VehicleCoordinationState::Disconnected => return Ok(()),
            VehicleCoordinationState::EmergencyStop => return Err(self.invalid("stop")),
            _ => {}
        }

        let departure = Heartbeat {
            status: DEPARTING_STATUS.to_string(),
            ..self.heartbeat()
        };
        let options = self.config.heartbeat_options();
        self.send_message(now, MessagePayload::Heartbeat(departure), &[Destination::Broadcast], options);
        self.tracker.tick_at(now);

        self.next_heartbeat = None;
        self.transition(VehicleCoordinationState::Disconnected);
        info!(vehicle = %self.local_id, "Left fleet");
        Ok(())
    }

    /// Leave EMERGENCY_STOP after an operator has cleared the vehicle: -> DISCONNECTED
    pub fn on_manual_reset(&mut self) -> FleetResult<()> {
        if self.state != VehicleCoordinationState::EmergencyStop {
            return Err(self.invalid("reset"));
        }
        self.next_heartbeat = None;
        self.emergencies_seen.clear();
        self.transition(VehicleCoordinationState::Disconnected);
        info!(vehicle = %self.local_id, "Manual reset, restart to rejoin the fleet");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Work sections
    // ---------------------------------------------------------------------

    /// Claim a work section. Returns whether this vehicle owns it afterwards.
    ///
    /// Only IDLE and WORKING vehicles claim; in any other state this is a no-op
    /// returning `false`. A successful new claim is announced to the fleet.
    pub fn claim_section(&mut self, section_id: &str) -> bool {
        self.claim_section_at(Instant::now(), section_id)
    }

    pub fn claim_section_at(&mut self, now: Instant, section_id: &str) -> bool {
        if !self.state.accepts_claims() {
            debug!(state = %self.state, section = section_id, "Claim ignored");
            return false;
        }
        if section_id.is_empty() {
            debug!("Claim ignored, empty section id");
            return false;
        }
        match self.allocation.owner_of(section_id) {
            Some(owner) if *owner == self.local_id => return true,
            Some(owner) => {
                debug!(section = section_id, %owner, "Section held by another vehicle");
                return false;
            }
            None => {}
        }

        let stamp = self.advance_clock();
        if !self.allocation.claim(section_id, &self.local_id, &stamp) {
            warn!(section = section_id, clock = %stamp, "Local claim lost to a newer record");
            return false;
        }

        info!(vehicle = %self.local_id, section = section_id, "Section claimed");
        let payload = MessagePayload::TaskClaim {
            section_id: section_id.to_string(),
            action: ClaimAction::Claim,
        };
        let destinations = self.fanout_destinations();
        let options = self.config.claim.send_options();
        self.send_stamped(now, stamp, payload, &destinations, options);
        self.reconcile_work_state();
        true
    }

    /// Release a section owned by this vehicle. Returns `false` if it is not the owner.
    pub fn release_section(&mut self, section_id: &str) -> bool {
        self.release_section_at(Instant::now(), section_id)
    }

    pub fn release_section_at(&mut self, now: Instant, section_id: &str) -> bool {
        if !self.state.accepts_claims() {
            debug!(state = %self.state, section = section_id, "Release ignored");
            return false;
        }
        if self.allocation.owner_of(section_id) != Some(&self.local_id) {
            debug!(section = section_id, "Release ignored, not the owner");
            return false;
        }

        let stamp = self.advance_clock();
        if !self.allocation.release(section_id, &self.local_id, &stamp) {
            return false;
        }

        info!(vehicle = %self.local_id, section = section_id, "Section released");
        let payload = MessagePayload::TaskClaim {
            section_id: section_id.to_string(),
            action: ClaimAction::Release,
        };
        let destinations = self.fanout_destinations();
        let options = self.config.claim.send_options();
        self.send_stamped(now, stamp, payload, &destinations, options);
        self.reconcile_work_state();
        true
    }

    // ---------------------------------------------------------------------
    // Emergency
    // ---------------------------------------------------------------------

    /// Halt this vehicle and tell every peer to halt.
    ///
    /// The stop is unicast to every known peer and broadcast once more, all at the
    /// emergency priority. Local state becomes EMERGENCY_STOP regardless of the
    /// current state. Returns the ids of every copy sent.
    pub fn broadcast_emergency_stop(&mut self, reason_code: u32) -> Vec<MessageId> {
        self.broadcast_emergency_stop_at(Instant::now(), reason_code)
    }

    pub fn broadcast_emergency_stop_at(&mut self, now: Instant, reason_code: u32) -> Vec<MessageId> {
        if self.transition(VehicleCoordinationState::EmergencyStop) {
            counter!(obs::EMERGENCY_STOPS, "origin" => "local").increment(1);
        }
        error!(vehicle = %self.local_id, reason_code, "Emergency stop raised");

        let mut destinations = self.peer_destinations();
        destinations.push(Destination::Broadcast);
        let payload = MessagePayload::EmergencyStop {
            reason_code,
            source_position: self.telemetry.position,
        };
        let options = self.config.emergency.send_options();
        let ids = self.send_message(now, payload, &destinations, options);

        // Emergency traffic goes out now rather than on the next tick
        self.tracker.tick_at(now);
        ids
    }

    // ---------------------------------------------------------------------
    // Inbound
    // ---------------------------------------------------------------------

    /// Process one datagram from the transport
    pub fn handle_datagram(&mut self, bytes: &[u8]) {
        self.handle_datagram_at(Instant::now(), bytes)
    }

    pub fn handle_datagram_at(&mut self, now: Instant, bytes: &[u8]) {
        // Not even acked, so peers keep retrying until this vehicle rejoins
        if !self.state.is_connected() {
            trace!(len = bytes.len(), "Disconnected, datagram dropped");
            return;
        }

        let Some(inbound) = self.tracker.receive_frame(bytes) else {
            return;
        };

        let message = match ProtocolMessage::from_value(inbound.payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(sender = %inbound.sender, error = %e, "Dropping malformed protocol message");
                counter!(obs::MESSAGES_DROPPED).increment(1);
                return;
            }
        };
        if message.sender_id != inbound.sender {
            warn!(
                frame_sender = %inbound.sender,
                sender_id = %message.sender_id,
                "Dropping message with mismatched sender"
            );
            counter!(obs::MESSAGES_DROPPED).increment(1);
            return;
        }

        self.handle_message_at(now, message);
    }

    /// Apply one decoded protocol message
    pub fn handle_message(&mut self, message: ProtocolMessage) {
        self.handle_message_at(Instant::now(), message)
    }

    pub fn handle_message_at(&mut self, now: Instant, message: ProtocolMessage) {
        if !self.state.is_connected() {
            trace!(msg_type = message.msg_type(), "Disconnected, message dropped");
            return;
        }
        if let MessagePayload::Unknown { msg_type } = &message.payload {
            debug!(%msg_type, sender = %message.sender_id, "Dropping unknown message type");
            counter!(obs::MESSAGES_DROPPED).increment(1);
            return;
        }
        if message.sender_id == self.local_id {
            return;
        }

        self.clock.merge(&message.vector_clock);
        counter!(obs::MESSAGES_RECEIVED, "msg_type" => message.msg_type().to_string()).increment(1);
        trace!(
            msg_type = message.msg_type(),
            sender = %message.sender_id,
            clock = %self.clock,
            "Dispatching message"
        );

        let ProtocolMessage {
            sender_id,
            vector_clock,
            payload,
        } = message;

        match payload {
            MessagePayload::Heartbeat(heartbeat) => self.on_heartbeat(now, sender_id, heartbeat),
            MessagePayload::StateSyncRequest => self.on_sync_request(now, sender_id),
            MessagePayload::StateSyncResponse { crdt_snapshot } => {
                self.on_sync_response(&sender_id, &crdt_snapshot)
            }
            MessagePayload::TaskClaim { section_id, action } => {
                self.on_task_claim(sender_id, section_id, action, vector_clock)
            }
            MessagePayload::EmergencyStop {
                reason_code,
                source_position,
            } => self.on_emergency_stop(sender_id, reason_code, source_position, vector_clock),
            MessagePayload::LeaderElectionVote {
                election_id,
                candidate_id,
            } => {
                debug!(election = %election_id, voter = %sender_id, candidate = %candidate_id, "Vote recorded");
                self.elections.record(&election_id, sender_id, candidate_id);
            }
            MessagePayload::Unknown { .. } => {}
        }
    }

    fn on_heartbeat(&mut self, now: Instant, sender: VehicleId, heartbeat: Heartbeat) {
        if heartbeat.is_departure() {
            if self.status.remove(&sender).is_some() {
                info!(peer = %sender, "Peer departed");
            }
        } else if self.status.update(sender.clone(), heartbeat, now) {
            info!(peer = %sender, "Peer joined");
        }
        gauge!(obs::KNOWN_PEERS).set(self.status.len() as f64);
    }

    fn on_sync_request(&mut self, now: Instant, requester: VehicleId) {
        let synchronizing = self.enter_sync();

        let payload = MessagePayload::StateSyncResponse {
            crdt_snapshot: self.allocation.snapshot(),
        };
        let options = self.config.sync.send_options();
        self.send_message(now, payload, &[Destination::Peer(requester.clone())], options);
        debug!(peer = %requester, sections = self.allocation.len(), "Answered state sync request");

        if synchronizing {
            self.transition(VehicleCoordinationState::Idle);
        }
    }

    fn on_sync_response(&mut self, sender: &VehicleId, snapshot: &AllocationSnapshot) {
        let synchronizing = self.enter_sync();

        for record in snapshot.sections().values() {
            self.clock.merge(&record.claim_clock);
        }
        let report = self.allocation.merge(snapshot);
        debug!(
            peer = %sender,
            applied = report.records_applied,
            rejected = report.records_rejected,
            "Merged state sync response"
        );
        self.log_ownership_changes(&report);

        if synchronizing {
            self.transition(VehicleCoordinationState::Idle);
        }
        self.reconcile_work_state();
    }

    fn on_task_claim(
        &mut self,
        sender: VehicleId,
        section_id: String,
        action: ClaimAction,
        clock: VectorClock,
    ) {
        let record = match action {
            ClaimAction::Claim => WorkSectionClaim::claim(section_id.clone(), sender.clone(), clock),
            ClaimAction::Release => WorkSectionClaim::release(section_id.clone(), clock),
        };

        let previous = self.allocation.owner_of(&section_id).cloned();
        if !self.allocation.merge_claim(record) {
            debug!(section = %section_id, peer = %sender, ?action, "Remote record superseded locally");
            return;
        }

        let current = self.allocation.owner_of(&section_id).cloned();
        if previous.as_ref() == Some(&self.local_id) && current.as_ref() != Some(&self.local_id) {
            info!(section = %section_id, winner = %sender, "Lost section to a concurrent claim");
        } else {
            debug!(section = %section_id, peer = %sender, ?action, "Applied remote record");
        }
        self.reconcile_work_state();
    }

    fn on_emergency_stop(
        &mut self,
        sender: VehicleId,
        reason_code: u32,
        source_position: Position,
        clock: VectorClock,
    ) {
        if self.transition(VehicleCoordinationState::EmergencyStop) {
            counter!(obs::EMERGENCY_STOPS, "origin" => "remote").increment(1);
        }

        // Unicast and broadcast copies of one stop share a stamp
        let seen = self.emergencies_seen.entry(sender.clone()).or_default();
        if seen.contains(&clock) {
            trace!(peer = %sender, clock = %clock, "Emergency copy already reported");
            return;
        }
        if seen.len() == EMERGENCY_HISTORY {
            seen.pop_front();
        }
        seen.push_back(clock.clone());

        error!(source = %sender, reason_code, ?source_position, "Emergency stop received");

        let event = EmergencyEvent {
            source: sender,
            reason_code,
            source_position,
            vector_clock: clock,
        };
        for listener in &self.emergency_listeners {
            listener(&event);
        }
    }

    // ---------------------------------------------------------------------
    // Scheduling
    // ---------------------------------------------------------------------

    /// Run due work: heartbeats, peer expiry and retransmissions.
    ///
    /// Returns the number of frames transmitted.
    pub fn tick(&mut self) -> usize {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> usize {
        if self.state.is_connected() {
            if let Some(due) = self.next_heartbeat {
                if now >= due {
                    let heartbeat = self.heartbeat();
                    let options = self.config.heartbeat_options();
                    self.send_message(now, MessagePayload::Heartbeat(heartbeat), &[Destination::Broadcast], options);
                    self.next_heartbeat = Some(instant_after(now, self.config.heartbeat_interval()));

                    if !self.status.prune(now, self.config.peer_timeout()).is_empty() {
                        gauge!(obs::KNOWN_PEERS).set(self.status.len() as f64);
                    }
                }
            }
        }
        self.tracker.tick_at(now)
    }

    /// Earliest instant at which [`tick`](Self::tick) has work to do
    pub fn next_wakeup(&self) -> Option<Instant> {
        [self.tracker.next_deadline(), self.next_heartbeat]
            .into_iter()
            .flatten()
            .min()
    }

    // ---------------------------------------------------------------------
    // Telemetry and elections
    // ---------------------------------------------------------------------

    /// Update the status sent in heartbeats and emergency stops
    pub fn update_telemetry(&mut self, position: Position, speed: f64, health: f64) {
        self.telemetry = Telemetry {
            position,
            speed,
            health: health.clamp(0.0, 1.0),
        };
    }

    /// Vote in a leader election and tell the fleet. No-op while disconnected.
    pub fn cast_election_vote(&mut self, election_id: &str, candidate: VehicleId) -> Vec<MessageId> {
        self.cast_election_vote_at(Instant::now(), election_id, candidate)
    }

    pub fn cast_election_vote_at(
        &mut self,
        now: Instant,
        election_id: &str,
        candidate: VehicleId,
    ) -> Vec<MessageId> {
        if !self.state.is_connected() {
            debug!(election = election_id, "Vote ignored while disconnected");
            return Vec::new();
        }

        self.elections
            .record(election_id, self.local_id.clone(), candidate.clone());
        let payload = MessagePayload::LeaderElectionVote {
            election_id: election_id.to_string(),
            candidate_id: candidate,
        };
        let destinations = self.fanout_destinations();
        let options = self.config.election.send_options();
        self.send_message(now, payload, &destinations, options)
    }

    /// Votes per candidate in `election_id`, including this vehicle's own
    pub fn election_tally(&self, election_id: &str) -> BTreeMap<VehicleId, usize> {
        self.elections.tally(election_id)
    }

    // ---------------------------------------------------------------------
    // Queries and events
    // ---------------------------------------------------------------------

    /// Last heartbeat of every live peer
    pub fn get_fleet_status(&self) -> BTreeMap<VehicleId, PeerStatus> {
        self.status.to_map()
    }

    /// Copy of the local allocation replica
    pub fn get_field_allocation_state(&self) -> AllocationSnapshot {
        self.allocation.snapshot()
    }

    pub fn get_current_state(&self) -> VehicleCoordinationState {
        self.state
    }

    /// Sections this vehicle currently owns
    pub fn owned_sections(&self) -> Vec<String> {
        self.allocation.sections_owned_by(&self.local_id)
    }

    pub fn vector_clock(&self) -> &VectorClock {
        &self.clock
    }

    pub fn local_id(&self) -> &VehicleId {
        &self.local_id
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    pub fn telemetry(&self) -> Telemetry {
        self.telemetry
    }

    pub fn tracker_stats(&self) -> TrackerStats {
        self.tracker.stats()
    }

    /// Register a state transition listener. Listeners run inline and must not block.
    pub fn on_state_change<F>(&mut self, callback: F)
    where
        F: Fn(VehicleCoordinationState, VehicleCoordinationState) + Send + 'static,
    {
        self.state_listeners.push(Box::new(callback));
    }

    /// Register an emergency listener. Listeners run inline and must not block.
    pub fn on_emergency<F>(&mut self, callback: F)
    where
        F: Fn(&EmergencyEvent) + Send + 'static,
    {
        self.emergency_listeners.push(Box::new(callback));
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn invalid(&self, operation: &'static str) -> FleetError {
        FleetError::InvalidState {
            state: self.state,
            operation,
        }
    }

    fn transition(&mut self, next: VehicleCoordinationState) -> bool {
        let from = self.state;
        if !from.can_transition_to(next) {
            trace!(%from, to = %next, "Transition not allowed");
            return false;
        }

        self.state = next;
        counter!(obs::STATE_TRANSITIONS, "from" => from.as_str(), "to" => next.as_str()).increment(1);
        info!(vehicle = %self.local_id, %from, to = %next, "State transition");
        for listener in &self.state_listeners {
            listener(from, next);
        }
        true
    }

    /// IDLE -> SYNCHRONIZING if possible; returns whether it happened
    fn enter_sync(&mut self) -> bool {
        self.state == VehicleCoordinationState::Idle
            && self.transition(VehicleCoordinationState::Synchronizing)
    }

    /// Keep IDLE and WORKING in line with section ownership
    fn reconcile_work_state(&mut self) {
        let owned = self.allocation.sections_owned_by(&self.local_id).len();
        gauge!(obs::OWNED_SECTIONS).set(owned as f64);

        match self.state {
            VehicleCoordinationState::Idle if owned > 0 => {
                self.transition(VehicleCoordinationState::Working);
            }
            VehicleCoordinationState::Working if owned == 0 => {
                self.transition(VehicleCoordinationState::Idle);
            }
            _ => {}
        }
    }

    fn log_ownership_changes(&self, report: &MergeReport) {
        for change in &report.ownership_changes {
            if change.previous.as_ref() == Some(&self.local_id) {
                info!(section = %change.section_id, owner = ?change.current, "Section taken over during sync");
            }
        }
    }

    fn advance_clock(&mut self) -> VectorClock {
        self.clock.increment(&self.local_id);
        self.clock.clone()
    }

    fn heartbeat(&self) -> Heartbeat {
        Heartbeat {
            status: self.state.as_str().to_string(),
            position: self.telemetry.position,
            speed: self.telemetry.speed,
            health: self.telemetry.health,
        }
    }

    /// Every peer this vehicle can address directly
    fn peer_destinations(&self) -> Vec<Destination> {
        let mut peers: BTreeSet<VehicleId> = self.status.peer_ids().into_iter().collect();
        peers.extend(self.tracker.transport().known_peers());
        peers.remove(&self.local_id);
        peers.into_iter().map(Destination::Peer).collect()
    }

    /// Unicast to known peers, or a single broadcast when none are known
    fn fanout_destinations(&self) -> Vec<Destination> {
        let peers = self.peer_destinations();
        if peers.is_empty() {
            vec![Destination::Broadcast]
        } else {
            peers
        }
    }

    fn send_message(
        &mut self,
        now: Instant,
        payload: MessagePayload,
        destinations: &[Destination],
        options: SendOptions,
    ) -> Vec<MessageId> {
        let stamp = self.advance_clock();
        self.send_stamped(now, stamp, payload, destinations, options)
    }

    /// Queue one copy of the message per destination, all carrying `stamp`
    fn send_stamped(
        &mut self,
        now: Instant,
        stamp: VectorClock,
        payload: MessagePayload,
        destinations: &[Destination],
        options: SendOptions,
    ) -> Vec<MessageId> {
        let message = ProtocolMessage::new(self.local_id.clone(), stamp, payload);
        let value = match message.to_value() {
            Ok(value) => value,
            Err(e) => {
                error!(msg_type = message.msg_type(), error = %e, "Cannot encode protocol message");
                return Vec::new();
            }
        };
        let msg_type = message.msg_type().to_string();

        let mut ids = Vec::with_capacity(destinations.len());
        for destination in destinations {
            let callback = options
                .requires_ack
                .then(|| failure_logger(msg_type.clone(), destination.clone()));
            let id = self
                .tracker
                .send_at(now, destination.clone(), value.clone(), options, callback);
            counter!(obs::MESSAGES_SENT, "msg_type" => msg_type.clone()).increment(1);
            ids.push(id);
        }
        ids
    }
}

/// Delivery callback that logs failed guaranteed sends
fn failure_logger(msg_type: String, destination: Destination) -> DeliveryCallback {
    Box::new(move |message_id, status| {
        if status != DeliveryStatus::Failed {
            return;
        }
        match destination {
            Destination::Peer(_) => {
                warn!(%message_id, %msg_type, %destination, "Guaranteed delivery failed")
            }
            Destination::Broadcast => {
                debug!(%message_id, %msg_type, "Broadcast went unacknowledged")
            }
        }
    })
}

impl fmt::Debug for FleetCoordinationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FleetCoordinationEngine")
            .field("local_id", &self.local_id)
            .field("state", &self.state)
            .field("clock", &self.clock)
            .field("sections", &self.allocation.len())
            .field("peers", &self.status.len())
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}
