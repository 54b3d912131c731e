//! Async runtime around one engine
//!
//! [`FleetNode::spawn`] moves the engine onto a tokio task. API calls, inbound
//! datagrams and scheduler ticks are serialized through a single `select!` loop,
//! so the engine itself never needs a lock.

use crate::engine::{EmergencyEvent, FleetCoordinationEngine};
use crate::error::{FleetError, FleetResult};
use crate::protocol::Position;
use crate::state::VehicleCoordinationState;
use crate::status::PeerStatus;
use fieldmesh_core::VehicleId;
use fieldmesh_crdt::AllocationSnapshot;
use fieldmesh_net::{MessageId, TrackerStats};
use std::collections::BTreeMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

const COMMAND_QUEUE: usize = 256;

type Job = Box<dyn FnOnce(&mut FleetCoordinationEngine) + Send>;

enum Command {
    Run(Job),
    Shutdown(oneshot::Sender<FleetCoordinationEngine>),
}

/// Spawns engine tasks
pub struct FleetNode;

impl FleetNode {
    /// Run `engine` on a new task, feeding it datagrams from `inbound`.
    ///
    /// The task ends on [`FleetHandle::shutdown`] or once every handle is dropped, in
    /// which case the engine is stopped first.
    pub fn spawn(
        engine: FleetCoordinationEngine,
        inbound: mpsc::Receiver<Vec<u8>>,
    ) -> (FleetHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
        let vehicle_id = engine.local_id().clone();
        let task = tokio::spawn(run(engine, rx, inbound));
        (FleetHandle { vehicle_id, commands: tx }, task)
    }
}

async fn run(
    mut engine: FleetCoordinationEngine,
    mut commands: mpsc::Receiver<Command>,
    mut inbound: mpsc::Receiver<Vec<u8>>,
) {
    let mut ticker = time::interval(engine.config().tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut inbound_open = true;
    debug!(vehicle = %engine.local_id(), "Fleet node running");

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Run(job)) => job(&mut engine),
                Some(Command::Shutdown(reply)) => {
                    info!(vehicle = %engine.local_id(), "Fleet node shut down");
                    let _ = reply.send(engine);
                    return;
                }
                None => {
                    if let Err(e) = engine.stop() {
                        debug!(error = %e, "Engine not stopped on handle drop");
                    }
                    info!(vehicle = %engine.local_id(), "All handles dropped, fleet node exiting");
                    return;
                }
            },
            datagram = inbound.recv(), if inbound_open => match datagram {
                Some(bytes) => engine.handle_datagram(&bytes),
                None => {
                    debug!("Inbound channel closed");
                    inbound_open = false;
                }
            },
            _ = ticker.tick() => {}
        }
        engine.tick();
    }
}

/// Clonable async front end to a running [`FleetNode`]
#[derive(Clone)]
pub struct FleetHandle {
    vehicle_id: VehicleId,
    commands: mpsc::Sender<Command>,
}

impl FleetHandle {
    /// Vehicle this node runs for
    pub fn vehicle_id(&self) -> &VehicleId {
        &self.vehicle_id
    }

    /// Whether the node task is still accepting commands
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    /// Run `f` on the engine and return its result
    pub async fn call<R, F>(&self, f: F) -> FleetResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut FleetCoordinationEngine) -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move |engine| {
            let _ = tx.send(f(engine));
        });
        self.commands
            .send(Command::Run(job))
            .await
            .map_err(|_| FleetError::NodeStopped)?;
        rx.await.map_err(|_| FleetError::NodeStopped)
    }

    pub async fn start(&self) -> FleetResult<()> {
        self.call(|e| e.start()).await?
    }

    pub async fn stop(&self) -> FleetResult<()> {
        self.call(|e| e.stop()).await?
    }

    pub async fn claim_section(&self, section_id: impl Into<String>) -> FleetResult<bool> {
        let section_id = section_id.into();
        self.call(move |e| e.claim_section(&section_id)).await
    }

    pub async fn release_section(&self, section_id: impl Into<String>) -> FleetResult<bool> {
        let section_id = section_id.into();
        self.call(move |e| e.release_section(&section_id)).await
    }

    pub async fn broadcast_emergency_stop(&self, reason_code: u32) -> FleetResult<Vec<MessageId>> {
        self.call(move |e| e.broadcast_emergency_stop(reason_code)).await
    }

    pub async fn on_manual_reset(&self) -> FleetResult<()> {
        self.call(|e| e.on_manual_reset()).await?
    }

    pub async fn update_telemetry(&self, position: Position, speed: f64, health: f64) -> FleetResult<()> {
        self.call(move |e| e.update_telemetry(position, speed, health)).await
    }

    pub async fn cast_election_vote(
        &self,
        election_id: impl Into<String>,
        candidate: VehicleId,
    ) -> FleetResult<Vec<MessageId>> {
        let election_id = election_id.into();
        self.call(move |e| e.cast_election_vote(&election_id, candidate)).await
    }

    pub async fn election_tally(&self, election_id: impl Into<String>) -> FleetResult<BTreeMap<VehicleId, usize>> {
        let election_id = election_id.into();
        self.call(move |e| e.election_tally(&election_id)).await
    }

    pub async fn get_fleet_status(&self) -> FleetResult<BTreeMap<VehicleId, PeerStatus>> {
        self.call(|e| e.get_fleet_status()).await
    }

    pub async fn get_field_allocation_state(&self) -> FleetResult<AllocationSnapshot> {
        self.call(|e| e.get_field_allocation_state()).await
    }

    pub async fn get_current_state(&self) -> FleetResult<VehicleCoordinationState> {
        self.call(|e| e.get_current_state()).await
    }

    pub async fn owned_sections(&self) -> FleetResult<Vec<String>> {
        self.call(|e| e.owned_sections()).await
    }

    pub async fn tracker_stats(&self) -> FleetResult<TrackerStats> {
        self.call(|e| e.tracker_stats()).await
    }

    pub async fn on_state_change<F>(&self, callback: F) -> FleetResult<()>
    where
        F: Fn(VehicleCoordinationState, VehicleCoordinationState) + Send + 'static,
    {
        self.call(move |e| e.on_state_change(callback)).await
    }

    pub async fn on_emergency<F>(&self, callback: F) -> FleetResult<()>
    where
        F: Fn(&EmergencyEvent) + Send + 'static,
    {
        self.call(move |e| e.on_emergency(callback)).await
    }

    /// Stop the task and take the engine back, unstopped
    pub async fn shutdown(self) -> FleetResult<FleetCoordinationEngine> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Shutdown(tx))
            .await
            .map_err(|_| FleetError::NodeStopped)?;
        rx.await.map_err(|_| FleetError::NodeStopped)
    }
}

impl std::fmt::Debug for FleetHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetHandle")
            .field("vehicle_id", &self.vehicle_id)
            .field("running", &self.is_running())
            .finish()
    }
}
