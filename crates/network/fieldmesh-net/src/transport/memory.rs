//! In-memory transport for testing and simulation.
//!
//! A [`MemoryNetwork`] is a shared radio medium. Every registered vehicle gets a
//! [`MemoryTransport`] for sending and a channel receiver for inbound datagrams.
//! The medium can drop datagrams at random and partition vehicles from each other.

use crate::error::TransportError;
use crate::transport::traits::{Destination, RawTransport};
use fieldmesh_core::VehicleId;
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Default per-vehicle inbound queue length.
pub const DEFAULT_INBOX_CAPACITY: usize = 1024;

/// Counters kept by the medium.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryNetworkStats {
    /// Datagrams placed in a receiver's inbox
    pub delivered: u64,
    /// Datagrams lost to random loss
    pub lost: u64,
    /// Datagrams blocked by a partition
    pub partitioned: u64,
    /// Datagrams dropped because the receiver's inbox was full or closed
    pub overflowed: u64,
}

struct Medium {
    inboxes: BTreeMap<VehicleId, mpsc::Sender<Vec<u8>>>,
    partitions: HashSet<(VehicleId, VehicleId)>,
    loss_probability: f64,
    rng: StdRng,
    stats: MemoryNetworkStats,
}

impl Medium {
    fn link(a: &VehicleId, b: &VehicleId) -> (VehicleId, VehicleId) {
        if a <= b {
            (a.clone(), b.clone())
        } else {
            (b.clone(), a.clone())
        }
    }

    fn deliver(&mut self, from: &VehicleId, to: &VehicleId, bytes: &[u8]) {
        if self.partitions.contains(&Self::link(from, to)) {
            self.stats.partitioned += 1;
            trace!(%from, %to, "Datagram blocked by partition");
            return;
        }
        if self.loss_probability > 0.0 && self.rng.gen_bool(self.loss_probability) {
            self.stats.lost += 1;
            trace!(%from, %to, "Datagram lost");
            return;
        }
        let Some(inbox) = self.inboxes.get(to) else {
            return;
        };
        match inbox.try_send(bytes.to_vec()) {
            Ok(()) => self.stats.delivered += 1,
            Err(_) => {
                self.stats.overflowed += 1;
                debug!(%to, "Inbox full or closed, datagram dropped");
            }
        }
    }
}

/// Shared in-process radio medium.
#[derive(Clone)]
pub struct MemoryNetwork {
    medium: Arc<Mutex<Medium>>,
}

impl MemoryNetwork {
    /// Creates a lossless network.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Creates a network whose random loss is reproducible.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            medium: Arc::new(Mutex::new(Medium {
                inboxes: BTreeMap::new(),
                partitions: HashSet::new(),
                loss_probability: 0.0,
                rng,
                stats: MemoryNetworkStats::default(),
            })),
        }
    }

    /// Attaches a vehicle and returns its transport and inbound receiver.
    ///
    /// Registering the same id again replaces the previous inbox.
    pub fn register(&self, id: VehicleId) -> (MemoryTransport, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(DEFAULT_INBOX_CAPACITY);
        self.medium.lock().inboxes.insert(id.clone(), tx);
        debug!(vehicle = %id, "Registered on memory network");
        (
            MemoryTransport {
                id,
                network: self.clone(),
            },
            rx,
        )
    }

    /// Detaches a vehicle; datagrams addressed to it are silently lost.
    pub fn unregister(&self, id: &VehicleId) {
        self.medium.lock().inboxes.remove(id);
    }

    /// Sets the probability in `[0, 1]` that any single datagram is lost.
    pub fn set_loss_probability(&self, probability: f64) {
        self.medium.lock().loss_probability = probability.clamp(0.0, 1.0);
    }

    /// Blocks traffic between two vehicles in both directions.
    pub fn partition(&self, a: &VehicleId, b: &VehicleId) {
        self.medium.lock().partitions.insert(Medium::link(a, b));
    }

    /// Cuts a vehicle off from every other registered vehicle.
    pub fn isolate(&self, id: &VehicleId) {
        let mut medium = self.medium.lock();
        let others: Vec<VehicleId> = medium.inboxes.keys().filter(|v| *v != id).cloned().collect();
        for other in others {
            medium.partitions.insert(Medium::link(id, &other));
        }
    }

    /// Restores traffic between two vehicles.
    pub fn heal(&self, a: &VehicleId, b: &VehicleId) {
        self.medium.lock().partitions.remove(&Medium::link(a, b));
    }

    /// Removes every partition.
    pub fn heal_all(&self) {
        self.medium.lock().partitions.clear();
    }

    /// Registered vehicles.
    pub fn members(&self) -> Vec<VehicleId> {
        self.medium.lock().inboxes.keys().cloned().collect()
    }

    /// Snapshot of the medium counters.
    pub fn stats(&self) -> MemoryNetworkStats {
        self.medium.lock().stats
    }
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

/// One vehicle's handle on a [`MemoryNetwork`].
#[derive(Clone)]
pub struct MemoryTransport {
    id: VehicleId,
    network: MemoryNetwork,
}

impl MemoryTransport {
    /// Vehicle this transport sends as.
    pub fn id(&self) -> &VehicleId {
        &self.id
    }
}

impl RawTransport for MemoryTransport {
    fn send_raw(&self, bytes: &[u8], destination: &Destination) -> Result<(), TransportError> {
        let mut medium = self.network.medium.lock();
        match destination {
            Destination::Peer(to) => {
                if !medium.inboxes.contains_key(to) {
                    return Err(TransportError::UnknownPeer(to.to_string()));
                }
                medium.deliver(&self.id, to, bytes);
            }
            Destination::Broadcast => {
                let targets: Vec<VehicleId> = medium
                    .inboxes
                    .keys()
                    .filter(|v| **v != self.id)
                    .cloned()
                    .collect();
                for to in &targets {
                    medium.deliver(&self.id, to, bytes);
                }
            }
        }
        Ok(())
    }

    fn known_peers(&self) -> Vec<VehicleId> {
        self.network
            .members()
            .into_iter()
            .filter(|v| *v != self.id)
            .collect()
    }
}
