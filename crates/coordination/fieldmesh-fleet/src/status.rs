//! Last-known status of every peer, fed by heartbeats

use crate::protocol::Heartbeat;
use chrono::{DateTime, Utc};
use fieldmesh_core::VehicleId;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Latest heartbeat from one peer
#[derive(Debug, Clone, PartialEq)]
pub struct PeerStatus {
    pub heartbeat: Heartbeat,
    /// Monotonic receipt time, used for expiry
    pub received_at: Instant,
    /// Wall-clock receipt time, for display
    pub last_seen: DateTime<Utc>,
}

/// Peer status keyed by vehicle id
#[derive(Debug, Clone, Default)]
pub struct FleetStatusTable {
    peers: BTreeMap<VehicleId, PeerStatus>,
}

impl FleetStatusTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a heartbeat; returns `true` if the peer was not known before
    pub fn update(&mut self, peer: VehicleId, heartbeat: Heartbeat, now: Instant) -> bool {
        let status = PeerStatus {
            heartbeat,
            received_at: now,
            last_seen: Utc::now(),
        };
        self.peers.insert(peer, status).is_none()
    }

    /// Forget a peer
    pub fn remove(&mut self, peer: &VehicleId) -> Option<PeerStatus> {
        self.peers.remove(peer)
    }

    /// Drop peers silent for longer than `timeout`; returns the dropped ids
    pub fn prune(&mut self, now: Instant, timeout: Duration) -> Vec<VehicleId> {
        let expired: Vec<VehicleId> = self
            .peers
            .iter()
            .filter(|(_, s)| now.saturating_duration_since(s.received_at) > timeout)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            self.peers.remove(id);
            debug!(peer = %id, "Peer timed out");
        }
        expired
    }

    pub fn get(&self, peer: &VehicleId) -> Option<&PeerStatus> {
        self.peers.get(peer)
    }

    pub fn contains(&self, peer: &VehicleId) -> bool {
        self.peers.contains_key(peer)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VehicleId, &PeerStatus)> {
        self.peers.iter()
    }

    /// Known peer ids in order
    pub fn peer_ids(&self) -> Vec<VehicleId> {
        self.peers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Copy of the table contents
    pub fn to_map(&self) -> BTreeMap<VehicleId, PeerStatus> {
        self.peers.clone()
    }
}
