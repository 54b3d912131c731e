//! Leader election vote bookkeeping
//!
//! Votes are routed and counted only. Deciding a winner or acting on one is left
//! to the application.

use fieldmesh_core::VehicleId;
use std::collections::BTreeMap;

/// Votes per election, one per voter
#[derive(Debug, Clone, Default)]
pub struct ElectionTally {
    elections: BTreeMap<String, BTreeMap<VehicleId, VehicleId>>,
}

impl ElectionTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `voter`'s vote. A later vote from the same voter replaces the earlier one.
    ///
    /// Returns the previous candidate, if any.
    pub fn record(&mut self, election_id: &str, voter: VehicleId, candidate: VehicleId) -> Option<VehicleId> {
        self.elections
            .entry(election_id.to_string())
            .or_default()
            .insert(voter, candidate)
    }

    /// Vote counts per candidate
    pub fn tally(&self, election_id: &str) -> BTreeMap<VehicleId, usize> {
        let mut counts = BTreeMap::new();
        if let Some(votes) = self.elections.get(election_id) {
            for candidate in votes.values() {
                *counts.entry(candidate.clone()).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Individual votes, voter to candidate
    pub fn votes(&self, election_id: &str) -> Option<&BTreeMap<VehicleId, VehicleId>> {
        self.elections.get(election_id)
    }

    /// Known election ids
    pub fn elections(&self) -> impl Iterator<Item = &str> {
        self.elections.keys().map(String::as_str)
    }
}
