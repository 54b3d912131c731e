//! Field allocation CRDT
//!
//! Every vehicle holds a full replica mapping work-section id to the winning
//! [`WorkSectionClaim`]. Replicas converge by exchanging [`AllocationSnapshot`]s or
//! single claim records; merge is a per-section maximum under a total order on
//! records, which makes it commutative, associative and idempotent.
//!
//! ## Winner order
//!
//! For two records on the same section the record with the larger key wins:
//!
//! 1. `claim_clock.weight()` (sum of clock entries). A dominated clock always has a
//!    strictly smaller weight, so a causally newer record always wins.
//! 2. Owner id, **lower** id wins (`"unclaimed"` participates as a plain string).
//! 3. Action, a release beats a claim.
//! 4. The clock entries themselves, which only matters for records that are equal in
//!    everything above.
//!
//! Concurrent claims with equal weight therefore resolve to the lexicographically
//! lowest vehicle id. Concurrent claims with different weights go to the heavier
//! clock, whatever the ids: a vehicle that has seen more of the fleet's history
//! beats a lower id that has seen less. Plain lowest-id ordering is not
//! associative once releases take part, so it cannot be the first key.

use crate::{
    clock::VectorClock,
    error::{CrdtError, Result},
};
use fieldmesh_core::{VehicleId, UNCLAIMED};
use serde::{Deserialize, Serialize};
use std::{
    cmp::{Ordering, Reverse},
    collections::BTreeMap,
    fmt,
};
use tracing::{debug, warn};

/// Who holds a work section according to one record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SectionOwner {
    /// Nobody, written as `"unclaimed"` on the wire
    Unclaimed,
    /// A vehicle
    Vehicle(VehicleId),
}

impl SectionOwner {
    /// Owning vehicle, if any
    pub fn vehicle(&self) -> Option<&VehicleId> {
        match self {
            SectionOwner::Unclaimed => None,
            SectionOwner::Vehicle(id) => Some(id),
        }
    }

    /// Wire representation
    pub fn as_str(&self) -> &str {
        match self {
            SectionOwner::Unclaimed => UNCLAIMED,
            SectionOwner::Vehicle(id) => id.as_str(),
        }
    }
}

impl From<String> for SectionOwner {
    fn from(s: String) -> Self {
        if s == UNCLAIMED {
            SectionOwner::Unclaimed
        } else {
            SectionOwner::Vehicle(VehicleId::from(s))
        }
    }
}

impl From<SectionOwner> for String {
    fn from(owner: SectionOwner) -> Self {
        match owner {
            SectionOwner::Unclaimed => UNCLAIMED.to_string(),
            SectionOwner::Vehicle(id) => id.into_inner(),
        }
    }
}

impl From<VehicleId> for SectionOwner {
    fn from(id: VehicleId) -> Self {
        SectionOwner::Vehicle(id)
    }
}

impl fmt::Display for SectionOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claim or release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimAction {
    /// Take ownership
    Claim,
    /// Give ownership back
    Release,
}

impl ClaimAction {
    fn rank(self) -> u8 {
        match self {
            ClaimAction::Claim => 0,
            ClaimAction::Release => 1,
        }
    }
}

/// One ownership record for a work section
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkSectionClaim {
    /// Section this record is about
    pub section_id: String,
    /// Owner after this record
    pub owner: SectionOwner,
    /// Causal timestamp of the record
    pub claim_clock: VectorClock,
    /// What the record does
    pub action: ClaimAction,
}

impl WorkSectionClaim {
    /// Create a claim record
    pub fn claim(section_id: impl Into<String>, vehicle: VehicleId, clock: VectorClock) -> Self {
        Self {
            section_id: section_id.into(),
            owner: SectionOwner::Vehicle(vehicle),
            claim_clock: clock,
            action: ClaimAction::Claim,
        }
    }

    /// Create a release record
    pub fn release(section_id: impl Into<String>, clock: VectorClock) -> Self {
        Self {
            section_id: section_id.into(),
            owner: SectionOwner::Unclaimed,
            claim_clock: clock,
            action: ClaimAction::Release,
        }
    }

    /// Check that owner and action agree
    pub fn validate(&self) -> Result<()> {
        if self.section_id.is_empty() {
            return Err(CrdtError::InvalidRecord {
                section_id: self.section_id.clone(),
                reason: "empty section id".to_string(),
            });
        }
        match (self.action, &self.owner) {
            (ClaimAction::Claim, SectionOwner::Vehicle(_))
            | (ClaimAction::Release, SectionOwner::Unclaimed) => Ok(()),
            (ClaimAction::Claim, SectionOwner::Unclaimed) => Err(CrdtError::InvalidRecord {
                section_id: self.section_id.clone(),
                reason: "claim without an owner".to_string(),
            }),
            (ClaimAction::Release, SectionOwner::Vehicle(v)) => Err(CrdtError::InvalidRecord {
                section_id: self.section_id.clone(),
                reason: format!("release still names owner {v}"),
            }),
        }
    }

    fn winner_key(&self) -> (u128, Reverse<&str>, u8, &VectorClock) {
        (
            self.claim_clock.weight(),
            Reverse(self.owner.as_str()),
            self.action.rank(),
            &self.claim_clock,
        )
    }

    /// Order two records for the same section; the greater one wins
    pub fn arbitrate(&self, other: &WorkSectionClaim) -> Ordering {
        self.winner_key().cmp(&other.winner_key())
    }
}

/// Serializable full replica state, sent in state sync responses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllocationSnapshot {
    sections: BTreeMap<String, WorkSectionClaim>,
}

impl AllocationSnapshot {
    /// Records keyed by section id
    pub fn sections(&self) -> &BTreeMap<String, WorkSectionClaim> {
        &self.sections
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// True when there are no records
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Canonical JSON encoding. Equal snapshots encode to equal bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from [`AllocationSnapshot::to_bytes`] output
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl FromIterator<WorkSectionClaim> for AllocationSnapshot {
    fn from_iter<I: IntoIterator<Item = WorkSectionClaim>>(iter: I) -> Self {
        let mut replica = FieldAllocationCrdt::new();
        for record in iter {
            replica.merge_claim(record);
        }
        replica.snapshot()
    }
}

/// Ownership of one section changed during a merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipChange {
    /// Affected section
    pub section_id: String,
    /// Owner before the merge
    pub previous: Option<VehicleId>,
    /// Owner after the merge
    pub current: Option<VehicleId>,
}

/// Outcome of merging a snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Records that replaced the local winner
    pub records_applied: usize,
    /// Records dropped as invalid
    pub records_rejected: usize,
    /// Sections whose owner changed
    pub ownership_changes: Vec<OwnershipChange>,
}

impl MergeReport {
    /// True when the merge did not change local state
    pub fn is_noop(&self) -> bool {
        self.records_applied == 0
    }
}

/// Replicated map from section id to the winning claim record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldAllocationCrdt {
    sections: BTreeMap<String, WorkSectionClaim>,
}

impl FieldAllocationCrdt {
    /// Create an empty replica
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a replica from a snapshot
    pub fn from_snapshot(snapshot: &AllocationSnapshot) -> Self {
        let mut replica = Self::new();
        replica.merge(snapshot);
        replica
    }

    /// Claim a section for `vehicle` stamped with `clock`.
    ///
    /// Returns `false` without mutating when another vehicle currently owns the
    /// section. Otherwise returns whether `vehicle` owns the section afterwards, which
    /// is only `false` when `clock` is older than the record already held.
    pub fn claim(&mut self, section_id: &str, vehicle: &VehicleId, clock: &VectorClock) -> bool {
        match self.owner_of(section_id) {
            Some(owner) if owner == vehicle => return true,
            Some(owner) => {
                debug!(section = section_id, %owner, claimant = %vehicle, "Section already claimed");
                return false;
            }
            None => {}
        }

        let record = WorkSectionClaim::claim(section_id, vehicle.clone(), clock.clone());
        self.merge_claim(record);
        self.owner_of(section_id) == Some(vehicle)
    }

    /// Release a section held by `vehicle`.
    ///
    /// No-op returning `false` when `vehicle` is not the current owner.
    pub fn release(&mut self, section_id: &str, vehicle: &VehicleId, clock: &VectorClock) -> bool {
        if self.owner_of(section_id) != Some(vehicle) {
            debug!(section = section_id, vehicle = %vehicle, "Release ignored, not the owner");
            return false;
        }

        self.merge_claim(WorkSectionClaim::release(section_id, clock.clone()));
        self.owner_of(section_id) != Some(vehicle)
    }

    /// Merge one record; returns `true` if it became the section's winner
    pub fn merge_claim(&mut self, record: WorkSectionClaim) -> bool {
        if let Err(err) = record.validate() {
            warn!(error = %err, "Dropping invalid claim record");
            return false;
        }

        match self.sections.get(&record.section_id) {
            Some(current) if record.arbitrate(current) != Ordering::Greater => false,
            _ => {
                self.sections.insert(record.section_id.clone(), record);
                true
            }
        }
    }

    /// Merge a remote snapshot section by section
    pub fn merge(&mut self, remote: &AllocationSnapshot) -> MergeReport {
        let mut report = MergeReport::default();

        for (key, record) in &remote.sections {
            if key != &record.section_id {
                let err = CrdtError::SectionMismatch {
                    key: key.clone(),
                    section_id: record.section_id.clone(),
                };
                warn!(error = %err, "Dropping snapshot entry");
                report.records_rejected += 1;
                continue;
            }
            if let Err(err) = record.validate() {
                warn!(error = %err, "Dropping snapshot entry");
                report.records_rejected += 1;
                continue;
            }

            let previous = self.owner_of(key).cloned();
            if self.merge_claim(record.clone()) {
                report.records_applied += 1;
                let current = self.owner_of(key).cloned();
                if previous != current {
                    report.ownership_changes.push(OwnershipChange {
                        section_id: key.clone(),
                        previous,
                        current,
                    });
                }
            }
        }

        if !report.is_noop() {
            debug!(
                applied = report.records_applied,
                ownership_changes = report.ownership_changes.len(),
                "Merged allocation snapshot"
            );
        }
        report
    }

    /// Copy of the full replica state
    pub fn snapshot(&self) -> AllocationSnapshot {
        AllocationSnapshot {
            sections: self.sections.clone(),
        }
    }

    /// Current owner of a section
    pub fn owner_of(&self, section_id: &str) -> Option<&VehicleId> {
        self.sections.get(section_id).and_then(|r| r.owner.vehicle())
    }

    /// Winning record for a section
    pub fn get(&self, section_id: &str) -> Option<&WorkSectionClaim> {
        self.sections.get(section_id)
    }

    /// Sections currently owned by `vehicle`, in id order
    pub fn sections_owned_by(&self, vehicle: &VehicleId) -> Vec<String> {
        self.sections
            .values()
            .filter(|r| r.owner.vehicle() == Some(vehicle))
            .map(|r| r.section_id.clone())
            .collect()
    }

    /// Pointwise maximum of every stored claim clock
    pub fn clock_frontier(&self) -> VectorClock {
        self.sections
            .values()
            .fold(VectorClock::new(), |mut acc, r| {
                acc.merge(&r.claim_clock);
                acc
            })
    }

    /// Iterate winning records in section order
    pub fn iter(&self) -> impl Iterator<Item = &WorkSectionClaim> {
        self.sections.values()
    }

    /// Number of sections with a record, released ones included
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// True when no section has a record
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vc(entries: &[(&str, u64)]) -> VectorClock {
        entries.iter().map(|(v, c)| (VehicleId::from(*v), *c)).collect()
    }

    #[test]
    fn test_claim_free_section() {
        let a = VehicleId::from("tractor-a");
        let mut crdt = FieldAllocationCrdt::new();
        assert!(crdt.claim("north-40", &a, &vc(&[("tractor-a", 1)])));
        assert_eq!(crdt.owner_of("north-40"), Some(&a));
        // Re-claiming your own section is fine
        assert!(crdt.claim("north-40", &a, &vc(&[("tractor-a", 2)])));
    }

    #[test]
    fn test_claim_rejected_when_owned_by_other() {
        let a = VehicleId::from("tractor-a");
        let b = VehicleId::from("tractor-b");
        let mut crdt = FieldAllocationCrdt::new();
        crdt.claim("north-40", &a, &vc(&[("tractor-a", 1)]));

        let before = crdt.clone();
        assert!(!crdt.claim("north-40", &b, &vc(&[("tractor-a", 1), ("tractor-b", 1)])));
        assert_eq!(crdt, before);
    }

    #[test]
    fn test_release_then_reclaim() {
        let a = VehicleId::from("tractor-a");
        let b = VehicleId::from("tractor-b");
        let mut crdt = FieldAllocationCrdt::new();
        crdt.claim("s1", &a, &vc(&[("tractor-a", 1)]));

        assert!(!crdt.release("s1", &b, &vc(&[("tractor-b", 1)])));
        assert_eq!(crdt.owner_of("s1"), Some(&a));

        assert!(crdt.release("s1", &a, &vc(&[("tractor-a", 2)])));
        assert_eq!(crdt.owner_of("s1"), None);
        assert_eq!(crdt.get("s1").map(|r| r.action), Some(ClaimAction::Release));

        assert!(crdt.claim("s1", &b, &vc(&[("tractor-a", 2), ("tractor-b", 1)])));
        assert_eq!(crdt.owner_of("s1"), Some(&b));
    }

    #[test]
    fn test_dominated_record_never_wins() {
        let mut crdt = FieldAllocationCrdt::new();
        let newer = WorkSectionClaim::claim("s1", "tractor-z".into(), vc(&[("tractor-a", 1), ("tractor-z", 1)]));
        let older = WorkSectionClaim::claim("s1", "tractor-a".into(), vc(&[("tractor-a", 1)]));

        assert!(crdt.merge_claim(newer.clone()));
        assert!(!crdt.merge_claim(older));
        assert_eq!(crdt.get("s1"), Some(&newer));
    }

    #[test]
    fn test_concurrent_claims_lowest_id_wins() {
        let a = WorkSectionClaim::claim("s1", "tractor-a".into(), vc(&[("tractor-a", 1)]));
        let b = WorkSectionClaim::claim("s1", "tractor-b".into(), vc(&[("tractor-b", 1)]));
        assert_eq!(a.arbitrate(&b), Ordering::Greater);

        let mut left = FieldAllocationCrdt::new();
        left.merge_claim(b.clone());
        left.merge_claim(a.clone());
        let mut right = FieldAllocationCrdt::new();
        right.merge_claim(a);
        right.merge_claim(b);

        assert_eq!(left, right);
        assert_eq!(left.owner_of("s1"), Some(&VehicleId::from("tractor-a")));
    }

    #[test]
    fn test_concurrent_heavier_clock_beats_lower_id() {
        let a = WorkSectionClaim::claim("s1", "tractor-a".into(), vc(&[("tractor-a", 1)]));
        let b = WorkSectionClaim::claim("s1", "tractor-b".into(), vc(&[("tractor-b", 3)]));
        assert!(a.claim_clock.is_concurrent(&b.claim_clock));
        assert_eq!(b.arbitrate(&a), Ordering::Greater);

        let mut crdt = FieldAllocationCrdt::new();
        crdt.merge_claim(a);
        crdt.merge_claim(b);
        assert_eq!(crdt.owner_of("s1"), Some(&VehicleId::from("tractor-b")));
    }

    #[test]
    fn test_invalid_records_rejected() {
        let bad_claim = WorkSectionClaim {
            section_id: "s1".into(),
            owner: SectionOwner::Unclaimed,
            claim_clock: vc(&[("a", 1)]),
            action: ClaimAction::Claim,
        };
        let bad_release = WorkSectionClaim {
            section_id: "s1".into(),
            owner: SectionOwner::Vehicle("a".into()),
            claim_clock: vc(&[("a", 1)]),
            action: ClaimAction::Release,
        };
        assert!(bad_claim.validate().is_err());
        assert!(bad_release.validate().is_err());

        let mut crdt = FieldAllocationCrdt::new();
        assert!(!crdt.merge_claim(bad_claim));
        assert!(crdt.is_empty());
    }

    #[test]
    fn test_merge_report_lists_ownership_changes() {
        let mut local = FieldAllocationCrdt::new();
        local.claim("s1", &"tractor-b".into(), &vc(&[("tractor-b", 1)]));

        let mut remote = FieldAllocationCrdt::new();
        remote.claim("s1", &"tractor-a".into(), &vc(&[("tractor-a", 1)]));
        remote.claim("s2", &"tractor-a".into(), &vc(&[("tractor-a", 2)]));

        let report = local.merge(&remote.snapshot());
        assert_eq!(report.records_applied, 2);
        assert_eq!(report.records_rejected, 0);
        assert_eq!(report.ownership_changes.len(), 2);
        assert_eq!(report.ownership_changes[0].previous, Some("tractor-b".into()));
        assert_eq!(report.ownership_changes[0].current, Some("tractor-a".into()));

        // Second merge of the same snapshot changes nothing
        assert!(local.merge(&remote.snapshot()).is_noop());
    }

    #[test]
    fn test_snapshot_wire_format() {
        let mut crdt = FieldAllocationCrdt::new();
        crdt.claim("north-40", &"tractor-a".into(), &vc(&[("tractor-a", 1)]));
        crdt.claim("south-10", &"tractor-a".into(), &vc(&[("tractor-a", 2)]));
        crdt.release("south-10", &"tractor-a".into(), &vc(&[("tractor-a", 3)]));

        let json: serde_json::Value = serde_json::to_value(crdt.snapshot()).unwrap();
        assert_eq!(json["north-40"]["owner"], "tractor-a");
        assert_eq!(json["north-40"]["action"], "claim");
        assert_eq!(json["south-10"]["owner"], "unclaimed");
        assert_eq!(json["south-10"]["action"], "release");
        assert_eq!(json["south-10"]["claim_clock"]["tractor-a"], 3);

        let bytes = crdt.snapshot().to_bytes().unwrap();
        let decoded = AllocationSnapshot::from_bytes(&bytes).unwrap();
        assert_eq!(FieldAllocationCrdt::from_snapshot(&decoded), crdt);
    }

    #[test]
    fn test_mismatched_snapshot_key_rejected() {
        let record = WorkSectionClaim::claim("s1", "a".into(), vc(&[("a", 1)]));
        let json = serde_json::json!({ "s2": record });
        let snapshot: AllocationSnapshot = serde_json::from_value(json).unwrap();

        let mut crdt = FieldAllocationCrdt::new();
        let report = crdt.merge(&snapshot);
        assert_eq!(report.records_rejected, 1);
        assert!(crdt.is_empty());
    }

    #[test]
    fn test_queries() {
        let a = VehicleId::from("a");
        let mut crdt = FieldAllocationCrdt::new();
        crdt.claim("s2", &a, &vc(&[("a", 1)]));
        crdt.claim("s1", &a, &vc(&[("a", 2), ("b", 4)]));
        crdt.claim("s3", &"b".into(), &vc(&[("b", 5)]));

        assert_eq!(crdt.sections_owned_by(&a), vec!["s1".to_string(), "s2".to_string()]);
        assert_eq!(crdt.clock_frontier(), vc(&[("a", 2), ("b", 5)]));
        assert_eq!(crdt.len(), 3);
    }
}
