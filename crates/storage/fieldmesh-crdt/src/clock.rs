//! Vector clocks for causal ordering across the fleet

use fieldmesh_core::VehicleId;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{self, Display},
};

/// Causal relationship between two vector clocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClockOrdering {
    /// Every entry is `<=` the other clock and at least one is `<`
    Before,
    /// Every entry is `>=` the other clock and at least one is `>`
    After,
    /// Neither clock dominates
    Concurrent,
    /// All entries equal
    Equal,
}

/// Vector clock keyed by vehicle id.
///
/// Absent entries read as zero and zero entries are never stored, so two clocks that
/// compare [`ClockOrdering::Equal`] also serialize to identical bytes. Entries are
/// kept in a `BTreeMap` for the same reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "BTreeMap<VehicleId, u64>", into = "BTreeMap<VehicleId, u64>")]
pub struct VectorClock {
    entries: BTreeMap<VehicleId, u64>,
}

impl VectorClock {
    /// Create an empty clock
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the caller's own entry by one and return the new value
    pub fn increment(&mut self, self_id: &VehicleId) -> u64 {
        let counter = self.entries.entry(self_id.clone()).or_insert(0);
        debug_assert!(*counter < u64::MAX, "vector clock entry for {self_id} overflowed");
        *counter = counter.saturating_add(1);
        *counter
    }

    /// Counter for a vehicle, zero when absent
    pub fn get(&self, vehicle: &VehicleId) -> u64 {
        self.entries.get(vehicle).copied().unwrap_or(0)
    }

    /// Pointwise maximum with another clock
    pub fn merge(&mut self, other: &VectorClock) {
        for (vehicle, &counter) in &other.entries {
            let current = self.entries.entry(vehicle.clone()).or_insert(0);
            *current = (*current).max(counter);
        }
    }

    /// Return a merged copy without touching either input
    pub fn merged(&self, other: &VectorClock) -> VectorClock {
        let mut out = self.clone();
        out.merge(other);
        out
    }

    /// Compare using the component-wise dominance rule
    pub fn compare(&self, other: &VectorClock) -> ClockOrdering {
        let mut less = false;
        let mut greater = false;

        for vehicle in self.entries.keys().chain(other.entries.keys()) {
            let mine = self.get(vehicle);
            let theirs = other.get(vehicle);
            if mine < theirs {
                less = true;
            } else if mine > theirs {
                greater = true;
            }
            if less && greater {
                return ClockOrdering::Concurrent;
            }
        }

        match (less, greater) {
            (false, false) => ClockOrdering::Equal,
            (true, false) => ClockOrdering::Before,
            (false, true) => ClockOrdering::After,
            (true, true) => ClockOrdering::Concurrent,
        }
    }

    /// Check if this clock happened before another
    pub fn happens_before(&self, other: &VectorClock) -> bool {
        self.compare(other) == ClockOrdering::Before
    }

    /// Check if this clock strictly dominates another
    pub fn dominates(&self, other: &VectorClock) -> bool {
        self.compare(other) == ClockOrdering::After
    }

    /// Check if clocks are concurrent
    pub fn is_concurrent(&self, other: &VectorClock) -> bool {
        self.compare(other) == ClockOrdering::Concurrent
    }

    /// Sum of all entries.
    ///
    /// Strictly increases along every causal chain: if `a` happens before `b` then
    /// `a.weight() < b.weight()`.
    pub fn weight(&self) -> u128 {
        self.entries.values().map(|&c| u128::from(c)).sum()
    }

    /// Vehicles with a non-zero entry
    pub fn vehicles(&self) -> impl Iterator<Item = &VehicleId> {
        self.entries.keys()
    }

    /// Iterate `(vehicle, counter)` pairs in id order
    pub fn iter(&self) -> impl Iterator<Item = (&VehicleId, u64)> {
        self.entries.iter().map(|(v, &c)| (v, c))
    }

    /// Number of non-zero entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when every entry is zero
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<BTreeMap<VehicleId, u64>> for VectorClock {
    fn from(mut entries: BTreeMap<VehicleId, u64>) -> Self {
        entries.retain(|_, counter| *counter > 0);
        Self { entries }
    }
}

impl From<VectorClock> for BTreeMap<VehicleId, u64> {
    fn from(clock: VectorClock) -> Self {
        clock.entries
    }
}

impl FromIterator<(VehicleId, u64)> for VectorClock {
    fn from_iter<I: IntoIterator<Item = (VehicleId, u64)>>(iter: I) -> Self {
        let mut clock = VectorClock::new();
        for (vehicle, counter) in iter {
            if counter > 0 {
                let entry = clock.entries.entry(vehicle).or_insert(0);
                *entry = (*entry).max(counter);
            }
        }
        clock
    }
}

impl Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (vehicle, counter)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{vehicle}:{counter}")?;
        }
        f.write_str("}")
    }
}
