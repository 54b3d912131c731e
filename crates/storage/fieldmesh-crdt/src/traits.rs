//! Core traits for replicated state

use crate::{allocation::AllocationSnapshot, FieldAllocationCrdt, VectorClock};

/// State that converges by exchanging snapshots.
///
/// `merge_state` must be commutative, associative and idempotent over snapshots.
pub trait Mergeable {
    /// Serializable form exchanged between replicas
    type State: Clone;

    /// Take a snapshot of the local state
    fn state(&self) -> Self::State;

    /// Merge a remote snapshot, returning `true` if local state changed
    fn merge_state(&mut self, remote: &Self::State) -> bool;
}

impl Mergeable for VectorClock {
    type State = VectorClock;

    fn state(&self) -> Self::State {
        self.clone()
    }

    fn merge_state(&mut self, remote: &Self::State) -> bool {
        let before = self.clone();
        self.merge(remote);
        *self != before
    }
}

impl Mergeable for FieldAllocationCrdt {
    type State = AllocationSnapshot;

    fn state(&self) -> Self::State {
        self.snapshot()
    }

    fn merge_state(&mut self, remote: &Self::State) -> bool {
        !self.merge(remote).is_noop()
    }
}

/// Run full pairwise anti-entropy rounds until no replica changes.
///
/// Returns the number of rounds taken.
pub fn converge<T: Mergeable>(replicas: &mut [T]) -> usize {
    let mut rounds = 0;
    loop {
        rounds += 1;
        let states: Vec<T::State> = replicas.iter().map(Mergeable::state).collect();
        let mut changed = false;
        for replica in replicas.iter_mut() {
            for state in &states {
                changed |= replica.merge_state(state);
            }
        }
        if !changed {
            return rounds;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldmesh_core::VehicleId;

    #[test]
    fn test_vector_clock_merge_state() {
        let a = VehicleId::from("a");
        let mut left = VectorClock::new();
        let mut right = VectorClock::new();
        left.increment(&a);

        assert!(right.merge_state(&left.state()));
        assert!(!right.merge_state(&left.state()));
        assert_eq!(left, right);
    }

    #[test]
    fn test_converge_replicas() {
        let mut replicas: Vec<FieldAllocationCrdt> = (0..3).map(|_| FieldAllocationCrdt::new()).collect();
        for (i, replica) in replicas.iter_mut().enumerate() {
            let vehicle = VehicleId::from(format!("v{i}"));
            let mut clock = VectorClock::new();
            clock.increment(&vehicle);
            replica.claim("shared", &vehicle, &clock);
        }

        let rounds = converge(&mut replicas);
        assert_eq!(rounds, 2);
        assert!(replicas.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(replicas[0].owner_of("shared"), Some(&VehicleId::from("v0")));
    }
}
