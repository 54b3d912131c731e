//! # FieldMesh CRDT
//!
//! Causal ordering and conflict-free shared state for a fleet of field vehicles.
//!
//! - [`VectorClock`]: per-vehicle logical clock with dominance comparison
//! - [`FieldAllocationCrdt`]: replicated map from work section to its winning
//!   [`WorkSectionClaim`]
//! - [`Mergeable`]: snapshot-based convergence shared by both
//!
//! ## Example
//!
//! ```rust
//! use fieldmesh_core::VehicleId;
//! use fieldmesh_crdt::{FieldAllocationCrdt, VectorClock};
//!
//! let a = VehicleId::from("tractor-a");
//! let b = VehicleId::from("tractor-b");
//!
//! let mut replica_a = FieldAllocationCrdt::new();
//! let mut replica_b = FieldAllocationCrdt::new();
//! let (mut clock_a, mut clock_b) = (VectorClock::new(), VectorClock::new());
//!
//! // Both vehicles grab the same section while partitioned
//! clock_a.increment(&a);
//! clock_b.increment(&b);
//! assert!(replica_a.claim("north-40", &a, &clock_a));
//! assert!(replica_b.claim("north-40", &b, &clock_b));
//!
//! // After exchanging snapshots they agree on one owner
//! replica_a.merge(&replica_b.snapshot());
//! replica_b.merge(&replica_a.snapshot());
//! assert_eq!(replica_a.owner_of("north-40"), replica_b.owner_of("north-40"));
//! ```

pub mod allocation;
pub mod clock;
pub mod error;
pub mod traits;

pub use allocation::{
    AllocationSnapshot, ClaimAction, FieldAllocationCrdt, MergeReport, OwnershipChange,
    SectionOwner, WorkSectionClaim,
};
pub use clock::{ClockOrdering, VectorClock};
pub use error::{CrdtError, Result};
pub use traits::{converge, Mergeable};
