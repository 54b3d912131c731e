//! Property-based convergence tests for the field allocation CRDT

use fieldmesh_core::VehicleId;
use fieldmesh_crdt::{
    converge, AllocationSnapshot, ClaimAction, FieldAllocationCrdt, VectorClock, WorkSectionClaim,
};
use proptest::prelude::*;

const VEHICLES: [&str; 4] = ["tractor-a", "tractor-b", "tractor-c", "tractor-d"];
const SECTIONS: [&str; 3] = ["north-40", "south-10", "east-7"];

fn vehicle_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(VEHICLES.to_vec()).prop_map(String::from)
}

fn section_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(SECTIONS.to_vec()).prop_map(String::from)
}

fn clock_strategy() -> impl Strategy<Value = VectorClock> {
    prop::collection::btree_map(vehicle_strategy(), 0u64..6, 0..4).prop_map(|entries| {
        entries
            .into_iter()
            .map(|(v, c)| (VehicleId::from(v), c))
            .collect()
    })
}

/// Strategy for valid claim or release records
fn record_strategy() -> impl Strategy<Value = WorkSectionClaim> {
    (
        section_strategy(),
        prop::option::of(vehicle_strategy()),
        clock_strategy(),
    )
        .prop_map(|(section, owner, clock)| match owner {
            Some(vehicle) => WorkSectionClaim::claim(section, vehicle.into(), clock),
            None => WorkSectionClaim::release(section, clock),
        })
}

fn snapshot_strategy() -> impl Strategy<Value = AllocationSnapshot> {
    prop::collection::vec(record_strategy(), 0..8)
        .prop_map(|records| records.into_iter().collect())
}

fn join(left: &AllocationSnapshot, right: &AllocationSnapshot) -> AllocationSnapshot {
    let mut replica = FieldAllocationCrdt::from_snapshot(left);
    replica.merge(right);
    replica.snapshot()
}

/// Fleet operations for the simulation
#[derive(Debug, Clone)]
enum FleetOp {
    Claim(usize, String),
    Release(usize, String),
    Sync { from: usize, to: usize },
}

fn fleet_op_strategy() -> impl Strategy<Value = FleetOp> {
    let idx = 0..VEHICLES.len();
    prop_oneof![
        3 => (idx.clone(), section_strategy()).prop_map(|(v, s)| FleetOp::Claim(v, s)),
        1 => (idx.clone(), section_strategy()).prop_map(|(v, s)| FleetOp::Release(v, s)),
        2 => (idx.clone(), idx).prop_map(|(from, to)| FleetOp::Sync { from, to }),
    ]
}

/// One simulated vehicle: replica plus its own clock
struct SimVehicle {
    id: VehicleId,
    clock: VectorClock,
    replica: FieldAllocationCrdt,
}

impl SimVehicle {
    fn new(id: &str) -> Self {
        Self {
            id: VehicleId::from(id),
            clock: VectorClock::new(),
            replica: FieldAllocationCrdt::new(),
        }
    }
}

fn run_fleet(ops: &[FleetOp]) -> Vec<SimVehicle> {
    let mut fleet: Vec<SimVehicle> = VEHICLES.iter().map(|v| SimVehicle::new(v)).collect();
    for op in ops {
        match op {
            FleetOp::Claim(v, section) => {
                let vehicle = &mut fleet[*v];
                vehicle.clock.increment(&vehicle.id);
                vehicle.replica.claim(section, &vehicle.id, &vehicle.clock);
            }
            FleetOp::Release(v, section) => {
                let vehicle = &mut fleet[*v];
                vehicle.clock.increment(&vehicle.id);
                vehicle.replica.release(section, &vehicle.id, &vehicle.clock);
            }
            FleetOp::Sync { from, to } => {
                let snapshot = fleet[*from].replica.snapshot();
                let target = &mut fleet[*to];
                target.replica.merge(&snapshot);
                let frontier = target.replica.clock_frontier();
                target.clock.merge(&frontier);
            }
        }
    }
    fleet
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn merge_is_commutative(a in snapshot_strategy(), b in snapshot_strategy()) {
        prop_assert_eq!(join(&a, &b), join(&b, &a));
    }

    #[test]
    fn merge_is_associative(
        a in snapshot_strategy(),
        b in snapshot_strategy(),
        c in snapshot_strategy(),
    ) {
        prop_assert_eq!(join(&join(&a, &b), &c), join(&a, &join(&b, &c)));
    }

    #[test]
    fn merge_is_idempotent(a in snapshot_strategy(), b in snapshot_strategy()) {
        let once = join(&a, &b);
        prop_assert_eq!(join(&once, &b), once.clone());
        prop_assert_eq!(join(&a, &a), a);
    }

    #[test]
    fn dominated_record_never_overrides(
        older in record_strategy(),
        newer_owner in prop::option::of(vehicle_strategy()),
        bump in vehicle_strategy(),
    ) {
        let mut newer_clock = older.claim_clock.clone();
        newer_clock.increment(&VehicleId::from(bump));
        let newer = match newer_owner {
            Some(v) => WorkSectionClaim::claim(older.section_id.clone(), v.into(), newer_clock),
            None => WorkSectionClaim::release(older.section_id.clone(), newer_clock),
        };
        prop_assert!(older.claim_clock.happens_before(&newer.claim_clock));

        let mut replica = FieldAllocationCrdt::new();
        replica.merge_claim(newer.clone());
        prop_assert!(!replica.merge_claim(older.clone()));
        prop_assert_eq!(replica.get(&older.section_id), Some(&newer));
    }

    #[test]
    fn fleet_converges_to_identical_bytes(
        ops in prop::collection::vec(fleet_op_strategy(), 0..40),
    ) {
        let fleet = run_fleet(&ops);
        let mut replicas: Vec<FieldAllocationCrdt> =
            fleet.into_iter().map(|v| v.replica).collect();
        converge(&mut replicas);

        let encoded: Vec<Vec<u8>> = replicas
            .iter()
            .map(|r| r.snapshot().to_bytes().unwrap())
            .collect();
        prop_assert!(encoded.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn every_section_has_at_most_one_owner(
        ops in prop::collection::vec(fleet_op_strategy(), 0..40),
    ) {
        let fleet = run_fleet(&ops);
        let mut replicas: Vec<FieldAllocationCrdt> =
            fleet.into_iter().map(|v| v.replica).collect();
        converge(&mut replicas);

        for section in SECTIONS {
            let owners: Vec<usize> = VEHICLES
                .iter()
                .enumerate()
                .filter(|(_, v)| {
                    replicas[0]
                        .sections_owned_by(&VehicleId::from(**v))
                        .iter()
                        .any(|s| s == section)
                })
                .map(|(i, _)| i)
                .collect();
            prop_assert!(owners.len() <= 1);
        }
    }
}

#[test]
fn north_40_claim_race() {
    let a = VehicleId::from("tractor-a");
    let b = VehicleId::from("tractor-b");
    let mut fleet = [SimVehicle::new("tractor-a"), SimVehicle::new("tractor-b")];

    // Partitioned: both claims succeed locally
    for vehicle in fleet.iter_mut() {
        vehicle.clock.increment(&vehicle.id);
        assert!(vehicle.replica.claim("north-40", &vehicle.id, &vehicle.clock));
    }
    assert_eq!(fleet[0].replica.owner_of("north-40"), Some(&a));
    assert_eq!(fleet[1].replica.owner_of("north-40"), Some(&b));

    // Partition heals
    let snap_a = fleet[0].replica.snapshot();
    let snap_b = fleet[1].replica.snapshot();
    let report_a = fleet[0].replica.merge(&snap_b);
    let report_b = fleet[1].replica.merge(&snap_a);

    assert!(report_a.ownership_changes.is_empty());
    assert_eq!(report_b.ownership_changes.len(), 1);
    assert_eq!(fleet[0].replica, fleet[1].replica);
    assert_eq!(fleet[1].replica.owner_of("north-40"), Some(&a));
}

#[test]
fn release_after_sync_frees_section_everywhere() {
    let a = VehicleId::from("tractor-a");
    let b = VehicleId::from("tractor-b");
    let mut fleet = [SimVehicle::new("tractor-a"), SimVehicle::new("tractor-b")];

    fleet[0].clock.increment(&a);
    let clock = fleet[0].clock.clone();
    fleet[0].replica.claim("south-10", &a, &clock);
    let snapshot = fleet[0].replica.snapshot();
    fleet[1].replica.merge(&snapshot);

    fleet[0].clock.increment(&a);
    let clock = fleet[0].clock.clone();
    assert!(fleet[0].replica.release("south-10", &a, &clock));
    let snapshot = fleet[0].replica.snapshot();
    fleet[1].replica.merge(&snapshot);

    let record = fleet[1].replica.get("south-10").cloned();
    assert_eq!(record.map(|r| r.action), Some(ClaimAction::Release));
    assert_eq!(fleet[1].replica.owner_of("south-10"), None);

    let frontier = fleet[1].replica.clock_frontier();
    fleet[1].clock.merge(&frontier);
    fleet[1].clock.increment(&b);
    let clock = fleet[1].clock.clone();
    assert!(fleet[1].replica.claim("south-10", &b, &clock));
}
