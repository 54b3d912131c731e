//! Benchmarks for the field allocation CRDT

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fieldmesh_core::VehicleId;
use fieldmesh_crdt::{FieldAllocationCrdt, VectorClock};

fn replica_with_sections(vehicle: &str, sections: usize) -> FieldAllocationCrdt {
    let id = VehicleId::from(vehicle);
    let mut clock = VectorClock::new();
    let mut replica = FieldAllocationCrdt::new();
    for i in 0..sections {
        clock.increment(&id);
        replica.claim(&format!("section-{i}"), &id, &clock);
    }
    replica
}

fn bench_snapshot_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocation_merge");

    for size in [10, 100, 1000].iter() {
        let left = replica_with_sections("tractor-a", *size);
        let right = replica_with_sections("tractor-b", *size).snapshot();

        group.bench_with_input(BenchmarkId::new("concurrent", size), size, |b, _| {
            b.iter(|| {
                let mut replica = left.clone();
                black_box(replica.merge(&right))
            });
        });
    }

    group.finish();
}

fn bench_vector_clock(c: &mut Criterion) {
    let mut group = c.benchmark_group("vector_clock");

    for actors in [4, 16, 64].iter() {
        let clock: VectorClock = (0..*actors)
            .map(|i| (VehicleId::from(format!("tractor-{i}")), i as u64 + 1))
            .collect();
        let other: VectorClock = (0..*actors)
            .map(|i| (VehicleId::from(format!("tractor-{i}")), (*actors - i) as u64))
            .collect();

        group.bench_with_input(BenchmarkId::new("compare", actors), actors, |b, _| {
            b.iter(|| black_box(clock.compare(&other)));
        });
        group.bench_with_input(BenchmarkId::new("merge", actors), actors, |b, _| {
            b.iter(|| black_box(clock.merged(&other)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_snapshot_merge, bench_vector_clock);
criterion_main!(benches);
