//! Registry benchmark: sorted insert and full re-sort.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use procview::{IntegrityLevel, Process, SortAttribute, SortState, SortedRegistry};

fn sample(count: u32) -> Vec<Process> {
    (0..count)
        .map(|i| {
            let mut p = Process::unresolved(i * 4, format!("proc-{:05}.exe", (i * 7919) % count));
            p.architecture_raw = if i % 3 == 0 { 0x014c } else { 0x8664 };
            p.integrity_level = IntegrityLevel::from_rid([0x1000, 0x2000, 0x3000, 0x4000][(i % 4) as usize]);
            p
        })
        .collect()
}

fn bench_insert(c: &mut Criterion) {
    let base = sample(1000);
    let extra = sample(1001).pop().unwrap();
    c.bench_function("registry_insert_into_1000", |b| {
        b.iter_batched(
            || {
                let mut r = SortedRegistry::default();
                r.reset(base.clone(), SortState::ascending(SortAttribute::Name));
                r
            },
            |mut r| {
                r.insert(black_box(extra.clone()));
                r
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_resort(c: &mut Criterion) {
    let mut registry = SortedRegistry::default();
    registry.reset(sample(1000), SortState::ascending(SortAttribute::Name));
    let mut flip = false;
    c.bench_function("registry_set_sort_state_1000", |b| {
        b.iter(|| {
            flip = !flip;
            let sort = if flip {
                SortState::descending(SortAttribute::Architecture)
            } else {
                SortState::ascending(SortAttribute::IntegrityLevel)
            };
            registry.set_sort_state(black_box(sort));
        })
    });
}

criterion_group!(benches, bench_insert, bench_resort);
criterion_main!(benches);
