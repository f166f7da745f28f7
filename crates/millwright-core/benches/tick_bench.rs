//! Criterion benchmarks for the optimized tick.
//!
//! - `smelting_lines`: 500 powered lines (5500 entities) on the default
//!   region thresholds.
//! - `chest_pairs`: 5000 independent components, one region each.
//! - `belt_lines`: 200 chains of 50 belts split into small regions, which
//!   stresses the handoff phase.
//! - `build`: partitioning and pool construction alone.

use criterion::{Criterion, criterion_group, criterion_main};
use millwright_core::config::SimConfig;
use millwright_core::engine::{Engine, OptimizedWorld};
use millwright_core::source::SourceWorld;
use millwright_core::test_utils::*;

fn engine(world: SourceWorld, config: SimConfig) -> Engine {
    let mut engine = Engine::new(world, config).expect("valid config");
    engine.initialize().expect("world builds");
    engine
}

fn belt_lines_world(lines: usize, len: usize) -> SourceWorld {
    let mut world = SourceWorld::new();
    for _ in 0..lines {
        let line = belt_line_world(len);
        let mut prev = None;
        for (_, belt) in line.belts.iter() {
            let mut belt = belt.clone();
            belt.output = None;
            let id = world.add(belt);
            if let Some(prev) = prev
                && let Some(src) = world.get_mut::<millwright_core::source::BeltSource>(prev)
            {
                src.output = Some(id);
            }
            prev = Some(id);
        }
    }
    world
}

fn bench_smelting_lines(c: &mut Criterion) {
    let mut group = c.benchmark_group("smelting_lines");
    group.sample_size(30);

    let mut engine = engine(smelting_lines_world(500), SimConfig::default());

    group.bench_function("500_lines", |b| {
        b.iter(|| engine.step().expect("tick"));
    });

    group.finish();
}

fn bench_chest_pairs(c: &mut Criterion) {
    let mut group = c.benchmark_group("chest_pairs");
    group.sample_size(30);

    let config = SimConfig {
        min_region_size: 1,
        ..SimConfig::default()
    };
    let mut engine = engine(chest_pairs_world(5_000), config);

    group.bench_function("5000_regions", |b| {
        b.iter(|| engine.step().expect("tick"));
    });

    group.finish();
}

fn bench_belt_lines(c: &mut Criterion) {
    let mut group = c.benchmark_group("belt_lines");
    group.sample_size(30);

    let config = SimConfig {
        max_region_size: 10,
        min_region_size: 1,
        ..SimConfig::default()
    };
    let mut engine = engine(belt_lines_world(200, 50), config);

    group.bench_function("200x50_belts_split", |b| {
        b.iter(|| engine.step().expect("tick"));
    });

    group.finish();
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    group.sample_size(20);

    let world = smelting_lines_world(500);
    let config = SimConfig::default();

    group.bench_function("500_lines", |b| {
        b.iter(|| OptimizedWorld::build(&world, &config).expect("world builds"));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_smelting_lines,
    bench_chest_pairs,
    bench_belt_lines,
    bench_build
);
criterion_main!(benches);
