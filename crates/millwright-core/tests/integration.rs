//! End-to-end tests: build an optimized world from a source world, tick it
//! through the engine, save it back and inspect the host-side state.

use millwright_core::config::SimConfig;
use millwright_core::engine::{Engine, OptimizedWorld, RebuildReason, SimError};
use millwright_core::graph::ConnectivityGraph;
use millwright_core::id::*;
use millwright_core::pool::BuildError;
use millwright_core::schedule::{Phase, WorkScheduler};
use millwright_core::source::*;
use millwright_core::test_utils::*;

fn config(workers: usize) -> SimConfig {
    SimConfig {
        worker_count: workers,
        ..SimConfig::default()
    }
}

fn run(world: SourceWorld, config: SimConfig, ticks: u64) -> SourceWorld {
    let mut engine = Engine::new(world, config).unwrap();
    engine.initialize().unwrap();
    for _ in 0..ticks {
        engine.step().unwrap();
    }
    engine.into_world().unwrap()
}

fn chest_counts(world: &SourceWorld, item: ItemId) -> Vec<u32> {
    world
        .storages
        .iter()
        .map(|(_, s)| {
            s.slots
                .iter()
                .filter(|slot| slot.item == item)
                .map(|slot| slot.count)
                .sum()
        })
        .collect()
}

// ===========================================================================
// Material flow
// ===========================================================================

#[test]
fn inserter_moves_items_between_chests() {
    let world = run(chest_to_chest_world(), config(2), 40);
    let counts = chest_counts(&world, iron_plate());
    assert!(counts[0] < 20, "source chest untouched: {counts:?}");
    assert!(counts[1] > 0, "target chest empty: {counts:?}");
    assert_eq!(world_item_count(&world), 20);
    assert_eq!(world.tick, 40);
}

#[test]
fn smelting_line_turns_ore_into_plates() {
    let world = run(smelting_line_world(), config(4), 300);
    let stats = &world.statistics;
    let plates = stats.produced.get(&iron_plate()).copied().unwrap_or(0);
    let ore = stats.produced.get(&iron_ore()).copied().unwrap_or(0);
    assert!(plates > 0);
    assert!(ore >= plates);
    assert!(chest_counts(&world, iron_plate()).iter().sum::<u32>() > 0);

    // Every extracted ore left the vein.
    let (_, vein) = world.veins.iter().next().unwrap();
    assert_eq!(vein.amount + ore, 500);
    assert!(stats.energy_generated > 0);
    assert!(stats.energy_consumed > 0);
}

#[test]
fn dark_solar_panel_starves_the_line() {
    let mut world = smelting_line_world();
    let panel = world.ids_of(EntityKind::Generator)[0];
    world.get_mut::<GeneratorSource>(panel).unwrap().ambient = 0;

    let world = run(world, config(2), 50);
    assert!(!world.statistics.produced.contains_key(&iron_ore()));
    let (_, vein) = world.veins.iter().next().unwrap();
    assert_eq!(vein.amount, 500);
}

#[test]
fn power_disabled_skips_power_phases_and_runs_at_full_speed() {
    let mut world = smelting_line_world();
    let panel = world.ids_of(EntityKind::Generator)[0];
    world.get_mut::<GeneratorSource>(panel).unwrap().ambient = 0;
    let config = SimConfig {
        power_enabled: false,
        ..config(2)
    };

    let built = OptimizedWorld::build(&world, &config).unwrap();
    assert!(built.tree().leaf(Phase::PowerDemand).is_none());
    assert!(built.tree().leaf(Phase::PowerBalance).is_none());

    let world = run(world, config, 50);
    assert!(world.statistics.produced.get(&iron_ore()).copied().unwrap_or(0) > 0);
}

#[test]
fn item_totals_change_only_by_recorded_production_and_consumption() {
    let before = smelting_lines_world(3);
    let start = world_item_count(&before) as i64;
    let world = run(before, config(4), 400);

    let stats = &world.statistics;
    let produced: u64 = stats.produced.values().sum();
    let consumed: u64 = stats.consumed.values().sum();
    assert!(produced > 0 && consumed > 0);
    assert_eq!(
        world_item_count(&world) as i64 - start,
        produced as i64 - consumed as i64
    );
}

#[test]
fn out_of_range_values_fail_initialize() {
    let mut world = chest_to_chest_world();
    let inserter = world.ids_of(EntityKind::Inserter)[0];
    world.get_mut::<InserterSource>(inserter).unwrap().grade.stack = 255;
    let mut engine = Engine::new(world, config(1)).unwrap();
    assert!(matches!(
        engine.initialize(),
        Err(SimError::Build(BuildError::InvalidStack { stack: 255, .. }))
    ));

    let mut world = smelting_line_world();
    let vein = world.veins.iter().next().map(|(id, _)| id).unwrap();
    world.veins.get_mut(vein).unwrap().item = ItemId(20_000);
    let mut engine = Engine::new(world, config(1)).unwrap();
    assert!(matches!(
        engine.initialize(),
        Err(SimError::Build(BuildError::ItemOutOfRange(ItemId(20_000))))
    ));
}

// ===========================================================================
// Regions and handoffs
// ===========================================================================

#[test]
fn cargo_crosses_region_boundaries() {
    let config = SimConfig {
        worker_count: 2,
        max_region_size: 2,
        min_region_size: 1,
        ..SimConfig::default()
    };
    let world = belt_line_world(6);
    let built = OptimizedWorld::build(&world, &config).unwrap();
    assert!(built.regions().len() >= 3);
    assert!(built.handoff_count() >= 2);

    let world = run(world, config, 120);
    let last = world.ids_of(EntityKind::Belt)[5];
    for (id, belt) in world.belts.iter() {
        let count = millwright_core::cargo::CargoPathBuffer::from_bytes(
            belt.buffer.clone(),
            belt.speed,
            false,
        )
        .unwrap()
        .item_count();
        assert_eq!(count, if id == last { 4 } else { 0 }, "belt {id:?}");
    }
}

#[test]
fn belt_cycle_is_one_region() {
    let mut world = SourceWorld::new();
    let a = world.add(BeltSource::new(2, 1));
    let b = world.add(BeltSource::new(2, 1).with_output(a, 4));
    world.get_mut::<BeltSource>(a).unwrap().output = Some(b);

    let partition = ConnectivityGraph::from_world(&world).partition(100, 1);
    assert_eq!(partition.len(), 1);
    assert!(partition.handoffs.is_empty());
}

#[test]
fn independent_components_become_separate_regions() {
    let config = SimConfig {
        min_region_size: 1,
        ..config(4)
    };
    let built = OptimizedWorld::build(&chest_pairs_world(8), &config).unwrap();
    assert_eq!(built.regions().len(), 8);
    assert_eq!(built.item_count(), 160);
}

// ===========================================================================
// Save and rebuild
// ===========================================================================

#[test]
fn save_without_ticking_changes_nothing() {
    for original in [chest_to_chest_world(), smelting_line_world()] {
        let built = OptimizedWorld::build(&original, &SimConfig::default()).unwrap();
        let mut world = original.clone();
        built.save(&mut world).unwrap();
        assert_eq!(world, original);
        built.save(&mut world).unwrap();
        assert_eq!(world, original);
    }
}

#[test]
fn repeated_saves_after_ticking_agree() {
    let mut world = smelting_line_world();
    let mut built = OptimizedWorld::build(&world, &SimConfig::default()).unwrap();
    let scheduler = WorkScheduler::new(2).unwrap();
    for _ in 0..25 {
        built.tick(&scheduler);
    }
    built.save(&mut world).unwrap();
    let first = world.clone();
    built.save(&mut world).unwrap();
    assert_eq!(world, first);
    assert_eq!(world.tick, 25);
}

#[test]
fn rebuild_resumes_where_the_last_build_stopped() {
    let straight = run(smelting_line_world(), config(2), 120);

    let mut engine = Engine::new(smelting_line_world(), config(2)).unwrap();
    engine.initialize().unwrap();
    for i in 0..120 {
        if i % 30 == 0 {
            engine.request_rebuild(RebuildReason::Requested);
        }
        engine.step().unwrap();
    }
    let rebuilt = engine.into_world().unwrap();
    assert_eq!(rebuilt, straight);
}

#[test]
fn removing_an_entity_rebuilds_without_it() {
    let mut engine = Engine::new(chest_to_chest_world(), config(1)).unwrap();
    engine.initialize().unwrap();
    for _ in 0..10 {
        engine.step().unwrap();
    }
    let inserter = engine.world().ids_of(EntityKind::Inserter)[0];
    let removed = engine
        .edit(|world| world.remove::<InserterSource>(inserter))
        .unwrap();
    assert!(removed.is_some());

    engine.step().unwrap();
    let built = engine.optimized().unwrap();
    assert_eq!(built.regions().iter().map(|r| r.shape().total()).sum::<usize>(), 2);
}

#[test]
fn stale_build_cannot_be_saved() {
    let mut world = chest_to_chest_world();
    let built = OptimizedWorld::build(&world, &SimConfig::default()).unwrap();
    world.add(StorageSource::new(1, 1));
    assert!(matches!(built.save(&mut world), Err(SimError::StaleHandle { .. })));
}

// ===========================================================================
// Determinism
// ===========================================================================

#[test]
fn worker_count_does_not_change_the_outcome() {
    let config = |workers| SimConfig {
        worker_count: workers,
        min_region_size: 1,
        ..SimConfig::default()
    };
    let serial = run(chest_pairs_world(12), config(1), 60);
    let parallel = run(chest_pairs_world(12), config(4), 60);
    assert_eq!(serial, parallel);

    let serial = run(smelting_line_world(), config(1), 150);
    let parallel = run(smelting_line_world(), config(4), 150);
    assert_eq!(serial, parallel);
}
