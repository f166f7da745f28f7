//! Shared test helpers for unit tests, integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::cargo::{Cargo, CargoPathBuffer};
use crate::config::SimConfig;
use crate::id::*;
use crate::needs::NeedsPatterns;
use crate::pool::{BuildContext, BuildError, KindPool, TickContext, VeinTable};
use crate::power::{PowerGrid, PowerIndex};
use crate::region::RegionPools;
use crate::source::*;
use crate::statics::StaticDataStore;
use crate::stats::{ProductionRegister, ResearchRegister};
use std::collections::HashMap;

// ===========================================================================
// Item constructors
// ===========================================================================

pub fn iron_ore() -> ItemId {
    ItemId(1001)
}
pub fn iron_plate() -> ItemId {
    ItemId(1101)
}

// ===========================================================================
// PoolHarness
// ===========================================================================

/// Builds pools from a world as a single region and owns the shared data a
/// tick needs, so pools can be driven one phase step at a time.
#[derive(Debug)]
pub struct PoolHarness {
    pub config: SimConfig,
    pub statics: StaticDataStore,
    pub patterns: NeedsPatterns,
    pub power: PowerIndex,
    pub grid: PowerGrid,
    pub production: ProductionRegister,
    pub research: ResearchRegister,
    pub veins: VeinTable,
}

impl Default for PoolHarness {
    fn default() -> Self {
        Self::with_config(SimConfig::default())
    }
}

impl PoolHarness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SimConfig) -> Self {
        Self {
            config,
            statics: StaticDataStore::new(),
            patterns: NeedsPatterns::new(),
            power: PowerIndex::new(),
            grid: PowerGrid::default(),
            production: ProductionRegister::new(),
            research: ResearchRegister::default(),
            veins: VeinTable::default(),
        }
    }

    /// Build one kind's pool from every live entity of that kind.
    pub fn build<P: KindPool>(&mut self, world: &SourceWorld) -> P {
        match self.try_build(world) {
            Ok(pool) => pool,
            Err(e) => panic!("pool build failed: {e}"),
        }
    }

    pub fn try_build<P: KindPool>(&mut self, world: &SourceWorld) -> Result<P, BuildError> {
        self.with_context(world, P::build)
    }

    /// Build every pool of `world` as one region.
    pub fn build_region(&mut self, world: &SourceWorld) -> RegionPools {
        match self.with_context(world, RegionPools::build) {
            Ok(pools) => pools,
            Err(e) => panic!("region build failed: {e}"),
        }
    }

    pub fn ctx(&self) -> TickContext<'_> {
        TickContext {
            config: &self.config,
            statics: &self.statics,
            patterns: &self.patterns,
            power: &self.grid,
            production: &self.production,
            research: &self.research,
            veins: &self.veins,
        }
    }

    fn with_context<T>(
        &mut self,
        world: &SourceWorld,
        build: impl FnOnce(&mut BuildContext<'_>) -> Result<T, BuildError>,
    ) -> Result<T, BuildError> {
        let members = all_members(world);
        let (veins, lookup): (VeinTable, HashMap<SourceId, u32>) = VeinTable::from_world(world)?;
        let mut ctx = BuildContext::new(
            world,
            &self.config,
            RegionId(0),
            &members,
            &mut self.statics,
            &mut self.patterns,
            &mut self.power,
            &lookup,
        );
        let built = build(&mut ctx)?;
        self.veins = veins;
        self.grid = self.power.clone().into_grid();
        self.research = ResearchRegister::new(self.statics.research.iter().map(|r| r.tech_id));
        Ok(built)
    }
}

/// Every live entity, sorted by `(kind, id)`.
pub fn all_members(world: &SourceWorld) -> Vec<EntityRef> {
    EntityKind::ALL
        .iter()
        .flat_map(|&kind| {
            world
                .ids_of(kind)
                .into_iter()
                .map(move |id| EntityRef::new(kind, id))
        })
        .collect()
}

// ===========================================================================
// Belt helpers
// ===========================================================================

/// A belt source whose buffer holds `cargos` at the given head indices.
pub fn belt_with(capacity: u32, speed: u8, cargos: &[(usize, Cargo)]) -> BeltSource {
    let mut path = CargoPathBuffer::new(capacity, speed, false);
    for &(head, cargo) in cargos {
        assert!(path.try_insert_at(head, cargo), "cargo does not fit at {head}");
    }
    let mut src = BeltSource::new(capacity, speed);
    src.buffer = path.as_bytes().to_vec();
    src
}

pub fn belt_ref(id: SourceId) -> Option<EntityRef> {
    Some(EntityRef::new(EntityKind::Belt, id))
}

// ===========================================================================
// World fixtures
// ===========================================================================

fn stocked_chest(item: ItemId, count: u32) -> StorageSource {
    let mut chest = StorageSource::new(2, 50);
    chest.slots[0] = StorageSlot {
        item,
        count,
        inc: 0,
    };
    chest
}

/// Two chests joined by one inserter; the first holds 20 iron plates.
pub fn chest_to_chest_world() -> SourceWorld {
    let mut world = SourceWorld::new();
    add_chest_pair(&mut world, 20);
    world
}

fn add_chest_pair(world: &mut SourceWorld, plates: u32) {
    let from = world.add(stocked_chest(iron_plate(), plates));
    let to = world.add(StorageSource::new(2, 50));
    let grade = InserterGrade {
        stt: 4,
        stack: 2,
        delay: 0,
    };
    world.add(InserterSource::new(
        Some(EntityRef::new(EntityKind::Storage, from)),
        Some(EntityRef::new(EntityKind::Storage, to)),
        grade,
    ));
}

/// `pairs` unconnected chest pairs; each pair is its own component.
pub fn chest_pairs_world(pairs: usize) -> SourceWorld {
    let mut world = SourceWorld::new();
    for _ in 0..pairs {
        add_chest_pair(&mut world, 20);
    }
    world
}

/// A chain of `len` belts, each feeding the next, with one stack of ore on
/// the first.
pub fn belt_line_world(len: usize) -> SourceWorld {
    let mut world = SourceWorld::new();
    let mut ids = Vec::with_capacity(len);
    for i in 0..len {
        let cargos = if i == 0 {
            vec![(4, Cargo::new(iron_ore(), 4, 0))]
        } else {
            Vec::new()
        };
        ids.push(world.add(belt_with(3, 2, &cargos)));
    }
    for pair in ids.windows(2) {
        if let Some(belt) = world.get_mut::<BeltSource>(pair[0]) {
            belt.output = Some(pair[1]);
            belt.output_index = 4;
        }
    }
    world
}

/// Miner → belt → smelter → belt → chest, powered by one solar panel.
///
/// The smelter turns one ore into one plate in two ticks at full power.
pub fn smelting_line_world() -> SourceWorld {
    smelting_lines_world(1)
}

/// `lines` independent smelting lines sharing one power network.
pub fn smelting_lines_world(lines: usize) -> SourceWorld {
    let mut world = SourceWorld::new();
    for _ in 0..lines {
        add_smelting_line(&mut world);
    }
    world
}

fn add_smelting_line(world: &mut SourceWorld) {
    let network = Some(PowerNetworkId(1));
    let vein = world.add_vein(VeinSource {
        item: iron_ore(),
        amount: 500,
    });

    let ore_belt = world.add(belt_with(6, 2, &[]));
    let plate_belt = world.add(belt_with(6, 2, &[]));
    let chest = world.add(StorageSource::new(4, 50));

    let mut miner = MinerSource::new(Some(vein), 20_000, 10_000);
    miner.output = Some(ore_belt);
    miner.power = PowerSpec {
        network,
        work_energy: 90,
        idle_energy: 5,
    };
    world.add(miner);

    let recipe = RecipeSource {
        recipe_id: RecipeId(1),
        time_spend: 20_000,
        requires: vec![iron_ore()],
        require_counts: vec![1],
        products: vec![iron_plate()],
        product_counts: vec![1],
    };
    let mut smelter = AssemblerSource::new(ProtoId(1), Some(recipe), 10_000);
    smelter.power = PowerSpec {
        network,
        work_energy: 180,
        idle_energy: 6,
    };
    let smelter = world.add(smelter);

    let solar = GeneratorProfile {
        kind: GeneratorKind::Solar,
        capacity: 1_000,
        fuel_items: Vec::new(),
        fuel_energy: 0,
    };
    world.add(GeneratorSource::new(ProtoId(2), solar, network));

    let grade = InserterGrade {
        stt: 3,
        stack: 1,
        delay: 0,
    };
    let smelter_ref = Some(EntityRef::new(EntityKind::Assembler, smelter));
    let mut load = InserterSource::new(belt_ref(ore_belt), smelter_ref, grade);
    load.pick_offset = 50;
    world.add(load);
    world.add(InserterSource::new(smelter_ref, belt_ref(plate_belt), grade));
    let mut unload = InserterSource::new(
        belt_ref(plate_belt),
        Some(EntityRef::new(EntityKind::Storage, chest)),
        grade,
    );
    unload.pick_offset = 50;
    world.add(unload);
}

/// Sum of every item the source world holds, fluids included.
pub fn world_item_count(world: &SourceWorld) -> u64 {
    let belts: u64 = world
        .belts
        .iter()
        .filter_map(|(_, b)| CargoPathBuffer::from_bytes(b.buffer.clone(), b.speed, false).ok())
        .map(|p| p.item_count() as u64)
        .sum();
    let storages: u64 = world
        .storages
        .iter()
        .flat_map(|(_, s)| s.slots.iter().map(|slot| slot.count as u64))
        .sum();
    let tanks: u64 = world.tanks.iter().map(|(_, t)| t.count as u64).sum();
    let assemblers: u64 = world
        .assemblers
        .iter()
        .map(|(_, a)| {
            a.served.iter().chain(&a.produced).map(|&n| n as u64).sum::<u64>()
        })
        .sum();
    let labs: u64 = world
        .labs
        .iter()
        .map(|(_, l)| l.served.iter().map(|&n| n as u64).sum::<u64>())
        .sum();
    let generators: u64 = world.generators.iter().map(|(_, g)| g.fuel_count as u64).sum();
    let turrets: u64 = world.turrets.iter().map(|(_, t)| t.ammo_count as u64).sum();
    let miners: u64 = world.miners.iter().map(|(_, m)| m.product_count as u64).sum();
    let inserters: u64 = world
        .inserters
        .iter()
        .filter_map(|(_, i)| i.cargo)
        .map(|c| c.stack as u64)
        .sum();
    belts + storages + tanks + assemblers + labs + generators + turrets + miners + inserters
}
