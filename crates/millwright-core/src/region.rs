//! One region's pools and the per-phase work run on them.
//!
//! [`RegionPools`] is the plain set of dense pools a region owns.
//! [`RegionState`] wraps each pool in its own `Mutex` so production units of
//! different kinds in the same region can run concurrently. Units that touch
//! several pools lock them in [`EntityKind::ALL`] order.

use crate::id::{EntityKind, RegionId};
use crate::pool::*;
use crate::schedule::RegionShape;
use crate::source::SourceWorld;
use std::sync::Mutex;
use tracing::debug;

// ---------------------------------------------------------------------------
// Shared phase bodies
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
fn post_demand(
    assemblers: &AssemblerPool,
    labs: &LabPool,
    generators: &mut GeneratorPool,
    turrets: &TurretPool,
    miners: &MinerPool,
    sprayers: &SprayerPool,
    inserters: &InserterPool,
    ctx: &TickContext<'_>,
) {
    assemblers.post_demand(ctx);
    labs.post_demand(ctx);
    generators.post_supply(ctx);
    turrets.post_demand(ctx);
    miners.post_demand(ctx);
    sprayers.post_demand(ctx);
    inserters.post_demand(ctx);
}

/// Transport order: inserters swing, belts advance and hand off, then the
/// belt-side machines read the moved cargo.
fn transport(
    inserters: &mut InserterPool,
    sprayers: &mut SprayerPool,
    monitors: &mut MonitorPool,
    mut targets: Targets<'_>,
    ctx: &TickContext<'_>,
) {
    inserters.tick(&mut targets, ctx);
    targets.belts.update();
    targets.tanks.update(targets.belts);
    sprayers.update(targets.belts, ctx);
    targets.turrets.load_ammo(targets.belts, ctx);
    targets.miners.output(targets.belts);
    monitors.update(targets.belts);
}

// ---------------------------------------------------------------------------
// RegionPools
// ---------------------------------------------------------------------------

/// Every dense pool of one region.
#[derive(Debug, Default)]
pub struct RegionPools {
    pub belts: BeltPool,
    pub storages: StoragePool,
    pub tanks: TankPool,
    pub assemblers: AssemblerPool,
    pub labs: LabPool,
    pub generators: GeneratorPool,
    pub turrets: TurretPool,
    pub miners: MinerPool,
    pub sprayers: SprayerPool,
    pub monitors: MonitorPool,
    pub inserters: InserterPool,
}

impl RegionPools {
    /// Build all kinds in [`EntityKind::ALL`] order so references resolve
    /// against already registered targets.
    pub fn build(ctx: &mut BuildContext<'_>) -> Result<Self, BuildError> {
        let pools = Self {
            belts: BeltPool::build(ctx)?,
            storages: StoragePool::build(ctx)?,
            tanks: TankPool::build(ctx)?,
            assemblers: AssemblerPool::build(ctx)?,
            labs: LabPool::build(ctx)?,
            generators: GeneratorPool::build(ctx)?,
            turrets: TurretPool::build(ctx)?,
            miners: MinerPool::build(ctx)?,
            sprayers: SprayerPool::build(ctx)?,
            monitors: MonitorPool::build(ctx)?,
            inserters: InserterPool::build(ctx)?,
        };
        debug!(region = ctx.region.0, shape = ?pools.shape(ctx.region).counts, "region built");
        Ok(pools)
    }

    pub fn save(&self, world: &mut SourceWorld) {
        self.belts.save(world);
        self.storages.save(world);
        self.tanks.save(world);
        self.assemblers.save(world);
        self.labs.save(world);
        self.generators.save(world);
        self.turrets.save(world);
        self.miners.save(world);
        self.sprayers.save(world);
        self.monitors.save(world);
        self.inserters.save(world);
    }

    pub fn shape(&self, region: RegionId) -> RegionShape {
        let mut counts = [0; EntityKind::COUNT];
        counts[EntityKind::Belt.index()] = self.belts.len();
        counts[EntityKind::Storage.index()] = self.storages.len();
        counts[EntityKind::Tank.index()] = self.tanks.len();
        counts[EntityKind::Assembler.index()] = self.assemblers.len();
        counts[EntityKind::Lab.index()] = self.labs.len();
        counts[EntityKind::Generator.index()] = self.generators.len();
        counts[EntityKind::Turret.index()] = self.turrets.len();
        counts[EntityKind::Miner.index()] = self.miners.len();
        counts[EntityKind::Sprayer.index()] = self.sprayers.len();
        counts[EntityKind::Monitor.index()] = self.monitors.len();
        counts[EntityKind::Inserter.index()] = self.inserters.len();
        RegionShape { region, counts }
    }

    fn targets(&mut self) -> (Targets<'_>, &mut InserterPool, &mut SprayerPool, &mut MonitorPool) {
        let targets = Targets {
            belts: &mut self.belts,
            storages: &mut self.storages,
            tanks: &mut self.tanks,
            assemblers: &mut self.assemblers,
            labs: &mut self.labs,
            generators: &mut self.generators,
            turrets: &mut self.turrets,
            miners: &mut self.miners,
        };
        (targets, &mut self.inserters, &mut self.sprayers, &mut self.monitors)
    }

    /// Run only the inserter step of the transport phase.
    pub fn tick_inserters(&mut self, ctx: &TickContext<'_>) {
        let (mut targets, inserters, _, _) = self.targets();
        inserters.tick(&mut targets, ctx);
    }

    /// Items held anywhere in the region.
    pub fn item_count(&self) -> u64 {
        self.belts.item_count()
            + self.storages.item_count()
            + self.tanks.item_count()
            + self.assemblers.item_count()
            + self.labs.item_count()
            + self.generators.item_count()
            + self.turrets.item_count()
            + self.miners.item_count()
            + self.inserters.item_count()
    }
}

// ---------------------------------------------------------------------------
// RegionState
// ---------------------------------------------------------------------------

/// A region's pools, each behind its own lock.
#[derive(Debug)]
pub struct RegionState {
    pub id: RegionId,
    pub belts: Mutex<BeltPool>,
    pub storages: Mutex<StoragePool>,
    pub tanks: Mutex<TankPool>,
    pub assemblers: Mutex<AssemblerPool>,
    pub labs: Mutex<LabPool>,
    pub generators: Mutex<GeneratorPool>,
    pub turrets: Mutex<TurretPool>,
    pub miners: Mutex<MinerPool>,
    pub sprayers: Mutex<SprayerPool>,
    pub monitors: Mutex<MonitorPool>,
    pub inserters: Mutex<InserterPool>,
    shape: RegionShape,
}

impl RegionState {
    pub fn new(id: RegionId, pools: RegionPools) -> Self {
        let shape = pools.shape(id);
        Self {
            id,
            belts: Mutex::new(pools.belts),
            storages: Mutex::new(pools.storages),
            tanks: Mutex::new(pools.tanks),
            assemblers: Mutex::new(pools.assemblers),
            labs: Mutex::new(pools.labs),
            generators: Mutex::new(pools.generators),
            turrets: Mutex::new(pools.turrets),
            miners: Mutex::new(pools.miners),
            sprayers: Mutex::new(pools.sprayers),
            monitors: Mutex::new(pools.monitors),
            inserters: Mutex::new(pools.inserters),
            shape,
        }
    }

    pub fn shape(&self) -> &RegionShape {
        &self.shape
    }

    pub fn run_power_demand(&self, ctx: &TickContext<'_>) {
        let assemblers = lock(&self.assemblers);
        let labs = lock(&self.labs);
        let mut generators = lock(&self.generators);
        let turrets = lock(&self.turrets);
        let miners = lock(&self.miners);
        let sprayers = lock(&self.sprayers);
        let inserters = lock(&self.inserters);
        post_demand(
            &assemblers,
            &labs,
            &mut generators,
            &turrets,
            &miners,
            &sprayers,
            &inserters,
            ctx,
        );
    }

    /// Production for one kind; locks only that kind's pool.
    pub fn run_production(&self, kind: EntityKind, ctx: &TickContext<'_>) {
        match kind {
            EntityKind::Assembler => lock(&self.assemblers).tick(ctx),
            EntityKind::Lab => lock(&self.labs).tick(ctx),
            EntityKind::Generator => lock(&self.generators).tick(ctx),
            EntityKind::Turret => lock(&self.turrets).tick(ctx),
            EntityKind::Miner => lock(&self.miners).tick(ctx),
            _ => {}
        }
    }

    pub fn run_transport(&self, ctx: &TickContext<'_>) {
        let mut belts = lock(&self.belts);
        let mut storages = lock(&self.storages);
        let mut tanks = lock(&self.tanks);
        let mut assemblers = lock(&self.assemblers);
        let mut labs = lock(&self.labs);
        let mut generators = lock(&self.generators);
        let mut turrets = lock(&self.turrets);
        let mut miners = lock(&self.miners);
        let mut sprayers = lock(&self.sprayers);
        let mut monitors = lock(&self.monitors);
        let mut inserters = lock(&self.inserters);
        let targets = Targets {
            belts: &mut belts,
            storages: &mut storages,
            tanks: &mut tanks,
            assemblers: &mut assemblers,
            labs: &mut labs,
            generators: &mut generators,
            turrets: &mut turrets,
            miners: &mut miners,
        };
        transport(&mut inserters, &mut sprayers, &mut monitors, targets, ctx);
    }

    pub fn save(&self, world: &mut SourceWorld) {
        lock(&self.belts).save(world);
        lock(&self.storages).save(world);
        lock(&self.tanks).save(world);
        lock(&self.assemblers).save(world);
        lock(&self.labs).save(world);
        lock(&self.generators).save(world);
        lock(&self.turrets).save(world);
        lock(&self.miners).save(world);
        lock(&self.sprayers).save(world);
        lock(&self.monitors).save(world);
        lock(&self.inserters).save(world);
    }

    pub fn item_count(&self) -> u64 {
        lock(&self.belts).item_count()
            + lock(&self.storages).item_count()
            + lock(&self.tanks).item_count()
            + lock(&self.assemblers).item_count()
            + lock(&self.labs).item_count()
            + lock(&self.generators).item_count()
            + lock(&self.turrets).item_count()
            + lock(&self.miners).item_count()
            + lock(&self.inserters).item_count()
    }
}
