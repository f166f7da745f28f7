//! The optimized world and the engine that keeps it in step with the host.
//!
//! # Architecture
//!
//! [`OptimizedWorld`] is one build of the source world: the region states,
//! the universe-wide shared data, the resolved cross-region belt handoffs and
//! the phase tree. It is valid only for the source-world generation it was
//! built from; [`OptimizedWorld::save`] refuses to write into any other.
//!
//! [`Engine`] owns the source world, the config and the worker pool, and
//! rebuilds the optimized world whenever the topology or config changes. It
//! saves the running state back before every rebuild, so host code never
//! sees a stale handle.

use crate::config::{ConfigError, SimConfig};
use crate::graph::ConnectivityGraph;
use crate::id::{EntityKind, EntityRef, RegionId};
use crate::needs::NeedsPatterns;
use crate::pool::belt::transfer_tail;
use crate::pool::{BuildContext, BuildError, KindPool, TickContext, VeinTable, lock};
use crate::power::{PowerGrid, PowerIndex};
use crate::region::{RegionPools, RegionState};
use crate::schedule::{
    Phase, RegionShape, UnitExecutor, UnitTarget, WorkNode, WorkScheduler, WorkUnit, build_tree,
};
use crate::source::{SourceWorld, WorldStatistics};
use crate::statics::StaticDataStore;
use crate::stats::{ProductionRegister, ResearchRegister, merge_statistics};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("build failed: {0}")]
    Build(#[from] BuildError),
    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),
    #[error("optimized world was built for generation {built}, source world is at {current}")]
    StaleHandle { built: u64, current: u64 },
    #[error("worker pool could not start: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("engine has not been initialized")]
    NotInitialized,
}

// ---------------------------------------------------------------------------
// Universe-wide data
// ---------------------------------------------------------------------------

/// Data shared by every region of one build.
#[derive(Debug)]
pub struct Universe {
    pub config: SimConfig,
    pub statics: StaticDataStore,
    pub patterns: NeedsPatterns,
    pub power: PowerGrid,
    pub veins: VeinTable,
    pub production: ProductionRegister,
    pub research: ResearchRegister,
    base_statistics: WorldStatistics,
    base_tick: u64,
}

impl Universe {
    pub fn ctx(&self) -> TickContext<'_> {
        TickContext {
            config: &self.config,
            statics: &self.statics,
            patterns: &self.patterns,
            power: &self.power,
            production: &self.production,
            research: &self.research,
            veins: &self.veins,
        }
    }
}

/// A belt link across two regions, resolved to dense indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Handoff {
    from_region: RegionId,
    from: usize,
    to_region: RegionId,
    to: usize,
    at: usize,
}

// ---------------------------------------------------------------------------
// OptimizedWorld
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct OptimizedWorld {
    generation: u64,
    regions: Vec<RegionState>,
    universe: Universe,
    handoffs: Vec<Handoff>,
    tree: WorkNode,
    ticks: AtomicU64,
}

impl OptimizedWorld {
    /// Partition `world`, build every region's pools and assemble the phase
    /// tree.
    pub fn build(world: &SourceWorld, config: &SimConfig) -> Result<Self, SimError> {
        config.validate()?;

        let graph = ConnectivityGraph::from_world(world);
        let partition = graph.partition(config.max_region_size, config.min_region_size);
        let (veins, vein_lookup) = VeinTable::from_world(world)?;

        let mut statics = StaticDataStore::new();
        let mut patterns = NeedsPatterns::new();
        let mut power = PowerIndex::new();
        let mut regions = Vec::with_capacity(partition.len());
        for plan in &partition.regions {
            let mut ctx = BuildContext::new(
                world,
                config,
                plan.id,
                &plan.members,
                &mut statics,
                &mut patterns,
                &mut power,
                &vein_lookup,
            );
            let pools = RegionPools::build(&mut ctx)?;
            regions.push(RegionState::new(plan.id, pools));
        }

        let mut handoffs = Vec::with_capacity(partition.handoffs.len());
        for link in &partition.handoffs {
            let from = EntityRef::new(EntityKind::Belt, link.from);
            let to = EntityRef::new(EntityKind::Belt, link.to);
            let resolved = (|| {
                let from_region = partition.region_of(from)?;
                let to_region = partition.region_of(to)?;
                if from_region == to_region {
                    return None;
                }
                let from_index = lock(&regions[from_region.0 as usize].belts).index_of(link.from)?;
                let to_index = lock(&regions[to_region.0 as usize].belts).index_of(link.to)?;
                let at = world.belts.get(link.from)?.output_index as usize;
                Some(Handoff {
                    from_region,
                    from: from_index as usize,
                    to_region,
                    to: to_index as usize,
                    at,
                })
            })();
            match resolved {
                Some(handoff) => handoffs.push(handoff),
                None => warn!(from = link.from.0, to = link.to.0, "cross-region belt link skipped"),
            }
        }

        let research = ResearchRegister::new(statics.research.iter().map(|r| r.tech_id));
        let phases: Vec<Phase> = Phase::ALL
            .into_iter()
            .filter(|p| config.power_enabled || !matches!(p, Phase::PowerDemand | Phase::PowerBalance))
            .collect();
        let shapes: Vec<RegionShape> = regions.iter().map(|r| r.shape().clone()).collect();
        let tree = build_tree(&shapes, &phases);

        info!(
            generation = world.generation(),
            regions = regions.len(),
            entities = world.entity_count(),
            largest = partition.largest(),
            handoffs = handoffs.len(),
            recipes = statics.recipes.len(),
            "optimized world built"
        );

        Ok(Self {
            generation: world.generation(),
            regions,
            universe: Universe {
                config: config.clone(),
                statics,
                patterns,
                power: power.into_grid(),
                veins,
                production: ProductionRegister::new(),
                research,
                base_statistics: world.statistics.clone(),
                base_tick: world.tick,
            },
            handoffs,
            tree,
            ticks: AtomicU64::new(0),
        })
    }

    /// Run one full tick on `scheduler`.
    pub fn tick(&mut self, scheduler: &WorkScheduler) {
        scheduler.run(&self.tree, &*self);
    }

    /// Run the units of a single phase. Phases absent from the tree (power
    /// phases with power disabled) are a no-op.
    pub fn run_phase(&mut self, phase: Phase, scheduler: &WorkScheduler) {
        if let Some(leaf) = self.tree.leaf(phase) {
            scheduler.run_leaf(leaf, &*self);
        }
    }

    /// Copy every region's state, the veins and the statistics back into
    /// `world`. Saving twice without ticking writes the same values.
    pub fn save(&self, world: &mut SourceWorld) -> Result<(), SimError> {
        if world.generation() != self.generation {
            return Err(SimError::StaleHandle {
                built: self.generation,
                current: world.generation(),
            });
        }
        for region in &self.regions {
            region.save(world);
        }
        self.universe.veins.save(world);
        world.statistics = merge_statistics(
            &self.universe.base_statistics,
            &self.universe.production,
            &self.universe.research,
        );
        world.tick = self.universe.base_tick + self.ticks();
        debug!(generation = self.generation, tick = world.tick, "optimized world saved");
        Ok(())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Ticks completed since the build.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn regions(&self) -> &[RegionState] {
        &self.regions
    }

    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    pub fn tree(&self) -> &WorkNode {
        &self.tree
    }

    pub fn handoff_count(&self) -> usize {
        self.handoffs.len()
    }

    /// Items held anywhere in the optimized world.
    pub fn item_count(&self) -> u64 {
        self.regions.iter().map(|r| r.item_count()).sum()
    }

    fn region(&self, id: RegionId) -> &RegionState {
        &self.regions[id.0 as usize]
    }

    /// Move tail records across region boundaries, in link order.
    fn run_handoffs(&self) {
        for h in &self.handoffs {
            let mut from = lock(&self.region(h.from_region).belts);
            let mut to = lock(&self.region(h.to_region).belts);
            transfer_tail(
                &mut from.pool.get_mut(h.from).path,
                &mut to.pool.get_mut(h.to).path,
                h.at,
            );
        }
    }

    fn run_bookkeeping(&self) {
        self.universe.production.fold_tick();
        self.universe.power.reset();
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }
}

impl UnitExecutor for OptimizedWorld {
    fn execute(&self, unit: &WorkUnit) {
        let ctx = self.universe.ctx();
        match (unit.phase, unit.target) {
            (Phase::PowerDemand, UnitTarget::Region { region, .. }) => {
                self.region(region).run_power_demand(&ctx);
            }
            (Phase::PowerBalance, UnitTarget::Universe) => {
                let delivered = self.universe.power.balance();
                self.universe.production.record_energy_consumed(delivered);
            }
            (Phase::Production, UnitTarget::Region { region, kind: Some(kind) }) => {
                self.region(region).run_production(kind, &ctx);
            }
            (Phase::Transport, UnitTarget::Region { region, .. }) => {
                self.region(region).run_transport(&ctx);
            }
            (Phase::Handoff, UnitTarget::Universe) => self.run_handoffs(),
            (Phase::Bookkeeping, UnitTarget::Universe) => self.run_bookkeeping(),
            (phase, target) => warn!(?phase, ?target, "unit has no work"),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Why the next step must rebuild before ticking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildReason {
    Topology,
    Config,
    Requested,
}

/// Owns the source world and keeps one optimized build of it current.
#[derive(Debug)]
pub struct Engine {
    world: SourceWorld,
    config: SimConfig,
    scheduler: WorkScheduler,
    optimized: Option<OptimizedWorld>,
    pending: Option<RebuildReason>,
}

impl Engine {
    pub fn new(world: SourceWorld, config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        let scheduler = WorkScheduler::new(config.worker_threads())?;
        info!(workers = scheduler.workers(), "engine created");
        Ok(Self {
            world,
            config,
            scheduler,
            optimized: None,
            pending: None,
        })
    }

    /// Build the optimized world for the current source world.
    pub fn initialize(&mut self) -> Result<(), SimError> {
        self.optimized = Some(OptimizedWorld::build(&self.world, &self.config)?);
        self.pending = None;
        Ok(())
    }

    /// Advance one tick, rebuilding first if needed.
    pub fn step(&mut self) -> Result<(), SimError> {
        self.ensure_current()?;
        let optimized = self.optimized.as_mut().ok_or(SimError::NotInitialized)?;
        optimized.tick(&self.scheduler);
        Ok(())
    }

    /// Run a single phase, rebuilding first if needed.
    pub fn run_phase(&mut self, phase: Phase) -> Result<(), SimError> {
        self.ensure_current()?;
        let optimized = self.optimized.as_mut().ok_or(SimError::NotInitialized)?;
        optimized.run_phase(phase, &self.scheduler);
        Ok(())
    }

    /// Write the running state back into the source world.
    pub fn save(&mut self) -> Result<&SourceWorld, SimError> {
        let optimized = self.optimized.as_ref().ok_or(SimError::NotInitialized)?;
        if optimized.generation() == self.world.generation() {
            optimized.save(&mut self.world)?;
        }
        Ok(&self.world)
    }

    /// Edit the source world. The running state is saved first and the next
    /// step rebuilds.
    pub fn edit<R>(&mut self, f: impl FnOnce(&mut SourceWorld) -> R) -> Result<R, SimError> {
        if self.optimized.is_some() {
            self.save()?;
        }
        let out = f(&mut self.world);
        self.world.mark_topology_changed();
        self.pending = Some(RebuildReason::Topology);
        Ok(out)
    }

    pub fn request_rebuild(&mut self, reason: RebuildReason) {
        self.pending = Some(reason);
    }

    /// Replace the config; takes effect at the next step.
    pub fn set_config(&mut self, config: SimConfig) -> Result<(), SimError> {
        config.validate()?;
        if config.worker_threads() != self.scheduler.workers() {
            self.scheduler = WorkScheduler::new(config.worker_threads())?;
        }
        self.config = config;
        self.pending = Some(RebuildReason::Config);
        Ok(())
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// The source world as of the last save.
    pub fn world(&self) -> &SourceWorld {
        &self.world
    }

    pub fn optimized(&self) -> Option<&OptimizedWorld> {
        self.optimized.as_ref()
    }

    /// Save and hand back the source world.
    pub fn into_world(mut self) -> Result<SourceWorld, SimError> {
        if self.optimized.is_some() {
            self.save()?;
        }
        Ok(self.world)
    }

    fn ensure_current(&mut self) -> Result<(), SimError> {
        let optimized = self.optimized.as_ref().ok_or(SimError::NotInitialized)?;
        let stale = optimized.generation() != self.world.generation();
        if !stale && self.pending.is_none() {
            return Ok(());
        }
        let reason = self.pending.take().unwrap_or(RebuildReason::Topology);
        if !stale {
            optimized.save(&mut self.world)?;
        }
        info!(?reason, generation = self.world.generation(), "rebuilding optimized world");
        self.optimized = Some(OptimizedWorld::build(&self.world, &self.config)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{chest_to_chest_world, smelting_line_world};

    fn engine(world: SourceWorld) -> Engine {
        let config = SimConfig {
            worker_count: 2,
            ..Default::default()
        };
        let mut engine = Engine::new(world, config).unwrap();
        engine.initialize().unwrap();
        engine
    }

    #[test]
    fn step_before_initialize_fails() {
        let mut engine = Engine::new(SourceWorld::new(), SimConfig::default()).unwrap();
        assert!(matches!(engine.step(), Err(SimError::NotInitialized)));
    }

    #[test]
    fn stale_handle_is_rejected() {
        let mut world = chest_to_chest_world();
        let built = OptimizedWorld::build(&world, &SimConfig::default()).unwrap();
        world.mark_topology_changed();
        assert!(matches!(
            built.save(&mut world),
            Err(SimError::StaleHandle { built: b, current: c }) if c == b + 1
        ));
    }

    #[test]
    fn ticks_advance_the_saved_tick() {
        let mut engine = engine(smelting_line_world());
        for _ in 0..5 {
            engine.step().unwrap();
        }
        assert_eq!(engine.save().unwrap().tick, 5);
    }

    #[test]
    fn edit_saves_then_rebuilds() {
        let mut engine = engine(chest_to_chest_world());
        for _ in 0..30 {
            engine.step().unwrap();
        }
        let before = engine.optimized().unwrap().generation();
        engine
            .edit(|world| world.add(crate::source::StorageSource::new(1, 10)))
            .unwrap();
        // Progress made before the edit is already in the world.
        assert_eq!(engine.world().tick, 30);
        engine.step().unwrap();
        assert!(engine.optimized().unwrap().generation() > before);
        assert_eq!(engine.save().unwrap().tick, 31);
    }

    #[test]
    fn config_change_keeps_state() {
        let mut engine = engine(smelting_line_world());
        for _ in 0..10 {
            engine.step().unwrap();
        }
        engine
            .set_config(SimConfig {
                worker_count: 1,
                max_region_size: 2,
                min_region_size: 1,
                ..Default::default()
            })
            .unwrap();
        engine.step().unwrap();
        assert_eq!(engine.save().unwrap().tick, 11);
    }
}
