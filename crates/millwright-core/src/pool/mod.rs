//! Dense per-kind entity pools.
//!
//! Each kind has one pool type implementing [`KindPool`]. A pool is built
//! from the live source entities of one region, holds them in a packed
//! [`DensePool`] addressed by `u32` index, and copies its state back into the
//! source world on save. Cross-entity references are [`TypedIndex`] values
//! resolved against the sibling pools of the same region.

pub mod assembler;
pub mod belt;
pub mod generator;
pub mod inserter;
pub mod lab;
pub mod miner;
pub mod monitor;
pub mod sprayer;
pub mod storage;
pub mod tank;
pub mod turret;

pub use assembler::{Assembler, AssemblerPool};
pub use belt::{Belt, BeltPool};
pub use generator::{Generator, GeneratorPool};
pub use inserter::{Inserter, InserterPool, Targets};
pub use lab::{Lab, LabPool};
pub use miner::{Miner, MinerPool, VeinTable};
pub use monitor::{Monitor, MonitorPool};
pub use sprayer::{Sprayer, SprayerPool};
pub use storage::{Storage, StoragePool};
pub use tank::{Tank, TankPool};
pub use turret::{Turret, TurretPool};

use crate::cargo::{Cargo, CargoPathError};
use crate::config::SimConfig;
use crate::fixed::Fixed64;
use crate::id::*;
use crate::needs::NeedsPatterns;
use crate::power::{PowerGrid, PowerIndex};
use crate::source::{PowerSpec, SourceWorld};
use crate::statics::StaticDataStore;
use crate::stats::{ProductionRegister, ResearchRegister};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Consistency failures detected while building pools.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("generators of proto {proto:?} carry different profiles")]
    InconsistentProfile { proto: ProtoId },
    #[error("{len} needs exceed the 8 need slots")]
    TooManyNeeds { len: usize },
    #[error("item id {0:?} does not fit in 14 bits")]
    ItemOutOfRange(ItemId),
    #[error("inserter {inserter:?} carries {stack} items per swing, outside 1..=254")]
    InvalidStack { inserter: SourceId, stack: u8 },
    #[error("recipe {0:?} has mismatched item and count arrays")]
    MalformedRecipe(RecipeId),
    #[error("research {0} has mismatched matrix arrays")]
    MalformedResearch(u32),
    #[error("belt {belt:?} holds an invalid cargo buffer: {source}")]
    CorruptBelt {
        belt: SourceId,
        #[source]
        source: CargoPathError,
    },
}

#[cold]
#[inline(never)]
#[track_caller]
fn out_of_range(index: usize, len: usize) -> ! {
    panic!("dense index {index} out of range for pool of {len}")
}

#[cold]
#[inline(never)]
#[track_caller]
fn poisoned() -> ! {
    panic!("pool lock poisoned by an aborted tick")
}

/// Lock a pool or shared field. A poisoned lock means an earlier tick
/// aborted on an invariant violation, which is fatal.
#[inline]
#[track_caller]
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(_) => poisoned(),
    }
}

// ---------------------------------------------------------------------------
// DensePool
// ---------------------------------------------------------------------------

/// Packed entity storage plus the `SourceId → index` map used on save.
#[derive(Debug, Clone)]
pub struct DensePool<T> {
    items: Vec<T>,
    source_ids: Vec<SourceId>,
    lookup: HashMap<SourceId, u32>,
}

impl<T> Default for DensePool<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            source_ids: Vec::new(),
            lookup: HashMap::new(),
        }
    }
}

impl<T> DensePool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: SourceId, item: T) -> u32 {
        let index = self.items.len() as u32;
        self.items.push(item);
        self.source_ids.push(id);
        self.lookup.insert(id, index);
        index
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    #[track_caller]
    pub fn get(&self, index: usize) -> &T {
        match self.items.get(index) {
            Some(item) => item,
            None => out_of_range(index, self.items.len()),
        }
    }

    #[inline]
    #[track_caller]
    pub fn get_mut(&mut self, index: usize) -> &mut T {
        let len = self.items.len();
        match self.items.get_mut(index) {
            Some(item) => item,
            None => out_of_range(index, len),
        }
    }

    /// Two distinct entries at once.
    #[track_caller]
    pub fn pair_mut(&mut self, a: usize, b: usize) -> (&mut T, &mut T) {
        let len = self.items.len();
        if a == b || a >= len || b >= len {
            out_of_range(a.max(b), len);
        }
        if a < b {
            let (lo, hi) = self.items.split_at_mut(b);
            (&mut lo[a], &mut hi[0])
        } else {
            let (lo, hi) = self.items.split_at_mut(a);
            (&mut hi[0], &mut lo[b])
        }
    }

    pub fn index_of(&self, id: SourceId) -> Option<u32> {
        self.lookup.get(&id).copied()
    }

    pub fn source_id(&self, index: usize) -> SourceId {
        self.source_ids[index]
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut [T] {
        &mut self.items
    }

    /// `(source id, entity)` pairs in dense order.
    pub fn iter(&self) -> impl Iterator<Item = (SourceId, &T)> {
        self.source_ids.iter().copied().zip(&self.items)
    }
}

// ---------------------------------------------------------------------------
// KindPool
// ---------------------------------------------------------------------------

/// One dense pool per entity kind and region.
pub trait KindPool: Sized {
    const KIND: EntityKind;

    /// Build from the members of `ctx.region`, registering every entity's
    /// dense index so later kinds can resolve references to it.
    fn build(ctx: &mut BuildContext<'_>) -> Result<Self, BuildError>;

    /// Copy dense state back into the source entities.
    fn save(&self, world: &mut SourceWorld);

    fn len(&self) -> usize;

    fn index_of(&self, id: SourceId) -> Option<u32>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything a pool needs while being built.
pub struct BuildContext<'a> {
    pub world: &'a SourceWorld,
    pub config: &'a SimConfig,
    pub region: RegionId,
    members: &'a [EntityRef],
    pub statics: &'a mut StaticDataStore,
    pub patterns: &'a mut NeedsPatterns,
    pub power: &'a mut PowerIndex,
    pub veins: &'a HashMap<SourceId, u32>,
    resolved: HashMap<EntityRef, TypedIndex>,
}

impl<'a> BuildContext<'a> {
    /// `members` must be sorted by `(kind, id)`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        world: &'a SourceWorld,
        config: &'a SimConfig,
        region: RegionId,
        members: &'a [EntityRef],
        statics: &'a mut StaticDataStore,
        patterns: &'a mut NeedsPatterns,
        power: &'a mut PowerIndex,
        veins: &'a HashMap<SourceId, u32>,
    ) -> Self {
        Self {
            world,
            config,
            region,
            members,
            statics,
            patterns,
            power,
            veins,
            resolved: HashMap::with_capacity(members.len()),
        }
    }

    /// Region members of one kind in ascending id order.
    pub fn members(&self, kind: EntityKind) -> Vec<SourceId> {
        let start = self.members.partition_point(|m| m.kind < kind);
        self.members[start..]
            .iter()
            .take_while(|m| m.kind == kind)
            .map(|m| m.id)
            .collect()
    }

    pub fn register(&mut self, kind: EntityKind, id: SourceId, index: u32) {
        self.resolved
            .insert(EntityRef::new(kind, id), TypedIndex::new(kind, index));
    }

    /// Dense index of a referenced entity in this region, or
    /// [`TypedIndex::NONE`] when absent.
    pub fn resolve(&self, target: Option<EntityRef>) -> TypedIndex {
        let Some(target) = target else {
            return TypedIndex::NONE;
        };
        match self.resolved.get(&target) {
            Some(&index) => index,
            None => {
                debug!(region = self.region.0, ?target, "reference left unresolved");
                TypedIndex::NONE
            }
        }
    }

    pub fn resolve_belt(&self, belt: Option<SourceId>) -> TypedIndex {
        self.resolve(belt.map(|id| EntityRef::new(EntityKind::Belt, id)))
    }

    /// Attach a consumer to its network and intern its draw.
    pub fn power_link(&mut self, spec: &PowerSpec) -> PowerLink {
        PowerLink {
            network: self.power.intern(spec.network),
            profile: self.statics.intern_power(spec.work_energy, spec.idle_energy),
        }
    }
}

// ---------------------------------------------------------------------------
// Tick inputs
// ---------------------------------------------------------------------------

/// Shared read-only data and accumulators handed to every pool tick.
#[derive(Clone, Copy)]
pub struct TickContext<'a> {
    pub config: &'a SimConfig,
    pub statics: &'a StaticDataStore,
    pub patterns: &'a NeedsPatterns,
    pub power: &'a PowerGrid,
    pub production: &'a ProductionRegister,
    pub research: &'a ResearchRegister,
    pub veins: &'a VeinTable,
}

/// A consumer's network index and interned power profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerLink {
    pub network: u32,
    pub profile: u32,
}

impl PowerLink {
    #[inline]
    pub fn post(self, ctx: &TickContext<'_>, working: bool) {
        let profile = ctx.statics.power_profiles.get(self.profile);
        let energy = if working {
            profile.work_energy
        } else {
            profile.idle_energy
        };
        ctx.power.post_demand(self.network, energy);
    }

    #[inline]
    pub fn satisfaction(self, ctx: &TickContext<'_>) -> Fixed64 {
        ctx.power.satisfaction(self.network)
    }
}

/// Split `inc` proportionally when `take` of `count` items leave a stack.
#[inline]
pub fn split_inc(inc: u32, count: u32, take: u32) -> u32 {
    if count == 0 {
        0
    } else {
        (inc as u64 * take as u64 / count as u64) as u32
    }
}

/// Take up to `max` of `count` items carrying `inc` in total, as
/// `(taken, taken_inc)`. Fewer items are taken when their share of `inc`
/// would not fit one cargo record; the rest of `inc` stays behind.
#[inline]
pub fn split_take(inc: u32, count: u32, max: u32) -> (u32, u32) {
    let mut take = count.min(max);
    if inc > 0 {
        let fits = (u64::from(Cargo::MAX_INC) + 1) * u64::from(count) - 1;
        take = take.min((fits / u64::from(inc)).max(1) as u32);
    }
    let taken_inc = split_inc(inc, count, take).min(u32::from(Cargo::MAX_INC));
    (take, taken_inc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_pool_maps_source_ids() {
        let mut pool = DensePool::new();
        assert_eq!(pool.push(SourceId(7), "a"), 0);
        assert_eq!(pool.push(SourceId(3), "b"), 1);
        assert_eq!(pool.index_of(SourceId(3)), Some(1));
        assert_eq!(pool.index_of(SourceId(4)), None);
        assert_eq!(pool.source_id(0), SourceId(7));
        assert_eq!(*pool.get(1), "b");
    }

    #[test]
    fn pair_mut_returns_both_in_order() {
        let mut pool = DensePool::new();
        pool.push(SourceId(1), 10);
        pool.push(SourceId(2), 20);
        let (b, a) = pool.pair_mut(1, 0);
        assert_eq!((*a, *b), (10, 20));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_index_is_fatal() {
        let pool: DensePool<u8> = DensePool::new();
        let _ = pool.get(0);
    }

    #[test]
    fn split_inc_is_proportional() {
        assert_eq!(split_inc(10, 4, 2), 5);
        assert_eq!(split_inc(3, 4, 1), 0);
        assert_eq!(split_inc(9, 0, 0), 0);
    }

    #[test]
    fn split_take_keeps_inc_encodable() {
        assert_eq!(split_take(10, 4, 2), (2, 5));
        assert_eq!(split_take(0, 4, 9), (4, 0));
        // 100 items averaging 4 inc: only 63 fit one record.
        let (n, inc) = split_take(400, 100, 100);
        assert_eq!((n, inc), (63, 252));
        assert!(split_inc(400, 100, n + 1) > u32::from(Cargo::MAX_INC));
    }
}
