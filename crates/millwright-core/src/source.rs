//! The host's sparse object model.
//!
//! Every entity kind lives in a [`SourcePool`]: a slot vector addressed by
//! stable [`SourceId`]s, with holes left behind by removals and a cursor one
//! past the highest issued id. The optimized build reads from here and writes
//! dense state back here on save; it never becomes the system of record.

use crate::cargo::Cargo;
use crate::id::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// SourcePool
// ---------------------------------------------------------------------------

/// Sparse pool with stable ids. Slot 0 is reserved so that id 0 never names a
/// live entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePool<T> {
    slots: Vec<Option<T>>,
}

impl<T> Default for SourcePool<T> {
    fn default() -> Self {
        Self { slots: vec![None] }
    }
}

impl<T> SourcePool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under a fresh id.
    pub fn insert(&mut self, value: T) -> SourceId {
        self.slots.push(Some(value));
        SourceId((self.slots.len() - 1) as u32)
    }

    /// Retire an entity, leaving its slot empty.
    pub fn remove(&mut self, id: SourceId) -> Option<T> {
        self.slots.get_mut(id.0 as usize).and_then(Option::take)
    }

    pub fn get(&self, id: SourceId) -> Option<&T> {
        self.slots.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: SourceId) -> Option<&mut T> {
        self.slots.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    pub fn contains(&self, id: SourceId) -> bool {
        self.get(id).is_some()
    }

    /// One past the highest id ever issued.
    pub fn cursor(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live entities in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (SourceId, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|v| (SourceId(i as u32), v)))
    }
}

// ---------------------------------------------------------------------------
// Shared building blocks
// ---------------------------------------------------------------------------

/// Power draw of a consumer, in energy units per tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PowerSpec {
    pub network: Option<PowerNetworkId>,
    pub work_energy: i64,
    pub idle_energy: i64,
}

/// A recipe as the host stores it on each machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeSource {
    pub recipe_id: RecipeId,
    /// Work units per cycle; a machine at speed 10_000 does 10_000 per tick.
    pub time_spend: i64,
    pub requires: Vec<ItemId>,
    pub require_counts: Vec<u32>,
    pub products: Vec<ItemId>,
    pub product_counts: Vec<u32>,
}

/// Research target of a lab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchSource {
    pub tech_id: u32,
    pub matrices: Vec<ItemId>,
    pub matrix_counts: Vec<u32>,
    pub time_spend: i64,
    pub hashes_per_cycle: u64,
}

/// Run state shared by the assembler family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssemblerState {
    Active,
    #[default]
    InactiveNoRecipe,
    InactiveInputMissing,
    InactiveOutputFull,
    InactiveNoPower,
    InactiveNoAssembler,
}

impl AssemblerState {
    pub fn is_active(self) -> bool {
        self == AssemblerState::Active
    }
}

/// Inserter motion stages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InserterStage {
    #[default]
    Picking,
    Sending,
    Inserting,
    Returning,
}

/// Hand speed and capacity of an inserter model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InserterGrade {
    /// Ticks for one swing (pick side to insert side).
    pub stt: u32,
    /// Items carried per swing.
    pub stack: u8,
    /// Extra ticks waited at the pick side before a swing.
    pub delay: u32,
}

impl Default for InserterGrade {
    fn default() -> Self {
        Self {
            stt: 10,
            stack: 1,
            delay: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeneratorKind {
    Fuel,
    Wind,
    Solar,
}

/// Model data of a generator. Identical for every generator of one proto.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeneratorProfile {
    pub kind: GeneratorKind,
    /// Maximum energy offered per tick.
    pub capacity: i64,
    /// Accepted fuel items (fuel generators only).
    pub fuel_items: Vec<ItemId>,
    /// Energy released per fuel item.
    pub fuel_energy: i64,
}

// ---------------------------------------------------------------------------
// Entity kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeltSource {
    pub capacity: u32,
    pub speed: u8,
    /// Downstream belt; pointing at itself closes the loop.
    pub output: Option<SourceId>,
    /// Head index at which records enter the output belt.
    pub output_index: u32,
    /// Persisted cargo bytes, `10 * capacity` long.
    pub buffer: Vec<u8>,
}

impl BeltSource {
    pub fn new(capacity: u32, speed: u8) -> Self {
        Self {
            capacity,
            speed,
            output: None,
            output_index: 4,
            buffer: vec![0; capacity as usize * crate::cargo::SLOT_STRIDE],
        }
    }

    pub fn with_output(mut self, output: SourceId, output_index: u32) -> Self {
        self.output = Some(output);
        self.output_index = output_index;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblerSource {
    pub proto: ProtoId,
    pub recipe: Option<RecipeSource>,
    /// Work per tick at full power; 10_000 is 1x.
    pub speed: u32,
    pub power: PowerSpec,
    pub time: i64,
    pub served: Vec<u32>,
    pub produced: Vec<u32>,
    pub replicating: bool,
    pub state: AssemblerState,
}

impl AssemblerSource {
    pub fn new(proto: ProtoId, recipe: Option<RecipeSource>, speed: u32) -> Self {
        let (inputs, outputs) = recipe
            .as_ref()
            .map_or((0, 0), |r| (r.requires.len(), r.products.len()));
        Self {
            proto,
            recipe,
            speed,
            power: PowerSpec::default(),
            time: 0,
            served: vec![0; inputs],
            produced: vec![0; outputs],
            replicating: false,
            state: AssemblerState::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabSource {
    pub proto: ProtoId,
    pub research: Option<ResearchSource>,
    pub speed: u32,
    pub power: PowerSpec,
    pub time: i64,
    pub served: Vec<u32>,
    pub replicating: bool,
    pub state: AssemblerState,
}

impl LabSource {
    pub fn new(proto: ProtoId, research: Option<ResearchSource>, speed: u32) -> Self {
        let inputs = research.as_ref().map_or(0, |r| r.matrices.len());
        Self {
            proto,
            research,
            speed,
            power: PowerSpec::default(),
            time: 0,
            served: vec![0; inputs],
            replicating: false,
            state: AssemblerState::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InserterSource {
    pub pick: Option<EntityRef>,
    pub insert: Option<EntityRef>,
    /// Start of the pick window when picking from a belt.
    pub pick_offset: u32,
    /// Head index used when inserting onto a belt.
    pub insert_offset: u32,
    pub grade: InserterGrade,
    /// Only move this item. `ItemId::NONE` lets the target's needs decide.
    pub filter: ItemId,
    pub power: PowerSpec,
    pub stage: InserterStage,
    pub time: u32,
    pub cargo: Option<Cargo>,
}

impl InserterSource {
    pub fn new(pick: Option<EntityRef>, insert: Option<EntityRef>, grade: InserterGrade) -> Self {
        Self {
            pick,
            insert,
            pick_offset: 0,
            insert_offset: 4,
            grade,
            filter: ItemId::NONE,
            power: PowerSpec::default(),
            stage: InserterStage::Picking,
            time: 0,
            cargo: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinerSource {
    pub vein: Option<SourceId>,
    /// Work units per extraction.
    pub period: i64,
    pub speed: u32,
    pub power: PowerSpec,
    pub time: i64,
    /// Items held when there is no output belt, or the belt is blocked.
    pub product: ItemId,
    pub product_count: u32,
    pub output: Option<SourceId>,
    pub output_index: u32,
    /// Whether the last production step made progress.
    pub working: bool,
}

impl MinerSource {
    pub fn new(vein: Option<SourceId>, period: i64, speed: u32) -> Self {
        Self {
            vein,
            period,
            speed,
            power: PowerSpec::default(),
            time: 0,
            product: ItemId::NONE,
            product_count: 0,
            output: None,
            output_index: 4,
            working: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSlot {
    pub item: ItemId,
    pub count: u32,
    pub inc: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSource {
    pub slots: Vec<StorageSlot>,
    pub slot_capacity: u32,
}

impl StorageSource {
    pub fn new(slot_count: usize, slot_capacity: u32) -> Self {
        Self {
            slots: vec![StorageSlot::default(); slot_count],
            slot_capacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TankSource {
    pub fluid: ItemId,
    pub count: u32,
    pub inc: u32,
    pub capacity: u32,
    pub input: Option<SourceId>,
    pub output: Option<SourceId>,
    pub output_index: u32,
}

impl TankSource {
    pub fn new(fluid: ItemId, capacity: u32) -> Self {
        Self {
            fluid,
            count: 0,
            inc: 0,
            capacity,
            input: None,
            output: None,
            output_index: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SprayerSource {
    /// Belt delivering the spray item.
    pub supply: Option<SourceId>,
    /// Belt whose cargo gets sprayed.
    pub belt: Option<SourceId>,
    pub offset: u32,
    pub charge: u32,
    pub spray_item: ItemId,
    pub charges_per_item: u32,
    pub inc_level: u8,
    pub power: PowerSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurretSource {
    pub ammo: ItemId,
    pub ammo_count: u32,
    pub ammo_capacity: u32,
    pub belt: Option<SourceId>,
    pub belt_offset: u32,
    /// Ticks between shots.
    pub interval: u32,
    pub cooldown: u32,
    /// Set by the host when an enemy is in range.
    pub has_target: bool,
    pub shots: u64,
    pub power: PowerSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSource {
    pub belt: Option<SourceId>,
    pub offset: u32,
    pub span: u32,
    /// Ring length in ticks.
    pub period: u32,
    /// Minimum summed sample over one period before the alarm clears.
    pub target: u32,
    pub samples: Vec<u32>,
    pub cursor: u32,
    pub alarm: bool,
}

impl MonitorSource {
    pub fn new(belt: Option<SourceId>, offset: u32, span: u32, period: u32, target: u32) -> Self {
        Self {
            belt,
            offset,
            span,
            period,
            target,
            samples: Vec::new(),
            cursor: 0,
            alarm: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorSource {
    pub proto: ProtoId,
    pub profile: GeneratorProfile,
    pub network: Option<PowerNetworkId>,
    pub fuel: ItemId,
    pub fuel_count: u32,
    pub fuel_capacity: u32,
    /// Energy left in the item being burned.
    pub current_energy: i64,
    /// Wind or sunlight strength in percent.
    pub ambient: u32,
}

impl GeneratorSource {
    pub fn new(proto: ProtoId, profile: GeneratorProfile, network: Option<PowerNetworkId>) -> Self {
        Self {
            proto,
            profile,
            network,
            fuel: ItemId::NONE,
            fuel_count: 0,
            fuel_capacity: 0,
            current_energy: 0,
            ambient: 100,
        }
    }
}

/// A finite resource deposit drained by miners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VeinSource {
    pub item: ItemId,
    pub amount: u64,
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Cumulative counters the host keeps across builds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldStatistics {
    pub produced: BTreeMap<ItemId, u64>,
    pub consumed: BTreeMap<ItemId, u64>,
    pub research_hashes: BTreeMap<u32, u64>,
    pub energy_generated: i64,
    pub energy_consumed: i64,
}

// ---------------------------------------------------------------------------
// SourceWorld
// ---------------------------------------------------------------------------

/// Implemented by every entity type stored in a [`SourceWorld`].
pub trait SourceEntity: Sized {
    const KIND: EntityKind;

    fn pool(world: &SourceWorld) -> &SourcePool<Self>;
    fn pool_mut(world: &mut SourceWorld) -> &mut SourcePool<Self>;
}

macro_rules! source_entity {
    ($ty:ty, $kind:ident, $field:ident) => {
        impl SourceEntity for $ty {
            const KIND: EntityKind = EntityKind::$kind;

            fn pool(world: &SourceWorld) -> &SourcePool<Self> {
                &world.$field
            }

            fn pool_mut(world: &mut SourceWorld) -> &mut SourcePool<Self> {
                &mut world.$field
            }
        }
    };
}

source_entity!(BeltSource, Belt, belts);
source_entity!(StorageSource, Storage, storages);
source_entity!(TankSource, Tank, tanks);
source_entity!(AssemblerSource, Assembler, assemblers);
source_entity!(LabSource, Lab, labs);
source_entity!(GeneratorSource, Generator, generators);
source_entity!(TurretSource, Turret, turrets);
source_entity!(MinerSource, Miner, miners);
source_entity!(SprayerSource, Sprayer, sprayers);
source_entity!(MonitorSource, Monitor, monitors);
source_entity!(InserterSource, Inserter, inserters);

/// The whole host-side world: one sparse pool per kind plus shared veins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceWorld {
    pub belts: SourcePool<BeltSource>,
    pub storages: SourcePool<StorageSource>,
    pub tanks: SourcePool<TankSource>,
    pub assemblers: SourcePool<AssemblerSource>,
    pub labs: SourcePool<LabSource>,
    pub generators: SourcePool<GeneratorSource>,
    pub turrets: SourcePool<TurretSource>,
    pub miners: SourcePool<MinerSource>,
    pub sprayers: SourcePool<SprayerSource>,
    pub monitors: SourcePool<MonitorSource>,
    pub inserters: SourcePool<InserterSource>,
    pub veins: SourcePool<VeinSource>,
    pub statistics: WorldStatistics,
    /// Global tick counter.
    pub tick: u64,
    generation: u64,
}

impl SourceWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter of topology changes. An optimized build is valid only for the
    /// generation it was built from.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Record a topology change made through `get_mut` (e.g. reconnecting an
    /// inserter).
    pub fn mark_topology_changed(&mut self) {
        self.generation += 1;
    }

    pub fn add<T: SourceEntity>(&mut self, entity: T) -> SourceId {
        self.generation += 1;
        T::pool_mut(self).insert(entity)
    }

    pub fn remove<T: SourceEntity>(&mut self, id: SourceId) -> Option<T> {
        let removed = T::pool_mut(self).remove(id);
        if removed.is_some() {
            self.generation += 1;
        }
        removed
    }

    pub fn get<T: SourceEntity>(&self, id: SourceId) -> Option<&T> {
        T::pool(self).get(id)
    }

    /// Mutable access without a topology bump; state edits only.
    pub fn get_mut<T: SourceEntity>(&mut self, id: SourceId) -> Option<&mut T> {
        T::pool_mut(self).get_mut(id)
    }

    pub fn pool<T: SourceEntity>(&self) -> &SourcePool<T> {
        T::pool(self)
    }

    pub fn add_vein(&mut self, vein: VeinSource) -> SourceId {
        self.generation += 1;
        self.veins.insert(vein)
    }

    /// Whether `entity` names a live entity.
    pub fn contains(&self, entity: EntityRef) -> bool {
        match entity.kind {
            EntityKind::Belt => self.belts.contains(entity.id),
            EntityKind::Storage => self.storages.contains(entity.id),
            EntityKind::Tank => self.tanks.contains(entity.id),
            EntityKind::Assembler => self.assemblers.contains(entity.id),
            EntityKind::Lab => self.labs.contains(entity.id),
            EntityKind::Generator => self.generators.contains(entity.id),
            EntityKind::Turret => self.turrets.contains(entity.id),
            EntityKind::Miner => self.miners.contains(entity.id),
            EntityKind::Sprayer => self.sprayers.contains(entity.id),
            EntityKind::Monitor => self.monitors.contains(entity.id),
            EntityKind::Inserter => self.inserters.contains(entity.id),
        }
    }

    /// Live ids of one kind, ascending.
    pub fn ids_of(&self, kind: EntityKind) -> Vec<SourceId> {
        fn ids<T>(pool: &SourcePool<T>) -> Vec<SourceId> {
            pool.iter().map(|(id, _)| id).collect()
        }
        match kind {
            EntityKind::Belt => ids(&self.belts),
            EntityKind::Storage => ids(&self.storages),
            EntityKind::Tank => ids(&self.tanks),
            EntityKind::Assembler => ids(&self.assemblers),
            EntityKind::Lab => ids(&self.labs),
            EntityKind::Generator => ids(&self.generators),
            EntityKind::Turret => ids(&self.turrets),
            EntityKind::Miner => ids(&self.miners),
            EntityKind::Sprayer => ids(&self.sprayers),
            EntityKind::Monitor => ids(&self.monitors),
            EntityKind::Inserter => ids(&self.inserters),
        }
    }

    /// Material-flow references held by `entity`, live or not.
    pub fn references(&self, entity: EntityRef) -> Vec<EntityRef> {
        let belt = |id: Option<SourceId>| id.map(|id| EntityRef::new(EntityKind::Belt, id));
        let refs: Vec<Option<EntityRef>> = match entity.kind {
            EntityKind::Belt => self
                .belts
                .get(entity.id)
                .map(|b| vec![belt(b.output)])
                .unwrap_or_default(),
            EntityKind::Inserter => self
                .inserters
                .get(entity.id)
                .map(|i| vec![i.pick, i.insert])
                .unwrap_or_default(),
            EntityKind::Miner => self
                .miners
                .get(entity.id)
                .map(|m| vec![belt(m.output)])
                .unwrap_or_default(),
            EntityKind::Tank => self
                .tanks
                .get(entity.id)
                .map(|t| vec![belt(t.input), belt(t.output)])
                .unwrap_or_default(),
            EntityKind::Sprayer => self
                .sprayers
                .get(entity.id)
                .map(|s| vec![belt(s.supply), belt(s.belt)])
                .unwrap_or_default(),
            EntityKind::Turret => self
                .turrets
                .get(entity.id)
                .map(|t| vec![belt(t.belt)])
                .unwrap_or_default(),
            EntityKind::Monitor => self
                .monitors
                .get(entity.id)
                .map(|m| vec![belt(m.belt)])
                .unwrap_or_default(),
            EntityKind::Storage
            | EntityKind::Assembler
            | EntityKind::Lab
            | EntityKind::Generator => Vec::new(),
        };
        refs.into_iter().flatten().collect()
    }

    /// Total live entities across all kinds.
    pub fn entity_count(&self) -> usize {
        EntityKind::ALL.iter().map(|&k| self.ids_of(k).len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_ids_start_at_one_and_leave_holes() {
        let mut pool = SourcePool::new();
        let a = pool.insert("a");
        let b = pool.insert("b");
        assert_eq!(a, SourceId(1));
        assert_eq!(b, SourceId(2));
        assert_eq!(pool.cursor(), 3);

        assert_eq!(pool.remove(a), Some("a"));
        assert_eq!(pool.remove(a), None);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.cursor(), 3);
        assert_eq!(pool.iter().map(|(id, _)| id).collect::<Vec<_>>(), vec![b]);
        assert!(pool.get(SourceId(0)).is_none());
    }

    #[test]
    fn add_and_remove_bump_generation() {
        let mut world = SourceWorld::new();
        let g0 = world.generation();
        let id = world.add(BeltSource::new(4, 1));
        assert_eq!(world.generation(), g0 + 1);

        world.get_mut::<BeltSource>(id).unwrap().speed = 2;
        assert_eq!(world.generation(), g0 + 1);

        assert!(world.remove::<BeltSource>(id).is_some());
        assert_eq!(world.generation(), g0 + 2);
        assert!(world.remove::<BeltSource>(id).is_none());
        assert_eq!(world.generation(), g0 + 2);
    }

    #[test]
    fn references_follow_material_flow() {
        let mut world = SourceWorld::new();
        let a = world.add(BeltSource::new(4, 1));
        let b = world.add(BeltSource::new(4, 1).with_output(a, 4));
        let belt_a = EntityRef::new(EntityKind::Belt, a);
        let belt_b = EntityRef::new(EntityKind::Belt, b);
        let ins = world.add(InserterSource::new(
            Some(belt_b),
            None,
            InserterGrade::default(),
        ));

        assert_eq!(world.references(belt_b), vec![belt_a]);
        assert!(world.references(belt_a).is_empty());
        assert_eq!(
            world.references(EntityRef::new(EntityKind::Inserter, ins)),
            vec![belt_b]
        );
        assert_eq!(world.entity_count(), 3);
    }
}
