//! Inserters move one hand of items from a pick target to an insert target.
//!
//! An inserter only picks what its insert target currently wants. The
//! target's demand is snapshotted into a [`Demand`] before the pick side is
//! touched, so both sides can live in the same pool without aliasing.
//!
//! Stages:
//!
//! ```text
//! Picking --(hand filled)--> Sending --(stt ticks)--> Inserting
//!    ^                                                   |
//!    +------(stt ticks)------ Returning <--(hand empty)--+
//! ```

use super::{
    AssemblerPool, BeltPool, BuildContext, BuildError, DensePool, GeneratorPool, KindPool, LabPool,
    MinerPool, PowerLink, StoragePool, TankPool, TickContext, TurretPool, split_inc,
};
use crate::cargo::Cargo;
use crate::fixed::Fixed64;
use crate::id::{EntityKind, ItemId, SourceId, TypedIndex};
use crate::needs::{MAX_NEEDS, NeedsEntry, NeedsPatterns};
use crate::source::{InserterSource, InserterStage, SourceWorld};

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

/// The sibling pools an inserter may pick from or insert into.
pub struct Targets<'a> {
    pub belts: &'a mut BeltPool,
    pub storages: &'a mut StoragePool,
    pub tanks: &'a mut TankPool,
    pub assemblers: &'a mut AssemblerPool,
    pub labs: &'a mut LabPool,
    pub generators: &'a mut GeneratorPool,
    pub turrets: &'a mut TurretPool,
    pub miners: &'a mut MinerPool,
}

/// What an insert target will take right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Demand {
    Any,
    Items { items: [ItemId; MAX_NEEDS], len: usize },
    Nothing,
}

impl Demand {
    fn from_needs(patterns: &NeedsPatterns, entry: NeedsEntry) -> Self {
        let mut items = [ItemId::NONE; MAX_NEEDS];
        let mut len = 0;
        for item in patterns.wanted(entry) {
            items[len] = item;
            len += 1;
        }
        if len == 0 {
            Demand::Nothing
        } else {
            Demand::Items { items, len }
        }
    }

    fn single(item: ItemId) -> Self {
        let mut items = [ItemId::NONE; MAX_NEEDS];
        items[0] = item;
        Demand::Items { items, len: 1 }
    }

    fn accepts(&self, item: ItemId) -> bool {
        match self {
            Demand::Any => true,
            Demand::Items { items, len } => items[..*len].contains(&item),
            Demand::Nothing => false,
        }
    }
}

impl Targets<'_> {
    fn demand(&self, target: TypedIndex, ctx: &TickContext<'_>) -> Demand {
        if target.is_none() {
            return Demand::Nothing;
        }
        let i = target.index as usize;
        match target.kind {
            EntityKind::Belt | EntityKind::Storage => Demand::Any,
            EntityKind::Tank => {
                let tank = self.tanks.pool.get(i);
                if tank.fluid.is_none() || tank.count >= tank.capacity {
                    Demand::Nothing
                } else {
                    Demand::single(tank.fluid)
                }
            }
            EntityKind::Assembler => Demand::from_needs(ctx.patterns, self.assemblers.needs.get(i)),
            EntityKind::Lab => Demand::from_needs(ctx.patterns, self.labs.needs.get(i)),
            EntityKind::Generator => Demand::from_needs(ctx.patterns, self.generators.needs.get(i)),
            EntityKind::Turret => Demand::from_needs(ctx.patterns, self.turrets.needs.get(i)),
            EntityKind::Miner | EntityKind::Sprayer | EntityKind::Monitor | EntityKind::Inserter => {
                Demand::Nothing
            }
        }
    }

    /// Take up to `max` items accepted by `accept` from `source`.
    fn pick(
        &mut self,
        source: TypedIndex,
        offset: usize,
        max: u8,
        accept: impl Fn(ItemId) -> bool,
        ctx: &TickContext<'_>,
    ) -> Option<Cargo> {
        let i = source.index as usize;
        let max = max as u32;
        match source.kind {
            EntityKind::Belt => {
                let range = ctx.config.inserter_pick_range as usize;
                let path = &mut self.belts.pool.get_mut(i).path;
                let head = path.find_head_in(offset, range, |c| accept(c.item))?;
                let cargo = path.get_cargo_at_index(head)?.cargo;
                if cargo.stack as u32 <= max {
                    return path.remove_cargo_at_index(head);
                }
                let inc = split_inc(cargo.inc as u32, cargo.stack as u32, max) as u8;
                let left = Cargo::new(cargo.item, cargo.stack - max as u8, cargo.inc - inc);
                path.set_cargo_at_index(head, left)
                    .then(|| Cargo::new(cargo.item, max as u8, inc))
            }
            EntityKind::Storage => {
                let (item, n, inc) = self.storages.pool.get_mut(i).take(max, accept)?;
                Some(Cargo::new(item, n as u8, inc as u8))
            }
            EntityKind::Assembler => {
                let (item, n) = self.assemblers.take_product(i, max, accept, ctx)?;
                Some(Cargo::new(item, n as u8, 0))
            }
            EntityKind::Miner => {
                let (item, n) = self.miners.pool.get_mut(i).take(max, accept)?;
                Some(Cargo::new(item, n as u8, 0))
            }
            EntityKind::Tank => {
                let tank = self.tanks.pool.get_mut(i);
                if !accept(tank.fluid) {
                    return None;
                }
                let fluid = tank.fluid;
                let (n, inc) = tank.drain(max)?;
                Some(Cargo::new(fluid, n as u8, inc as u8))
            }
            EntityKind::Lab
            | EntityKind::Generator
            | EntityKind::Turret
            | EntityKind::Sprayer
            | EntityKind::Monitor
            | EntityKind::Inserter => None,
        }
    }

    /// Deliver `cargo`, returning what is left in the hand.
    fn insert(
        &mut self,
        target: TypedIndex,
        offset: usize,
        cargo: Cargo,
        ctx: &TickContext<'_>,
    ) -> Option<Cargo> {
        let i = target.index as usize;
        let n = cargo.stack as u32;
        let delivered = match target.kind {
            EntityKind::Belt => self.belts.pool.get_mut(i).path.try_insert_at(offset, cargo),
            EntityKind::Storage => {
                let accepted = self
                    .storages
                    .pool
                    .get_mut(i)
                    .add(cargo.item, n, cargo.inc as u32);
                if accepted < n {
                    let inc = cargo.inc - split_inc(cargo.inc as u32, n, accepted) as u8;
                    return Some(Cargo::new(cargo.item, (n - accepted) as u8, inc));
                }
                true
            }
            EntityKind::Tank => {
                let tank = self.tanks.pool.get_mut(i);
                let fits = tank.accepts(cargo.item, n);
                if fits {
                    tank.fill(n, cargo.inc as u32);
                }
                fits
            }
            EntityKind::Assembler => self.assemblers.accept(i, cargo.item, n, ctx),
            EntityKind::Lab => self.labs.accept(i, cargo.item, n, ctx),
            EntityKind::Generator => self.generators.accept(i, cargo.item, n, ctx),
            EntityKind::Turret => self.turrets.accept(i, cargo.item, n, ctx),
            EntityKind::Miner | EntityKind::Sprayer | EntityKind::Monitor | EntityKind::Inserter => {
                false
            }
        };
        if delivered { None } else { Some(cargo) }
    }
}

// ---------------------------------------------------------------------------
// Inserter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Inserter {
    pub pick: TypedIndex,
    pub insert: TypedIndex,
    pub pick_offset: usize,
    pub insert_offset: usize,
    pub grade: u32,
    pub filter: ItemId,
    pub power: PowerLink,
    pub stage: InserterStage,
    pub time: u32,
    pub cargo: Option<Cargo>,
}

impl Inserter {
    fn update(&mut self, targets: &mut Targets<'_>, ctx: &TickContext<'_>) {
        if self.power.satisfaction(ctx) == Fixed64::ZERO {
            return;
        }
        let grade = *ctx.statics.inserter_grades.get(self.grade);
        match self.stage {
            InserterStage::Picking => {
                if self.time < grade.delay {
                    self.time += 1;
                    return;
                }
                let demand = targets.demand(self.insert, ctx);
                let filter = self.filter;
                let accept = |item: ItemId| {
                    (filter.is_none() || item == filter) && demand.accepts(item)
                };
                if demand == Demand::Nothing {
                    return;
                }
                if let Some(cargo) =
                    targets.pick(self.pick, self.pick_offset, grade.stack, accept, ctx)
                {
                    self.cargo = Some(cargo);
                    self.stage = InserterStage::Sending;
                    self.time = 0;
                }
            }
            InserterStage::Sending => {
                self.time += 1;
                if self.time >= grade.stt {
                    self.stage = InserterStage::Inserting;
                    self.time = 0;
                }
            }
            InserterStage::Inserting => {
                let Some(cargo) = self.cargo else {
                    self.stage = InserterStage::Returning;
                    return;
                };
                self.cargo = targets.insert(self.insert, self.insert_offset, cargo, ctx);
                if self.cargo.is_none() {
                    self.stage = InserterStage::Returning;
                }
            }
            InserterStage::Returning => {
                self.time += 1;
                if self.time >= grade.stt {
                    self.stage = InserterStage::Picking;
                    self.time = 0;
                }
            }
        }
    }

    /// Items currently in the hand.
    pub fn held(&self) -> u32 {
        self.cargo.map_or(0, |c| c.stack as u32)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InserterPool {
    pub pool: DensePool<Inserter>,
}

impl KindPool for InserterPool {
    const KIND: EntityKind = EntityKind::Inserter;

    fn build(ctx: &mut BuildContext<'_>) -> Result<Self, BuildError> {
        let world = ctx.world;
        let mut pool = DensePool::new();
        for id in ctx.members(Self::KIND) {
            let Some(src) = world.inserters.get(id) else {
                continue;
            };
            if src.filter > ItemId::MAX {
                return Err(BuildError::ItemOutOfRange(src.filter));
            }
            if src.grade.stack == 0 || src.grade.stack > Cargo::MAX_STACK {
                return Err(BuildError::InvalidStack {
                    inserter: id,
                    stack: src.grade.stack,
                });
            }
            let inserter = Inserter {
                pick: ctx.resolve(src.pick),
                insert: ctx.resolve(src.insert),
                pick_offset: src.pick_offset as usize,
                insert_offset: src.insert_offset as usize,
                grade: ctx.statics.intern_grade(src.grade),
                filter: src.filter,
                power: ctx.power_link(&src.power),
                stage: src.stage,
                time: src.time,
                cargo: src.cargo,
            };
            let index = pool.push(id, inserter);
            ctx.register(Self::KIND, id, index);
        }
        Ok(Self { pool })
    }

    fn save(&self, world: &mut SourceWorld) {
        for (id, ins) in self.pool.iter() {
            if let Some(src) = world.get_mut::<InserterSource>(id) {
                src.stage = ins.stage;
                src.time = ins.time;
                src.cargo = ins.cargo;
            }
        }
    }

    fn len(&self) -> usize {
        self.pool.len()
    }

    fn index_of(&self, id: SourceId) -> Option<u32> {
        self.pool.index_of(id)
    }
}

impl InserterPool {
    pub fn post_demand(&self, ctx: &TickContext<'_>) {
        for ins in self.pool.items() {
            ins.power.post(ctx, ins.stage != InserterStage::Picking);
        }
    }

    /// Transport phase, before belts advance. Inserters with an unresolved
    /// side never move.
    pub fn tick(&mut self, targets: &mut Targets<'_>, ctx: &TickContext<'_>) {
        for ins in self.pool.items_mut() {
            if ins.pick.is_none() || ins.insert.is_none() {
                continue;
            }
            ins.update(targets, ctx);
        }
    }

    pub fn item_count(&self) -> u64 {
        self.pool.items().iter().map(|i| i.held() as u64).sum()
    }
}
