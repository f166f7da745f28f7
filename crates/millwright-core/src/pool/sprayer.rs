use super::{BeltPool, BuildContext, BuildError, DensePool, KindPool, PowerLink, TickContext};
use crate::cargo::Cargo;
use crate::fixed::Fixed64;
use crate::id::{EntityKind, ItemId, SourceId, TypedIndex};
use crate::source::{SourceWorld, SprayerSource};

/// Raises the proliferation level (`inc`) of cargo passing one belt position,
/// paying one charge per inc point. Charges come from spray items arriving at
/// the tail of a supply belt.
#[derive(Debug, Clone)]
pub struct Sprayer {
    pub supply: TypedIndex,
    pub belt: TypedIndex,
    pub offset: usize,
    pub charge: u32,
    pub spray_item: ItemId,
    pub charges_per_item: u32,
    pub inc_level: u8,
    pub power: PowerLink,
}

impl Sprayer {
    fn refill(&mut self, belts: &mut BeltPool, ctx: &TickContext<'_>) {
        if self.charge > 0 || self.spray_item.is_none() {
            return;
        }
        let Some(supply) = self.supply.of_kind(EntityKind::Belt) else {
            return;
        };
        let path = &mut belts.pool.get_mut(supply).path;
        if path.peek_at_end().is_some_and(|c| c.item == self.spray_item)
            && let Some(cargo) = path.try_pick_at_end()
        {
            self.charge += cargo.stack as u32 * self.charges_per_item;
            ctx.production.record_consumed(cargo.item, cargo.stack as u32);
        }
    }

    fn spray(&mut self, belts: &mut BeltPool) {
        let Some(belt) = self.belt.of_kind(EntityKind::Belt) else {
            return;
        };
        let path = &mut belts.pool.get_mut(belt).path;
        let Some(loc) = path.get_cargo_at_index(self.offset) else {
            return;
        };
        let cargo = loc.cargo;
        let target = (self.inc_level as u32 * cargo.stack as u32).min(Cargo::MAX_INC as u32);
        let want = target.saturating_sub(cargo.inc as u32);
        let applied = want.min(self.charge);
        if applied == 0 {
            return;
        }
        let sprayed = Cargo::new(cargo.item, cargo.stack, cargo.inc + applied as u8);
        if path.set_cargo_at_index(loc.head(), sprayed) {
            self.charge -= applied;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SprayerPool {
    pub pool: DensePool<Sprayer>,
}

impl KindPool for SprayerPool {
    const KIND: EntityKind = EntityKind::Sprayer;

    fn build(ctx: &mut BuildContext<'_>) -> Result<Self, BuildError> {
        let world = ctx.world;
        let mut pool = DensePool::new();
        for id in ctx.members(Self::KIND) {
            let Some(src) = world.sprayers.get(id) else {
                continue;
            };
            if src.spray_item > ItemId::MAX {
                return Err(BuildError::ItemOutOfRange(src.spray_item));
            }
            let sprayer = Sprayer {
                supply: ctx.resolve_belt(src.supply),
                belt: ctx.resolve_belt(src.belt),
                offset: src.offset as usize,
                charge: src.charge,
                spray_item: src.spray_item,
                charges_per_item: src.charges_per_item,
                inc_level: src.inc_level,
                power: ctx.power_link(&src.power),
            };
            let index = pool.push(id, sprayer);
            ctx.register(Self::KIND, id, index);
        }
        Ok(Self { pool })
    }

    fn save(&self, world: &mut SourceWorld) {
        for (id, s) in self.pool.iter() {
            if let Some(src) = world.get_mut::<SprayerSource>(id) {
                src.charge = s.charge;
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

impl SprayerPool {
    pub fn post_demand(&self, ctx: &TickContext<'_>) {
        for s in self.pool.items() {
            s.power.post(ctx, s.charge > 0);
        }
    }

    /// Transport phase.
    pub fn update(&mut self, belts: &mut BeltPool, ctx: &TickContext<'_>) {
        for s in self.pool.items_mut() {
            s.refill(belts, ctx);
            if s.power.satisfaction(ctx) > Fixed64::ZERO {
                s.spray(belts);
            }
        }
    }
}
