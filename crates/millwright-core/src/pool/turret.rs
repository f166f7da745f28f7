use super::{BeltPool, BuildContext, BuildError, DensePool, KindPool, PowerLink, TickContext};
use crate::fixed::Fixed64;
use crate::id::{EntityKind, ItemId, SourceId, TypedIndex};
use crate::needs::{EMPTY_PATTERN, NeedsStore};
use crate::source::{SourceWorld, TurretSource};

#[derive(Debug, Clone)]
pub struct Turret {
    pub ammo: ItemId,
    pub ammo_count: u32,
    pub ammo_capacity: u32,
    pub belt: TypedIndex,
    pub belt_offset: usize,
    pub interval: u32,
    pub cooldown: u32,
    pub has_target: bool,
    pub shots: u64,
    pub power: PowerLink,
}

impl Turret {
    fn has_room(&self) -> bool {
        self.ammo_count < self.ammo_capacity
    }
}

#[derive(Debug, Clone, Default)]
pub struct TurretPool {
    pub pool: DensePool<Turret>,
    pub needs: NeedsStore,
}

impl KindPool for TurretPool {
    const KIND: EntityKind = EntityKind::Turret;

    fn build(ctx: &mut BuildContext<'_>) -> Result<Self, BuildError> {
        let world = ctx.world;
        let mut out = Self::default();
        for id in ctx.members(Self::KIND) {
            let Some(src) = world.turrets.get(id) else {
                continue;
            };
            if src.ammo > ItemId::MAX {
                return Err(BuildError::ItemOutOfRange(src.ammo));
            }
            let pattern = if src.ammo.is_none() {
                EMPTY_PATTERN
            } else {
                ctx.patterns.intern(&[src.ammo])?
            };
            let turret = Turret {
                ammo: src.ammo,
                ammo_count: src.ammo_count,
                ammo_capacity: src.ammo_capacity,
                belt: ctx.resolve_belt(src.belt),
                belt_offset: src.belt_offset as usize,
                interval: src.interval,
                cooldown: src.cooldown,
                has_target: src.has_target,
                shots: src.shots,
                power: ctx.power_link(&src.power),
            };
            let index = out.pool.push(id, turret);
            out.needs.push(pattern);
            out.needs.get_mut(index as usize).set(0, out.pool.get(index as usize).has_room());
            ctx.register(Self::KIND, id, index);
        }
        Ok(out)
    }

    fn save(&self, world: &mut SourceWorld) {
        for (id, t) in self.pool.iter() {
            if let Some(src) = world.get_mut::<TurretSource>(id) {
                src.ammo_count = t.ammo_count;
                src.cooldown = t.cooldown;
                src.shots = t.shots;
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

impl TurretPool {
    pub fn post_demand(&self, ctx: &TickContext<'_>) {
        for t in self.pool.items() {
            t.power.post(ctx, t.has_target || t.cooldown > 0);
        }
    }

    /// Production phase: cool down and fire at the current target.
    pub fn tick(&mut self, ctx: &TickContext<'_>) {
        for (i, t) in self.pool.items_mut().iter_mut().enumerate() {
            t.cooldown = t.cooldown.saturating_sub(1);
            let powered = t.power.satisfaction(ctx) > Fixed64::ZERO;
            if t.has_target && t.cooldown == 0 && t.ammo_count > 0 && powered {
                t.ammo_count -= 1;
                t.shots += 1;
                t.cooldown = t.interval;
                ctx.production.record_consumed(t.ammo, 1);
            }
            self.needs.get_mut(i).set(0, t.has_room());
        }
    }

    /// Transport phase: pull ammo from the feeding belt.
    pub fn load_ammo(&mut self, belts: &mut BeltPool, ctx: &TickContext<'_>) {
        let range = ctx.config.inserter_pick_range as usize;
        for (i, t) in self.pool.items_mut().iter_mut().enumerate() {
            let Some(belt) = t.belt.of_kind(EntityKind::Belt) else {
                continue;
            };
            if t.ammo.is_none() || !t.has_room() {
                continue;
            }
            let room = t.ammo_capacity - t.ammo_count;
            let ammo = t.ammo;
            let path = &mut belts.pool.get_mut(belt).path;
            if let Some((cargo, _)) = path.try_pick_matching(t.belt_offset, range, |c| {
                c.item == ammo && c.stack as u32 <= room
            }) {
                t.ammo_count += cargo.stack as u32;
            }
            self.needs.get_mut(i).set(0, t.has_room());
        }
    }

    /// Load ammo delivered by an inserter.
    pub fn accept(&mut self, index: usize, item: ItemId, count: u32, ctx: &TickContext<'_>) -> bool {
        if !ctx.patterns.wants(self.needs.get(index), item) {
            return false;
        }
        let t = self.pool.get_mut(index);
        if t.ammo_count + count > t.ammo_capacity {
            return false;
        }
        t.ammo_count += count;
        self.needs.get_mut(index).set(0, t.has_room());
        true
    }

    /// Flag the turrets the host reports as having an enemy in range.
    pub fn set_target(&mut self, index: usize, has_target: bool) {
        self.pool.get_mut(index).has_target = has_target;
    }

    pub fn item_count(&self) -> u64 {
        self.pool.items().iter().map(|t| t.ammo_count as u64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cargo::Cargo;
    use crate::source::BeltSource;
    use crate::test_utils::PoolHarness;

    fn gun_turret(ammo_count: u32) -> TurretSource {
        TurretSource {
            ammo: ItemId(1601),
            ammo_count,
            ammo_capacity: 10,
            belt: None,
            belt_offset: 0,
            interval: 3,
            cooldown: 0,
            has_target: true,
            shots: 0,
            power: Default::default(),
        }
    }

    #[test]
    fn fires_on_interval_while_ammo_lasts() {
        let mut world = SourceWorld::new();
        world.add(gun_turret(2));
        let mut h = PoolHarness::new();
        let mut pool: TurretPool = h.build(&world);
        let ctx = h.ctx();

        for _ in 0..10 {
            pool.tick(&ctx);
        }
        let t = pool.pool.get(0);
        assert_eq!(t.shots, 2);
        assert_eq!(t.ammo_count, 0);
        assert_eq!(ctx.production.consumed(ItemId(1601)), 2);
        assert!(ctx.patterns.wants(pool.needs.get(0), ItemId(1601)));
    }

    #[test]
    fn idle_without_target() {
        let mut world = SourceWorld::new();
        let mut src = gun_turret(5);
        src.has_target = false;
        world.add(src);
        let mut h = PoolHarness::new();
        let mut pool: TurretPool = h.build(&world);
        pool.tick(&h.ctx());
        assert_eq!(pool.pool.get(0).shots, 0);

        pool.set_target(0, true);
        pool.tick(&h.ctx());
        assert_eq!(pool.pool.get(0).shots, 1);
    }

    #[test]
    fn loads_matching_ammo_from_its_belt() {
        let mut world = SourceWorld::new();
        let mut belt = BeltSource::new(3, 1);
        belt.buffer = {
            let mut path = crate::cargo::CargoPathBuffer::new(3, 1, false);
            assert!(path.try_insert_at(4, Cargo::new(ItemId(9), 1, 0)));
            assert!(path.try_insert_at(14, Cargo::new(ItemId(1601), 4, 0)));
            path.as_bytes().to_vec()
        };
        let belt_id = world.add(belt);
        let mut src = gun_turret(0);
        src.belt = Some(belt_id);
        src.belt_offset = 10;
        world.add(src);

        let mut h = PoolHarness::new();
        let mut r = h.build_region(&world);
        r.turrets.load_ammo(&mut r.belts, &h.ctx());
        assert_eq!(r.turrets.pool.get(0).ammo_count, 4);
        assert_eq!(r.belts.item_count(), 1);
    }

    #[test]
    fn rejects_overfill() {
        let mut world = SourceWorld::new();
        world.add(gun_turret(8));
        let mut h = PoolHarness::new();
        let mut pool: TurretPool = h.build(&world);
        let ctx = h.ctx();
        assert!(!pool.accept(0, ItemId(1601), 3, &ctx));
        assert!(pool.accept(0, ItemId(1601), 2, &ctx));
        assert!(!ctx.patterns.wants(pool.needs.get(0), ItemId(1601)));
    }
}
