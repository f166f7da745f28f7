//! Miners and the shared vein table.
//!
//! Veins are shared across regions: two miners in different regions may
//! drain the same deposit during one production phase, so every vein sits
//! behind its own lock. The order in which competing miners reach a nearly
//! empty vein is not deterministic.

use super::{BeltPool, BuildContext, BuildError, DensePool, KindPool, PowerLink, TickContext, lock};
use crate::cargo::Cargo;
use crate::fixed::{Fixed64, scale};
use crate::id::{EntityKind, ItemId, SourceId, TypedIndex};
use crate::source::{MinerSource, SourceWorld, VeinSource};
use std::collections::HashMap;
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// VeinTable
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct VeinTable {
    veins: Vec<Mutex<VeinSource>>,
    ids: Vec<SourceId>,
}

impl VeinTable {
    /// Copy every vein out of `world`, returning the table and the
    /// `SourceId → index` map used while building miners.
    pub fn from_world(world: &SourceWorld) -> Result<(Self, HashMap<SourceId, u32>), BuildError> {
        let mut table = Self::default();
        let mut lookup = HashMap::new();
        for (id, vein) in world.veins.iter() {
            if vein.item > ItemId::MAX {
                return Err(BuildError::ItemOutOfRange(vein.item));
            }
            lookup.insert(id, table.veins.len() as u32);
            table.veins.push(Mutex::new(vein.clone()));
            table.ids.push(id);
        }
        Ok((table, lookup))
    }

    pub fn len(&self) -> usize {
        self.veins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.veins.is_empty()
    }

    /// Take one unit from a vein. `None` once it is exhausted.
    pub fn extract(&self, index: u32) -> Option<ItemId> {
        let mut vein = lock(&self.veins[index as usize]);
        if vein.amount == 0 {
            return None;
        }
        vein.amount -= 1;
        Some(vein.item)
    }

    pub fn amount(&self, index: u32) -> u64 {
        lock(&self.veins[index as usize]).amount
    }

    pub fn save(&self, world: &mut SourceWorld) {
        for (id, vein) in self.ids.iter().zip(&self.veins) {
            if let Some(src) = world.veins.get_mut(*id) {
                src.amount = lock(vein).amount;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Miners
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Miner {
    pub vein: Option<u32>,
    pub period: i64,
    pub speed: u32,
    pub power: PowerLink,
    pub time: i64,
    pub product: ItemId,
    pub product_count: u32,
    pub output: TypedIndex,
    pub output_index: usize,
    pub working: bool,
}

impl Miner {
    fn update(&mut self, ctx: &TickContext<'_>) -> bool {
        let Some(vein) = self.vein else {
            return false;
        };
        if self.product_count >= ctx.config.miner_buffer {
            return false;
        }
        let ratio = self.power.satisfaction(ctx);
        if ratio == Fixed64::ZERO {
            return false;
        }
        self.time += scale(self.speed as i64, ratio);
        if self.time < self.period {
            return true;
        }
        match ctx.veins.extract(vein) {
            Some(item) => {
                self.time -= self.period;
                self.product = item;
                self.product_count += 1;
                ctx.production.record_produced(item, 1);
                true
            }
            None => {
                self.time = self.period;
                false
            }
        }
    }

    /// Remove up to `max` buffered items.
    pub fn take(&mut self, max: u32, accept: impl FnOnce(ItemId) -> bool) -> Option<(ItemId, u32)> {
        if self.product_count == 0 || !accept(self.product) {
            return None;
        }
        let n = self.product_count.min(max);
        self.product_count -= n;
        Some((self.product, n))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MinerPool {
    pub pool: DensePool<Miner>,
}

impl KindPool for MinerPool {
    const KIND: EntityKind = EntityKind::Miner;

    fn build(ctx: &mut BuildContext<'_>) -> Result<Self, BuildError> {
        let world = ctx.world;
        let mut pool = DensePool::new();
        for id in ctx.members(Self::KIND) {
            let Some(src) = world.miners.get(id) else {
                continue;
            };
            let miner = Miner {
                vein: src.vein.and_then(|v| ctx.veins.get(&v).copied()),
                period: src.period.max(1),
                speed: src.speed,
                power: ctx.power_link(&src.power),
                time: src.time,
                product: src.product,
                product_count: src.product_count,
                output: ctx.resolve_belt(src.output),
                output_index: src.output_index as usize,
                working: src.working,
            };
            let index = pool.push(id, miner);
            ctx.register(Self::KIND, id, index);
        }
        Ok(Self { pool })
    }

    fn save(&self, world: &mut SourceWorld) {
        for (id, m) in self.pool.iter() {
            if let Some(src) = world.get_mut::<MinerSource>(id) {
                src.time = m.time;
                src.product = m.product;
                src.product_count = m.product_count;
                src.working = m.working;
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

impl MinerPool {
    pub fn post_demand(&self, ctx: &TickContext<'_>) {
        for m in self.pool.items() {
            m.power.post(ctx, m.working);
        }
    }

    /// Production phase: dig into the vein.
    pub fn tick(&mut self, ctx: &TickContext<'_>) {
        for m in self.pool.items_mut() {
            m.working = m.update(ctx);
        }
    }

    /// Transport phase: drop one buffered item onto the output belt.
    pub fn output(&mut self, belts: &mut BeltPool) {
        for m in self.pool.items_mut() {
            let Some(belt) = m.output.of_kind(EntityKind::Belt) else {
                continue;
            };
            if m.product_count == 0 {
                continue;
            }
            let path = &mut belts.pool.get_mut(belt).path;
            if path.try_insert_at(m.output_index, Cargo::new(m.product, 1, 0)) {
                m.product_count -= 1;
            }
        }
    }

    pub fn item_count(&self) -> u64 {
        self.pool.items().iter().map(|m| m.product_count as u64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::BeltSource;
    use crate::test_utils::PoolHarness;

    fn iron_world(amount: u64) -> (SourceWorld, SourceId) {
        let mut world = SourceWorld::new();
        let vein = world.add_vein(VeinSource {
            item: ItemId(1001),
            amount,
        });
        let miner = world.add(MinerSource::new(Some(vein), 20_000, 10_000));
        (world, miner)
    }

    #[test]
    fn extracts_once_per_period() {
        let (world, _) = iron_world(100);
        let mut h = PoolHarness::new();
        let mut pool: MinerPool = h.build(&world);
        for _ in 0..4 {
            pool.tick(&h.ctx());
        }
        assert_eq!(pool.pool.get(0).product_count, 2);
        assert_eq!(h.veins.amount(0), 98);
        assert_eq!(h.production.produced(ItemId(1001)), 2);
    }

    #[test]
    fn exhausted_vein_stops_the_miner() {
        let (world, _) = iron_world(1);
        let mut h = PoolHarness::new();
        let mut pool: MinerPool = h.build(&world);
        for _ in 0..6 {
            pool.tick(&h.ctx());
        }
        let m = pool.pool.get(0);
        assert_eq!(m.product_count, 1);
        assert!(!m.working);
        assert_eq!(h.veins.amount(0), 0);
    }

    #[test]
    fn buffer_limit_pauses_digging() {
        let (world, _) = iron_world(100);
        let mut h = PoolHarness::with_config(crate::config::SimConfig {
            miner_buffer: 1,
            ..Default::default()
        });
        let mut pool: MinerPool = h.build(&world);
        for _ in 0..10 {
            pool.tick(&h.ctx());
        }
        assert_eq!(pool.pool.get(0).product_count, 1);
        assert_eq!(pool.pool.get_mut(0).take(5, |_| true), Some((ItemId(1001), 1)));
    }

    #[test]
    fn output_goes_onto_the_belt() {
        let (mut world, miner) = iron_world(100);
        let belt = world.add(BeltSource::new(2, 1));
        if let Some(m) = world.get_mut::<MinerSource>(miner) {
            m.output = Some(belt);
            m.product = ItemId(1001);
            m.product_count = 3;
        }
        let mut h = PoolHarness::new();
        let mut r = h.build_region(&world);
        r.miners.output(&mut r.belts);
        assert_eq!(r.miners.pool.get(0).product_count, 2);
        assert_eq!(r.belts.item_count(), 1);
        // The head is still occupied this tick.
        r.miners.output(&mut r.belts);
        assert_eq!(r.belts.item_count(), 1);
    }

    #[test]
    fn vein_table_saves_amounts() {
        let (mut world, _) = iron_world(7);
        let (table, lookup) = VeinTable::from_world(&world).unwrap();
        assert_eq!(lookup.len(), 1);
        assert_eq!(table.extract(0), Some(ItemId(1001)));
        table.save(&mut world);
        let (_, vein) = world.veins.iter().next().unwrap();
        assert_eq!(vein.amount, 6);
    }

    #[test]
    fn vein_item_beyond_14_bits_is_rejected() {
        let mut world = SourceWorld::new();
        let vein = world.add_vein(VeinSource {
            item: ItemId(20_000),
            amount: 10,
        });
        world.add(MinerSource::new(Some(vein), 20_000, 10_000));
        assert!(matches!(
            VeinTable::from_world(&world),
            Err(BuildError::ItemOutOfRange(ItemId(20_000)))
        ));
        assert!(matches!(
            PoolHarness::new().try_build::<MinerPool>(&world),
            Err(BuildError::ItemOutOfRange(_))
        ));
    }
}
