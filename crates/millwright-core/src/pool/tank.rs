use super::{BeltPool, BuildContext, BuildError, DensePool, KindPool, split_take};
use crate::cargo::Cargo;
use crate::id::{EntityKind, ItemId, SourceId, TypedIndex};
use crate::source::{SourceWorld, TankSource};

/// Fluid units a tank pushes onto its output belt per record.
const OUTPUT_STACK: u32 = 4;

#[derive(Debug, Clone)]
pub struct Tank {
    pub fluid: ItemId,
    pub count: u32,
    pub inc: u32,
    pub capacity: u32,
    pub input: TypedIndex,
    pub output: TypedIndex,
    pub output_index: usize,
}

impl Tank {
    pub fn accepts(&self, item: ItemId, count: u32) -> bool {
        !self.fluid.is_none() && item == self.fluid && self.count + count <= self.capacity
    }

    /// Drain up to `max` units, returning `(count, inc)`.
    pub fn drain(&mut self, max: u32) -> Option<(u32, u32)> {
        if self.count == 0 || max == 0 {
            return None;
        }
        let (n, inc) = split_take(self.inc, self.count, max);
        self.count -= n;
        self.inc -= inc;
        Some((n, inc))
    }

    pub fn fill(&mut self, count: u32, inc: u32) {
        self.count += count;
        self.inc += inc;
    }
}

#[derive(Debug, Clone, Default)]
pub struct TankPool {
    pub pool: DensePool<Tank>,
}

impl KindPool for TankPool {
    const KIND: EntityKind = EntityKind::Tank;

    fn build(ctx: &mut BuildContext<'_>) -> Result<Self, BuildError> {
        let world = ctx.world;
        let mut pool = DensePool::new();
        for id in ctx.members(Self::KIND) {
            let Some(src) = world.tanks.get(id) else {
                continue;
            };
            if src.fluid > ItemId::MAX {
                return Err(BuildError::ItemOutOfRange(src.fluid));
            }
            let tank = Tank {
                fluid: src.fluid,
                count: src.count,
                inc: src.inc,
                capacity: src.capacity,
                input: ctx.resolve_belt(src.input),
                output: ctx.resolve_belt(src.output),
                output_index: src.output_index as usize,
            };
            let index = pool.push(id, tank);
            ctx.register(Self::KIND, id, index);
        }
        Ok(Self { pool })
    }

    fn save(&self, world: &mut SourceWorld) {
        for (id, tank) in self.pool.iter() {
            if let Some(src) = world.get_mut::<TankSource>(id) {
                src.count = tank.count;
                src.inc = tank.inc;
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

impl TankPool {
    /// Pull matching fluid off input belts and push fluid onto output belts.
    pub fn update(&mut self, belts: &mut BeltPool) {
        for tank in self.pool.items_mut() {
            if let Some(input) = tank.input.of_kind(EntityKind::Belt) {
                let path = &mut belts.pool.get_mut(input).path;
                if let Some(cargo) = path.peek_at_end()
                    && tank.accepts(cargo.item, cargo.stack as u32)
                    && let Some(cargo) = path.try_pick_at_end()
                {
                    tank.fill(cargo.stack as u32, cargo.inc as u32);
                }
            }

            if let Some(output) = tank.output.of_kind(EntityKind::Belt) {
                let path = &mut belts.pool.get_mut(output).path;
                if tank.count > 0 && path.can_insert_at(tank.output_index) {
                    let (n, inc) = split_take(tank.inc, tank.count, OUTPUT_STACK);
                    let cargo = Cargo::new(tank.fluid, n as u8, inc as u8);
                    if path.try_insert_at(tank.output_index, cargo) {
                        tank.count -= n;
                        tank.inc -= inc;
                    }
                }
            }
        }
    }

    pub fn item_count(&self) -> u64 {
        self.pool.items().iter().map(|t| t.count as u64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tank(count: u32, capacity: u32) -> Tank {
        Tank {
            fluid: ItemId(1000),
            count,
            inc: 0,
            capacity,
            input: TypedIndex::NONE,
            output: TypedIndex::NONE,
            output_index: 4,
        }
    }

    #[test]
    fn accepts_only_its_fluid_within_capacity() {
        let t = tank(8, 10);
        assert!(t.accepts(ItemId(1000), 2));
        assert!(!t.accepts(ItemId(1000), 3));
        assert!(!t.accepts(ItemId(1001), 1));
    }

    #[test]
    fn drain_splits_inc() {
        let mut t = tank(4, 10);
        t.inc = 8;
        assert_eq!(t.drain(3), Some((3, 6)));
        assert_eq!(t.drain(3), Some((1, 2)));
        assert_eq!(t.drain(3), None);
    }
}
