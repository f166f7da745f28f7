use super::{BuildContext, BuildError, DensePool, KindPool};
use crate::cargo::CargoPathBuffer;
use crate::id::{EntityKind, SourceId, TypedIndex};
use crate::source::{BeltSource, SourceWorld};

/// One conveyor segment in dense form.
#[derive(Debug, Clone)]
pub struct Belt {
    pub path: CargoPathBuffer,
    /// Output belt in the same region, or NONE.
    pub output: TypedIndex,
    pub output_index: usize,
    /// The output belt lives in another region; the handoff phase moves the
    /// tail record.
    pub remote: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BeltPool {
    pub pool: DensePool<Belt>,
}

impl KindPool for BeltPool {
    const KIND: EntityKind = EntityKind::Belt;

    fn build(ctx: &mut BuildContext<'_>) -> Result<Self, BuildError> {
        let world = ctx.world;
        let mut pool = DensePool::new();
        for id in ctx.members(Self::KIND) {
            let Some(src) = world.belts.get(id) else {
                continue;
            };
            let closed = src.output == Some(id);
            let path = CargoPathBuffer::from_bytes(src.buffer.clone(), src.speed, closed)
                .map_err(|source| BuildError::CorruptBelt { belt: id, source })?;
            let index = pool.push(
                id,
                Belt {
                    path,
                    output: TypedIndex::NONE,
                    output_index: src.output_index as usize,
                    remote: false,
                },
            );
            ctx.register(Self::KIND, id, index);
        }

        // Outputs may point forward in dense order, so resolve them once all
        // belts of the region are registered.
        for i in 0..pool.len() {
            let id = pool.source_id(i);
            let Some(output) = world.belts.get(id).and_then(|b| b.output) else {
                continue;
            };
            let resolved = ctx.resolve_belt(Some(output));
            let belt = pool.get_mut(i);
            belt.output = resolved;
            belt.remote = resolved.is_none() && world.belts.contains(output);
        }
        Ok(Self { pool })
    }

    fn save(&self, world: &mut SourceWorld) {
        for (id, belt) in self.pool.iter() {
            if let Some(src) = world.get_mut::<BeltSource>(id) {
                src.buffer.clear();
                src.buffer.extend_from_slice(belt.path.as_bytes());
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

impl BeltPool {
    /// Hand tail records to same-region outputs, then advance every belt.
    pub fn update(&mut self) {
        for i in 0..self.pool.len() {
            self.hand_off(i);
            self.pool.get_mut(i).path.advance();
        }
    }

    fn hand_off(&mut self, i: usize) {
        let belt = self.pool.get(i);
        let Some(out) = belt.output.of_kind(EntityKind::Belt) else {
            return;
        };
        let at = belt.output_index;
        if out == i {
            recycle_tail(&mut self.pool.get_mut(i).path, at);
        } else {
            let (from, to) = self.pool.pair_mut(i, out);
            transfer_tail(&mut from.path, &mut to.path, at);
        }
    }

    pub fn item_count(&self) -> u64 {
        self.pool
            .items()
            .iter()
            .map(|b| b.path.item_count() as u64)
            .sum()
    }
}

/// Move the record sitting at the tail of `from` onto `to` with its head at
/// `at`. Leaves both untouched when either side is not ready.
pub fn transfer_tail(from: &mut CargoPathBuffer, to: &mut CargoPathBuffer, at: usize) -> bool {
    if from.peek_at_end().is_none() || !to.can_insert_at(at) {
        return false;
    }
    match from.try_pick_at_end() {
        Some(cargo) => to.try_insert_at(at, cargo),
        None => false,
    }
}

/// Closed loop: feed the tail record back in at `at` on the same belt.
fn recycle_tail(path: &mut CargoPathBuffer, at: usize) -> bool {
    if path.peek_at_end().is_none() || !path.can_insert_at(at) {
        return false;
    }
    match path.try_pick_at_end() {
        Some(cargo) => path.try_insert_at(at, cargo),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cargo::Cargo;
    use crate::id::ItemId;

    fn belt(capacity: u32, speed: u8) -> CargoPathBuffer {
        CargoPathBuffer::new(capacity, speed, false)
    }

    #[test]
    fn transfer_moves_only_arrived_cargo() {
        let mut a = belt(2, 10);
        let mut b = belt(2, 10);
        let c = Cargo::new(ItemId(3), 1, 0);
        assert!(a.insert_at_head(c));
        assert!(!transfer_tail(&mut a, &mut b, 4));

        a.advance();
        assert!(transfer_tail(&mut a, &mut b, 4));
        assert!(a.is_empty());
        assert_eq!(b.get_cargo_at_index(4).map(|l| l.cargo), Some(c));
    }

    #[test]
    fn transfer_waits_for_blocked_output() {
        let mut a = belt(1, 1);
        let mut b = belt(1, 1);
        a.insert_at_head(Cargo::new(ItemId(1), 1, 0));
        b.insert_at_head(Cargo::new(ItemId(2), 1, 0));
        assert!(!transfer_tail(&mut a, &mut b, 4));
        assert_eq!(a.record_count(), 1);
    }

    #[test]
    fn closed_loop_recirculates() {
        let mut path = CargoPathBuffer::new(3, 10, true);
        let c = Cargo::new(ItemId(9), 2, 0);
        assert!(path.insert_at_head(c));
        path.advance();
        path.advance();
        assert_eq!(path.peek_at_end(), Some(c));
        assert!(recycle_tail(&mut path, 4));
        assert_eq!(path.cargos().collect::<Vec<_>>(), vec![(4, c)]);
    }
}
