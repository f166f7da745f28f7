use super::{BuildContext, BuildError, DensePool, KindPool, split_inc, split_take};
use crate::id::{EntityKind, ItemId, SourceId};
use crate::source::{SourceWorld, StorageSlot, StorageSource};

/// A chest: fixed slots, each holding one item type.
#[derive(Debug, Clone)]
pub struct Storage {
    pub slots: Vec<StorageSlot>,
    pub slot_capacity: u32,
}

impl Storage {
    /// Store up to `count` items, topping up matching slots before opening
    /// empty ones. Returns how many were accepted.
    pub fn add(&mut self, item: ItemId, count: u32, inc: u32) -> u32 {
        if item.is_none() || count == 0 {
            return 0;
        }
        let mut left = count;
        let mut inc_left = inc;
        let capacity = self.slot_capacity;
        let place = |slot: &mut StorageSlot, left: &mut u32, inc_left: &mut u32| {
            let room = capacity.saturating_sub(slot.count);
            let n = room.min(*left);
            if n == 0 {
                return;
            }
            let moved_inc = split_inc(*inc_left, *left, n);
            slot.item = item;
            slot.count += n;
            slot.inc += moved_inc;
            *left -= n;
            *inc_left -= moved_inc;
        };

        for slot in self.slots.iter_mut().filter(|s| s.item == item && s.count > 0) {
            place(slot, &mut left, &mut inc_left);
        }
        for slot in self.slots.iter_mut().filter(|s| s.count == 0) {
            if left == 0 {
                break;
            }
            place(slot, &mut left, &mut inc_left);
        }
        count - left
    }

    /// Remove up to `max` items from the first non-empty slot whose item
    /// passes `accept`. Returns `(item, count, inc)`.
    pub fn take(&mut self, max: u32, mut accept: impl FnMut(ItemId) -> bool) -> Option<(ItemId, u32, u32)> {
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.count > 0 && accept(s.item))?;
        let (n, inc) = split_take(slot.inc, slot.count, max);
        let item = slot.item;
        slot.count -= n;
        slot.inc -= inc;
        if slot.count == 0 {
            *slot = StorageSlot::default();
        }
        Some((item, n, inc))
    }

    /// Whether at least one more `item` fits.
    pub fn has_room_for(&self, item: ItemId) -> bool {
        self.slots
            .iter()
            .any(|s| s.count == 0 || (s.item == item && s.count < self.slot_capacity))
    }

    pub fn count_of(&self, item: ItemId) -> u64 {
        self.slots
            .iter()
            .filter(|s| s.item == item)
            .map(|s| s.count as u64)
            .sum()
    }

    pub fn total(&self) -> u64 {
        self.slots.iter().map(|s| s.count as u64).sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StoragePool {
    pub pool: DensePool<Storage>,
}

impl KindPool for StoragePool {
    const KIND: EntityKind = EntityKind::Storage;

    fn build(ctx: &mut BuildContext<'_>) -> Result<Self, BuildError> {
        let world = ctx.world;
        let mut pool = DensePool::new();
        for id in ctx.members(Self::KIND) {
            let Some(src) = world.storages.get(id) else {
                continue;
            };
            if let Some(slot) = src.slots.iter().find(|s| s.item > ItemId::MAX) {
                return Err(BuildError::ItemOutOfRange(slot.item));
            }
            let index = pool.push(
                id,
                Storage {
                    slots: src.slots.clone(),
                    slot_capacity: src.slot_capacity,
                },
            );
            ctx.register(Self::KIND, id, index);
        }
        Ok(Self { pool })
    }

    fn save(&self, world: &mut SourceWorld) {
        for (id, storage) in self.pool.iter() {
            if let Some(src) = world.get_mut::<StorageSource>(id) {
                src.slots.clone_from(&storage.slots);
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

impl StoragePool {
    pub fn item_count(&self) -> u64 {
        self.pool.items().iter().map(Storage::total).sum()
    }
}
