//! Per-entity "which inputs do I want" state.
//!
//! Thousands of machines running the same recipe want the same items, so the
//! item sequences are interned once ([`NeedsPatterns`]) and every entity keeps
//! only a pattern index plus a presence byte ([`NeedsEntry`]).

use crate::id::ItemId;
use crate::pool::BuildError;
use std::collections::HashMap;

/// Need slots per entity; one bit each in [`NeedsEntry::mask`].
pub const MAX_NEEDS: usize = 8;

/// Pattern index of entities that never want anything.
pub const EMPTY_PATTERN: u32 = 0;

/// Universe-wide table of interned need item sequences. Pattern 0 is the
/// empty sequence.
#[derive(Debug, Clone)]
pub struct NeedsPatterns {
    patterns: Vec<Box<[ItemId]>>,
    lookup: HashMap<Box<[ItemId]>, u32>,
}

impl Default for NeedsPatterns {
    fn default() -> Self {
        let empty: Box<[ItemId]> = Box::new([]);
        let mut lookup = HashMap::new();
        lookup.insert(empty.clone(), EMPTY_PATTERN);
        Self {
            patterns: vec![empty],
            lookup,
        }
    }
}

impl NeedsPatterns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern an item sequence. Sequences longer than [`MAX_NEEDS`] are a
    /// build error.
    pub fn intern(&mut self, items: &[ItemId]) -> Result<u32, BuildError> {
        if items.len() > MAX_NEEDS {
            return Err(BuildError::TooManyNeeds { len: items.len() });
        }
        if let Some(&index) = self.lookup.get(items) {
            return Ok(index);
        }
        let index = self.patterns.len() as u32;
        let boxed: Box<[ItemId]> = items.into();
        self.patterns.push(boxed.clone());
        self.lookup.insert(boxed, index);
        Ok(index)
    }

    /// Items of one pattern.
    #[inline]
    pub fn get(&self, pattern: u32) -> &[ItemId] {
        &self.patterns[pattern as usize]
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.len() <= 1
    }

    /// Items currently wanted by `entry`, in slot order.
    pub fn wanted<'a>(&'a self, entry: NeedsEntry) -> impl Iterator<Item = ItemId> + 'a {
        self.get(entry.pattern)
            .iter()
            .enumerate()
            .filter(move |(slot, _)| entry.mask & (1 << slot) != 0)
            .map(|(_, &item)| item)
    }

    /// Whether `entry` wants `item`.
    #[inline]
    pub fn wants(&self, entry: NeedsEntry, item: ItemId) -> bool {
        entry.mask != 0
            && self
                .get(entry.pattern)
                .iter()
                .enumerate()
                .any(|(slot, &i)| i == item && entry.mask & (1 << slot) != 0)
    }
}

/// One entity's needs: a pattern plus which of its slots are active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NeedsEntry {
    pub pattern: u32,
    pub mask: u8,
}

impl NeedsEntry {
    pub fn new(pattern: u32) -> Self {
        Self { pattern, mask: 0 }
    }

    #[inline]
    pub fn set(&mut self, slot: usize, wanted: bool) {
        debug_assert!(slot < MAX_NEEDS);
        if wanted {
            self.mask |= 1 << slot;
        } else {
            self.mask &= !(1 << slot);
        }
    }

    #[inline]
    pub fn is_set(self, slot: usize) -> bool {
        self.mask & (1 << slot) != 0
    }
}

/// Needs of every entity in one dense pool, indexed like the pool.
#[derive(Debug, Clone, Default)]
pub struct NeedsStore {
    entries: Vec<NeedsEntry>,
}

impl NeedsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pattern: u32) {
        self.entries.push(NeedsEntry::new(pattern));
    }

    #[inline]
    pub fn get(&self, index: usize) -> NeedsEntry {
        self.entries[index]
    }

    #[inline]
    pub fn get_mut(&mut self, index: usize) -> &mut NeedsEntry {
        &mut self.entries[index]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
