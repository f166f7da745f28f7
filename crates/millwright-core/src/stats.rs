//! Thread-safe accumulators shared by every region.
//!
//! Production units across regions record into the same registers
//! concurrently. Each increment is a single relaxed `fetch_add`; nothing is
//! held across an entity update. Bookkeeping folds the per-tick counters into
//! cumulative totals once all other phases of the tick are done.

use crate::id::ItemId;
use crate::source::WorldStatistics;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

const ITEM_SLOTS: usize = ItemId::MAX.0 as usize + 1;

fn zeroed(len: usize) -> Box<[AtomicU64]> {
    (0..len).map(|_| AtomicU64::new(0)).collect()
}

// ---------------------------------------------------------------------------
// ProductionRegister
// ---------------------------------------------------------------------------

/// Per-item production and consumption, plus energy counters.
#[derive(Debug)]
pub struct ProductionRegister {
    tick_produced: Box<[AtomicU64]>,
    tick_consumed: Box<[AtomicU64]>,
    total_produced: Box<[AtomicU64]>,
    total_consumed: Box<[AtomicU64]>,
    energy_generated: AtomicI64,
    energy_consumed: AtomicI64,
}

impl Default for ProductionRegister {
    fn default() -> Self {
        Self {
            tick_produced: zeroed(ITEM_SLOTS),
            tick_consumed: zeroed(ITEM_SLOTS),
            total_produced: zeroed(ITEM_SLOTS),
            total_consumed: zeroed(ITEM_SLOTS),
            energy_generated: AtomicI64::new(0),
            energy_consumed: AtomicI64::new(0),
        }
    }
}

impl ProductionRegister {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_produced(&self, item: ItemId, count: u32) {
        if count > 0 {
            self.tick_produced[item.0 as usize].fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_consumed(&self, item: ItemId, count: u32) {
        if count > 0 {
            self.tick_consumed[item.0 as usize].fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_energy_generated(&self, energy: i64) {
        self.energy_generated.fetch_add(energy, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_energy_consumed(&self, energy: i64) {
        self.energy_consumed.fetch_add(energy, Ordering::Relaxed);
    }

    /// Move this tick's counts into the totals.
    pub fn fold_tick(&self) {
        fold(&self.tick_produced, &self.total_produced);
        fold(&self.tick_consumed, &self.total_consumed);
    }

    /// Production recorded since the last fold.
    pub fn tick_produced(&self, item: ItemId) -> u64 {
        self.tick_produced[item.0 as usize].load(Ordering::Relaxed)
    }

    /// Everything produced since the build, folded or not.
    pub fn produced(&self, item: ItemId) -> u64 {
        let i = item.0 as usize;
        self.total_produced[i].load(Ordering::Relaxed) + self.tick_produced[i].load(Ordering::Relaxed)
    }

    pub fn consumed(&self, item: ItemId) -> u64 {
        let i = item.0 as usize;
        self.total_consumed[i].load(Ordering::Relaxed) + self.tick_consumed[i].load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let collect = |tick: &[AtomicU64], total: &[AtomicU64]| -> BTreeMap<ItemId, u64> {
            tick.iter()
                .zip(total)
                .enumerate()
                .filter_map(|(i, (t, s))| {
                    let n = t.load(Ordering::Relaxed) + s.load(Ordering::Relaxed);
                    (n > 0).then_some((ItemId(i as u16), n))
                })
                .collect()
        };
        StatsSnapshot {
            produced: collect(&self.tick_produced, &self.total_produced),
            consumed: collect(&self.tick_consumed, &self.total_consumed),
            energy_generated: self.energy_generated.load(Ordering::Relaxed),
            energy_consumed: self.energy_consumed.load(Ordering::Relaxed),
        }
    }
}

fn fold(tick: &[AtomicU64], total: &[AtomicU64]) {
    for (t, s) in tick.iter().zip(total) {
        let n = t.swap(0, Ordering::Relaxed);
        if n > 0 {
            s.fetch_add(n, Ordering::Relaxed);
        }
    }
}

/// Plain-value copy of a [`ProductionRegister`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub produced: BTreeMap<ItemId, u64>,
    pub consumed: BTreeMap<ItemId, u64>,
    pub energy_generated: i64,
    pub energy_consumed: i64,
}

// ---------------------------------------------------------------------------
// ResearchRegister
// ---------------------------------------------------------------------------

/// Hash progress per technology. The set of technologies is fixed at build.
#[derive(Debug, Default)]
pub struct ResearchRegister {
    techs: Vec<u32>,
    lookup: HashMap<u32, usize>,
    hashes: Vec<AtomicU64>,
}

impl ResearchRegister {
    pub fn new(techs: impl IntoIterator<Item = u32>) -> Self {
        let mut register = Self::default();
        for tech in techs {
            if !register.lookup.contains_key(&tech) {
                register.lookup.insert(tech, register.techs.len());
                register.techs.push(tech);
                register.hashes.push(AtomicU64::new(0));
            }
        }
        register
    }

    #[inline]
    pub fn record(&self, tech: u32, hashes: u64) {
        if let Some(&i) = self.lookup.get(&tech) {
            self.hashes[i].fetch_add(hashes, Ordering::Relaxed);
        }
    }

    pub fn hashes(&self, tech: u32) -> u64 {
        self.lookup
            .get(&tech)
            .map_or(0, |&i| self.hashes[i].load(Ordering::Relaxed))
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u64)> + '_ {
        self.techs
            .iter()
            .zip(&self.hashes)
            .map(|(&t, h)| (t, h.load(Ordering::Relaxed)))
    }
}

/// `base` plus everything accumulated since the build.
pub fn merge_statistics(
    base: &WorldStatistics,
    production: &ProductionRegister,
    research: &ResearchRegister,
) -> WorldStatistics {
    let mut merged = base.clone();
    let snapshot = production.snapshot();
    for (item, n) in snapshot.produced {
        *merged.produced.entry(item).or_default() += n;
    }
    for (item, n) in snapshot.consumed {
        *merged.consumed.entry(item).or_default() += n;
    }
    for (tech, n) in research.iter().filter(|&(_, n)| n > 0) {
        *merged.research_hashes.entry(tech).or_default() += n;
    }
    merged.energy_generated += snapshot.energy_generated;
    merged.energy_consumed += snapshot.energy_consumed;
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn fold_moves_tick_counts_into_totals() {
        let reg = ProductionRegister::new();
        reg.record_produced(ItemId(3), 2);
        reg.record_consumed(ItemId(4), 5);
        assert_eq!(reg.tick_produced(ItemId(3)), 2);

        reg.fold_tick();
        assert_eq!(reg.tick_produced(ItemId(3)), 0);
        assert_eq!(reg.produced(ItemId(3)), 2);
        assert_eq!(reg.consumed(ItemId(4)), 5);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let reg = Arc::new(ProductionRegister::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        reg.record_produced(ItemId(1), 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(reg.produced(ItemId(1)), 4000);
    }

    #[test]
    fn merge_adds_onto_base() {
        let mut base = WorldStatistics::default();
        base.produced.insert(ItemId(1), 10);
        base.research_hashes.insert(9, 100);

        let reg = ProductionRegister::new();
        reg.record_produced(ItemId(1), 5);
        reg.record_consumed(ItemId(2), 1);
        reg.record_energy_generated(300);
        let research = ResearchRegister::new([9, 9, 11]);
        research.record(9, 20);
        research.record(42, 1);

        let merged = merge_statistics(&base, &reg, &research);
        assert_eq!(merged.produced[&ItemId(1)], 15);
        assert_eq!(merged.consumed[&ItemId(2)], 1);
        assert_eq!(merged.research_hashes[&9], 120);
        assert!(!merged.research_hashes.contains_key(&11));
        assert_eq!(merged.energy_generated, 300);
    }

    #[test]
    fn merge_with_nothing_recorded_is_identity() {
        let mut base = WorldStatistics::default();
        base.consumed.insert(ItemId(7), 3);
        let merged = merge_statistics(&base, &ProductionRegister::new(), &ResearchRegister::default());
        assert_eq!(merged, base);
    }
}
