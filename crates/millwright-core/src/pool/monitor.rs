use super::{BeltPool, BuildContext, BuildError, DensePool, KindPool};
use crate::id::{EntityKind, SourceId, TypedIndex};
use crate::source::{MonitorSource, SourceWorld};

/// Samples the item count on a stretch of belt every tick and raises an
/// alarm when the total over the last `period` ticks falls below `target`.
#[derive(Debug, Clone)]
pub struct Monitor {
    pub belt: TypedIndex,
    pub offset: usize,
    pub span: usize,
    pub period: u32,
    pub target: u32,
    /// Ring of per-tick samples; grows up to `period` entries.
    pub samples: Vec<u32>,
    pub cursor: u32,
    pub alarm: bool,
}

impl Monitor {
    fn record(&mut self, sample: u32) {
        if self.period == 0 {
            return;
        }
        let period = self.period as usize;
        if self.samples.len() < period {
            self.samples.push(sample);
            self.cursor = (self.samples.len() % period) as u32;
        } else {
            self.samples[self.cursor as usize] = sample;
            self.cursor = (self.cursor + 1) % self.period;
        }
        let full = self.samples.len() == period;
        self.alarm = full && self.total() < self.target as u64;
    }

    /// Sum of the samples in the ring.
    pub fn total(&self) -> u64 {
        self.samples.iter().map(|&n| n as u64).sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MonitorPool {
    pub pool: DensePool<Monitor>,
}

impl KindPool for MonitorPool {
    const KIND: EntityKind = EntityKind::Monitor;

    fn build(ctx: &mut BuildContext<'_>) -> Result<Self, BuildError> {
        let world = ctx.world;
        let mut pool = DensePool::new();
        for id in ctx.members(Self::KIND) {
            let Some(src) = world.monitors.get(id) else {
                continue;
            };
            let mut samples = src.samples.clone();
            samples.truncate(src.period as usize);
            let monitor = Monitor {
                belt: ctx.resolve_belt(src.belt),
                offset: src.offset as usize,
                span: src.span as usize,
                period: src.period,
                target: src.target,
                samples,
                cursor: src.cursor.min(src.period.saturating_sub(1)),
                alarm: src.alarm,
            };
            let index = pool.push(id, monitor);
            ctx.register(Self::KIND, id, index);
        }
        Ok(Self { pool })
    }

    fn save(&self, world: &mut SourceWorld) {
        for (id, m) in self.pool.iter() {
            if let Some(src) = world.get_mut::<MonitorSource>(id) {
                src.samples.clone_from(&m.samples);
                src.cursor = m.cursor;
                src.alarm = m.alarm;
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

impl MonitorPool {
    /// Transport phase, after belts advance.
    pub fn update(&mut self, belts: &BeltPool) {
        for m in self.pool.items_mut() {
            let sample = match m.belt.of_kind(EntityKind::Belt) {
                Some(belt) => belts.pool.get(belt).path.count_in_range(m.offset, m.span),
                None => 0,
            };
            m.record(sample);
        }
    }
}
