use super::assembler::refresh_needs;
use super::{BuildContext, BuildError, DensePool, KindPool, PowerLink, TickContext};
use crate::fixed::{Fixed64, scale};
use crate::id::{EntityKind, ItemId, SourceId};
use crate::needs::{EMPTY_PATTERN, NeedsStore};
use crate::source::{AssemblerState, LabSource, SourceWorld};
use crate::statics::ResearchView;

/// A research station consuming matrices into research hashes.
#[derive(Debug, Clone)]
pub struct Lab {
    pub research: Option<u32>,
    pub speed: u32,
    pub power: PowerLink,
    pub time: i64,
    pub served: Vec<u32>,
    pub replicating: bool,
    pub state: AssemblerState,
}

impl Lab {
    fn update(&mut self, research: &ResearchView<'_>, ctx: &TickContext<'_>) -> AssemblerState {
        if self.replicating && self.time >= research.data.time_spend {
            ctx.research
                .record(research.data.tech_id, research.data.hashes_per_cycle);
            self.time -= research.data.time_spend;
            self.replicating = false;
        }

        if !self.replicating {
            let ready = self
                .served
                .iter()
                .zip(research.matrix_counts)
                .all(|(&have, &count)| have >= count);
            if !ready {
                return AssemblerState::InactiveInputMissing;
            }
            for ((have, &count), &item) in self
                .served
                .iter_mut()
                .zip(research.matrix_counts)
                .zip(research.matrices)
            {
                *have -= count;
                ctx.production.record_consumed(item, count);
            }
            self.replicating = true;
        }

        let ratio = self.power.satisfaction(ctx);
        if ratio == Fixed64::ZERO {
            return AssemblerState::InactiveNoPower;
        }
        self.time += scale(self.speed as i64, ratio);
        AssemblerState::Active
    }
}

#[derive(Debug, Clone, Default)]
pub struct LabPool {
    pub pool: DensePool<Lab>,
    pub needs: NeedsStore,
}

impl KindPool for LabPool {
    const KIND: EntityKind = EntityKind::Lab;

    fn build(ctx: &mut BuildContext<'_>) -> Result<Self, BuildError> {
        let world = ctx.world;
        let mut out = Self::default();
        for id in ctx.members(Self::KIND) {
            let Some(src) = world.labs.get(id) else {
                continue;
            };
            let (research, pattern, inputs) = match &src.research {
                Some(r) => {
                    let index = ctx.statics.intern_research(r, ctx.patterns)?;
                    let pattern = ctx.statics.research.get(index).needs_pattern;
                    (Some(index), pattern, r.matrices.len())
                }
                None => (None, EMPTY_PATTERN, 0),
            };
            let mut served = src.served.clone();
            served.resize(inputs, 0);
            let lab = Lab {
                research,
                speed: src.speed,
                power: ctx.power_link(&src.power),
                time: src.time,
                served,
                replicating: src.replicating,
                state: src.state,
            };
            let index = out.pool.push(id, lab);
            out.needs.push(pattern);
            ctx.register(Self::KIND, id, index);
        }
        Ok(out)
    }

    fn save(&self, world: &mut SourceWorld) {
        for (id, lab) in self.pool.iter() {
            if let Some(src) = world.get_mut::<LabSource>(id) {
                src.time = lab.time;
                src.served.clone_from(&lab.served);
                src.replicating = lab.replicating;
                src.state = lab.state;
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

impl LabPool {
    /// Production phase. A lab without a research target reports
    /// `InactiveNoAssembler`.
    pub fn tick(&mut self, ctx: &TickContext<'_>) {
        let multiple = ctx.config.assembler_input_multiple;
        for (i, lab) in self.pool.items_mut().iter_mut().enumerate() {
            let Some(research) = lab.research else {
                lab.state = AssemblerState::InactiveNoAssembler;
                continue;
            };
            let view = ctx.statics.research(research);
            lab.state = lab.update(&view, ctx);
            refresh_needs(&mut self.needs, i, &lab.served, view.matrix_counts, multiple);
        }
    }

    pub fn post_demand(&self, ctx: &TickContext<'_>) {
        for lab in self.pool.items() {
            lab.power.post(ctx, lab.state.is_active());
        }
    }

    pub fn accept(&mut self, index: usize, item: ItemId, count: u32, ctx: &TickContext<'_>) -> bool {
        if !ctx.patterns.wants(self.needs.get(index), item) {
            return false;
        }
        let lab = self.pool.get_mut(index);
        let Some(research) = lab.research else {
            return false;
        };
        let view = ctx.statics.research(research);
        let Some(slot) = view.matrices.iter().position(|&m| m == item) else {
            return false;
        };
        lab.served[slot] += count;
        refresh_needs(
            &mut self.needs,
            index,
            &lab.served,
            view.matrix_counts,
            ctx.config.assembler_input_multiple,
        );
        true
    }

    pub fn item_count(&self) -> u64 {
        self.pool
            .items()
            .iter()
            .map(|l| l.served.iter().map(|&n| n as u64).sum::<u64>())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ProtoId;
    use crate::source::ResearchSource;
    use crate::test_utils::PoolHarness;

    #[test]
    fn lab_turns_matrices_into_hashes() {
        let mut world = SourceWorld::new();
        let research = ResearchSource {
            tech_id: 1001,
            matrices: vec![ItemId(6001)],
            matrix_counts: vec![1],
            time_spend: 10_000,
            hashes_per_cycle: 60,
        };
        world.add(LabSource::new(ProtoId(2), Some(research), 10_000));
        let mut h = PoolHarness::new();
        let mut pool: LabPool = h.build(&world);

        pool.tick(&h.ctx());
        assert_eq!(pool.pool.get(0).state, AssemblerState::InactiveInputMissing);
        assert!(pool.accept(0, ItemId(6001), 1, &h.ctx()));

        pool.tick(&h.ctx()); // consumes and works one tick
        pool.tick(&h.ctx()); // completes the cycle
        assert_eq!(h.research.hashes(1001), 60);
        assert_eq!(h.production.consumed(ItemId(6001)), 1);
    }

    #[test]
    fn lab_without_research_is_inactive() {
        let mut world = SourceWorld::new();
        world.add(LabSource::new(ProtoId(2), None, 10_000));
        let mut h = PoolHarness::new();
        let mut pool: LabPool = h.build(&world);
        pool.tick(&h.ctx());
        assert_eq!(pool.pool.get(0).state, AssemblerState::InactiveNoAssembler);
        assert!(!pool.accept(0, ItemId(6001), 1, &h.ctx()));
    }
}
