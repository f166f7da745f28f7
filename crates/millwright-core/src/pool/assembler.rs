//! Recipe-driven machines.
//!
//! Each tick an assembler first tries to flush a finished cycle into its
//! product buffer, then starts a new cycle if every input is served, then
//! advances its work timer by `speed * satisfaction`. The resulting
//! [`AssemblerState`] is recomputed from scratch every tick.

use super::{BuildContext, BuildError, DensePool, KindPool, PowerLink, TickContext};
use crate::fixed::{Fixed64, scale};
use crate::id::{EntityKind, ItemId, SourceId};
use crate::needs::{EMPTY_PATTERN, NeedsStore};
use crate::source::{AssemblerSource, AssemblerState, SourceWorld};
use crate::statics::RecipeView;

#[derive(Debug, Clone)]
pub struct Assembler {
    pub recipe: Option<u32>,
    pub speed: u32,
    pub power: PowerLink,
    pub time: i64,
    pub served: Vec<u32>,
    pub produced: Vec<u32>,
    pub replicating: bool,
    pub state: AssemblerState,
}

impl Assembler {
    fn update(&mut self, recipe: &RecipeView<'_>, ctx: &TickContext<'_>) -> AssemblerState {
        if self.speed == 0 {
            return AssemblerState::InactiveNoAssembler;
        }

        if self.replicating && self.time >= recipe.data.time_spend {
            let cap = ctx.config.assembler_output_multiple;
            let full = self
                .produced
                .iter()
                .zip(recipe.product_counts)
                .any(|(&have, &count)| have + count > count * cap);
            if full {
                return AssemblerState::InactiveOutputFull;
            }
            for ((have, &count), &item) in self
                .produced
                .iter_mut()
                .zip(recipe.product_counts)
                .zip(recipe.products)
            {
                *have += count;
                ctx.production.record_produced(item, count);
            }
            self.time -= recipe.data.time_spend;
            self.replicating = false;
        }

        if !self.replicating {
            let ready = self
                .served
                .iter()
                .zip(recipe.require_counts)
                .all(|(&have, &count)| have >= count);
            if !ready {
                return AssemblerState::InactiveInputMissing;
            }
            for ((have, &count), &item) in self
                .served
                .iter_mut()
                .zip(recipe.require_counts)
                .zip(recipe.requires)
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

/// Assemblers of one region and their needs.
#[derive(Debug, Clone, Default)]
pub struct AssemblerPool {
    pub pool: DensePool<Assembler>,
    pub needs: NeedsStore,
}

impl KindPool for AssemblerPool {
    const KIND: EntityKind = EntityKind::Assembler;

    fn build(ctx: &mut BuildContext<'_>) -> Result<Self, BuildError> {
        let world = ctx.world;
        let mut out = Self::default();
        for id in ctx.members(Self::KIND) {
            let Some(src) = world.assemblers.get(id) else {
                continue;
            };
            let (recipe, pattern, inputs, outputs) = match &src.recipe {
                Some(r) => {
                    let index = ctx.statics.intern_recipe(r, ctx.patterns)?;
                    let pattern = ctx.statics.recipes.get(index).needs_pattern;
                    (Some(index), pattern, r.requires.len(), r.products.len())
                }
                None => (None, EMPTY_PATTERN, 0, 0),
            };
            let mut served = src.served.clone();
            served.resize(inputs, 0);
            let mut produced = src.produced.clone();
            produced.resize(outputs, 0);

            let assembler = Assembler {
                recipe,
                speed: src.speed,
                power: ctx.power_link(&src.power),
                time: src.time,
                served,
                produced,
                replicating: src.replicating,
                state: src.state,
            };
            let index = out.pool.push(id, assembler);
            out.needs.push(pattern);
            ctx.register(Self::KIND, id, index);
        }
        Ok(out)
    }

    fn save(&self, world: &mut SourceWorld) {
        for (id, a) in self.pool.iter() {
            if let Some(src) = world.get_mut::<AssemblerSource>(id) {
                src.time = a.time;
                src.served.clone_from(&a.served);
                src.produced.clone_from(&a.produced);
                src.replicating = a.replicating;
                src.state = a.state;
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

impl AssemblerPool {
    /// Production phase.
    pub fn tick(&mut self, ctx: &TickContext<'_>) {
        let multiple = ctx.config.assembler_input_multiple;
        for (i, a) in self.pool.items_mut().iter_mut().enumerate() {
            let Some(recipe) = a.recipe else {
                a.state = AssemblerState::InactiveNoRecipe;
                continue;
            };
            let view = ctx.statics.recipe(recipe);
            a.state = a.update(&view, ctx);
            refresh_needs(&mut self.needs, i, &a.served, view.require_counts, multiple);
        }
    }

    /// Power demand phase.
    pub fn post_demand(&self, ctx: &TickContext<'_>) {
        for a in self.pool.items() {
            a.power.post(ctx, a.state.is_active());
        }
    }

    /// Deliver `count` of `item` if the assembler currently wants it.
    pub fn accept(&mut self, index: usize, item: ItemId, count: u32, ctx: &TickContext<'_>) -> bool {
        let entry = self.needs.get(index);
        if !ctx.patterns.wants(entry, item) {
            return false;
        }
        let a = self.pool.get_mut(index);
        let Some(recipe) = a.recipe else {
            return false;
        };
        let view = ctx.statics.recipe(recipe);
        let Some(slot) = view.requires.iter().position(|&r| r == item) else {
            return false;
        };
        a.served[slot] += count;
        refresh_needs(
            &mut self.needs,
            index,
            &a.served,
            view.require_counts,
            ctx.config.assembler_input_multiple,
        );
        true
    }

    /// Take up to `max` of the first finished product passing `accept`.
    pub fn take_product(
        &mut self,
        index: usize,
        max: u32,
        mut accept: impl FnMut(ItemId) -> bool,
        ctx: &TickContext<'_>,
    ) -> Option<(ItemId, u32)> {
        let a = self.pool.get_mut(index);
        let view = ctx.statics.recipe(a.recipe?);
        let (slot, &item) = view
            .products
            .iter()
            .enumerate()
            .find(|&(j, &item)| a.produced[j] > 0 && accept(item))?;
        let n = a.produced[slot].min(max);
        a.produced[slot] -= n;
        Some((item, n))
    }

    /// Items held in input and output buffers.
    pub fn item_count(&self) -> u64 {
        self.pool
            .items()
            .iter()
            .map(|a| a.served.iter().chain(&a.produced).map(|&n| n as u64).sum::<u64>())
            .sum()
    }
}

/// Set need bit `j` while input `j` holds fewer than `multiple` cycles.
pub(crate) fn refresh_needs(
    needs: &mut NeedsStore,
    index: usize,
    served: &[u32],
    counts: &[u32],
    multiple: u32,
) {
    let entry = needs.get_mut(index);
    for (j, (&have, &count)) in served.iter().zip(counts).enumerate() {
        entry.set(j, have < count * multiple);
    }
}
