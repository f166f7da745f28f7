use super::{BuildContext, BuildError, DensePool, KindPool, TickContext};
use crate::fixed::scale;
use crate::id::{EntityKind, ItemId, SourceId};
use crate::needs::{EMPTY_PATTERN, NeedsStore};
use crate::source::{GeneratorKind, GeneratorProfile, GeneratorSource, SourceWorld};

#[derive(Debug, Clone)]
pub struct Generator {
    pub profile: u32,
    pub network: u32,
    pub fuel: ItemId,
    pub fuel_count: u32,
    pub fuel_capacity: u32,
    pub current_energy: i64,
    pub ambient: u32,
    /// Supply posted in this tick's demand phase.
    pub offered: i64,
}

impl Generator {
    fn offer(&self, profile: &GeneratorProfile) -> i64 {
        match profile.kind {
            GeneratorKind::Fuel if self.fuel_count > 0 => profile.capacity,
            GeneratorKind::Fuel => profile.capacity.min(self.current_energy.max(0)),
            GeneratorKind::Wind | GeneratorKind::Solar => {
                profile.capacity * self.ambient.min(100) as i64 / 100
            }
        }
    }

    /// Burn fuel for `demand` energy, returning what was generated.
    fn burn(&mut self, profile: &GeneratorProfile, demand: i64, ctx: &TickContext<'_>) -> i64 {
        if profile.kind != GeneratorKind::Fuel {
            return demand;
        }
        while self.current_energy < demand && self.fuel_count > 0 && profile.fuel_energy > 0 {
            self.fuel_count -= 1;
            self.current_energy += profile.fuel_energy;
            ctx.production.record_consumed(self.fuel, 1);
        }
        let burned = demand.min(self.current_energy.max(0));
        self.current_energy -= burned;
        burned
    }
}

#[derive(Debug, Clone, Default)]
pub struct GeneratorPool {
    pub pool: DensePool<Generator>,
    pub needs: NeedsStore,
}

impl KindPool for GeneratorPool {
    const KIND: EntityKind = EntityKind::Generator;

    fn build(ctx: &mut BuildContext<'_>) -> Result<Self, BuildError> {
        let world = ctx.world;
        let mut out = Self::default();
        for id in ctx.members(Self::KIND) {
            let Some(src) = world.generators.get(id) else {
                continue;
            };
            let profile = ctx.statics.intern_generator(src.proto, &src.profile)?;
            let pattern = match src.profile.kind {
                GeneratorKind::Fuel => ctx.patterns.intern(&src.profile.fuel_items)?,
                GeneratorKind::Wind | GeneratorKind::Solar => EMPTY_PATTERN,
            };
            let generator = Generator {
                profile,
                network: ctx.power.intern(src.network),
                fuel: src.fuel,
                fuel_count: src.fuel_count,
                fuel_capacity: src.fuel_capacity,
                current_energy: src.current_energy,
                ambient: src.ambient,
                offered: 0,
            };
            let index = out.pool.push(id, generator);
            out.needs.push(pattern);
            let g = out.pool.get(index as usize);
            refresh_fuel_needs(&mut out.needs, index as usize, g, &src.profile);
            ctx.register(Self::KIND, id, index);
        }
        Ok(out)
    }

    fn save(&self, world: &mut SourceWorld) {
        for (id, g) in self.pool.iter() {
            if let Some(src) = world.get_mut::<GeneratorSource>(id) {
                src.fuel = g.fuel;
                src.fuel_count = g.fuel_count;
                src.current_energy = g.current_energy;
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

impl GeneratorPool {
    /// Power demand phase: offer supply to each network.
    pub fn post_supply(&mut self, ctx: &TickContext<'_>) {
        for g in self.pool.items_mut() {
            let profile = ctx.statics.generator_profiles.get(g.profile);
            g.offered = g.offer(profile);
            ctx.power.post_supply(g.network, g.offered);
        }
    }

    /// Production phase: generate the share of the offer the network drew.
    pub fn tick(&mut self, ctx: &TickContext<'_>) {
        for (i, g) in self.pool.items_mut().iter_mut().enumerate() {
            let profile = ctx.statics.generator_profiles.get(g.profile);
            let drawn = scale(g.offered, ctx.power.load(g.network));
            let generated = g.burn(profile, drawn, ctx);
            ctx.production.record_energy_generated(generated);

            refresh_fuel_needs(&mut self.needs, i, g, profile);
        }
    }

    /// Load fuel delivered by an inserter.
    pub fn accept(&mut self, index: usize, item: ItemId, count: u32, ctx: &TickContext<'_>) -> bool {
        if !ctx.patterns.wants(self.needs.get(index), item) {
            return false;
        }
        let g = self.pool.get_mut(index);
        if g.fuel_count > 0 && g.fuel != item {
            return false;
        }
        g.fuel = item;
        g.fuel_count += count;
        let profile = ctx.statics.generator_profiles.get(g.profile);
        refresh_fuel_needs(&mut self.needs, index, g, profile);
        true
    }

    pub fn item_count(&self) -> u64 {
        self.pool.items().iter().map(|g| g.fuel_count as u64).sum()
    }
}

/// Fuel slots are wanted while the generator has room and either burns
/// nothing or already burns that item.
fn refresh_fuel_needs(
    needs: &mut NeedsStore,
    index: usize,
    g: &Generator,
    profile: &GeneratorProfile,
) {
    if profile.kind != GeneratorKind::Fuel {
        return;
    }
    let hungry = g.fuel_count < g.fuel_capacity;
    let entry = needs.get_mut(index);
    for (slot, &item) in profile.fuel_items.iter().enumerate() {
        let same_fuel = g.fuel_count == 0 || g.fuel == item;
        entry.set(slot, hungry && same_fuel);
    }
}
