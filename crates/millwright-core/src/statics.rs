//! Content-addressed storage for immutable, widely shared configuration.
//!
//! Values are interned by full structural equality: interning an equal value
//! twice yields the same `u32` index, and tables only grow until the next
//! full rebuild replaces the whole store.

use crate::id::{ItemId, ProtoId, RecipeId};
use crate::needs::NeedsPatterns;
use crate::pool::BuildError;
use crate::source::{GeneratorProfile, InserterGrade, RecipeSource, ResearchSource};
use std::collections::HashMap;
use std::hash::Hash;

// ---------------------------------------------------------------------------
// Interning tables
// ---------------------------------------------------------------------------

/// Interns whole values.
#[derive(Debug, Clone)]
pub struct InternTable<T> {
    values: Vec<T>,
    lookup: HashMap<T, u32>,
}

impl<T> Default for InternTable<T> {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            lookup: HashMap::new(),
        }
    }
}

impl<T: Eq + Hash + Clone> InternTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, value: T) -> u32 {
        if let Some(&index) = self.lookup.get(&value) {
            return index;
        }
        let index = self.values.len() as u32;
        self.values.push(value.clone());
        self.lookup.insert(value, index);
        index
    }

    /// Index of an already interned value.
    pub fn find(&self, value: &T) -> Option<u32> {
        self.lookup.get(value).copied()
    }

    #[inline]
    pub fn get(&self, index: u32) -> &T {
        &self.values[index as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.lookup.clear();
    }
}

/// Interns slices by content. Lookups borrow the slice, so a hit allocates
/// nothing.
#[derive(Debug, Clone)]
pub struct ArrayInterner<T> {
    arrays: Vec<Box<[T]>>,
    lookup: HashMap<Box<[T]>, u32>,
}

impl<T> Default for ArrayInterner<T> {
    fn default() -> Self {
        Self {
            arrays: Vec::new(),
            lookup: HashMap::new(),
        }
    }
}

impl<T: Eq + Hash + Clone> ArrayInterner<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, values: &[T]) -> u32 {
        if let Some(&index) = self.lookup.get(values) {
            return index;
        }
        let index = self.arrays.len() as u32;
        let boxed: Box<[T]> = values.into();
        self.arrays.push(boxed.clone());
        self.lookup.insert(boxed, index);
        index
    }

    #[inline]
    pub fn get(&self, index: u32) -> &[T] {
        &self.arrays[index as usize]
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    pub fn clear(&mut self) {
        self.arrays.clear();
        self.lookup.clear();
    }
}

// ---------------------------------------------------------------------------
// Interned value types
// ---------------------------------------------------------------------------

/// A recipe with its arrays replaced by interned indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecipeData {
    pub recipe_id: RecipeId,
    pub time_spend: i64,
    pub requires: u32,
    pub require_counts: u32,
    pub products: u32,
    pub product_counts: u32,
    /// Needs pattern built from `requires`.
    pub needs_pattern: u32,
}

/// A lab research target with interned arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResearchData {
    pub tech_id: u32,
    pub matrices: u32,
    pub matrix_counts: u32,
    pub time_spend: i64,
    pub hashes_per_cycle: u64,
    pub needs_pattern: u32,
}

/// Consumer power draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PowerProfile {
    pub work_energy: i64,
    pub idle_energy: i64,
}

// ---------------------------------------------------------------------------
// StaticDataStore
// ---------------------------------------------------------------------------

/// Universe-wide deduplicated configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticDataStore {
    pub recipes: InternTable<RecipeData>,
    pub research: InternTable<ResearchData>,
    pub power_profiles: InternTable<PowerProfile>,
    pub generator_profiles: InternTable<GeneratorProfile>,
    pub inserter_grades: InternTable<InserterGrade>,
    pub item_arrays: ArrayInterner<ItemId>,
    pub count_arrays: ArrayInterner<u32>,
    generator_by_proto: HashMap<ProtoId, u32>,
}

impl StaticDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a recipe, its arrays and its needs pattern.
    pub fn intern_recipe(
        &mut self,
        recipe: &RecipeSource,
        patterns: &mut NeedsPatterns,
    ) -> Result<u32, BuildError> {
        if recipe.requires.len() != recipe.require_counts.len()
            || recipe.products.len() != recipe.product_counts.len()
        {
            return Err(BuildError::MalformedRecipe(recipe.recipe_id));
        }
        check_items(&recipe.requires)?;
        check_items(&recipe.products)?;
        let data = RecipeData {
            recipe_id: recipe.recipe_id,
            time_spend: recipe.time_spend,
            requires: self.item_arrays.intern(&recipe.requires),
            require_counts: self.count_arrays.intern(&recipe.require_counts),
            products: self.item_arrays.intern(&recipe.products),
            product_counts: self.count_arrays.intern(&recipe.product_counts),
            needs_pattern: patterns.intern(&recipe.requires)?,
        };
        Ok(self.recipes.intern(data))
    }

    pub fn intern_research(
        &mut self,
        research: &ResearchSource,
        patterns: &mut NeedsPatterns,
    ) -> Result<u32, BuildError> {
        if research.matrices.len() != research.matrix_counts.len() {
            return Err(BuildError::MalformedResearch(research.tech_id));
        }
        check_items(&research.matrices)?;
        let data = ResearchData {
            tech_id: research.tech_id,
            matrices: self.item_arrays.intern(&research.matrices),
            matrix_counts: self.count_arrays.intern(&research.matrix_counts),
            time_spend: research.time_spend,
            hashes_per_cycle: research.hashes_per_cycle,
            needs_pattern: patterns.intern(&research.matrices)?,
        };
        Ok(self.research.intern(data))
    }

    pub fn intern_power(&mut self, work_energy: i64, idle_energy: i64) -> u32 {
        self.power_profiles.intern(PowerProfile {
            work_energy,
            idle_energy,
        })
    }

    /// Intern a generator profile, checking that every generator of one proto
    /// carries the same profile.
    pub fn intern_generator(
        &mut self,
        proto: ProtoId,
        profile: &GeneratorProfile,
    ) -> Result<u32, BuildError> {
        check_items(&profile.fuel_items)?;
        let index = self.generator_profiles.intern(profile.clone());
        match self.generator_by_proto.get(&proto) {
            Some(&existing) if existing != index => Err(BuildError::InconsistentProfile { proto }),
            Some(_) => Ok(index),
            None => {
                self.generator_by_proto.insert(proto, index);
                Ok(index)
            }
        }
    }

    pub fn intern_grade(&mut self, grade: InserterGrade) -> u32 {
        self.inserter_grades.intern(grade)
    }

    // -- Resolved views used by the tick loops --

    #[inline]
    pub fn recipe(&self, index: u32) -> RecipeView<'_> {
        let data = self.recipes.get(index);
        RecipeView {
            data,
            requires: self.item_arrays.get(data.requires),
            require_counts: self.count_arrays.get(data.require_counts),
            products: self.item_arrays.get(data.products),
            product_counts: self.count_arrays.get(data.product_counts),
        }
    }

    #[inline]
    pub fn research(&self, index: u32) -> ResearchView<'_> {
        let data = self.research.get(index);
        ResearchView {
            data,
            matrices: self.item_arrays.get(data.matrices),
            matrix_counts: self.count_arrays.get(data.matrix_counts),
        }
    }

    /// Drop everything, including the proto consistency map.
    pub fn clear(&mut self) {
        self.recipes.clear();
        self.research.clear();
        self.power_profiles.clear();
        self.generator_profiles.clear();
        self.inserter_grades.clear();
        self.item_arrays.clear();
        self.count_arrays.clear();
        self.generator_by_proto.clear();
    }
}

fn check_items(items: &[ItemId]) -> Result<(), BuildError> {
    match items.iter().find(|&&item| item > ItemId::MAX) {
        Some(&item) => Err(BuildError::ItemOutOfRange(item)),
        None => Ok(()),
    }
}

/// A recipe with its arrays resolved.
#[derive(Debug, Clone, Copy)]
pub struct RecipeView<'a> {
    pub data: &'a RecipeData,
    pub requires: &'a [ItemId],
    pub require_counts: &'a [u32],
    pub products: &'a [ItemId],
    pub product_counts: &'a [u32],
}

#[derive(Debug, Clone, Copy)]
pub struct ResearchView<'a> {
    pub data: &'a ResearchData,
    pub matrices: &'a [ItemId],
    pub matrix_counts: &'a [u32],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::GeneratorKind;

    fn gear_recipe() -> RecipeSource {
        RecipeSource {
            recipe_id: RecipeId(1),
            time_spend: 60_000,
            requires: vec![ItemId(1101)],
            require_counts: vec![2],
            products: vec![ItemId(1201)],
            product_counts: vec![1],
        }
    }

    #[test]
    fn structurally_equal_recipes_share_an_index() {
        let mut store = StaticDataStore::new();
        let mut patterns = NeedsPatterns::new();
        let a = store.intern_recipe(&gear_recipe(), &mut patterns).unwrap();
        let b = store.intern_recipe(&gear_recipe(), &mut patterns).unwrap();
        assert_eq!(a, b);
        assert_eq!(store.recipes.len(), 1);

        let mut other = gear_recipe();
        other.require_counts = vec![3];
        let c = store.intern_recipe(&other, &mut patterns).unwrap();
        assert_ne!(a, c);

        // The item array is shared, the count array is not.
        assert_eq!(store.recipe(a).data.requires, store.recipe(c).data.requires);
        assert_ne!(
            store.recipe(a).data.require_counts,
            store.recipe(c).data.require_counts
        );
        assert_eq!(store.recipe(c).require_counts, &[3]);
    }

    #[test]
    fn array_interner_matches_by_content() {
        let mut arrays = ArrayInterner::new();
        let a = arrays.intern(&[1u32, 2, 3]);
        let v = vec![1u32, 2, 3];
        assert_eq!(arrays.intern(&v), a);
        assert_ne!(arrays.intern(&[1u32, 2]), a);
        assert_eq!(arrays.get(a), &[1, 2, 3]);
        arrays.clear();
        assert!(arrays.is_empty());
    }

    #[test]
    fn mismatched_recipe_arrays_are_rejected() {
        let mut store = StaticDataStore::new();
        let mut patterns = NeedsPatterns::new();
        let mut bad = gear_recipe();
        bad.require_counts.push(1);
        assert!(matches!(
            store.intern_recipe(&bad, &mut patterns),
            Err(BuildError::MalformedRecipe(RecipeId(1)))
        ));
    }

    #[test]
    fn generator_profile_must_match_per_proto() {
        let mut store = StaticDataStore::new();
        let solar = GeneratorProfile {
            kind: GeneratorKind::Solar,
            capacity: 360,
            fuel_items: Vec::new(),
            fuel_energy: 0,
        };
        let a = store.intern_generator(ProtoId(7), &solar).unwrap();
        assert_eq!(store.intern_generator(ProtoId(7), &solar).unwrap(), a);

        let mut stronger = solar.clone();
        stronger.capacity = 720;
        assert!(matches!(
            store.intern_generator(ProtoId(7), &stronger),
            Err(BuildError::InconsistentProfile { proto: ProtoId(7) })
        ));
        assert!(store.intern_generator(ProtoId(8), &stronger).is_ok());
    }

    #[test]
    fn item_ids_beyond_fourteen_bits_are_rejected() {
        let mut store = StaticDataStore::new();
        let mut patterns = NeedsPatterns::new();
        let mut bad = gear_recipe();
        bad.products = vec![ItemId(1 << 14)];
        assert!(matches!(
            store.intern_recipe(&bad, &mut patterns),
            Err(BuildError::ItemOutOfRange(ItemId(16384)))
        ));
    }
}
