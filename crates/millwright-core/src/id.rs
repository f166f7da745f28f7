use serde::{Deserialize, Serialize};

/// The kind of a simulated machine. Every kind owns one dense pool per region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntityKind {
    Belt = 0,
    Storage,
    Tank,
    Assembler,
    Lab,
    Generator,
    Turret,
    Miner,
    Sprayer,
    Monitor,
    Inserter,
}

impl EntityKind {
    pub const COUNT: usize = 11;

    /// All kinds in build order. Belts come first because nearly every other
    /// kind references them; inserters come last because they reference
    /// everything else.
    pub const ALL: [EntityKind; Self::COUNT] = [
        EntityKind::Belt,
        EntityKind::Storage,
        EntityKind::Tank,
        EntityKind::Assembler,
        EntityKind::Lab,
        EntityKind::Generator,
        EntityKind::Turret,
        EntityKind::Miner,
        EntityKind::Sprayer,
        EntityKind::Monitor,
        EntityKind::Inserter,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            EntityKind::Belt => "belt",
            EntityKind::Storage => "storage",
            EntityKind::Tank => "tank",
            EntityKind::Assembler => "assembler",
            EntityKind::Lab => "lab",
            EntityKind::Generator => "generator",
            EntityKind::Turret => "turret",
            EntityKind::Miner => "miner",
            EntityKind::Sprayer => "sprayer",
            EntityKind::Monitor => "monitor",
            EntityKind::Inserter => "inserter",
        }
    }
}

/// Stable id of an entity in its host-side sparse pool. Id 0 is never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceId(pub u32);

/// A host-side reference to another entity: kind plus stable id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: SourceId,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: SourceId) -> Self {
        Self { kind, id }
    }
}

/// A reference from one optimized entity to another: the target's kind plus
/// its position in that kind's dense array. Valid for one build generation.
///
/// [`TypedIndex::NONE`] means "no target"; consumers test [`is_none`] before
/// resolving.
///
/// [`is_none`]: TypedIndex::is_none
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypedIndex {
    pub kind: EntityKind,
    pub index: u32,
}

impl TypedIndex {
    pub const NONE: TypedIndex = TypedIndex {
        kind: EntityKind::Belt,
        index: u32::MAX,
    };

    #[inline]
    pub fn new(kind: EntityKind, index: u32) -> Self {
        debug_assert!(index != u32::MAX, "dense index collides with the NONE sentinel");
        Self { kind, index }
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self.index == u32::MAX
    }

    #[inline]
    pub fn is_some(self) -> bool {
        !self.is_none()
    }

    /// The dense index when this refers to a `kind` entity.
    #[inline]
    pub fn of_kind(self, kind: EntityKind) -> Option<usize> {
        if self.is_none() || self.kind != kind {
            None
        } else {
            Some(self.index as usize)
        }
    }
}

impl Default for TypedIndex {
    fn default() -> Self {
        Self::NONE
    }
}

/// Identifies an item type. Item 0 means "no item" (and "any" in filters).
/// Ids are limited to 14 bits by the conveyor encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemId(pub u16);

impl ItemId {
    pub const NONE: ItemId = ItemId(0);
    pub const MAX: ItemId = ItemId((1 << 14) - 1);

    #[inline]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// Identifies a balanced connectivity region within one build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionId(pub u32);

/// Identifies a power network in the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PowerNetworkId(pub u32);

/// Identifies a host recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecipeId(pub u32);

/// Identifies a machine prototype (the host's per-model sub id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProtoId(pub u32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_index_none_short_circuits() {
        let none = TypedIndex::NONE;
        assert!(none.is_none());
        assert_eq!(none.of_kind(EntityKind::Belt), None);
        assert_eq!(TypedIndex::default(), TypedIndex::NONE);
    }

    #[test]
    fn typed_index_of_kind_checks_kind() {
        let t = TypedIndex::new(EntityKind::Assembler, 3);
        assert_eq!(t.of_kind(EntityKind::Assembler), Some(3));
        assert_eq!(t.of_kind(EntityKind::Lab), None);
    }

    #[test]
    fn kinds_are_listed_in_index_order() {
        for (i, kind) in EntityKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn item_id_bounds() {
        assert!(ItemId::NONE.is_none());
        assert_eq!(ItemId::MAX.0, 16383);
    }
}
