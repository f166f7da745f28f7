//! Property-based tests for the cargo encoding and for item conservation
//! across whole ticks.

use millwright_core::cargo::{Cargo, CargoPathBuffer};
use millwright_core::config::SimConfig;
use millwright_core::engine::Engine;
use millwright_core::id::ItemId;
use millwright_core::test_utils::*;
use proptest::prelude::*;

// ===========================================================================
// Generators
// ===========================================================================

fn arb_cargo() -> impl Strategy<Value = Cargo> {
    (1..=ItemId::MAX.0, 1..=Cargo::MAX_STACK, 0..=Cargo::MAX_INC)
        .prop_map(|(item, stack, inc)| Cargo::new(ItemId(item), stack, inc))
}

/// A capacity and a head index that fits it.
fn arb_slot() -> impl Strategy<Value = (u32, usize)> {
    (1..=20u32).prop_flat_map(|capacity| {
        let last_head = capacity as usize * 10 - 6;
        (Just(capacity), 4..=last_head)
    })
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// A record reads back unchanged from any of its ten bytes.
    #[test]
    fn record_resolves_from_every_byte(cargo in arb_cargo(), (capacity, head) in arb_slot()) {
        let mut path = CargoPathBuffer::new(capacity, 1, false);
        prop_assert!(path.try_insert_at(head, cargo));
        for i in head - 4..=head + 5 {
            let loc = path.get_cargo_at_index(i).unwrap();
            prop_assert_eq!(loc.cargo, cargo);
            prop_assert_eq!(loc.head(), head);
        }
        let reloaded = CargoPathBuffer::from_bytes(path.as_bytes().to_vec(), 1, false).unwrap();
        prop_assert_eq!(reloaded, path);
    }

    /// Advancing never creates, destroys or overlaps records.
    #[test]
    fn advance_conserves_records(
        cargos in proptest::collection::vec(arb_cargo(), 1..12),
        speed in 1..=6u8,
        gaps in proptest::collection::vec(0..4usize, 12),
    ) {
        let mut path = CargoPathBuffer::new(16, speed, false);
        let mut inserted = 0u32;
        for (cargo, &gap) in cargos.iter().zip(&gaps) {
            if path.insert_at_head(*cargo) {
                inserted += cargo.stack as u32;
            }
            for _ in 0..=gap {
                path.advance();
            }
            prop_assert!(path.validate().is_ok());
        }
        for _ in 0..200 {
            path.advance();
        }
        prop_assert_eq!(path.item_count(), inserted);
        prop_assert!(path.validate().is_ok());
    }

    /// Items in a closed world of chests and inserters are only moved.
    #[test]
    fn chest_pairs_conserve_items(pairs in 1..10usize, ticks in 0..60u64, workers in 1..4usize) {
        let config = SimConfig {
            worker_count: workers,
            min_region_size: 1,
            ..SimConfig::default()
        };
        let mut engine = Engine::new(chest_pairs_world(pairs), config).unwrap();
        engine.initialize().unwrap();
        for _ in 0..ticks {
            engine.step().unwrap();
        }
        let world = engine.into_world().unwrap();
        prop_assert_eq!(world_item_count(&world), 20 * pairs as u64);
    }

    /// Cargo on a split belt line survives every region boundary.
    #[test]
    fn belt_lines_conserve_items(len in 2..12usize, max_region in 1..5usize, ticks in 0..100u64) {
        let config = SimConfig {
            worker_count: 2,
            max_region_size: max_region,
            min_region_size: 1,
            ..SimConfig::default()
        };
        let mut engine = Engine::new(belt_line_world(len), config).unwrap();
        engine.initialize().unwrap();
        for _ in 0..ticks {
            engine.step().unwrap();
        }
        let world = engine.into_world().unwrap();
        prop_assert_eq!(world_item_count(&world), 4);
    }
}
