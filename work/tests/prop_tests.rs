use proptest::prelude::*;

use helix_types::BlockHash;
use helix_work::{validate_work, DifficultyBounds, WorkGenerator};

proptest! {
    /// A generated nonce always passes its own validation.
    #[test]
    fn generated_nonce_always_valid(
        hash_byte in 0u8..=255,
        difficulty in 0u64..0xf000_0000_0000_0000,
    ) {
        let header = BlockHash::new([hash_byte; 32]);
        let nonce = WorkGenerator.generate(&header, difficulty).unwrap();
        prop_assert!(validate_work(&header, nonce.0, difficulty));
    }

    /// Zero difficulty always passes regardless of nonce.
    #[test]
    fn zero_difficulty_always_passes(
        hash_bytes in prop::array::uniform32(0u8..),
        nonce in any::<u64>(),
    ) {
        prop_assert!(validate_work(&BlockHash::new(hash_bytes), nonce, 0));
    }

    /// If a nonce is valid at D it is valid at every lower difficulty.
    #[test]
    fn lower_difficulty_is_easier(
        hash_bytes in prop::array::uniform32(0u8..),
        nonce in any::<u64>(),
        difficulty in 1u64..u64::MAX,
    ) {
        let header = BlockHash::new(hash_bytes);
        if validate_work(&header, nonce, difficulty) {
            prop_assert!(validate_work(&header, nonce, difficulty - 1));
        }
    }

    /// Clamping always lands inside the bounds and stepping never escapes them.
    #[test]
    fn difficulty_stays_in_bounds(
        min in any::<u64>(),
        span in any::<u64>(),
        step in any::<u64>(),
        value in any::<u64>(),
    ) {
        let bounds = DifficultyBounds { min, max: min.saturating_add(span), step };
        prop_assert!(bounds.contains(bounds.clamp(value)));
        prop_assert!(bounds.contains(bounds.step_up(value)));
        prop_assert!(bounds.contains(bounds.step_down(value)));
    }
}
