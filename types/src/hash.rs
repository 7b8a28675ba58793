//! 32-byte hash types for proofs, transactions, and blocks.
//!
//! All three share the same representation; they are kept as distinct types
//! so a proof hash can never be passed where a block hash is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! hash_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name([u8; 32]);

        impl Default for $name {
            fn default() -> Self {
                Self::ZERO
            }
        }

        impl $name {
            pub const ZERO: Self = Self([0u8; 32]);

            pub fn new(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; 32]
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({}\u{2026})", stringify!($name), hex::encode(&self.0[..4]))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(&self.0))
            }
        }
    };
}

hash_type!(
    /// Hash of a PoH proof — links each proof to its predecessor.
    ProofHash
);

hash_type!(
    /// Hash of a submitted transaction.
    TxHash
);

hash_type!(
    /// Header hash of a sub-block or a finalized block.
    BlockHash
);

// Inline hex encoding to avoid adding the `hex` crate as a dependency of types.
mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_shows_prefix_only() {
        let hash = BlockHash::new([0xAB; 32]);
        assert_eq!(format!("{hash:?}"), "BlockHash(abababab\u{2026})");
    }

    #[test]
    fn display_is_full_hex() {
        let hash = ProofHash::new([0x01; 32]);
        assert_eq!(hash.to_string().len(), 64);
        assert!(hash.to_string().starts_with("0101"));
    }

    #[test]
    fn zero_detection() {
        assert!(TxHash::ZERO.is_zero());
        assert!(TxHash::default().is_zero());
        assert!(!TxHash::new([1; 32]).is_zero());
    }
}
