//! Cryptographic primitives for the Helix consensus core.
//!
//! - **Blake2b-256** for proof chains, sub-block/block headers and work values
//! - **ChaCha20-Poly1305** for per-component encryption of ledger entries

pub mod encryption;
pub mod error;
pub mod hash;

pub use encryption::{EntryCipher, SealedPayload};
pub use error::CryptoError;
pub use hash::{blake2b_256, blake2b_256_multi, work_value};
