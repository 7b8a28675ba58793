//! Proof-of-work finalization.
//!
//! The finalizer is the last pipeline stage: once a full batch of certified
//! sub-blocks is pending, it hashes the block header and searches for a nonce
//! whose work value meets the current difficulty. The nonce search is spread
//! over every CPU core.

pub mod difficulty;
pub mod error;
pub mod finalizer;
pub mod generator;
pub mod validator;

pub use difficulty::DifficultyBounds;
pub use error::WorkError;
pub use finalizer::{block_header_hash, Finalizer};
pub use generator::WorkGenerator;
pub use validator::validate_work;

/// The result of PoW generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkNonce(pub u64);
