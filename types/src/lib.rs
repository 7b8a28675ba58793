//! Fundamental types for the Helix consensus core.
//!
//! This crate defines the types shared across every other crate in the
//! workspace: hashes, validator addresses, timestamps, pipeline stages,
//! consensus parameters, and the proof / sub-block / block data model.

pub mod address;
pub mod block;
pub mod hash;
pub mod params;
pub mod proof;
pub mod stage;
pub mod time;

pub use address::ValidatorAddress;
pub use block::{Block, SubBlock, Transaction, SUB_BLOCKS_PER_BLOCK};
pub use hash::{BlockHash, ProofHash, TxHash};
pub use params::ConsensusParams;
pub use proof::Proof;
pub use stage::{PipelineStage, Stage, StageError};
pub use time::Timestamp;
