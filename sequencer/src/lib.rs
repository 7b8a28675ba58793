//! Proof-of-history sequencer.
//!
//! Produces an ordered hash chain of timestamped proofs. Each proof commits
//! to its predecessor, so the relative order of events is fixed before any
//! validator sees them. Proofs found to be invalid are marked and stop
//! dependent processing.

pub mod error;
pub mod sequencer;

pub use error::SequencerError;
pub use sequencer::{proof_hash, Sequencer};
