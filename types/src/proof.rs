//! Proof-of-history record produced by the sequencer.

use serde::{Deserialize, Serialize};

use crate::{ProofHash, Timestamp};

/// A single link in the sequencer's hash chain.
///
/// `hash` commits to `previous`, `sequence`, `timestamp` and `data_hash`, so
/// any node holding the proof can recompute it without the sequencer's state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub hash: ProofHash,
    /// Position in the sequence; strictly increasing, starting at 1.
    pub sequence: u64,
    pub timestamp: Timestamp,
    /// Hash of the preceding proof (`ProofHash::ZERO` for the first one).
    pub previous: ProofHash,
    /// Digest of the event data this proof orders.
    pub data_hash: [u8; 32],
}
