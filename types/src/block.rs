//! Transactions, sub-blocks, and finalized blocks.

use serde::{Deserialize, Serialize};

use crate::{BlockHash, Proof, Timestamp, TxHash, ValidatorAddress};

/// Number of certified sub-blocks sealed into one finalized block.
///
/// This ratio is a hard invariant: the finalizer refuses any other count and
/// block validation rejects blocks that do not hold exactly this many.
pub const SUB_BLOCKS_PER_BLOCK: usize = 1000;

/// A transaction waiting in (or taken from) the mempool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: TxHash,
    pub payload: Vec<u8>,
    pub submitted_at: Timestamp,
}

/// An ordered batch of transactions certified by one validator against a
/// sequencer proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubBlock {
    /// Position within the enclosing block, `0..SUB_BLOCKS_PER_BLOCK`.
    pub index: u32,
    pub proof: Proof,
    pub validator: ValidatorAddress,
    pub transactions: Vec<Transaction>,
    pub hash: BlockHash,
}

/// A block sealed by proof-of-work over exactly [`SUB_BLOCKS_PER_BLOCK`]
/// sub-blocks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub previous: BlockHash,
    /// Header hash (everything except the nonce).
    pub hash: BlockHash,
    /// Work threshold the nonce had to meet when the block was mined.
    pub difficulty: u64,
    pub nonce: u64,
    pub timestamp: Timestamp,
    pub sub_blocks: Vec<SubBlock>,
}

impl Block {
    pub fn sub_block_count(&self) -> usize {
        self.sub_blocks.len()
    }

    /// Whether the block holds the mandated number of sub-blocks.
    pub fn has_full_batch(&self) -> bool {
        self.sub_blocks.len() == SUB_BLOCKS_PER_BLOCK
    }

    pub fn transaction_count(&self) -> usize {
        self.sub_blocks.iter().map(|s| s.transactions.len()).sum()
    }
}
