//! The finalized chain.

use helix_types::{Block, BlockHash};

use crate::ConsensusError;

/// Finalized blocks in height order. Heights start at 1.
#[derive(Debug, Default)]
pub struct Chain {
    blocks: Vec<Block>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash the next block must link to.
    pub fn tip_hash(&self) -> BlockHash {
        self.blocks.last().map(|b| b.hash).unwrap_or(BlockHash::ZERO)
    }

    /// Height the next block will take.
    pub fn next_height(&self) -> u64 {
        self.blocks.len() as u64 + 1
    }

    pub(crate) fn push(&mut self, block: Block) {
        self.blocks.push(block);
    }

    pub fn latest(&self) -> Option<&Block> {
        self.blocks.last()
    }

    pub fn get(&self, height: u64) -> Option<&Block> {
        let index = height.checked_sub(1)?;
        self.blocks.get(index as usize)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Swap in a corrected copy of the block at `height`.
    ///
    /// The replacement must keep the same height and the same link to its
    /// predecessor. Its own validity is checked by the caller.
    pub fn replace(&mut self, height: u64, block: Block) -> Result<Block, ConsensusError> {
        let index = height
            .checked_sub(1)
            .filter(|i| (*i as usize) < self.blocks.len())
            .ok_or(ConsensusError::UnknownHeight(height))? as usize;

        if block.height != height {
            return Err(ConsensusError::InvalidReplacement {
                height,
                reason: format!("block claims height {}", block.height),
            });
        }
        if block.previous != self.blocks[index].previous {
            return Err(ConsensusError::InvalidReplacement {
                height,
                reason: "previous hash differs".into(),
            });
        }

        tracing::info!(height, hash = %block.hash, "block replaced");
        Ok(std::mem::replace(&mut self.blocks[index], block))
    }

    /// Check height sequence and hash links. Work is checked elsewhere.
    pub fn links_are_consistent(&self) -> bool {
        let mut previous = BlockHash::ZERO;
        for (i, block) in self.blocks.iter().enumerate() {
            if block.height != i as u64 + 1 || block.previous != previous {
                return false;
            }
            previous = block.hash;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helix_types::Timestamp;

    fn block(height: u64, previous: BlockHash, tag: u8) -> Block {
        Block {
            height,
            previous,
            hash: BlockHash::new([tag; 32]),
            difficulty: 0,
            nonce: 0,
            timestamp: Timestamp::new(height),
            sub_blocks: Vec::new(),
        }
    }

    fn chain_of(n: u8) -> Chain {
        let mut chain = Chain::new();
        for i in 1..=n {
            let previous = chain.tip_hash();
            chain.push(block(i as u64, previous, i));
        }
        chain
    }

    #[test]
    fn heights_and_links() {
        let chain = chain_of(3);
        assert_eq!(chain.next_height(), 4);
        assert_eq!(chain.get(2).unwrap().previous, BlockHash::new([1; 32]));
        assert!(chain.get(0).is_none());
        assert!(chain.links_are_consistent());
    }

    #[test]
    fn broken_link_detected() {
        let mut chain = chain_of(2);
        chain.push(block(3, BlockHash::new([9; 32]), 3));
        assert!(!chain.links_are_consistent());
    }

    #[test]
    fn replace_keeps_position() {
        let mut chain = chain_of(3);
        let old = chain
            .replace(2, block(2, BlockHash::new([1; 32]), 0x22))
            .unwrap();
        assert_eq!(old.hash, BlockHash::new([2; 32]));
        assert_eq!(chain.get(2).unwrap().hash, BlockHash::new([0x22; 32]));
    }

    #[test]
    fn replace_rejects_mismatch() {
        let mut chain = chain_of(2);
        assert!(matches!(
            chain.replace(5, block(5, BlockHash::ZERO, 5)),
            Err(ConsensusError::UnknownHeight(5))
        ));
        assert!(matches!(
            chain.replace(2, block(3, BlockHash::new([1; 32]), 7)),
            Err(ConsensusError::InvalidReplacement { .. })
        ));
        assert!(matches!(
            chain.replace(2, block(2, BlockHash::ZERO, 7)),
            Err(ConsensusError::InvalidReplacement { .. })
        ));
    }
}
