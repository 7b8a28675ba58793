//! The PoW finalizer stage.

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use helix_crypto::blake2b_256_multi;
use helix_types::{
    Block, BlockHash, ConsensusParams, PipelineStage, Stage, StageError, SubBlock, Timestamp,
    SUB_BLOCKS_PER_BLOCK,
};

use crate::{validate_work, DifficultyBounds, WorkError, WorkGenerator};

/// Header hash committing to everything in a block except its nonce.
pub fn block_header_hash(
    previous: &BlockHash,
    height: u64,
    difficulty: u64,
    timestamp: Timestamp,
    sub_blocks: &[SubBlock],
) -> BlockHash {
    let height = height.to_le_bytes();
    let difficulty = difficulty.to_le_bytes();
    let timestamp = timestamp.as_secs().to_le_bytes();

    let mut parts: Vec<&[u8]> = Vec::with_capacity(4 + sub_blocks.len());
    parts.push(previous.as_bytes());
    parts.push(&height);
    parts.push(&difficulty);
    parts.push(&timestamp);
    parts.extend(sub_blocks.iter().map(|s| s.hash.as_bytes().as_slice()));

    BlockHash::new(blake2b_256_multi(&parts))
}

/// How many invalid-block marks are kept; the oldest are forgotten first.
const INVALID_MARKS_CAPACITY: usize = 4_096;

pub struct Finalizer {
    generator: WorkGenerator,
    difficulty: u64,
    bounds: DifficultyBounds,
    invalid: HashSet<BlockHash>,
    invalid_order: VecDeque<BlockHash>,
    last_mine_duration: Option<Duration>,
    blocks_mined: u64,
    target_block_time: Duration,
    halted: bool,
}

impl Finalizer {
    pub fn new(params: &ConsensusParams) -> Self {
        let bounds = DifficultyBounds::from_params(params);
        Self {
            generator: WorkGenerator,
            difficulty: bounds.clamp(params.initial_difficulty),
            bounds,
            invalid: HashSet::new(),
            invalid_order: VecDeque::new(),
            last_mine_duration: None,
            blocks_mined: 0,
            target_block_time: Duration::from_millis(params.target_block_time_ms.max(1)),
            halted: false,
        }
    }

    /// Seal a full batch of sub-blocks into a block.
    pub fn mine(
        &mut self,
        previous: BlockHash,
        height: u64,
        sub_blocks: Vec<SubBlock>,
        now: Timestamp,
    ) -> Result<Block, WorkError> {
        if self.halted {
            return Err(StageError::Halted(Stage::Finalizer).into());
        }
        if sub_blocks.len() != SUB_BLOCKS_PER_BLOCK {
            return Err(WorkError::SubBlockCount(sub_blocks.len()));
        }

        let difficulty = self.difficulty;
        let hash = block_header_hash(&previous, height, difficulty, now, &sub_blocks);

        let started = Instant::now();
        let nonce = self.generator.generate(&hash, difficulty)?;
        let elapsed = started.elapsed();

        self.last_mine_duration = Some(elapsed);
        self.blocks_mined += 1;

        tracing::info!(
            height,
            %hash,
            nonce = nonce.0,
            difficulty = format_args!("{difficulty:#018x}"),
            elapsed_ms = elapsed.as_millis() as u64,
            "block mined"
        );

        Ok(Block {
            height,
            previous,
            hash,
            difficulty,
            nonce: nonce.0,
            timestamp: now,
            sub_blocks,
        })
    }

    /// Full structural and work check of a block.
    pub fn validate_block(&self, block: &Block) -> bool {
        if self.invalid.contains(&block.hash) {
            return false;
        }
        if !block.has_full_batch() {
            return false;
        }
        let expected = block_header_hash(
            &block.previous,
            block.height,
            block.difficulty,
            block.timestamp,
            &block.sub_blocks,
        );
        if expected != block.hash {
            return false;
        }
        validate_work(&block.hash, block.nonce, block.difficulty)
    }

    /// Mark a block invalid. Returns `false` if it was already marked.
    pub fn mark_invalid(&mut self, hash: BlockHash) -> bool {
        let newly = self.invalid.insert(hash);
        if newly {
            tracing::warn!(%hash, "block marked invalid");
            self.invalid_order.push_back(hash);
            if self.invalid_order.len() > INVALID_MARKS_CAPACITY {
                if let Some(old) = self.invalid_order.pop_front() {
                    self.invalid.remove(&old);
                }
            }
        }
        newly
    }

    pub fn is_marked_invalid(&self, hash: &BlockHash) -> bool {
        self.invalid.contains(hash)
    }

    /// Local difficulty used for the next block.
    pub fn difficulty(&self) -> u64 {
        self.difficulty
    }

    /// Set the local difficulty, clamped to the configured bounds.
    /// Returns the value actually applied.
    pub fn set_difficulty(&mut self, difficulty: u64) -> u64 {
        let clamped = self.bounds.clamp(difficulty);
        if clamped != difficulty {
            tracing::debug!(requested = difficulty, applied = clamped, "difficulty clamped");
        }
        self.difficulty = clamped;
        clamped
    }

    pub fn bounds(&self) -> DifficultyBounds {
        self.bounds
    }

    pub fn last_mine_duration(&self) -> Option<Duration> {
        self.last_mine_duration
    }

    pub fn blocks_mined(&self) -> u64 {
        self.blocks_mined
    }

    /// Hashes per second implied by the last mining run at the current
    /// difficulty. `0.0` before the first block.
    pub fn estimated_hashrate(&self) -> f64 {
        match self.last_mine_duration {
            Some(d) if !d.is_zero() => {
                DifficultyBounds::expected_attempts(self.difficulty) / d.as_secs_f64()
            }
            _ => 0.0,
        }
    }
}

impl PipelineStage for Finalizer {
    fn stage(&self) -> Stage {
        Stage::Finalizer
    }

    fn halt(&mut self) -> Result<(), StageError> {
        if self.halted {
            return Err(StageError::AlreadyHalted(Stage::Finalizer));
        }
        self.halted = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), StageError> {
        if !self.halted {
            return Err(StageError::NotHalted(Stage::Finalizer));
        }
        self.halted = false;
        Ok(())
    }

    fn is_halted(&self) -> bool {
        self.halted
    }

    /// Last mining time relative to the target block time.
    fn load(&self) -> f64 {
        self.last_mine_duration
            .map(|d| d.as_secs_f64() / self.target_block_time.as_secs_f64())
            .unwrap_or(0.0)
    }
}
