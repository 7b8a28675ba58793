use helix_types::{StageError, SUB_BLOCKS_PER_BLOCK};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkError {
    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("block needs exactly {SUB_BLOCKS_PER_BLOCK} sub-blocks, got {0}")]
    SubBlockCount(usize),

    #[error("work difficulty {actual} below minimum {minimum}")]
    InsufficientDifficulty { actual: u64, minimum: u64 },

    #[error("nonce space exhausted at difficulty {0:#018x}")]
    Exhausted(u64),
}
