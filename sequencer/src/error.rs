use helix_types::StageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SequencerError {
    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("proof timestamp generation is halted")]
    TimestampsHalted,
}
