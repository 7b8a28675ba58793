use thiserror::Error;

use helix_ledger::LedgerError;
use helix_sequencer::SequencerError;
use helix_staking::StakingError;
use helix_types::{StageError, ValidatorAddress};
use helix_work::WorkError;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("sequencer: {0}")]
    Sequencer(#[from] SequencerError),

    #[error("validator pool: {0}")]
    Staking(#[from] StakingError),

    #[error("finalizer: {0}")]
    Work(#[from] WorkError),

    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("validator {0} could not certify the sub-block")]
    CertificationFailed(ValidatorAddress),

    #[error("validator {0} is not active")]
    NotActive(ValidatorAddress),

    #[error("no block at height {0}")]
    UnknownHeight(u64),

    #[error("replacement block does not fit at height {height}: {reason}")]
    InvalidReplacement { height: u64, reason: String },
}
