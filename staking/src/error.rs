use helix_types::{StageError, ValidatorAddress};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StakingError {
    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("validator {0} not found")]
    UnknownValidator(ValidatorAddress),

    #[error("validator {0} already registered")]
    AlreadyRegistered(ValidatorAddress),

    #[error("stake {stake} below minimum {min}")]
    BelowMinStake { stake: u128, min: u128 },

    #[error("validator {0} has frozen stake")]
    Frozen(ValidatorAddress),

    #[error("no eligible validators in the active pool")]
    NoEligibleValidators,

    #[error("stake amount must be non-zero")]
    ZeroAmount,
}
