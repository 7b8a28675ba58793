//! Pipeline stages and the contract every stage implements.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The three stages of the consensus pipeline, in processing order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Proof-of-history ordering.
    Sequencer,
    /// Proof-of-stake certification.
    ValidatorPool,
    /// Proof-of-work sealing.
    Finalizer,
}

impl Stage {
    /// All stages in pipeline order. Emergency resume walks this order.
    pub const ALL: [Stage; 3] = [Stage::Sequencer, Stage::ValidatorPool, Stage::Finalizer];

    /// Short consensus-family tag (used for punishment categories).
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Sequencer => "PoH",
            Self::ValidatorPool => "PoS",
            Self::Finalizer => "PoW",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sequencer => "sequencer",
            Self::ValidatorPool => "validator_pool",
            Self::Finalizer => "finalizer",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    #[error("{0} is halted")]
    Halted(Stage),

    #[error("{0} is already halted")]
    AlreadyHalted(Stage),

    #[error("{0} is not halted")]
    NotHalted(Stage),
}

/// Control surface shared by the sequencer, validator pool and finalizer.
///
/// The emergency controller and the elasticity monitor only talk to stages
/// through this trait.
pub trait PipelineStage {
    fn stage(&self) -> Stage;

    /// Stop accepting work. Fails if the stage is already halted.
    fn halt(&mut self) -> Result<(), StageError>;

    /// Accept work again. Fails if the stage is not halted.
    fn resume(&mut self) -> Result<(), StageError>;

    fn is_halted(&self) -> bool;

    /// Current utilisation in `[0, ∞)`; `1.0` means at nominal capacity.
    fn load(&self) -> f64;
}
