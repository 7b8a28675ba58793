//! Consensus orchestration for the hybrid PoH → PoS → PoW pipeline.
//!
//! ## Module overview
//!
//! - [`orchestrator`] — [`ConsensusEngine`]: owns the three stages and runs
//!   the sub-block / block cycle.
//! - [`chain`] — finalized blocks in height order.
//! - [`lifecycle`] — validator scoring, rewards, penalties, rotation.
//! - [`parameters`] — minimum-stake and difficulty registries with
//!   priority arbitration and stage reconciliation.
//! - [`fork`] — fork detection and recovery state machine.
//! - [`emergency`] — network-wide halt and resume.
//! - [`punishment`] — punishment records with expiry.
//! - [`error`] — consensus error types.

pub mod chain;
pub mod emergency;
pub mod error;
pub mod fork;
pub mod lifecycle;
pub mod orchestrator;
pub mod parameters;
pub mod punishment;

pub use chain::Chain;
pub use emergency::{EmergencyAction, EmergencyController, EmergencyState, TransitionReport};
pub use error::ConsensusError;
pub use fork::{ChainView, ForkCheck, ForkResolver, ForkState};
pub use lifecycle::{score, LifecycleManager, LifecycleReport, Rotation};
pub use orchestrator::{sub_block_hash, ConsensusEngine, StageReading};
pub use parameters::{
    arbitrate, ChangeRequest, Decision, DifficultyRegistry, LoggedRequest, ParameterKind,
    ParameterRegistry, ParameterValue, ReconcileOutcome, RejectReason, StakeRegistry,
};
pub use punishment::{PunishmentRecord, PunishmentTracker};
