//! Proof-of-stake validator pool.
//!
//! Validators join by depositing stake and sit in standby until activated.
//! Active validators are picked stake-weighted, using the sequencer proof
//! hash as the seed, to certify each sub-block.
//!
//! - [`validator`] — per-validator record.
//! - [`pool`] — the pool stage: selection, certification, stake control.

pub mod error;
pub mod pool;
pub mod validator;

pub use error::StakingError;
pub use pool::ValidatorPool;
pub use validator::Validator;
