//! Validator lifecycle: scoring, rewards, penalties, rotation.
//!
//! Run periodically. Each active validator is scored on uptime, validation
//! success and stake. High scorers earn a token reward, low scorers are
//! slashed, and validators that fall below the minimum score (or are
//! overloaded) are rotated out for the first standby validator.

use helix_ledger::{status, AuditTrail, Ledger};
use helix_staking::Validator;
use helix_types::{ConsensusParams, Stage, Timestamp, ValidatorAddress};

use crate::{ConsensusEngine, ConsensusError, PunishmentTracker};

const UPTIME_WEIGHT: f64 = 0.5;
const SUCCESS_WEIGHT: f64 = 0.3;
const STAKE_WEIGHT: f64 = 0.2;

/// Performance score of one validator.
///
/// `0.5 × uptime + 0.3 × success ratio + 0.2 × stake / min_stake`. The
/// success ratio is `1.0` before the first validation; the stake term is `0`
/// when `min_stake` is zero.
pub fn score(validator: &Validator, min_stake: u128) -> f64 {
    let stake_ratio = if min_stake == 0 {
        0.0
    } else {
        validator.stake as f64 / min_stake as f64
    };
    UPTIME_WEIGHT * validator.uptime
        + SUCCESS_WEIGHT * validator.success_ratio()
        + STAKE_WEIGHT * stake_ratio
}

#[derive(Clone, Debug, PartialEq)]
pub struct Rotation {
    pub outgoing: ValidatorAddress,
    /// `None` when no standby validator was available.
    pub incoming: Option<ValidatorAddress>,
    /// Stake added to the incoming validator to meet the minimum.
    pub stake_topped_up: u128,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LifecycleReport {
    pub scores: Vec<(ValidatorAddress, f64)>,
    pub rewarded: Vec<ValidatorAddress>,
    pub penalized: Vec<ValidatorAddress>,
    pub rotations: Vec<Rotation>,
}

pub struct LifecycleManager {
    trail: AuditTrail,
    reward_threshold: f64,
    penalty_threshold: f64,
    min_performance: f64,
    max_load: f64,
    reward_amount: u128,
    penalty_amount: u128,
}

impl LifecycleManager {
    pub fn new(params: &ConsensusParams, trail: AuditTrail) -> Self {
        Self {
            trail,
            reward_threshold: params.reward_threshold,
            penalty_threshold: params.penalty_threshold,
            min_performance: params.min_performance,
            max_load: params.max_validator_load,
            reward_amount: params.reward_amount,
            penalty_amount: params.penalty_amount,
        }
    }

    /// Score every active validator and act on the result.
    ///
    /// `min_stake` is the registry value; it drives both the stake term and
    /// the top-up of incoming validators. Assignments are reset afterwards so
    /// the next run scores a fresh window. Validators rotated out stay out of
    /// standby promotion until the next run.
    pub fn run(
        &self,
        engine: &mut ConsensusEngine,
        min_stake: u128,
        punishments: &mut PunishmentTracker,
        ledger: &mut Ledger,
        now: Timestamp,
    ) -> LifecycleReport {
        engine.pool_mut().clear_rotated();
        let capacity = engine.pool().assignment_capacity();
        let evaluated: Vec<(ValidatorAddress, f64, f64)> = engine
            .active_validators()
            .into_iter()
            .map(|v| (v.address.clone(), score(v, min_stake), v.load(capacity)))
            .collect();

        let mut report = LifecycleReport::default();

        for (address, score, load) in evaluated {
            report.scores.push((address.clone(), score));

            if score >= self.reward_threshold {
                if engine.pool_mut().reward(&address, self.reward_amount).is_ok() {
                    self.trail.log(
                        ledger,
                        "ValidatorReward",
                        status::COMPLETED,
                        Some(format!("{address} +{} score={score:.3}", self.reward_amount)),
                    );
                    report.rewarded.push(address.clone());
                }
            } else if score < self.penalty_threshold {
                if let Ok(remaining) = engine.pool_mut().slash(&address, self.penalty_amount) {
                    punishments.record(&address, Stage::ValidatorPool, self.penalty_amount, now);
                    self.trail.log(
                        ledger,
                        "ValidatorPenalty",
                        status::COMPLETED,
                        Some(format!(
                            "{address} -{} score={score:.3} stake={remaining}",
                            self.penalty_amount
                        )),
                    );
                    report.penalized.push(address.clone());
                }
            }

            if score < self.min_performance || load > self.max_load {
                tracing::info!(%address, score, load, "rotating validator out");
                match self.rotate(engine, &address, min_stake, ledger) {
                    Ok(rotation) => report.rotations.push(rotation),
                    Err(e) => tracing::warn!(%address, error = %e, "rotation failed"),
                }
            }
        }

        engine.pool_mut().reset_assignments();

        tracing::info!(
            scored = report.scores.len(),
            rewarded = report.rewarded.len(),
            penalized = report.penalized.len(),
            rotated = report.rotations.len(),
            "lifecycle cycle complete"
        );
        report
    }

    /// Operator-initiated rotation of a specific validator.
    pub fn force_rotate(
        &self,
        engine: &mut ConsensusEngine,
        address: &ValidatorAddress,
        min_stake: u128,
        ledger: &mut Ledger,
    ) -> Result<Rotation, ConsensusError> {
        match engine.pool().get(address) {
            Some(v) if v.active => {}
            _ => return Err(ConsensusError::NotActive(address.clone())),
        }
        tracing::info!(%address, "forced rotation");
        self.rotate(engine, address, min_stake, ledger)
    }

    fn rotate(
        &self,
        engine: &mut ConsensusEngine,
        outgoing: &ValidatorAddress,
        min_stake: u128,
        ledger: &mut Ledger,
    ) -> Result<Rotation, ConsensusError> {
        let pool = engine.pool_mut();
        let incoming = pool
            .standby_validators()
            .into_iter()
            .find(|v| v.address != *outgoing)
            .map(|v| v.address.clone());
        pool.rotate_out(outgoing)?;

        let mut stake_topped_up = 0;
        if let Some(incoming) = &incoming {
            let floor = min_stake.max(pool.min_stake());
            stake_topped_up = pool.raise_stake_to(incoming, floor)?;
            pool.activate(incoming)?;
        }

        let details = match &incoming {
            Some(incoming) => format!("{outgoing} -> {incoming} (+{stake_topped_up})"),
            None => format!("{outgoing} -> none (no standby)"),
        };
        let entry_status = if incoming.is_some() {
            status::COMPLETED
        } else {
            status::UNRESOLVED
        };
        self.trail.log(ledger, "ValidatorRotation", entry_status, Some(details));

        Ok(Rotation {
            outgoing: outgoing.clone(),
            incoming,
            stake_topped_up,
        })
    }
}
