//! Load-driven corrective scaling.
//!
//! Each tick reads every live stage's load. A stage above the threshold gets
//! one bounded adjustment:
//!
//! - Sequencer: one more sequencing lane.
//! - Validator pool: the first standby validator is promoted, its stake
//!   raised to the registry minimum if needed.
//! - Finalizer: difficulty is stepped up through the difficulty registry and
//!   pushed to the finalizer.

use helix_consensus::{ChangeRequest, ConsensusEngine, Decision, DifficultyRegistry, ParameterKind};
use helix_ledger::{status, AuditTrail, Ledger};
use helix_types::{ConsensusParams, Stage, ValidatorAddress};

#[derive(Clone, Debug, PartialEq)]
pub enum ElasticAction {
    LaneAdded { workers: usize },
    ValidatorPromoted { address: ValidatorAddress, stake_added: u128 },
    DifficultyStepped { from: u64, to: u64 },
    /// Overloaded, but nothing is left to adjust.
    Exhausted,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Adjustment {
    pub stage: Stage,
    pub load: f64,
    pub action: ElasticAction,
}

pub struct ElasticityMonitor {
    trail: AuditTrail,
    threshold: f64,
    step: u64,
    priority: u8,
}

impl ElasticityMonitor {
    pub fn new(params: &ConsensusParams, trail: AuditTrail) -> Self {
        Self {
            trail,
            threshold: params.elasticity_threshold,
            step: params.difficulty_step,
            priority: params.elasticity_priority,
        }
    }

    /// Adjust every live stage whose load exceeds the threshold.
    pub fn check(
        &self,
        engine: &mut ConsensusEngine,
        min_stake: u128,
        difficulty: &mut DifficultyRegistry,
        ledger: &mut Ledger,
    ) -> Vec<Adjustment> {
        let overloaded: Vec<(Stage, f64)> = engine
            .stage_loads()
            .into_iter()
            .filter(|(stage, load)| *load > self.threshold && !engine.stage(*stage).is_halted())
            .collect();

        overloaded
            .into_iter()
            .map(|(stage, load)| {
                let action = self.relieve(stage, engine, min_stake, difficulty);
                let entry_status = if action == ElasticAction::Exhausted {
                    status::UNRESOLVED
                } else {
                    status::COMPLETED
                };
                tracing::info!(%stage, load, ?action, "elasticity adjustment");
                self.trail.log(
                    ledger,
                    "ElasticityAdjustment",
                    entry_status,
                    Some(format!("{stage} load={load:.3} {action:?}")),
                );
                Adjustment { stage, load, action }
            })
            .collect()
    }

    /// Apply the corrective action for one stage.
    pub fn relieve(
        &self,
        stage: Stage,
        engine: &mut ConsensusEngine,
        min_stake: u128,
        difficulty: &mut DifficultyRegistry,
    ) -> ElasticAction {
        match stage {
            Stage::Sequencer => {
                let sequencer = engine.sequencer_mut();
                if sequencer.add_worker() {
                    ElasticAction::LaneAdded {
                        workers: sequencer.workers(),
                    }
                } else {
                    ElasticAction::Exhausted
                }
            }
            Stage::ValidatorPool => {
                let pool = engine.pool_mut();
                let Some(address) = pool.first_standby().map(|v| v.address.clone()) else {
                    return ElasticAction::Exhausted;
                };
                let floor = min_stake.max(pool.min_stake());
                let promoted = pool
                    .raise_stake_to(&address, floor)
                    .and_then(|added| pool.activate(&address).map(|()| added));
                match promoted {
                    Ok(stake_added) => ElasticAction::ValidatorPromoted { address, stake_added },
                    Err(e) => {
                        tracing::warn!(%address, error = %e, "standby promotion failed");
                        ElasticAction::Exhausted
                    }
                }
            }
            Stage::Finalizer => {
                let from = difficulty.value();
                let ceiling = engine.finalizer().bounds().max;
                let target = from.saturating_add(self.step).min(ceiling);
                let request = ChangeRequest::new("elasticity", target, self.priority);
                match difficulty.apply_change(request) {
                    Decision::Applied { from, to } => {
                        engine.apply_parameter(ParameterKind::Difficulty, to as u128);
                        ElasticAction::DifficultyStepped { from, to }
                    }
                    Decision::Unchanged | Decision::Rejected(_) => ElasticAction::Exhausted,
                }
            }
        }
    }
}
