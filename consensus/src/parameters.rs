//! Parameter synchronizers.
//!
//! A [`ParameterRegistry`] holds the network-wide value of one parameter
//! (minimum stake or mining difficulty) and arbitrates change requests from
//! the supervisory components:
//!
//! - an override request, or one at or above the override priority, is
//!   applied as-is and may lower the value;
//! - any other request may only raise it.
//!
//! Rejections are decisions, not errors: every request is logged with its
//! outcome. [`ParameterRegistry::reconcile`] then brings the stages' local
//! copies back in line with the registry.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use helix_types::{Stage, Timestamp};

use crate::ConsensusEngine;

/// Requests kept in the registry's log.
const MAX_LOGGED_REQUESTS: usize = 1024;

/// Which synchronized parameter a registry manages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterKind {
    MinStake,
    Difficulty,
}

impl ParameterKind {
    /// Ledger entry type for changes to this parameter.
    pub fn entry_type(&self) -> &'static str {
        match self {
            Self::MinStake => "MinStakeChange",
            Self::Difficulty => "DifficultyChange",
        }
    }
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MinStake => f.write_str("min_stake"),
            Self::Difficulty => f.write_str("difficulty"),
        }
    }
}

/// A value a registry can hold. Stage readings travel as `u128`.
pub trait ParameterValue: Copy + Ord + fmt::Debug + fmt::Display + Send + Sync + 'static {
    fn from_reading(raw: u128) -> Self;
    fn to_reading(self) -> u128;
}

impl ParameterValue for u128 {
    fn from_reading(raw: u128) -> Self {
        raw
    }

    fn to_reading(self) -> u128 {
        self
    }
}

impl ParameterValue for u64 {
    fn from_reading(raw: u128) -> Self {
        u64::try_from(raw).unwrap_or(u64::MAX)
    }

    fn to_reading(self) -> u128 {
        self as u128
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeRequest<V> {
    pub requested_by: String,
    pub new_value: V,
    /// Apply regardless of direction.
    pub is_override: bool,
    pub priority: u8,
}

impl<V> ChangeRequest<V> {
    pub fn new(requested_by: impl Into<String>, new_value: V, priority: u8) -> Self {
        Self {
            requested_by: requested_by.into(),
            new_value,
            is_override: false,
            priority,
        }
    }

    pub fn with_override(mut self) -> Self {
        self.is_override = true;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// A non-override request below the override priority tried to lower
    /// the value.
    WouldLower,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision<V> {
    Applied { from: V, to: V },
    /// The request asked for the value already in place.
    Unchanged,
    Rejected(RejectReason),
}

impl<V> Decision<V> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Applied { .. } => helix_ledger::status::APPLIED,
            Self::Unchanged => helix_ledger::status::COMPLETED,
            Self::Rejected(_) => helix_ledger::status::REJECTED,
        }
    }
}

/// Decide a change request against the current value.
pub fn arbitrate<V: ParameterValue>(
    current: V,
    request: &ChangeRequest<V>,
    override_priority: u8,
) -> Decision<V> {
    let forced = request.is_override || request.priority >= override_priority;
    if request.new_value == current {
        Decision::Unchanged
    } else if forced || request.new_value > current {
        Decision::Applied {
            from: current,
            to: request.new_value,
        }
    } else {
        Decision::Rejected(RejectReason::WouldLower)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoggedRequest<V> {
    pub request: ChangeRequest<V>,
    pub decision: Decision<V>,
    pub at: Timestamp,
}

/// What one reconciliation pass did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileOutcome<V> {
    /// Set when a live stage held a higher value and the registry followed.
    pub raised_to: Option<V>,
    /// Stages whose local copy was overwritten with the registry value.
    pub pushed: Vec<Stage>,
}

impl<V> ReconcileOutcome<V> {
    pub fn is_noop(&self) -> bool {
        self.raised_to.is_none() && self.pushed.is_empty()
    }
}

pub struct ParameterRegistry<V> {
    kind: ParameterKind,
    value: V,
    override_priority: u8,
    reconciliation_priority: u8,
    log: VecDeque<LoggedRequest<V>>,
}

/// Network-wide minimum stake.
pub type StakeRegistry = ParameterRegistry<u128>;
/// Network-wide mining difficulty.
pub type DifficultyRegistry = ParameterRegistry<u64>;

impl<V: ParameterValue> ParameterRegistry<V> {
    pub fn new(kind: ParameterKind, initial: V, override_priority: u8, reconciliation_priority: u8) -> Self {
        Self {
            kind,
            value: initial,
            override_priority,
            reconciliation_priority,
            log: VecDeque::new(),
        }
    }

    pub fn kind(&self) -> ParameterKind {
        self.kind
    }

    pub fn value(&self) -> V {
        self.value
    }

    /// Arbitrate and, if accepted, apply a change request.
    pub fn apply_change(&mut self, request: ChangeRequest<V>) -> Decision<V> {
        let decision = arbitrate(self.value, &request, self.override_priority);
        match decision {
            Decision::Applied { from, to } => {
                self.value = to;
                tracing::info!(
                    parameter = %self.kind,
                    %from,
                    %to,
                    requested_by = %request.requested_by,
                    priority = request.priority,
                    is_override = request.is_override,
                    "parameter change applied"
                );
            }
            Decision::Unchanged => {
                tracing::debug!(parameter = %self.kind, value = %self.value, "parameter already at requested value");
            }
            Decision::Rejected(reason) => {
                tracing::info!(
                    parameter = %self.kind,
                    current = %self.value,
                    requested = %request.new_value,
                    requested_by = %request.requested_by,
                    priority = request.priority,
                    ?reason,
                    "parameter change rejected"
                );
            }
        }

        self.log.push_back(LoggedRequest {
            request,
            decision,
            at: Timestamp::now(),
        });
        while self.log.len() > MAX_LOGGED_REQUESTS {
            self.log.pop_front();
        }
        decision
    }

    /// Requests seen so far, oldest first.
    pub fn log(&self) -> impl Iterator<Item = &LoggedRequest<V>> {
        self.log.iter()
    }

    /// Bring stage copies in line with the registry.
    ///
    /// Only live stages are consulted: if one holds a higher value than the
    /// registry, the registry is raised to it first. The registry value is
    /// then pushed to every stage whose copy differs, halted ones included.
    pub fn reconcile(&mut self, engine: &mut ConsensusEngine) -> ReconcileOutcome<V> {
        let readings = engine.parameter_readings(self.kind);

        let highest_live = readings
            .iter()
            .filter(|r| r.live)
            .map(|r| V::from_reading(r.value))
            .max();

        let mut raised_to = None;
        if let Some(highest) = highest_live {
            if highest > self.value {
                let request = ChangeRequest::new("reconciliation", highest, self.reconciliation_priority);
                if self.apply_change(request).is_applied() {
                    raised_to = Some(highest);
                }
            }
        }

        let target = self.value.to_reading();
        let mut pushed = Vec::new();
        for reading in readings {
            if reading.value != target {
                let applied = engine.apply_parameter(self.kind, target);
                if applied != target {
                    tracing::debug!(
                        parameter = %self.kind,
                        stage = %reading.stage,
                        target,
                        applied,
                        "stage holds a bounded copy"
                    );
                }
                pushed.push(reading.stage);
            }
        }

        if !pushed.is_empty() || raised_to.is_some() {
            tracing::info!(
                parameter = %self.kind,
                value = %self.value,
                ?raised_to,
                ?pushed,
                "parameter reconciled"
            );
        }

        ReconcileOutcome { raised_to, pushed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helix_types::{ConsensusParams, PipelineStage, ValidatorAddress};

    fn stake_registry(initial: u128) -> StakeRegistry {
        StakeRegistry::new(ParameterKind::MinStake, initial, 100, 90)
    }

    #[test]
    fn raise_then_lower_rejected() {
        let mut reg = stake_registry(1_000);

        let d = reg.apply_change(ChangeRequest::new("elasticity", 1_500, 10));
        assert_eq!(d, Decision::Applied { from: 1_000, to: 1_500 });
        assert_eq!(reg.value(), 1_500);

        let d = reg.apply_change(ChangeRequest::new("elasticity", 800, 10));
        assert_eq!(d, Decision::Rejected(RejectReason::WouldLower));
        assert_eq!(reg.value(), 1_500);
        assert_eq!(reg.log().count(), 2);
    }

    #[test]
    fn override_and_high_priority_may_lower() {
        let mut reg = stake_registry(1_500);
        assert!(reg
            .apply_change(ChangeRequest::new("operator", 800, 0).with_override())
            .is_applied());
        assert_eq!(reg.value(), 800);

        assert!(reg.apply_change(ChangeRequest::new("operator", 500, 100)).is_applied());
        assert_eq!(reg.value(), 500);

        assert!(!reg.apply_change(ChangeRequest::new("monitor", 400, 99)).is_applied());
    }

    #[test]
    fn equal_value_is_unchanged() {
        let mut reg = stake_registry(1_000);
        assert_eq!(reg.apply_change(ChangeRequest::new("x", 1_000, 10)), Decision::Unchanged);
    }

    #[test]
    fn reconcile_pushes_registry_value() {
        let mut engine = ConsensusEngine::new(ConsensusParams::default());
        let mut reg = stake_registry(1_500);

        let outcome = reg.reconcile(&mut engine);
        assert_eq!(outcome.raised_to, None);
        assert_eq!(outcome.pushed, vec![Stage::ValidatorPool]);
        assert_eq!(engine.pool().min_stake(), 1_500);

        assert!(reg.reconcile(&mut engine).is_noop());
    }

    #[test]
    fn reconcile_follows_higher_live_reading() {
        let mut engine = ConsensusEngine::new(ConsensusParams::default());
        engine.pool_mut().set_min_stake(2_000);
        let mut reg = stake_registry(1_000);

        let outcome = reg.reconcile(&mut engine);
        assert_eq!(outcome.raised_to, Some(2_000));
        assert!(outcome.pushed.is_empty());
        assert_eq!(reg.value(), 2_000);
    }

    #[test]
    fn reconcile_ignores_halted_reading() {
        let mut engine = ConsensusEngine::new(ConsensusParams::default());
        engine
            .add_validator(ValidatorAddress::new("val-a"), 5_000, Timestamp::new(0))
            .unwrap();
        engine.pool_mut().set_min_stake(5_000);
        engine.pool_mut().halt().unwrap();
        let mut reg = stake_registry(1_000);

        let outcome = reg.reconcile(&mut engine);
        assert_eq!(outcome.raised_to, None);
        assert_eq!(outcome.pushed, vec![Stage::ValidatorPool]);
        assert_eq!(reg.value(), 1_000);
        assert_eq!(engine.pool().min_stake(), 1_000);
    }

    #[test]
    fn difficulty_registry_reconciles_finalizer() {
        let params = ConsensusParams::default();
        let mut engine = ConsensusEngine::new(params.clone());
        let target = params.initial_difficulty + params.difficulty_step;
        let mut reg = DifficultyRegistry::new(ParameterKind::Difficulty, target, 100, 90);

        let outcome = reg.reconcile(&mut engine);
        assert_eq!(outcome.pushed, vec![Stage::Finalizer]);
        assert_eq!(engine.finalizer().difficulty(), target);
    }
}
