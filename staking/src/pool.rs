//! The PoS validator pool stage.

use std::collections::BTreeMap;

use helix_types::{ConsensusParams, PipelineStage, Stage, StageError, Timestamp, ValidatorAddress};

use crate::{StakingError, Validator};

pub struct ValidatorPool {
    validators: BTreeMap<ValidatorAddress, Validator>,
    next_seq: u64,
    /// Local copy of the minimum stake, reconciled against the registry.
    min_stake: u128,
    assignment_capacity: u64,
    halted: bool,
}

impl ValidatorPool {
    pub fn new(params: &ConsensusParams) -> Self {
        Self {
            validators: BTreeMap::new(),
            next_seq: 0,
            min_stake: params.initial_min_stake,
            assignment_capacity: params.assignment_capacity.max(1),
            halted: false,
        }
    }

    /// Deposit stake, creating a standby validator on first deposit.
    pub fn deposit_stake(
        &mut self,
        address: ValidatorAddress,
        amount: u128,
        now: Timestamp,
    ) -> Result<&Validator, StakingError> {
        if amount == 0 {
            return Err(StakingError::ZeroAmount);
        }
        let next_seq = &mut self.next_seq;
        let validator = self.validators.entry(address.clone()).or_insert_with(|| {
            let seq = *next_seq;
            *next_seq += 1;
            tracing::info!(%address, amount, "validator registered");
            Validator::new(address, 0, seq, now)
        });
        validator.stake = validator.stake.saturating_add(amount);
        Ok(validator)
    }

    /// Register a fully formed validator record.
    pub fn add_validator(&mut self, mut validator: Validator) -> Result<(), StakingError> {
        if self.validators.contains_key(&validator.address) {
            return Err(StakingError::AlreadyRegistered(validator.address));
        }
        validator.registered_seq = self.next_seq;
        self.next_seq += 1;
        self.validators.insert(validator.address.clone(), validator);
        Ok(())
    }

    /// Remove a validator (disqualification or voluntary exit).
    pub fn remove_validator(&mut self, address: &ValidatorAddress) -> Option<Validator> {
        let removed = self.validators.remove(address);
        if removed.is_some() {
            tracing::info!(%address, "validator removed");
        }
        removed
    }

    /// Move a validator into the active pool. Requires the minimum stake.
    pub fn activate(&mut self, address: &ValidatorAddress) -> Result<(), StakingError> {
        let min_stake = self.min_stake;
        let validator = self.get_mut(address)?;
        if validator.frozen {
            return Err(StakingError::Frozen(address.clone()));
        }
        if validator.stake < min_stake {
            return Err(StakingError::BelowMinStake {
                stake: validator.stake,
                min: min_stake,
            });
        }
        validator.active = true;
        validator.rotated_out = false;
        Ok(())
    }

    pub fn deactivate(&mut self, address: &ValidatorAddress) -> Result<(), StakingError> {
        self.get_mut(address)?.active = false;
        Ok(())
    }

    /// Deactivate and keep out of standby promotion until
    /// [`clear_rotated`](Self::clear_rotated).
    pub fn rotate_out(&mut self, address: &ValidatorAddress) -> Result<(), StakingError> {
        let validator = self.get_mut(address)?;
        validator.active = false;
        validator.rotated_out = true;
        Ok(())
    }

    /// Close the rotation window: validators rotated out become standby again.
    pub fn clear_rotated(&mut self) {
        for validator in self.validators.values_mut() {
            validator.rotated_out = false;
        }
    }

    pub fn get(&self, address: &ValidatorAddress) -> Option<&Validator> {
        self.validators.get(address)
    }

    fn get_mut(&mut self, address: &ValidatorAddress) -> Result<&mut Validator, StakingError> {
        self.validators
            .get_mut(address)
            .ok_or_else(|| StakingError::UnknownValidator(address.clone()))
    }

    pub fn validators(&self) -> impl Iterator<Item = &Validator> {
        self.validators.values()
    }

    pub fn active_validators(&self) -> Vec<&Validator> {
        self.validators.values().filter(|v| v.active).collect()
    }

    /// Standby validators in registration order.
    pub fn standby_validators(&self) -> Vec<&Validator> {
        let mut standby: Vec<&Validator> = self
            .validators
            .values()
            .filter(|v| v.is_standby())
            .collect();
        standby.sort_by_key(|v| v.registered_seq);
        standby
    }

    pub fn first_standby(&self) -> Option<&Validator> {
        self.validators
            .values()
            .filter(|v| v.is_standby())
            .min_by_key(|v| v.registered_seq)
    }

    /// Pick an active validator with probability proportional to stake.
    ///
    /// Deterministic for a given seed and pool state, so every node holding
    /// the same proof picks the same validator.
    pub fn select_validator(&mut self, seed: &[u8; 32]) -> Result<ValidatorAddress, StakingError> {
        if self.halted {
            return Err(StageError::Halted(Stage::ValidatorPool).into());
        }

        let total: u128 = self
            .validators
            .values()
            .filter(|v| v.is_eligible())
            .map(|v| v.stake)
            .fold(0u128, |acc, s| acc.saturating_add(s));
        if total == 0 {
            return Err(StakingError::NoEligibleValidators);
        }

        let mut head = [0u8; 16];
        head.copy_from_slice(&seed[..16]);
        let target = u128::from_le_bytes(head) % total;

        let mut accumulated = 0u128;
        let mut chosen = None;
        for validator in self.validators.values_mut().filter(|v| v.is_eligible()) {
            accumulated = accumulated.saturating_add(validator.stake);
            if accumulated > target {
                chosen = Some(validator);
                break;
            }
        }

        let validator = chosen.ok_or(StakingError::NoEligibleValidators)?;
        validator.assignments += 1;
        Ok(validator.address.clone())
    }

    /// Record one certification attempt. Returns whether it succeeded.
    ///
    /// A certification only succeeds when the proof is valid and the
    /// validator is still eligible.
    pub fn certify(
        &mut self,
        address: &ValidatorAddress,
        proof_valid: bool,
    ) -> Result<bool, StakingError> {
        if self.halted {
            return Err(StageError::Halted(Stage::ValidatorPool).into());
        }
        let validator = self.get_mut(address)?;
        validator.total_validations += 1;
        let ok = proof_valid && validator.is_eligible();
        if ok {
            validator.successful_validations += 1;
        }
        Ok(ok)
    }

    /// Credit a token reward. Returns the validator's accumulated rewards.
    pub fn reward(&mut self, address: &ValidatorAddress, amount: u128) -> Result<u128, StakingError> {
        let validator = self.get_mut(address)?;
        validator.rewards = validator.rewards.saturating_add(amount);
        Ok(validator.rewards)
    }

    /// Slash stake. Returns the remaining stake.
    pub fn slash(&mut self, address: &ValidatorAddress, amount: u128) -> Result<u128, StakingError> {
        let validator = self.get_mut(address)?;
        validator.stake = validator.stake.saturating_sub(amount);
        Ok(validator.stake)
    }

    /// Freeze a validator's stake and pull it out of the active pool.
    pub fn freeze_stake(&mut self, address: &ValidatorAddress) -> Result<(), StakingError> {
        let validator = self.get_mut(address)?;
        validator.frozen = true;
        validator.active = false;
        tracing::warn!(%address, stake = validator.stake, "validator stake frozen");
        Ok(())
    }

    pub fn set_uptime(&mut self, address: &ValidatorAddress, uptime: f64) -> Result<(), StakingError> {
        self.get_mut(address)?.uptime = uptime.clamp(0.0, 1.0);
        Ok(())
    }

    /// Raise a validator's stake to at least `floor`. Returns the amount added.
    pub fn raise_stake_to(&mut self, address: &ValidatorAddress, floor: u128) -> Result<u128, StakingError> {
        let validator = self.get_mut(address)?;
        let added = floor.saturating_sub(validator.stake);
        validator.stake += added;
        Ok(added)
    }

    /// Start a new scoring window.
    pub fn reset_assignments(&mut self) {
        for validator in self.validators.values_mut() {
            validator.assignments = 0;
        }
    }

    pub fn min_stake(&self) -> u128 {
        self.min_stake
    }

    pub fn set_min_stake(&mut self, min_stake: u128) {
        self.min_stake = min_stake;
    }

    pub fn assignment_capacity(&self) -> u64 {
        self.assignment_capacity
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

impl PipelineStage for ValidatorPool {
    fn stage(&self) -> Stage {
        Stage::ValidatorPool
    }

    fn halt(&mut self) -> Result<(), StageError> {
        if self.halted {
            return Err(StageError::AlreadyHalted(Stage::ValidatorPool));
        }
        self.halted = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), StageError> {
        if !self.halted {
            return Err(StageError::NotHalted(Stage::ValidatorPool));
        }
        self.halted = false;
        Ok(())
    }

    fn is_halted(&self) -> bool {
        self.halted
    }

    /// Mean assignment load across active validators.
    fn load(&self) -> f64 {
        let active: Vec<&Validator> = self.validators.values().filter(|v| v.active).collect();
        if active.is_empty() {
            return 0.0;
        }
        let sum: f64 = active.iter().map(|v| v.load(self.assignment_capacity)).sum();
        sum / active.len() as f64
    }
}
