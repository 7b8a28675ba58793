//! Validator record.

use serde::{Deserialize, Serialize};

use helix_types::{Timestamp, ValidatorAddress};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Validator {
    pub address: ValidatorAddress,
    pub stake: u128,
    /// Fraction of the observation window the validator was reachable, `[0, 1]`.
    pub uptime: f64,
    pub successful_validations: u64,
    pub total_validations: u64,
    pub active: bool,
    /// Isolated by the security monitor; never selected while set.
    pub frozen: bool,
    /// Rotated out in the current scoring window; not promoted from standby
    /// until the window closes.
    #[serde(default)]
    pub rotated_out: bool,
    /// Certifications assigned in the current scoring window.
    pub assignments: u64,
    /// Tokens credited by the lifecycle manager.
    pub rewards: u128,
    /// Registration order; standby promotion is first-registered-first.
    pub registered_seq: u64,
    pub registered_at: Timestamp,
}

impl Validator {
    pub fn new(address: ValidatorAddress, stake: u128, registered_seq: u64, now: Timestamp) -> Self {
        Self {
            address,
            stake,
            uptime: 1.0,
            successful_validations: 0,
            total_validations: 0,
            active: false,
            frozen: false,
            rotated_out: false,
            assignments: 0,
            rewards: 0,
            registered_seq,
            registered_at: now,
        }
    }

    /// Successful / total validations; `1.0` before the first validation.
    pub fn success_ratio(&self) -> f64 {
        if self.total_validations == 0 {
            return 1.0;
        }
        self.successful_validations as f64 / self.total_validations as f64
    }

    /// Assignments relative to the per-window capacity.
    pub fn load(&self, assignment_capacity: u64) -> f64 {
        self.assignments as f64 / assignment_capacity.max(1) as f64
    }

    /// Inactive, unfrozen and not rotated out this window.
    pub fn is_standby(&self) -> bool {
        !self.active && !self.frozen && !self.rotated_out
    }

    pub fn is_eligible(&self) -> bool {
        self.active && !self.frozen && self.stake > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_validator_has_full_ratio() {
        let v = Validator::new("val-a".into(), 100, 0, Timestamp::new(0));
        assert_eq!(v.success_ratio(), 1.0);
        assert!(!v.is_eligible());
    }

    #[test]
    fn ratio_and_load() {
        let mut v = Validator::new("val-a".into(), 100, 0, Timestamp::new(0));
        v.total_validations = 4;
        v.successful_validations = 3;
        v.assignments = 50;
        assert_eq!(v.success_ratio(), 0.75);
        assert_eq!(v.load(100), 0.5);
        assert_eq!(v.load(0), 50.0);
    }
}
