//! Punishment records with an expiry window.
//!
//! Each record names the pipeline stage the offence was caught in (PoH for a
//! bad proof, PoS for a stake violation, PoW for a bad block). Records expire
//! after the configured window and are pruned on demand.

use serde::{Deserialize, Serialize};

use helix_types::{Stage, Timestamp, ValidatorAddress};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PunishmentRecord {
    pub validator: ValidatorAddress,
    pub category: Stage,
    /// Stake slashed, or `0` for isolation-only punishments.
    pub magnitude: u128,
    pub timestamp: Timestamp,
}

pub struct PunishmentTracker {
    records: Vec<PunishmentRecord>,
    window_secs: u64,
}

impl PunishmentTracker {
    pub fn new(window_secs: u64) -> Self {
        Self {
            records: Vec::new(),
            window_secs,
        }
    }

    pub fn record(
        &mut self,
        validator: &ValidatorAddress,
        category: Stage,
        magnitude: u128,
        now: Timestamp,
    ) -> PunishmentRecord {
        let record = PunishmentRecord {
            validator: validator.clone(),
            category,
            magnitude,
            timestamp: now,
        };
        tracing::info!(
            %validator,
            category = category.tag(),
            magnitude,
            "punishment recorded"
        );
        self.records.push(record.clone());
        record
    }

    /// Unexpired punishments, oldest first.
    pub fn active(&self, now: Timestamp) -> impl Iterator<Item = &PunishmentRecord> {
        let window = self.window_secs;
        self.records
            .iter()
            .filter(move |r| !r.timestamp.has_expired(window, now))
    }

    pub fn is_punished(&self, validator: &ValidatorAddress, now: Timestamp) -> bool {
        self.active(now).any(|r| &r.validator == validator)
    }

    pub fn active_for(&self, validator: &ValidatorAddress, now: Timestamp) -> Vec<&PunishmentRecord> {
        self.active(now).filter(|r| &r.validator == validator).collect()
    }

    /// Drop expired records. Returns how many were removed.
    pub fn prune(&mut self, now: Timestamp) -> usize {
        let before = self.records.len();
        let window = self.window_secs;
        self.records.retain(|r| !r.timestamp.has_expired(window, now));
        before - self.records.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn val(name: &str) -> ValidatorAddress {
        ValidatorAddress::new(name)
    }

    #[test]
    fn punishment_expires_after_window() {
        let mut tracker = PunishmentTracker::new(100);
        tracker.record(&val("a"), Stage::ValidatorPool, 5, Timestamp::new(1_000));

        assert!(tracker.is_punished(&val("a"), Timestamp::new(1_099)));
        assert!(!tracker.is_punished(&val("a"), Timestamp::new(1_100)));
        assert!(!tracker.is_punished(&val("b"), Timestamp::new(1_000)));
    }

    #[test]
    fn prune_removes_expired_only() {
        let mut tracker = PunishmentTracker::new(100);
        tracker.record(&val("a"), Stage::Sequencer, 0, Timestamp::new(1_000));
        tracker.record(&val("b"), Stage::Finalizer, 0, Timestamp::new(1_050));

        assert_eq!(tracker.prune(Timestamp::new(1_100)), 1);
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.active_for(&val("b"), Timestamp::new(1_100)).len(), 1);
    }

    #[test]
    fn categories_are_kept() {
        let mut tracker = PunishmentTracker::new(86_400);
        tracker.record(&val("a"), Stage::Sequencer, 0, Timestamp::new(1));
        tracker.record(&val("a"), Stage::Finalizer, 0, Timestamp::new(2));
        let tags: Vec<_> = tracker
            .active_for(&val("a"), Timestamp::new(3))
            .iter()
            .map(|r| r.category.tag())
            .collect();
        assert_eq!(tags, ["PoH", "PoW"]);
    }
}
