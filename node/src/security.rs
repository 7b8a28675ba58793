//! Adversarial-failure sweep.
//!
//! Re-validates recent proofs, active validator stakes and the last mined
//! block. Anything that fails is isolated (proof marked and timestamping
//! halted, stake frozen, block marked invalid), the responsible validator is
//! punished in the matching category, and each isolation is logged.
//! Isolation does not slash, so punishment magnitudes are zero.

use std::collections::HashSet;

use helix_consensus::{ConsensusEngine, PunishmentTracker};
use helix_ledger::{status, AuditTrail, Ledger};
use helix_types::{
    BlockHash, ConsensusParams, Proof, ProofHash, Stage, Timestamp, ValidatorAddress,
};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SecurityReport {
    pub proofs_checked: usize,
    pub invalid_proofs: Vec<ProofHash>,
    pub frozen_validators: Vec<ValidatorAddress>,
    pub invalid_block: Option<BlockHash>,
    pub punished: Vec<(ValidatorAddress, Stage)>,
}

impl SecurityReport {
    pub fn is_clean(&self) -> bool {
        self.invalid_proofs.is_empty()
            && self.frozen_validators.is_empty()
            && self.invalid_block.is_none()
    }
}

pub struct SecurityMonitor {
    trail: AuditTrail,
    proof_window: usize,
}

impl SecurityMonitor {
    pub fn new(params: &ConsensusParams, trail: AuditTrail) -> Self {
        Self {
            trail,
            proof_window: params.proof_history,
        }
    }

    pub fn check(
        &self,
        engine: &mut ConsensusEngine,
        min_stake: u128,
        punishments: &mut PunishmentTracker,
        ledger: &mut Ledger,
        now: Timestamp,
    ) -> SecurityReport {
        let mut report = SecurityReport::default();
        self.check_proofs(engine, punishments, ledger, now, &mut report);
        self.check_stakes(engine, min_stake, punishments, ledger, now, &mut report);
        self.check_last_block(engine, punishments, ledger, now, &mut report);

        if report.is_clean() {
            tracing::debug!(proofs = report.proofs_checked, "security sweep clean");
        } else {
            tracing::warn!(
                invalid_proofs = report.invalid_proofs.len(),
                frozen = report.frozen_validators.len(),
                invalid_block = ?report.invalid_block,
                "security sweep isolated entities"
            );
        }
        report
    }

    /// Proofs the sequencer still remembers plus those carried by the latest
    /// block, each with the validator that certified it.
    fn candidate_proofs(&self, engine: &ConsensusEngine) -> Vec<(Proof, Option<ValidatorAddress>)> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        if let Some(block) = engine.latest_block() {
            for sub_block in &block.sub_blocks {
                if seen.insert(sub_block.proof.hash) {
                    out.push((sub_block.proof.clone(), Some(sub_block.validator.clone())));
                }
            }
        }
        for proof in engine.sequencer().recent_proofs(self.proof_window) {
            if seen.insert(proof.hash) {
                let validator = engine.validator_for_proof(&proof.hash).cloned();
                out.push((proof, validator));
            }
        }
        out
    }

    fn check_proofs(
        &self,
        engine: &mut ConsensusEngine,
        punishments: &mut PunishmentTracker,
        ledger: &mut Ledger,
        now: Timestamp,
        report: &mut SecurityReport,
    ) {
        let candidates = self.candidate_proofs(engine);
        report.proofs_checked = candidates.len();

        for (proof, validator) in candidates {
            let sequencer = engine.sequencer_mut();
            if sequencer.is_marked_invalid(&proof.hash) || sequencer.validate_proof(&proof) {
                continue;
            }
            sequencer.mark_invalid(proof.hash);
            sequencer.halt_timestamps();
            report.invalid_proofs.push(proof.hash);

            let blamed = validator
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "unknown".into());
            if let Some(validator) = validator {
                punishments.record(&validator, Stage::Sequencer, 0, now);
                report.punished.push((validator, Stage::Sequencer));
            }
            self.trail.log(
                ledger,
                "ProofIsolation",
                status::COMPLETED,
                Some(format!(
                    "proof {} seq={} validator={blamed}; timestamps halted",
                    proof.hash, proof.sequence
                )),
            );
        }
    }

    fn check_stakes(
        &self,
        engine: &mut ConsensusEngine,
        min_stake: u128,
        punishments: &mut PunishmentTracker,
        ledger: &mut Ledger,
        now: Timestamp,
        report: &mut SecurityReport,
    ) {
        let under_staked: Vec<(ValidatorAddress, u128)> = engine
            .active_validators()
            .into_iter()
            .filter(|v| v.stake < min_stake)
            .map(|v| (v.address.clone(), v.stake))
            .collect();

        for (address, stake) in under_staked {
            if let Err(e) = engine.pool_mut().freeze_stake(&address) {
                tracing::warn!(%address, error = %e, "stake freeze failed");
                continue;
            }
            punishments.record(&address, Stage::ValidatorPool, 0, now);
            report.punished.push((address.clone(), Stage::ValidatorPool));
            self.trail.log(
                ledger,
                "StakeIsolation",
                status::COMPLETED,
                Some(format!("{address} stake={stake} min={min_stake}; frozen")),
            );
            report.frozen_validators.push(address);
        }
    }

    fn check_last_block(
        &self,
        engine: &mut ConsensusEngine,
        punishments: &mut PunishmentTracker,
        ledger: &mut Ledger,
        now: Timestamp,
        report: &mut SecurityReport,
    ) {
        let Some(block) = engine.latest_block() else {
            return;
        };
        if engine.finalizer().is_marked_invalid(&block.hash) || engine.finalizer().validate_block(block) {
            return;
        }
        let hash = block.hash;
        let height = block.height;
        let blamed = block.sub_blocks.first().map(|s| s.validator.clone());

        engine.finalizer_mut().mark_invalid(hash);
        report.invalid_block = Some(hash);
        if let Some(validator) = &blamed {
            punishments.record(validator, Stage::Finalizer, 0, now);
            report.punished.push((validator.clone(), Stage::Finalizer));
        }
        self.trail.log(
            ledger,
            "BlockIsolation",
            status::COMPLETED,
            Some(format!(
                "block {hash} height={height} validator={}; marked invalid",
                blamed.map(|v| v.to_string()).unwrap_or_else(|| "unknown".into())
            )),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helix_types::SUB_BLOCKS_PER_BLOCK;

    fn addr(s: &str) -> ValidatorAddress {
        ValidatorAddress::new(s)
    }

    fn monitor() -> SecurityMonitor {
        SecurityMonitor::new(&ConsensusParams::default(), AuditTrail::plain("security"))
    }

    fn engine_with_block() -> ConsensusEngine {
        let mut engine = ConsensusEngine::new(ConsensusParams::default());
        engine.add_validator(addr("a"), 1_000, Timestamp::new(0)).unwrap();
        for i in 0..SUB_BLOCKS_PER_BLOCK {
            let now = Timestamp::new(100 + i as u64);
            engine.submit_transaction(vec![i as u8, (i >> 8) as u8], now);
            assert!(engine.process_transactions(now));
        }
        engine
    }

    #[test]
    fn clean_engine_passes() {
        let mut engine = ConsensusEngine::new(ConsensusParams::default());
        engine.add_validator(addr("a"), 1_000, Timestamp::new(0)).unwrap();
        engine.submit_transaction(b"tx".to_vec(), Timestamp::new(1));
        engine.process_transactions(Timestamp::new(1));
        let mut ledger = Ledger::new();
        let mut punishments = PunishmentTracker::new(3_600);

        let report = monitor().check(&mut engine, 1_000, &mut punishments, &mut ledger, Timestamp::new(2));
        assert!(report.is_clean());
        assert_eq!(report.proofs_checked, 1);
        assert!(ledger.is_empty());
        assert!(punishments.is_empty());
    }

    #[test]
    fn under_staked_validator_frozen() {
        let mut engine = ConsensusEngine::new(ConsensusParams::default());
        engine.add_validator(addr("rich"), 2_000, Timestamp::new(0)).unwrap();
        engine.add_validator(addr("poor"), 1_000, Timestamp::new(0)).unwrap();
        let mut ledger = Ledger::new();
        let mut punishments = PunishmentTracker::new(3_600);

        let report = monitor().check(&mut engine, 1_500, &mut punishments, &mut ledger, Timestamp::new(5));
        assert_eq!(report.frozen_validators, vec![addr("poor")]);
        let poor = engine.pool().get(&addr("poor")).unwrap();
        assert!(poor.frozen && !poor.active);
        assert!(engine.pool().get(&addr("rich")).unwrap().active);
        assert_eq!(
            punishments.active_for(&addr("poor"), Timestamp::new(6))[0].category,
            Stage::ValidatorPool
        );
        assert_eq!(ledger.of_type("StakeIsolation").count(), 1);

        // frozen validators are no longer active, so a second sweep is quiet
        let again = monitor().check(&mut engine, 1_500, &mut punishments, &mut ledger, Timestamp::new(6));
        assert!(again.is_clean());
    }

    #[test]
    fn tampered_block_isolated() {
        let mut engine = engine_with_block();
        let mut tampered = engine.latest_block().unwrap().clone();
        tampered.sub_blocks[0].proof.timestamp = Timestamp::new(1);
        tampered.timestamp = Timestamp::new(tampered.timestamp.as_secs() + 1);
        engine.chain_mut().replace(1, tampered.clone()).unwrap();

        let mut ledger = Ledger::new();
        let mut punishments = PunishmentTracker::new(3_600);
        let report = monitor().check(&mut engine, 1_000, &mut punishments, &mut ledger, Timestamp::new(2_000));

        assert_eq!(report.invalid_proofs, vec![tampered.sub_blocks[0].proof.hash]);
        assert!(engine.sequencer().timestamps_halted());
        assert_eq!(report.invalid_block, Some(tampered.hash));
        assert!(engine.finalizer().is_marked_invalid(&tampered.hash));
        assert_eq!(
            report.punished,
            vec![(addr("a"), Stage::Sequencer), (addr("a"), Stage::Finalizer)]
        );
        assert_eq!(ledger.of_type("ProofIsolation").count(), 1);
        assert_eq!(ledger.of_type("BlockIsolation").count(), 1);

        // already isolated: nothing new on the next sweep
        let again = monitor().check(&mut engine, 1_000, &mut punishments, &mut ledger, Timestamp::new(2_001));
        assert!(again.is_clean());
        assert_eq!(ledger.len(), 2);
    }
}
