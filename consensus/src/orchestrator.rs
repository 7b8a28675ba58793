//! The consensus orchestrator.
//!
//! [`ConsensusEngine`] owns the three pipeline stages and drives one
//! sub-block per cycle through them:
//!
//! 1. the sequencer stamps the batch with a proof,
//! 2. the validator pool picks a validator (seeded by the proof hash) who
//!    certifies the sub-block,
//! 3. once [`SUB_BLOCKS_PER_BLOCK`] sub-blocks are pending, the finalizer
//!    mines them into a block.
//!
//! A failure at any stage stops that sub-block or block but never the cycle
//! counter. Supervisory components (lifecycle, monitors, synchronizers) reach
//! the stages only through the accessors here.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use helix_crypto::blake2b_256_multi;
use helix_sequencer::Sequencer;
use helix_staking::{Validator, ValidatorPool};
use helix_types::{
    Block, BlockHash, ConsensusParams, PipelineStage, Proof, ProofHash, Stage, SubBlock,
    Timestamp, Transaction, TxHash, ValidatorAddress, SUB_BLOCKS_PER_BLOCK,
};
use helix_work::Finalizer;

use crate::{Chain, ConsensusError, ParameterKind};

/// Hash of a certified sub-block: position, proof, certifier and contents.
pub fn sub_block_hash(
    index: u32,
    proof: &Proof,
    validator: &ValidatorAddress,
    transactions: &[Transaction],
) -> BlockHash {
    let index = index.to_le_bytes();
    let mut parts: Vec<&[u8]> = Vec::with_capacity(3 + transactions.len());
    parts.push(&index);
    parts.push(proof.hash.as_bytes());
    parts.push(validator.as_str().as_bytes());
    parts.extend(transactions.iter().map(|t| t.hash.as_bytes().as_slice()));
    BlockHash::new(blake2b_256_multi(&parts))
}

/// One stage's local copy of a synchronized parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StageReading {
    pub stage: Stage,
    pub value: u128,
    /// `false` while the stage is halted; halted readings never drive
    /// reconciliation.
    pub live: bool,
}

pub struct ConsensusEngine {
    params: ConsensusParams,
    sequencer: Sequencer,
    pool: ValidatorPool,
    finalizer: Finalizer,
    chain: Chain,
    mempool: VecDeque<Transaction>,
    /// Certified sub-blocks awaiting finalization. Never exceeds
    /// [`SUB_BLOCKS_PER_BLOCK`].
    pending: Vec<SubBlock>,
    /// Which validator certified each recent proof, bounded by proof history.
    proof_validators: HashMap<ProofHash, ValidatorAddress>,
    proof_order: VecDeque<ProofHash>,
    cycle: u64,
    tx_counter: u64,
    /// Sliding window of timestamped cycle outcomes for network health.
    outcomes: VecDeque<(Timestamp, bool)>,
    finalization_times: VecDeque<Duration>,
    last_finalization_time: Option<Duration>,
}

impl ConsensusEngine {
    pub fn new(params: ConsensusParams) -> Self {
        Self {
            sequencer: Sequencer::new(&params),
            pool: ValidatorPool::new(&params),
            finalizer: Finalizer::new(&params),
            chain: Chain::new(),
            mempool: VecDeque::new(),
            pending: Vec::with_capacity(SUB_BLOCKS_PER_BLOCK),
            proof_validators: HashMap::new(),
            proof_order: VecDeque::new(),
            cycle: 0,
            tx_counter: 0,
            outcomes: VecDeque::with_capacity(params.health_window),
            finalization_times: VecDeque::with_capacity(params.health_window),
            last_finalization_time: None,
            params,
        }
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    // ── Transactions ────────────────────────────────────────────────────

    /// Queue a transaction for the next sub-block.
    pub fn submit_transaction(&mut self, payload: Vec<u8>, now: Timestamp) -> TxHash {
        self.tx_counter += 1;
        let submitted = now.as_secs().to_le_bytes();
        let counter = self.tx_counter.to_le_bytes();
        let hash = TxHash::new(blake2b_256_multi(&[
            payload.as_slice(),
            submitted.as_slice(),
            counter.as_slice(),
        ]));
        self.mempool.push_back(Transaction {
            hash,
            payload,
            submitted_at: now,
        });
        self.sequencer.enqueue(1);
        hash
    }

    pub fn pending_transactions(&self) -> usize {
        self.mempool.len()
    }

    /// Put transactions back at the head of the mempool, keeping their order.
    fn requeue(&mut self, transactions: Vec<Transaction>) {
        self.sequencer.enqueue(transactions.len());
        for tx in transactions.into_iter().rev() {
            self.mempool.push_front(tx);
        }
    }

    // ── Cycle ───────────────────────────────────────────────────────────

    /// Run one sub-block cycle. Returns whether a sub-block was certified.
    ///
    /// An empty mempool produces no sub-block and does not count against
    /// network health.
    pub fn process_transactions(&mut self, now: Timestamp) -> bool {
        self.cycle += 1;
        self.expire_health_outcomes(now);

        if self.pending.len() >= SUB_BLOCKS_PER_BLOCK && !self.finalize_block(now) {
            tracing::warn!(cycle = self.cycle, "full batch still awaiting finalization");
            self.record_outcome(false, now);
            return false;
        }

        if self.mempool.is_empty() {
            tracing::trace!(cycle = self.cycle, "mempool empty");
            return false;
        }

        let take = self.params.max_transactions_per_sub_block.max(1).min(self.mempool.len());
        let transactions: Vec<Transaction> = self.mempool.drain(..take).collect();
        self.sequencer.drain(take);

        let ok = match self.certify_sub_block(transactions, now) {
            Ok(index) => {
                tracing::debug!(cycle = self.cycle, index, "sub-block certified");
                true
            }
            Err((e, transactions)) => {
                tracing::warn!(cycle = self.cycle, error = %e, "sub-block not certified");
                self.requeue(transactions);
                false
            }
        };
        self.record_outcome(ok, now);

        if ok && self.pending.len() == SUB_BLOCKS_PER_BLOCK {
            self.finalize_block(now);
        }
        ok
    }

    fn certify_sub_block(
        &mut self,
        transactions: Vec<Transaction>,
        now: Timestamp,
    ) -> Result<u32, (ConsensusError, Vec<Transaction>)> {
        let data: Vec<u8> = transactions
            .iter()
            .flat_map(|t| t.hash.as_bytes().iter().copied())
            .collect();

        let proof = match self.sequencer.generate_proof(&data, now) {
            Ok(proof) => proof,
            Err(e) => return Err((e.into(), transactions)),
        };
        let proof_valid = self.sequencer.validate_proof(&proof);

        let validator = match self.pool.select_validator(proof.hash.as_bytes()) {
            Ok(v) => v,
            Err(e) => return Err((e.into(), transactions)),
        };

        match self.pool.certify(&validator, proof_valid) {
            Ok(true) => {}
            Ok(false) => return Err((ConsensusError::CertificationFailed(validator), transactions)),
            Err(e) => return Err((e.into(), transactions)),
        }

        self.remember_certifier(proof.hash, validator.clone());

        let index = self.pending.len() as u32;
        let hash = sub_block_hash(index, &proof, &validator, &transactions);
        self.pending.push(SubBlock {
            index,
            proof,
            validator,
            transactions,
            hash,
        });
        Ok(index)
    }

    fn remember_certifier(&mut self, proof: ProofHash, validator: ValidatorAddress) {
        self.proof_validators.insert(proof, validator);
        self.proof_order.push_back(proof);
        while self.proof_order.len() > self.params.proof_history.max(1) {
            if let Some(old) = self.proof_order.pop_front() {
                self.proof_validators.remove(&old);
            }
        }
    }

    fn record_outcome(&mut self, ok: bool, now: Timestamp) {
        self.outcomes.push_back((now, ok));
        while self.outcomes.len() > self.params.health_window.max(1) {
            self.outcomes.pop_front();
        }
    }

    /// Mine the pending batch if it is full. Returns whether a block was
    /// appended; a failed attempt leaves the batch pending for the next cycle.
    pub fn finalize_block(&mut self, now: Timestamp) -> bool {
        if self.pending.len() != SUB_BLOCKS_PER_BLOCK {
            tracing::debug!(pending = self.pending.len(), "batch not full, nothing to finalize");
            return false;
        }

        let previous = self.chain.tip_hash();
        let height = self.chain.next_height();
        let started = Instant::now();

        match self.finalizer.mine(previous, height, self.pending.clone(), now) {
            Ok(block) => {
                let elapsed = started.elapsed();
                self.last_finalization_time = Some(elapsed);
                self.finalization_times.push_back(elapsed);
                while self.finalization_times.len() > self.params.health_window.max(1) {
                    self.finalization_times.pop_front();
                }
                self.pending.clear();
                tracing::info!(
                    height,
                    hash = %block.hash,
                    transactions = block.transaction_count(),
                    "block finalized"
                );
                self.chain.push(block);
                true
            }
            Err(e) => {
                tracing::warn!(height, error = %e, "block finalization failed");
                false
            }
        }
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    // ── Chain ───────────────────────────────────────────────────────────

    /// Validate every finalized block and the links between them.
    pub fn validate_chain(&self) -> bool {
        self.chain.links_are_consistent()
            && self
                .chain
                .blocks()
                .iter()
                .all(|b| self.finalizer.validate_block(b))
    }

    /// Re-run finalizer validation on the most recent block. An empty chain
    /// is trivially valid.
    pub fn revalidate_latest_block(&self) -> bool {
        self.chain
            .latest()
            .map(|b| self.finalizer.validate_block(b))
            .unwrap_or(true)
    }

    pub fn validated_sub_blocks(&self) -> &[SubBlock] {
        &self.pending
    }

    pub fn blocks(&self) -> &[Block] {
        self.chain.blocks()
    }

    pub fn latest_block(&self) -> Option<&Block> {
        self.chain.latest()
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut Chain {
        &mut self.chain
    }

    /// Validator that certified the sub-block built on `proof`, if still
    /// remembered.
    pub fn validator_for_proof(&self, proof: &ProofHash) -> Option<&ValidatorAddress> {
        self.proof_validators.get(proof)
    }

    // ── Health ──────────────────────────────────────────────────────────

    /// Fraction of successful cycles over the sliding window; `1.0` before
    /// any cycle has produced work.
    pub fn network_health(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 1.0;
        }
        let ok = self.outcomes.iter().filter(|(_, ok)| *ok).count();
        ok as f64 / self.outcomes.len() as f64
    }

    /// Drop cycle outcomes older than `health_window_secs`. Returns how many
    /// were dropped.
    pub fn expire_health_outcomes(&mut self, now: Timestamp) -> usize {
        let window = self.params.health_window_secs;
        let mut expired = 0;
        while let Some((at, _)) = self.outcomes.front() {
            if !at.has_expired(window, now) {
                break;
            }
            self.outcomes.pop_front();
            expired += 1;
        }
        expired
    }

    pub fn last_finalization_time(&self) -> Option<Duration> {
        self.last_finalization_time
    }

    /// Mean finalization time over the health window.
    pub fn average_finalization_time(&self) -> Option<Duration> {
        if self.finalization_times.is_empty() {
            return None;
        }
        let total: Duration = self.finalization_times.iter().sum();
        Some(total / self.finalization_times.len() as u32)
    }

    // ── Stages ──────────────────────────────────────────────────────────

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn sequencer_mut(&mut self) -> &mut Sequencer {
        &mut self.sequencer
    }

    pub fn pool(&self) -> &ValidatorPool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut ValidatorPool {
        &mut self.pool
    }

    pub fn finalizer(&self) -> &Finalizer {
        &self.finalizer
    }

    pub fn finalizer_mut(&mut self) -> &mut Finalizer {
        &mut self.finalizer
    }

    pub fn stage(&self, stage: Stage) -> &dyn PipelineStage {
        match stage {
            Stage::Sequencer => &self.sequencer,
            Stage::ValidatorPool => &self.pool,
            Stage::Finalizer => &self.finalizer,
        }
    }

    pub fn stage_mut(&mut self, stage: Stage) -> &mut dyn PipelineStage {
        match stage {
            Stage::Sequencer => &mut self.sequencer,
            Stage::ValidatorPool => &mut self.pool,
            Stage::Finalizer => &mut self.finalizer,
        }
    }

    /// Current load of every stage, in pipeline order.
    pub fn stage_loads(&self) -> Vec<(Stage, f64)> {
        Stage::ALL
            .iter()
            .map(|s| (*s, self.stage(*s).load()))
            .collect()
    }

    // ── Validators ──────────────────────────────────────────────────────

    pub fn active_validators(&self) -> Vec<&Validator> {
        self.pool.active_validators()
    }

    /// Deposit `stake` for `address` and move it into the active pool.
    pub fn add_validator(
        &mut self,
        address: ValidatorAddress,
        stake: u128,
        now: Timestamp,
    ) -> Result<(), ConsensusError> {
        self.pool.deposit_stake(address.clone(), stake, now)?;
        self.pool.activate(&address)?;
        tracing::info!(%address, stake, "validator activated");
        Ok(())
    }

    pub fn remove_validator(&mut self, address: &ValidatorAddress) -> Option<Validator> {
        self.pool.remove_validator(address)
    }

    // ── Synchronized parameters ─────────────────────────────────────────

    /// Every stage's local copy of `kind`.
    pub fn parameter_readings(&self, kind: ParameterKind) -> Vec<StageReading> {
        match kind {
            ParameterKind::MinStake => vec![StageReading {
                stage: Stage::ValidatorPool,
                value: self.pool.min_stake(),
                live: !self.pool.is_halted(),
            }],
            ParameterKind::Difficulty => vec![StageReading {
                stage: Stage::Finalizer,
                value: self.finalizer.difficulty() as u128,
                live: !self.finalizer.is_halted(),
            }],
        }
    }

    /// Push a registry value into the stage holding `kind`. Returns the value
    /// the stage actually holds afterwards (difficulty is clamped).
    pub fn apply_parameter(&mut self, kind: ParameterKind, value: u128) -> u128 {
        match kind {
            ParameterKind::MinStake => {
                self.pool.set_min_stake(value);
                value
            }
            ParameterKind::Difficulty => {
                let value = u64::try_from(value).unwrap_or(u64::MAX);
                self.finalizer.set_difficulty(value) as u128
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ConsensusParams {
        ConsensusParams {
            initial_difficulty: 0xf000_0000_0000_0000,
            ..ConsensusParams::default()
        }
    }

    fn engine_with_validators(names: &[&str]) -> ConsensusEngine {
        let mut engine = ConsensusEngine::new(params());
        for name in names {
            engine
                .add_validator(ValidatorAddress::new(*name), 1_000, Timestamp::new(0))
                .unwrap();
        }
        engine
    }

    #[test]
    fn empty_mempool_advances_cycle_only() {
        let mut engine = engine_with_validators(&["val-a"]);
        assert!(!engine.process_transactions(Timestamp::new(1)));
        assert_eq!(engine.cycle(), 1);
        assert!(engine.validated_sub_blocks().is_empty());
        assert_eq!(engine.network_health(), 1.0);
    }

    #[test]
    fn transactions_become_a_sub_block() {
        let mut engine = engine_with_validators(&["val-a", "val-b"]);
        engine.submit_transaction(b"tx-1".to_vec(), Timestamp::new(1));
        engine.submit_transaction(b"tx-2".to_vec(), Timestamp::new(1));

        assert!(engine.process_transactions(Timestamp::new(2)));
        assert_eq!(engine.pending_transactions(), 0);

        let sub_blocks = engine.validated_sub_blocks();
        assert_eq!(sub_blocks.len(), 1);
        assert_eq!(sub_blocks[0].transactions.len(), 2);

        let proof = sub_blocks[0].proof.hash;
        assert_eq!(
            engine.validator_for_proof(&proof),
            Some(&sub_blocks[0].validator)
        );
        assert_eq!(engine.sequencer().queued(), 0);
    }

    #[test]
    fn no_validators_fails_cycle_and_requeues() {
        let mut engine = ConsensusEngine::new(params());
        engine.submit_transaction(b"tx-1".to_vec(), Timestamp::new(1));

        assert!(!engine.process_transactions(Timestamp::new(2)));
        assert_eq!(engine.pending_transactions(), 1);
        assert_eq!(engine.network_health(), 0.0);
        assert_eq!(engine.cycle(), 1);
    }

    #[test]
    fn stale_failures_age_out_of_health() {
        let mut engine = ConsensusEngine::new(ConsensusParams {
            health_window_secs: 60,
            ..params()
        });
        engine.submit_transaction(b"tx-1".to_vec(), Timestamp::new(1));
        assert!(!engine.process_transactions(Timestamp::new(10)));
        assert_eq!(engine.network_health(), 0.0);

        assert_eq!(engine.expire_health_outcomes(Timestamp::new(69)), 0);
        assert_eq!(engine.network_health(), 0.0);
        assert_eq!(engine.expire_health_outcomes(Timestamp::new(70)), 1);
        assert_eq!(engine.network_health(), 1.0);

        assert!(!engine.process_transactions(Timestamp::new(100)));
        assert_eq!(engine.network_health(), 0.0);

        // expiry also runs at the start of every cycle
        engine
            .add_validator(ValidatorAddress::new("val-a"), 1_000, Timestamp::new(0))
            .unwrap();
        assert!(engine.process_transactions(Timestamp::new(200)));
        assert_eq!(engine.network_health(), 1.0);
    }

    #[test]
    fn sub_block_size_is_capped() {
        let mut engine = ConsensusEngine::new(ConsensusParams {
            max_transactions_per_sub_block: 3,
            ..params()
        });
        engine
            .add_validator(ValidatorAddress::new("val-a"), 1_000, Timestamp::new(0))
            .unwrap();
        for i in 0..5u8 {
            engine.submit_transaction(vec![i], Timestamp::new(1));
        }
        assert!(engine.process_transactions(Timestamp::new(2)));
        assert_eq!(engine.validated_sub_blocks()[0].transactions.len(), 3);
        assert_eq!(engine.pending_transactions(), 2);
    }

    #[test]
    fn halted_sequencer_stops_sub_blocks() {
        let mut engine = engine_with_validators(&["val-a"]);
        engine.stage_mut(Stage::Sequencer).halt().unwrap();
        engine.submit_transaction(b"tx".to_vec(), Timestamp::new(1));

        assert!(!engine.process_transactions(Timestamp::new(2)));
        assert_eq!(engine.pending_transactions(), 1);
        assert!(engine.stage(Stage::Sequencer).is_halted());
    }

    #[test]
    fn finalize_requires_full_batch() {
        let mut engine = engine_with_validators(&["val-a"]);
        engine.submit_transaction(b"tx".to_vec(), Timestamp::new(1));
        engine.process_transactions(Timestamp::new(2));

        assert!(!engine.finalize_block(Timestamp::new(3)));
        assert!(engine.blocks().is_empty());
        assert!(engine.validate_chain());
        assert!(engine.revalidate_latest_block());
    }

    #[test]
    fn parameter_readings_follow_halt_state() {
        let mut engine = engine_with_validators(&["val-a"]);
        let readings = engine.parameter_readings(ParameterKind::MinStake);
        assert_eq!(readings.len(), 1);
        assert!(readings[0].live);
        assert_eq!(readings[0].value, 1_000);

        engine.stage_mut(Stage::ValidatorPool).halt().unwrap();
        assert!(!engine.parameter_readings(ParameterKind::MinStake)[0].live);
    }

    #[test]
    fn apply_parameter_clamps_difficulty() {
        let mut engine = ConsensusEngine::new(params());
        let max = engine.finalizer().bounds().max;
        assert_eq!(
            engine.apply_parameter(ParameterKind::Difficulty, u128::MAX),
            max as u128
        );
        assert_eq!(engine.apply_parameter(ParameterKind::MinStake, 1_500), 1_500);
        assert_eq!(engine.pool().min_stake(), 1_500);
    }

    #[test]
    fn stage_loads_in_pipeline_order() {
        let engine = engine_with_validators(&["val-a"]);
        let stages: Vec<Stage> = engine.stage_loads().iter().map(|(s, _)| *s).collect();
        assert_eq!(stages, Stage::ALL.to_vec());
    }
}
