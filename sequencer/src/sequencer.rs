//! The PoH sequencer stage.

use std::collections::{HashSet, VecDeque};

use helix_crypto::{blake2b_256, blake2b_256_multi};
use helix_types::{
    ConsensusParams, PipelineStage, Proof, ProofHash, Stage, StageError, Timestamp,
};

use crate::SequencerError;

/// Hash committing a proof to its predecessor, position, time and data.
pub fn proof_hash(
    previous: &ProofHash,
    sequence: u64,
    timestamp: Timestamp,
    data_hash: &[u8; 32],
) -> ProofHash {
    ProofHash::new(blake2b_256_multi(&[
        previous.as_bytes(),
        &sequence.to_le_bytes(),
        &timestamp.as_secs().to_le_bytes(),
        data_hash,
    ]))
}

pub struct Sequencer {
    last_hash: ProofHash,
    last_timestamp: Timestamp,
    sequence: u64,
    /// Bounded window of recent proofs, oldest first.
    recent: VecDeque<Proof>,
    history: usize,
    /// Proofs marked invalid, bounded like the history; oldest marks are
    /// forgotten first.
    invalid: HashSet<ProofHash>,
    invalid_order: VecDeque<ProofHash>,
    halted: bool,
    timestamps_halted: bool,
    queued: usize,
    workers: usize,
    max_workers: usize,
    capacity_per_worker: usize,
}

impl Sequencer {
    pub fn new(params: &ConsensusParams) -> Self {
        Self {
            last_hash: ProofHash::ZERO,
            last_timestamp: Timestamp::EPOCH,
            sequence: 0,
            recent: VecDeque::with_capacity(params.proof_history.min(4_096)),
            history: params.proof_history.max(1),
            invalid: HashSet::new(),
            invalid_order: VecDeque::new(),
            halted: false,
            timestamps_halted: false,
            queued: 0,
            workers: params.sequencer_workers.max(1),
            max_workers: params.sequencer_max_workers.max(1),
            capacity_per_worker: params.sequencer_capacity_per_worker.max(1),
        }
    }

    /// Extend the hash chain with a proof for `data`.
    ///
    /// Timestamps never go backwards: a clock reading older than the last
    /// proof is replaced by the last proof's timestamp.
    pub fn generate_proof(&mut self, data: &[u8], now: Timestamp) -> Result<Proof, SequencerError> {
        if self.halted {
            return Err(StageError::Halted(Stage::Sequencer).into());
        }
        if self.timestamps_halted {
            return Err(SequencerError::TimestampsHalted);
        }

        let timestamp = now.max(self.last_timestamp);
        let sequence = self.sequence + 1;
        let data_hash = blake2b_256(data);
        let hash = proof_hash(&self.last_hash, sequence, timestamp, &data_hash);

        let proof = Proof {
            hash,
            sequence,
            timestamp,
            previous: self.last_hash,
            data_hash,
        };

        self.sequence = sequence;
        self.last_hash = hash;
        self.last_timestamp = timestamp;
        self.recent.push_back(proof.clone());
        while self.recent.len() > self.history {
            self.recent.pop_front();
        }

        tracing::trace!(sequence, %hash, "proof generated");
        Ok(proof)
    }

    /// Re-derive a proof's hash and check it has not been marked invalid.
    pub fn validate_proof(&self, proof: &Proof) -> bool {
        if proof.sequence == 0 || self.invalid.contains(&proof.hash) {
            return false;
        }
        proof_hash(&proof.previous, proof.sequence, proof.timestamp, &proof.data_hash)
            == proof.hash
    }

    /// Mark a proof invalid. Returns `false` if it was already marked.
    pub fn mark_invalid(&mut self, hash: ProofHash) -> bool {
        let newly = self.invalid.insert(hash);
        if newly {
            tracing::warn!(%hash, "proof marked invalid");
            self.invalid_order.push_back(hash);
            while self.invalid_order.len() > self.history {
                if let Some(old) = self.invalid_order.pop_front() {
                    self.invalid.remove(&old);
                }
            }
        }
        newly
    }

    pub fn is_marked_invalid(&self, hash: &ProofHash) -> bool {
        self.invalid.contains(hash)
    }

    /// Up to `n` most recent proofs, oldest first.
    pub fn recent_proofs(&self, n: usize) -> Vec<Proof> {
        let skip = self.recent.len().saturating_sub(n);
        self.recent.iter().skip(skip).cloned().collect()
    }

    pub fn latest_proof(&self) -> Option<&Proof> {
        self.recent.back()
    }

    /// Current position in the sequence (0 before the first proof).
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Stop issuing timestamps without halting the stage.
    pub fn halt_timestamps(&mut self) {
        if !self.timestamps_halted {
            tracing::warn!(sequence = self.sequence, "proof timestamp generation halted");
        }
        self.timestamps_halted = true;
    }

    /// Returns `false` if timestamps were not halted.
    pub fn resume_timestamps(&mut self) -> bool {
        if !self.timestamps_halted {
            return false;
        }
        tracing::info!(sequence = self.sequence, "proof timestamp generation resumed");
        self.timestamps_halted = false;
        true
    }

    pub fn timestamps_halted(&self) -> bool {
        self.timestamps_halted
    }

    /// Record `n` events waiting to be sequenced.
    pub fn enqueue(&mut self, n: usize) {
        self.queued = self.queued.saturating_add(n);
    }

    /// Record `n` events taken off the queue.
    pub fn drain(&mut self, n: usize) {
        self.queued = self.queued.saturating_sub(n);
    }

    pub fn queued(&self) -> usize {
        self.queued
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Spread sequencing over one more lane. Returns `false` at the cap.
    pub fn add_worker(&mut self) -> bool {
        if self.workers >= self.max_workers {
            return false;
        }
        self.workers += 1;
        tracing::info!(workers = self.workers, "sequencer lane added");
        true
    }
}

impl PipelineStage for Sequencer {
    fn stage(&self) -> Stage {
        Stage::Sequencer
    }

    fn halt(&mut self) -> Result<(), StageError> {
        if self.halted {
            return Err(StageError::AlreadyHalted(Stage::Sequencer));
        }
        self.halted = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), StageError> {
        if !self.halted {
            return Err(StageError::NotHalted(Stage::Sequencer));
        }
        self.halted = false;
        Ok(())
    }

    fn is_halted(&self) -> bool {
        self.halted
    }

    fn load(&self) -> f64 {
        self.queued as f64 / (self.workers * self.capacity_per_worker) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequencer() -> Sequencer {
        Sequencer::new(&ConsensusParams::default())
    }

    #[test]
    fn proofs_form_a_chain() {
        let mut seq = sequencer();
        let a = seq.generate_proof(b"tx-a", Timestamp::new(10)).unwrap();
        let b = seq.generate_proof(b"tx-b", Timestamp::new(11)).unwrap();

        assert_eq!(a.sequence, 1);
        assert_eq!(a.previous, ProofHash::ZERO);
        assert_eq!(b.sequence, 2);
        assert_eq!(b.previous, a.hash);
        assert!(seq.validate_proof(&a));
        assert!(seq.validate_proof(&b));
    }

    #[test]
    fn timestamps_never_go_backwards() {
        let mut seq = sequencer();
        seq.generate_proof(b"a", Timestamp::new(100)).unwrap();
        let late = seq.generate_proof(b"b", Timestamp::new(90)).unwrap();
        assert_eq!(late.timestamp, Timestamp::new(100));
    }

    #[test]
    fn tampered_proof_fails_validation() {
        let mut seq = sequencer();
        let mut proof = seq.generate_proof(b"a", Timestamp::new(1)).unwrap();
        proof.timestamp = Timestamp::new(2);
        assert!(!seq.validate_proof(&proof));
    }

    #[test]
    fn marked_proof_fails_validation() {
        let mut seq = sequencer();
        let proof = seq.generate_proof(b"a", Timestamp::new(1)).unwrap();
        assert!(seq.mark_invalid(proof.hash));
        assert!(!seq.mark_invalid(proof.hash));
        assert!(!seq.validate_proof(&proof));
    }

    #[test]
    fn halted_stage_refuses_proofs() {
        let mut seq = sequencer();
        seq.halt().unwrap();
        assert!(matches!(
            seq.generate_proof(b"a", Timestamp::new(1)),
            Err(SequencerError::Stage(StageError::Halted(Stage::Sequencer)))
        ));
        assert_eq!(seq.halt(), Err(StageError::AlreadyHalted(Stage::Sequencer)));
        seq.resume().unwrap();
        assert_eq!(seq.resume(), Err(StageError::NotHalted(Stage::Sequencer)));
        assert!(seq.generate_proof(b"a", Timestamp::new(1)).is_ok());
    }

    #[test]
    fn halted_timestamps_refuse_proofs() {
        let mut seq = sequencer();
        seq.halt_timestamps();
        assert!(matches!(
            seq.generate_proof(b"a", Timestamp::new(1)),
            Err(SequencerError::TimestampsHalted)
        ));
        assert_eq!(seq.sequence(), 0);

        assert!(seq.resume_timestamps());
        assert!(!seq.resume_timestamps());
        assert!(seq.generate_proof(b"a", Timestamp::new(1)).is_ok());
    }

    #[test]
    fn invalid_marks_are_bounded() {
        let params = ConsensusParams {
            proof_history: 2,
            ..ConsensusParams::default()
        };
        let mut seq = Sequencer::new(&params);
        let proofs: Vec<Proof> = (0..3u8)
            .map(|i| seq.generate_proof(&[i], Timestamp::new(1)).unwrap())
            .collect();
        for proof in &proofs {
            seq.mark_invalid(proof.hash);
        }
        assert!(!seq.is_marked_invalid(&proofs[0].hash));
        assert!(seq.is_marked_invalid(&proofs[1].hash));
        assert!(seq.is_marked_invalid(&proofs[2].hash));
    }

    #[test]
    fn history_is_bounded() {
        let params = ConsensusParams {
            proof_history: 3,
            ..ConsensusParams::default()
        };
        let mut seq = Sequencer::new(&params);
        for i in 0..5u8 {
            seq.generate_proof(&[i], Timestamp::new(1)).unwrap();
        }
        let recent = seq.recent_proofs(10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].sequence, 3);
        assert_eq!(seq.latest_proof().unwrap().sequence, 5);
        assert_eq!(seq.recent_proofs(1)[0].sequence, 5);
    }

    #[test]
    fn load_tracks_queue_and_lanes() {
        let params = ConsensusParams {
            sequencer_capacity_per_worker: 10,
            sequencer_workers: 1,
            sequencer_max_workers: 2,
            ..ConsensusParams::default()
        };
        let mut seq = Sequencer::new(&params);
        seq.enqueue(9);
        assert!((seq.load() - 0.9).abs() < 1e-9);

        assert!(seq.add_worker());
        assert!(!seq.add_worker());
        assert!((seq.load() - 0.45).abs() < 1e-9);

        seq.drain(20);
        assert_eq!(seq.queued(), 0);
    }
}
