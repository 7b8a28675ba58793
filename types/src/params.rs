//! Consensus parameters — every tunable threshold of the pipeline and its
//! supervisors.
//!
//! The two arbitrated values (minimum stake and mining difficulty) only seed
//! their registries here; after startup they change exclusively through
//! registry change requests.

use serde::{Deserialize, Serialize};

/// All consensus parameters known to a node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusParams {
    // ── Parameter registries ────────────────────────────────────────────
    /// Starting value of the minimum-stake registry.
    pub initial_min_stake: u128,

    /// Starting value of the difficulty registry. Work passes when
    /// `work_value >= difficulty`, so larger is harder.
    pub initial_difficulty: u64,

    /// Lower bound the finalizer clamps its difficulty to.
    pub min_difficulty: u64,

    /// Upper bound the finalizer clamps its difficulty to.
    pub max_difficulty: u64,

    /// Requests at or above this priority bypass the raise-only rule.
    pub override_priority: u8,

    /// Priority of the periodic reconciliation pass (below override).
    pub reconciliation_priority: u8,

    /// Priority of elasticity-driven difficulty steps.
    pub elasticity_priority: u8,

    // ── Sequencer (PoH) ─────────────────────────────────────────────────
    /// Number of recent proofs retained for re-validation.
    pub proof_history: usize,

    /// Sequencing lanes at startup.
    pub sequencer_workers: usize,

    /// Upper bound on sequencing lanes the elasticity monitor may add.
    pub sequencer_max_workers: usize,

    /// Queued events one lane absorbs before it counts as fully loaded.
    pub sequencer_capacity_per_worker: usize,

    // ── Validator pool (PoS) ────────────────────────────────────────────
    /// Certifications per scoring window at which a validator is fully loaded.
    pub assignment_capacity: u64,

    /// Transactions taken from the mempool per sub-block.
    pub max_transactions_per_sub_block: usize,

    // ── Finalizer (PoW) ─────────────────────────────────────────────────
    /// Mining time considered nominal load, in milliseconds.
    pub target_block_time_ms: u64,

    // ── Validator lifecycle ─────────────────────────────────────────────
    /// Score at or above which a validator is rewarded.
    pub reward_threshold: f64,

    /// Score below which a validator is penalized.
    pub penalty_threshold: f64,

    /// Score below which a validator is rotated out of the active pool.
    pub min_performance: f64,

    /// Load above which a validator is rotated out of the active pool.
    pub max_validator_load: f64,

    /// Tokens credited per reward.
    pub reward_amount: u128,

    /// Stake slashed per penalty.
    pub penalty_amount: u128,

    /// How long a punishment record counts against a validator, in seconds.
    pub punishment_window_secs: u64,

    // ── Supervisors ─────────────────────────────────────────────────────
    /// Network health below which the emergency controller shuts down.
    pub health_threshold: f64,

    /// Number of recent cycles the network-health ratio is computed over.
    pub health_window: usize,

    /// Age in seconds after which a cycle outcome drops out of the
    /// network-health ratio. With every outcome expired the ratio reads
    /// `1.0` again, which is what lets an emergency shutdown lift on its own.
    pub health_window_secs: u64,

    /// Average finalization time above which the node reports unhealthy.
    pub max_finalization_ms: u64,

    /// Stage load above which the elasticity monitor intervenes.
    pub elasticity_threshold: f64,

    /// Fixed increment applied to difficulty by the elasticity monitor.
    pub difficulty_step: u64,

    // ── Gossip / shards ─────────────────────────────────────────────────
    /// Largest gossip message accepted for propagation, in bytes.
    pub max_message_size: usize,

    /// Peer-connection cap.
    pub max_peers: usize,

    /// Most items handled per gossip or shard poll.
    pub max_batch: usize,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            initial_min_stake: 1_000,
            // 1 in 256 hashes passes.
            initial_difficulty: 0xff00_0000_0000_0000,
            min_difficulty: 0,
            // 1 in 2^24 hashes passes.
            max_difficulty: 0xffff_ff00_0000_0000,
            override_priority: 100,
            reconciliation_priority: 90,
            elasticity_priority: 50,

            proof_history: 4_096,
            sequencer_workers: 1,
            sequencer_max_workers: 8,
            sequencer_capacity_per_worker: 10_000,

            assignment_capacity: 1_000,
            max_transactions_per_sub_block: 256,

            target_block_time_ms: 10_000,

            reward_threshold: 0.9,
            penalty_threshold: 0.6,
            min_performance: 0.5,
            max_validator_load: 0.9,
            reward_amount: 10,
            penalty_amount: 5,
            punishment_window_secs: 24 * 3600,

            health_threshold: 0.9,
            health_window: 100,
            health_window_secs: 300,
            max_finalization_ms: 60_000,
            elasticity_threshold: 0.8,
            difficulty_step: 1 << 52,

            max_message_size: 1024 * 1024,
            max_peers: 50,
            max_batch: 100,
        }
    }
}
