//! Prometheus metrics for the Helix node.
//!
//! [`NodeMetrics`] owns a dedicated [`Registry`]; counters are bumped by the
//! periodic tasks as events happen, gauges are refreshed from engine state on
//! the metrics tick.

use prometheus::{
    register_gauge_with_registry, register_histogram_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry, Encoder, Gauge,
    Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};

pub struct NodeMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    pub sub_blocks_certified: IntCounter,
    pub blocks_finalized: IntCounter,
    /// Cycles that had work but produced no sub-block.
    pub failed_cycles: IntCounter,
    pub validator_rotations: IntCounter,
    pub validator_rewards: IntCounter,
    pub validator_penalties: IntCounter,
    pub forks_detected: IntCounter,
    pub forks_resolved: IntCounter,
    pub emergency_shutdowns: IntCounter,
    pub gossip_propagated: IntCounter,
    /// Oversize, duplicate, peerless or channel-refused messages.
    pub gossip_rejected: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub active_validators: IntGauge,
    pub min_stake: IntGauge,
    pub difficulty: IntGauge,
    /// Network health scaled by 1000 (`950` = 0.95).
    pub network_health_permille: IntGauge,
    /// Hashes per second implied by the last mined block.
    pub estimated_hashrate: Gauge,

    // ── Histograms ──────────────────────────────────────────────────────
    pub finalization_time_ms: Histogram,
}

impl NodeMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        // Counters
        let sub_blocks_certified = register_int_counter_with_registry!(
            Opts::new(
                "helix_sub_blocks_certified_total",
                "Sub-blocks certified by the validator pool"
            ),
            registry
        )
        .expect("failed to register sub_blocks_certified counter");

        let blocks_finalized = register_int_counter_with_registry!(
            Opts::new("helix_blocks_finalized_total", "Blocks sealed by proof-of-work"),
            registry
        )
        .expect("failed to register blocks_finalized counter");

        let failed_cycles = register_int_counter_with_registry!(
            Opts::new(
                "helix_failed_cycles_total",
                "Sub-block cycles that failed to certify"
            ),
            registry
        )
        .expect("failed to register failed_cycles counter");

        let validator_rotations = register_int_counter_with_registry!(
            Opts::new("helix_validator_rotations_total", "Validators rotated out"),
            registry
        )
        .expect("failed to register validator_rotations counter");

        let validator_rewards = register_int_counter_with_registry!(
            Opts::new("helix_validator_rewards_total", "Validator rewards paid"),
            registry
        )
        .expect("failed to register validator_rewards counter");

        let validator_penalties = register_int_counter_with_registry!(
            Opts::new("helix_validator_penalties_total", "Validator penalties applied"),
            registry
        )
        .expect("failed to register validator_penalties counter");

        let forks_detected = register_int_counter_with_registry!(
            Opts::new("helix_forks_detected_total", "Chain validation failures"),
            registry
        )
        .expect("failed to register forks_detected counter");

        let forks_resolved = register_int_counter_with_registry!(
            Opts::new("helix_forks_resolved_total", "Forks resolved by re-validation"),
            registry
        )
        .expect("failed to register forks_resolved counter");

        let emergency_shutdowns = register_int_counter_with_registry!(
            Opts::new("helix_emergency_shutdowns_total", "Emergency pipeline shutdowns"),
            registry
        )
        .expect("failed to register emergency_shutdowns counter");

        let gossip_propagated = register_int_counter_with_registry!(
            Opts::new("helix_gossip_propagated_total", "Gossip messages propagated"),
            registry
        )
        .expect("failed to register gossip_propagated counter");

        let gossip_rejected = register_int_counter_with_registry!(
            Opts::new(
                "helix_gossip_rejected_total",
                "Gossip messages dropped or only partly sent"
            ),
            registry
        )
        .expect("failed to register gossip_rejected counter");

        // Gauges
        let active_validators = register_int_gauge_with_registry!(
            Opts::new("helix_active_validators", "Validators in the active pool"),
            registry
        )
        .expect("failed to register active_validators gauge");

        let min_stake = register_int_gauge_with_registry!(
            Opts::new("helix_min_stake", "Current minimum-stake registry value"),
            registry
        )
        .expect("failed to register min_stake gauge");

        let difficulty = register_int_gauge_with_registry!(
            Opts::new(
                "helix_difficulty_bits",
                "Leading-one bits of the current difficulty registry value"
            ),
            registry
        )
        .expect("failed to register difficulty gauge");

        let network_health_permille = register_int_gauge_with_registry!(
            Opts::new(
                "helix_network_health_permille",
                "Successful cycle ratio over the health window, times 1000"
            ),
            registry
        )
        .expect("failed to register network_health gauge");

        let estimated_hashrate = register_gauge_with_registry!(
            Opts::new(
                "helix_estimated_hashrate",
                "Hashes per second implied by the last mined block"
            ),
            registry
        )
        .expect("failed to register estimated_hashrate gauge");

        // 1 ms → ~65 s
        let finalization_time_ms = register_histogram_with_registry!(
            HistogramOpts::new(
                "helix_finalization_time_ms",
                "Proof-of-work finalization time in milliseconds"
            )
            .buckets(prometheus::exponential_buckets(1.0, 2.0, 17).unwrap()),
            registry
        )
        .expect("failed to register finalization_time_ms histogram");

        Self {
            registry,
            sub_blocks_certified,
            blocks_finalized,
            failed_cycles,
            validator_rotations,
            validator_rewards,
            validator_penalties,
            forks_detected,
            forks_resolved,
            emergency_shutdowns,
            gossip_propagated,
            gossip_rejected,
            active_validators,
            min_stake,
            difficulty,
            network_health_permille,
            estimated_hashrate,
            finalization_time_ms,
        }
    }

    /// Set the difficulty gauge. Difficulty spans the whole `u64` range, so it
    /// is exported as its count of leading one bits.
    pub fn set_difficulty(&self, difficulty: u64) {
        self.difficulty.set(difficulty.leading_ones() as i64);
    }

    pub fn set_min_stake(&self, min_stake: u128) {
        self.min_stake.set(i64::try_from(min_stake).unwrap_or(i64::MAX));
    }

    pub fn set_network_health(&self, health: f64) {
        self.network_health_permille
            .set((health.clamp(0.0, 1.0) * 1000.0).round() as i64);
    }

    /// Prometheus text exposition of every metric.
    pub fn encode(&self) -> String {
        let mut buf = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buf) {
            tracing::warn!(error = %e, "metrics encoding failed");
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}
