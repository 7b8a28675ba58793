//! Periodic health verdict.
//!
//! Combines finalization latency, mean validator performance and difficulty
//! bounds into one boolean verdict, and records the full report in the
//! ledger.

use std::time::Duration;

use serde::Serialize;

use helix_consensus::{score, ConsensusEngine};
use helix_ledger::{status, AuditTrail, Ledger};
use helix_types::{ConsensusParams, Timestamp};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub timestamp: Timestamp,
    pub network_health: f64,
    /// `None` before the first block.
    pub average_finalization_ms: Option<u64>,
    pub finalization_ok: bool,
    /// `None` with no active validators.
    pub mean_validator_score: Option<f64>,
    pub performance_ok: bool,
    pub difficulty: u64,
    pub difficulty_ok: bool,
    /// Hashes per second implied by the last mined block; `0.0` before the
    /// first one.
    pub estimated_hashrate: f64,
}

pub struct HealthMonitor {
    trail: AuditTrail,
    max_finalization: Duration,
    min_performance: f64,
    last: Option<HealthReport>,
}

impl HealthMonitor {
    pub fn new(params: &ConsensusParams, trail: AuditTrail) -> Self {
        Self {
            trail,
            max_finalization: Duration::from_millis(params.max_finalization_ms),
            min_performance: params.min_performance,
            last: None,
        }
    }

    pub fn last_report(&self) -> Option<&HealthReport> {
        self.last.as_ref()
    }

    pub fn check(
        &mut self,
        engine: &ConsensusEngine,
        min_stake: u128,
        ledger: &mut Ledger,
        now: Timestamp,
    ) -> HealthReport {
        let average = engine.average_finalization_time();
        let finalization_ok = average.map_or(true, |avg| avg <= self.max_finalization);

        let active = engine.active_validators();
        let mean_validator_score = if active.is_empty() {
            None
        } else {
            let total: f64 = active.iter().map(|v| score(v, min_stake)).sum();
            Some(total / active.len() as f64)
        };
        let performance_ok = mean_validator_score.map_or(true, |s| s >= self.min_performance);

        let finalizer = engine.finalizer();
        let difficulty = finalizer.difficulty();
        let difficulty_ok = finalizer.bounds().contains(difficulty);
        let estimated_hashrate = finalizer.estimated_hashrate();

        let report = HealthReport {
            healthy: finalization_ok && performance_ok && difficulty_ok,
            timestamp: now,
            network_health: engine.network_health(),
            average_finalization_ms: average.map(|d| d.as_millis() as u64),
            finalization_ok,
            mean_validator_score,
            performance_ok,
            difficulty,
            difficulty_ok,
            estimated_hashrate,
        };

        if report.healthy {
            tracing::debug!(
                network_health = report.network_health,
                estimated_hashrate,
                "health check passed"
            );
        } else {
            tracing::warn!(
                finalization_ok,
                performance_ok,
                difficulty_ok,
                ?mean_validator_score,
                "node unhealthy"
            );
        }

        let details = serde_json::to_string(&report).ok();
        let entry_status = if report.healthy {
            status::COMPLETED
        } else {
            status::FAILED
        };
        self.trail.log(ledger, "HealthReport", entry_status, details);

        self.last = Some(report.clone());
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helix_types::ValidatorAddress;

    fn monitor() -> HealthMonitor {
        HealthMonitor::new(&ConsensusParams::default(), AuditTrail::plain("health"))
    }

    #[test]
    fn idle_engine_is_healthy() {
        let engine = ConsensusEngine::new(ConsensusParams::default());
        let mut ledger = Ledger::new();
        let report = monitor().check(&engine, 1_000, &mut ledger, Timestamp::new(1));

        assert!(report.healthy);
        assert_eq!(report.mean_validator_score, None);
        assert_eq!(report.average_finalization_ms, None);
        assert_eq!(report.estimated_hashrate, 0.0);
        assert_eq!(ledger.of_type("HealthReport").count(), 1);
    }

    #[test]
    fn poor_validators_make_node_unhealthy() {
        let mut engine = ConsensusEngine::new(ConsensusParams::default());
        let addr = ValidatorAddress::new("slow");
        engine.add_validator(addr.clone(), 1_000, Timestamp::new(0)).unwrap();
        engine.pool_mut().set_uptime(&addr, 0.0).unwrap();
        let mut ledger = Ledger::new();
        let mut monitor = monitor();

        // score = 0.3 + 0.2 × (1000 / 10_000)
        let report = monitor.check(&engine, 10_000, &mut ledger, Timestamp::new(1));
        assert!(!report.performance_ok);
        assert!(!report.healthy);

        let record = ledger.latest_of_type("HealthReport").unwrap();
        let entry = monitor.trail.open(record).unwrap();
        assert_eq!(entry.status, "Failed");
        assert!(entry.details.unwrap().contains("\"performance_ok\":false"));
        assert_eq!(monitor.last_report(), Some(&report));
    }

    #[test]
    fn report_is_sealed_with_a_key() {
        let engine = ConsensusEngine::new(ConsensusParams::default());
        let mut ledger = Ledger::new();
        let mut monitor = HealthMonitor::new(
            &ConsensusParams::default(),
            AuditTrail::from_master_key("health", Some(&[3u8; 32]), true),
        );
        monitor.check(&engine, 1_000, &mut ledger, Timestamp::new(1));
        assert!(ledger.latest_of_type("HealthReport").unwrap().is_sealed());
    }
}
