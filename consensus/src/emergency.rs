//! Emergency shutdown and resume.
//!
//! When network health drops below the threshold the controller halts all
//! three stages and freezes the ledger. It resumes once health recovers or an
//! operator forces it. Each stage is halted or resumed independently: one
//! stage failing does not stop the others. Resuming also lifts a security
//! halt on proof timestamps.

use helix_ledger::{status, AuditTrail, Ledger};
use helix_types::{ConsensusParams, Stage, StageError};

use crate::ConsensusEngine;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmergencyState {
    Running,
    ShutDown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmergencyAction {
    None,
    ShutDown,
    Resumed,
}

/// Per-stage results of a shutdown or resume.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransitionReport {
    pub succeeded: Vec<Stage>,
    pub failed: Vec<(Stage, StageError)>,
}

pub struct EmergencyController {
    state: EmergencyState,
    force_resume: bool,
    threshold: f64,
    trail: AuditTrail,
}

impl EmergencyController {
    pub fn new(params: &ConsensusParams, trail: AuditTrail) -> Self {
        Self {
            state: EmergencyState::Running,
            force_resume: false,
            threshold: params.health_threshold,
            trail,
        }
    }

    pub fn state(&self) -> EmergencyState {
        self.state
    }

    /// Resume on the next evaluation regardless of health.
    pub fn set_force_resume(&mut self) {
        tracing::info!("forced resume requested");
        self.force_resume = true;
    }

    pub fn force_resume_pending(&self) -> bool {
        self.force_resume
    }

    /// Shut down or resume depending on `health`.
    pub fn evaluate(&mut self, health: f64, engine: &mut ConsensusEngine, ledger: &mut Ledger) -> EmergencyAction {
        match self.state {
            EmergencyState::Running if health < self.threshold => {
                tracing::error!(health, threshold = self.threshold, "network health critical");
                self.shutdown(engine, ledger);
                EmergencyAction::ShutDown
            }
            EmergencyState::ShutDown if health >= self.threshold || self.force_resume => {
                tracing::info!(health, forced = self.force_resume, "resuming after emergency");
                self.resume(engine, ledger);
                EmergencyAction::Resumed
            }
            _ => EmergencyAction::None,
        }
    }

    /// Halt every stage, record the shutdown, then freeze the ledger.
    pub fn shutdown(&mut self, engine: &mut ConsensusEngine, ledger: &mut Ledger) -> TransitionReport {
        let mut report = TransitionReport::default();

        for stage in Stage::ALL {
            match engine.stage_mut(stage).halt() {
                Ok(()) => {
                    tracing::warn!(%stage, "stage halted");
                    self.trail.log(ledger, "StageHalt", status::COMPLETED, Some(stage.to_string()));
                    report.succeeded.push(stage);
                }
                Err(e) => {
                    tracing::error!(%stage, error = %e, "stage halt failed");
                    self.trail.log(
                        ledger,
                        "StageHalt",
                        status::FAILED,
                        Some(format!("{stage}: {e}")),
                    );
                    report.failed.push((stage, e));
                }
            }
        }

        self.trail.log(
            ledger,
            "EmergencyShutdown",
            status::COMPLETED,
            Some(format!("halted={} failed={}", report.succeeded.len(), report.failed.len())),
        );
        ledger.freeze();
        self.state = EmergencyState::ShutDown;
        report
    }

    /// Unfreeze the ledger, resume stages in pipeline order, then lift any
    /// timestamp halt on the sequencer.
    pub fn resume(&mut self, engine: &mut ConsensusEngine, ledger: &mut Ledger) -> TransitionReport {
        ledger.unfreeze();
        let mut report = TransitionReport::default();

        for stage in Stage::ALL {
            match engine.stage_mut(stage).resume() {
                Ok(()) => {
                    tracing::info!(%stage, "stage resumed");
                    self.trail.log(ledger, "StageResume", status::COMPLETED, Some(stage.to_string()));
                    report.succeeded.push(stage);
                }
                Err(e) => {
                    tracing::warn!(%stage, error = %e, "stage resume failed");
                    self.trail.log(
                        ledger,
                        "StageResume",
                        status::FAILED,
                        Some(format!("{stage}: {e}")),
                    );
                    report.failed.push((stage, e));
                }
            }
        }

        if engine.sequencer_mut().resume_timestamps() {
            self.trail.log(
                ledger,
                "TimestampResume",
                status::COMPLETED,
                Some("emergency resume".into()),
            );
        }

        self.trail.log(
            ledger,
            "EmergencyResume",
            status::COMPLETED,
            Some(format!("resumed={} failed={}", report.succeeded.len(), report.failed.len())),
        );
        self.force_resume = false;
        self.state = EmergencyState::Running;
        report
    }
}
