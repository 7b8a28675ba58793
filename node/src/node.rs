//! Helix node: the consensus engine plus its supervisory tasks.
//!
//! Shared state lives behind tokio locks and is always taken in the order
//! engine → parameter registries → supervisor state → ledger. Every
//! supervisor runs as its own periodic task under a [`TaskSupervisor`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex, RwLock};

use helix_consensus::{
    ChangeRequest, ConsensusEngine, Decision, DifficultyRegistry, EmergencyAction,
    EmergencyController, EmergencyState, ForkCheck, ForkResolver, LifecycleManager, ParameterKind,
    ParameterValue, PunishmentTracker, Rotation, StakeRegistry,
};
use helix_ledger::{status, AuditTrail, Ledger};
use helix_network::{GossipOutcome, GossipPropagator, OutboundMessage, ShardId, ShardOutcome, ShardRegistry};
use helix_types::{BlockHash, Timestamp, TxHash, ValidatorAddress};

use crate::supervisor::SHUTDOWN_TIMEOUT;
use crate::{
    ElasticityMonitor, HealthMonitor, HealthReport, NodeConfig, NodeError, NodeMetrics,
    SecurityMonitor, ShutdownController, TaskSupervisor,
};

/// Compact gossip payload announcing a newly finalized block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockAnnouncement {
    pub shard: ShardId,
    pub height: u64,
    pub hash: BlockHash,
    pub previous: BlockHash,
    pub difficulty: u64,
    pub nonce: u64,
    pub timestamp: Timestamp,
}

/// Handles shared by every periodic task.
#[derive(Clone)]
struct NodeContext {
    shard_id: ShardId,
    max_batch: usize,
    engine: Arc<RwLock<ConsensusEngine>>,
    ledger: Arc<Mutex<Ledger>>,
    stake_registry: Arc<Mutex<StakeRegistry>>,
    difficulty_registry: Arc<Mutex<DifficultyRegistry>>,
    punishments: Arc<Mutex<PunishmentTracker>>,
    lifecycle: Arc<LifecycleManager>,
    fork_resolver: Arc<Mutex<ForkResolver>>,
    emergency: Arc<Mutex<EmergencyController>>,
    health: Arc<Mutex<HealthMonitor>>,
    security: Arc<SecurityMonitor>,
    elasticity: Arc<ElasticityMonitor>,
    gossip: Arc<Mutex<GossipPropagator>>,
    shards: Arc<Mutex<ShardRegistry>>,
    metrics: Arc<NodeMetrics>,
    /// Node-level entries: parameter decisions, gossip and shard outcomes.
    trail: Arc<AuditTrail>,
}

pub struct HelixNode {
    pub config: NodeConfig,
    pub metrics: Arc<NodeMetrics>,
    pub shutdown: Arc<ShutdownController>,
    ctx: NodeContext,
    supervisor: TaskSupervisor,
    outbound_rx: Option<mpsc::Receiver<OutboundMessage>>,
    started: bool,
}

impl HelixNode {
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        let params = config.consensus_params()?;
        let master_key = config.ledger_master_key()?;
        if config.encrypt_ledger && master_key.is_none() {
            tracing::warn!("ledger encryption required but no ledger_key configured; ledger writes will be skipped");
        }
        let trail = |component: &str| {
            AuditTrail::from_master_key(component, master_key.as_ref(), config.encrypt_ledger)
        };

        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_buffer.max(1));
        let metrics = Arc::new(NodeMetrics::new());
        let shutdown = Arc::new(ShutdownController::new());

        let ctx = NodeContext {
            shard_id: config.shard_id,
            max_batch: params.max_batch.max(1),
            stake_registry: Arc::new(Mutex::new(StakeRegistry::new(
                ParameterKind::MinStake,
                params.initial_min_stake,
                params.override_priority,
                params.reconciliation_priority,
            ))),
            difficulty_registry: Arc::new(Mutex::new(DifficultyRegistry::new(
                ParameterKind::Difficulty,
                params.initial_difficulty,
                params.override_priority,
                params.reconciliation_priority,
            ))),
            punishments: Arc::new(Mutex::new(PunishmentTracker::new(params.punishment_window_secs))),
            lifecycle: Arc::new(LifecycleManager::new(&params, trail("lifecycle"))),
            fork_resolver: Arc::new(Mutex::new(ForkResolver::new(trail("fork")))),
            emergency: Arc::new(Mutex::new(EmergencyController::new(&params, trail("emergency")))),
            health: Arc::new(Mutex::new(HealthMonitor::new(&params, trail("health")))),
            security: Arc::new(SecurityMonitor::new(&params, trail("security"))),
            elasticity: Arc::new(ElasticityMonitor::new(&params, trail("elasticity"))),
            gossip: Arc::new(Mutex::new(GossipPropagator::new(outbound_tx, &params))),
            shards: Arc::new(Mutex::new(ShardRegistry::new())),
            metrics: Arc::clone(&metrics),
            trail: Arc::new(trail("node")),
            ledger: Arc::new(Mutex::new(Ledger::new())),
            engine: Arc::new(RwLock::new(ConsensusEngine::new(params))),
        };

        Ok(Self {
            config,
            metrics,
            supervisor: TaskSupervisor::new(Arc::clone(&shutdown)),
            shutdown,
            ctx,
            outbound_rx: Some(outbound_rx),
            started: false,
        })
    }

    pub fn engine(&self) -> Arc<RwLock<ConsensusEngine>> {
        Arc::clone(&self.ctx.engine)
    }

    pub fn ledger(&self) -> Arc<Mutex<Ledger>> {
        Arc::clone(&self.ctx.ledger)
    }

    /// Receiver of `(peer, bytes)` pairs for the transport layer. Can be
    /// taken once.
    pub fn take_outbound(&mut self) -> Option<mpsc::Receiver<OutboundMessage>> {
        self.outbound_rx.take()
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.supervisor.task_names()
    }

    /// Register the local shard and spawn every periodic task.
    pub async fn start(&mut self) -> Result<(), NodeError> {
        if self.started {
            return Err(NodeError::AlreadyStarted);
        }
        self.started = true;

        let c = &self.config;
        tracing::info!(
            shard = c.shard_id,
            cycle_ms = c.cycle_interval_ms,
            encrypt_ledger = c.encrypt_ledger,
            "Helix node starting"
        );

        self.ctx.shards.lock().await.request_registration(c.shard_id)?;

        let secs = Duration::from_secs;
        let schedule: [(&'static str, Duration); 9] = [
            ("consensus-cycle", c.cycle_interval()),
            ("gossip", secs(c.gossip_interval_secs.max(1))),
            ("emergency", secs(c.emergency_interval_secs.max(1))),
            ("elasticity", secs(c.elasticity_interval_secs.max(1))),
            ("health", secs(c.health_interval_secs.max(1))),
            ("parameter-sync", secs(c.parameter_sync_interval_secs.max(1))),
            ("fork-check", secs(c.fork_check_interval_secs.max(1))),
            ("lifecycle", secs(c.lifecycle_interval_secs.max(1))),
            ("security", secs(c.security_interval_secs.max(1))),
        ];
        for (name, period) in schedule {
            let ctx = self.ctx.clone();
            self.supervisor.spawn_periodic(name, period, move || {
                let ctx = ctx.clone();
                async move { ctx.run_tick(name).await }
            });
        }

        let ctx = self.ctx.clone();
        self.supervisor.spawn_periodic(
            "punishment-prune",
            secs(c.punishment_prune_interval_secs.max(1)),
            move || {
                let ctx = ctx.clone();
                async move {
                    let pruned = ctx.punishments.lock().await.prune(Timestamp::now());
                    if pruned > 0 {
                        tracing::debug!(pruned, "expired punishments pruned");
                    }
                }
            },
        );

        if c.enable_metrics {
            let ctx = self.ctx.clone();
            self.supervisor
                .spawn_periodic("metrics", secs(c.metrics_interval_secs.max(1)), move || {
                    let ctx = ctx.clone();
                    async move { ctx.refresh_metrics().await }
                });
        }

        tracing::info!(tasks = self.supervisor.len(), "Helix node started");
        Ok(())
    }

    /// Signal every task, wait for them to drain, then take a final
    /// metrics snapshot.
    pub async fn stop(&mut self) -> Result<(), NodeError> {
        tracing::info!("Helix node stopping");
        let result = self.supervisor.stop(SHUTDOWN_TIMEOUT).await;
        self.ctx.refresh_metrics().await;
        self.started = false;
        tracing::info!("Helix node stopped");
        result
    }

    // ── Operator entry points ───────────────────────────────────────────

    pub async fn submit_transaction(&self, payload: Vec<u8>) -> TxHash {
        self.ctx
            .engine
            .write()
            .await
            .submit_transaction(payload, Timestamp::now())
    }

    pub async fn add_validator(&self, address: ValidatorAddress, stake: u128) -> Result<(), NodeError> {
        self.ctx
            .engine
            .write()
            .await
            .add_validator(address, stake, Timestamp::now())?;
        Ok(())
    }

    /// Submit a minimum-stake change; an applied value is pushed to the pool.
    pub async fn request_min_stake(&self, request: ChangeRequest<u128>) -> Decision<u128> {
        let mut engine = self.ctx.engine.write().await;
        let mut registry = self.ctx.stake_registry.lock().await;
        let decision = registry.apply_change(request.clone());
        if let Decision::Applied { to, .. } = decision {
            engine.apply_parameter(ParameterKind::MinStake, to.to_reading());
        }
        let mut ledger = self.ctx.ledger.lock().await;
        self.ctx
            .log_decision(&mut ledger, ParameterKind::MinStake, &request, &decision);
        decision
    }

    /// Submit a difficulty change; an applied value is pushed to the finalizer.
    pub async fn request_difficulty(&self, request: ChangeRequest<u64>) -> Decision<u64> {
        let mut engine = self.ctx.engine.write().await;
        let mut registry = self.ctx.difficulty_registry.lock().await;
        let decision = registry.apply_change(request.clone());
        if let Decision::Applied { to, .. } = decision {
            engine.apply_parameter(ParameterKind::Difficulty, to.to_reading());
        }
        let mut ledger = self.ctx.ledger.lock().await;
        self.ctx
            .log_decision(&mut ledger, ParameterKind::Difficulty, &request, &decision);
        decision
    }

    pub async fn min_stake(&self) -> u128 {
        self.ctx.stake_registry.lock().await.value()
    }

    pub async fn difficulty(&self) -> u64 {
        self.ctx.difficulty_registry.lock().await.value()
    }

    /// Resume on the next emergency evaluation regardless of health.
    pub async fn force_resume(&self) {
        self.ctx.emergency.lock().await.set_force_resume();
    }

    /// Lift a proof-timestamp halt. Returns `false` if timestamps were
    /// not halted.
    pub async fn resume_timestamps(&self) -> bool {
        let mut engine = self.ctx.engine.write().await;
        if !engine.sequencer_mut().resume_timestamps() {
            return false;
        }
        let mut ledger = self.ctx.ledger.lock().await;
        self.ctx.trail.log(
            &mut ledger,
            "TimestampResume",
            status::COMPLETED,
            Some("operator".into()),
        );
        true
    }

    pub async fn emergency_state(&self) -> EmergencyState {
        self.ctx.emergency.lock().await.state()
    }

    /// Rotate an active validator out now.
    pub async fn force_rotate(&self, address: &ValidatorAddress) -> Result<Rotation, NodeError> {
        let mut engine = self.ctx.engine.write().await;
        let min_stake = self.ctx.stake_registry.lock().await.value();
        let mut ledger = self.ctx.ledger.lock().await;
        let rotation = self
            .ctx
            .lifecycle
            .force_rotate(&mut engine, address, min_stake, &mut ledger)?;
        self.metrics.validator_rotations.inc();
        Ok(rotation)
    }

    pub async fn connect_peer(&self, peer_id: impl Into<String>) -> Result<bool, NodeError> {
        Ok(self.ctx.gossip.lock().await.connect_peer(peer_id)?)
    }

    pub async fn disconnect_peer(&self, peer_id: &str) -> Result<(), NodeError> {
        Ok(self.ctx.gossip.lock().await.disconnect_peer(peer_id)?)
    }

    /// Queue a message for the next gossip poll. Returns `false` if the
    /// oldest queued message was dropped to make room.
    pub async fn broadcast(&self, message: Vec<u8>) -> bool {
        self.ctx.gossip.lock().await.enqueue(message)
    }

    pub async fn register_shard(&self, shard: ShardId) -> Result<(), NodeError> {
        Ok(self.ctx.shards.lock().await.request_registration(shard)?)
    }

    pub async fn request_shard_state(&self, shard: ShardId) -> Result<(), NodeError> {
        Ok(self.ctx.shards.lock().await.request_state(shard)?)
    }

    pub async fn health_report(&self) -> Option<HealthReport> {
        self.ctx.health.lock().await.last_report().cloned()
    }

    /// Run one named task's tick immediately, outside its schedule.
    pub async fn run_tick(&self, task: &str) {
        self.ctx.run_tick(task).await;
    }
}

impl NodeContext {
    async fn run_tick(&self, task: &str) {
        match task {
            "consensus-cycle" => self.cycle_tick().await,
            "gossip" => self.gossip_tick().await,
            "emergency" => self.emergency_tick().await,
            "elasticity" => self.elasticity_tick().await,
            "health" => self.health_tick().await,
            "parameter-sync" => self.parameter_sync_tick().await,
            "fork-check" => self.fork_tick().await,
            "lifecycle" => self.lifecycle_tick().await,
            "security" => self.security_tick().await,
            "metrics" => self.refresh_metrics().await,
            other => tracing::warn!(task = other, "unknown task"),
        }
    }

    /// One sub-block cycle. Mining may take a while, so it runs on the
    /// blocking pool. While shut down no cycle runs; stale outcomes still
    /// age out of the health window so the emergency tick can resume.
    async fn cycle_tick(&self) {
        let shut_down = self.emergency.lock().await.state() == EmergencyState::ShutDown;
        if shut_down {
            let expired = self
                .engine
                .write()
                .await
                .expire_health_outcomes(Timestamp::now());
            if expired > 0 {
                tracing::debug!(expired, "health outcomes aged out during shutdown");
            }
            return;
        }

        let engine = Arc::clone(&self.engine);
        let result = tokio::task::spawn_blocking(move || {
            let mut engine = engine.blocking_write();
            let had_work = engine.pending_transactions() > 0;
            let blocks_before = engine.blocks().len();
            let certified = engine.process_transactions(Timestamp::now());
            let new_block = (engine.blocks().len() > blocks_before)
                .then(|| engine.latest_block().cloned())
                .flatten();
            (had_work, certified, new_block, engine.last_finalization_time())
        })
        .await;

        let (had_work, certified, new_block, finalization_time) = match result {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "consensus cycle panicked");
                return;
            }
        };

        if certified {
            self.metrics.sub_blocks_certified.inc();
        } else if had_work {
            self.metrics.failed_cycles.inc();
        }

        let Some(block) = new_block else {
            return;
        };
        self.metrics.blocks_finalized.inc();
        if let Some(t) = finalization_time {
            self.metrics
                .finalization_time_ms
                .observe(t.as_secs_f64() * 1000.0);
        }

        let announcement = BlockAnnouncement {
            shard: self.shard_id,
            height: block.height,
            hash: block.hash,
            previous: block.previous,
            difficulty: block.difficulty,
            nonce: block.nonce,
            timestamp: block.timestamp,
        };
        match bincode::serialize(&announcement) {
            Ok(bytes) => {
                self.gossip.lock().await.enqueue(bytes);
            }
            Err(e) => tracing::warn!(error = %e, "block announcement not encoded"),
        }

        if let Err(e) = self.shards.lock().await.update_state(
            self.shard_id,
            block.height,
            block.hash,
            Timestamp::now(),
        ) {
            tracing::debug!(error = %e, "local shard not registered yet");
        }
    }

    async fn gossip_tick(&self) {
        let outcomes = self.gossip.lock().await.poll();
        let (registrations, states) = {
            let mut shards = self.shards.lock().await;
            (
                shards.poll_registrations(self.max_batch, Timestamp::now()),
                shards.poll_state_requests(self.max_batch),
            )
        };
        if outcomes.is_empty() && registrations.is_empty() && states.is_empty() {
            return;
        }

        let mut ledger = self.ledger.lock().await;
        for outcome in &outcomes {
            let entry_status = if outcome.is_propagated() {
                self.metrics.gossip_propagated.inc();
                status::COMPLETED
            } else {
                self.metrics.gossip_rejected.inc();
                status::FAILED
            };
            let details = match outcome {
                GossipOutcome::Propagated { peers } => format!("propagated to {peers} peer(s)"),
                GossipOutcome::Oversize { size, limit } => format!("oversize {size} > {limit}"),
                GossipOutcome::NoPeers => "no peers connected".to_string(),
                GossipOutcome::ChannelFull { sent, failed } => {
                    format!("sent={sent} failed={failed}")
                }
                GossipOutcome::Duplicate => "duplicate".to_string(),
            };
            self.trail
                .log(&mut ledger, "GossipPropagation", entry_status, Some(details));
        }

        for outcome in registrations.iter().chain(states.iter()) {
            let (entry_type, entry_status, details) = match outcome {
                ShardOutcome::Registered(id) => {
                    ("ShardRegistration", status::COMPLETED, format!("shard {id} registered"))
                }
                ShardOutcome::AlreadyRegistered(id) => (
                    "ShardRegistration",
                    status::COMPLETED,
                    format!("shard {id} already registered"),
                ),
                ShardOutcome::Found(state) => (
                    "ShardState",
                    status::COMPLETED,
                    format!("shard {} height={} tip={}", state.shard, state.height, state.tip),
                ),
                ShardOutcome::UnknownShard(id) => {
                    ("ShardState", status::FAILED, format!("shard {id} unknown"))
                }
            };
            self.trail
                .log(&mut ledger, entry_type, entry_status, Some(details));
        }
    }

    async fn emergency_tick(&self) {
        let mut engine = self.engine.write().await;
        let mut emergency = self.emergency.lock().await;
        let mut ledger = self.ledger.lock().await;
        let health = engine.network_health();
        self.metrics.set_network_health(health);
        if emergency.evaluate(health, &mut engine, &mut ledger) == EmergencyAction::ShutDown {
            self.metrics.emergency_shutdowns.inc();
        }
    }

    async fn elasticity_tick(&self) {
        let mut engine = self.engine.write().await;
        let min_stake = self.stake_registry.lock().await.value();
        let mut difficulty = self.difficulty_registry.lock().await;
        let mut ledger = self.ledger.lock().await;
        self.elasticity
            .check(&mut engine, min_stake, &mut difficulty, &mut ledger);
    }

    async fn health_tick(&self) {
        let engine = self.engine.read().await;
        let min_stake = self.stake_registry.lock().await.value();
        let mut health = self.health.lock().await;
        let mut ledger = self.ledger.lock().await;
        health.check(&engine, min_stake, &mut ledger, Timestamp::now());
    }

    async fn parameter_sync_tick(&self) {
        let mut engine = self.engine.write().await;
        let mut stake = self.stake_registry.lock().await;
        let mut difficulty = self.difficulty_registry.lock().await;

        let stake_outcome = stake.reconcile(&mut engine);
        let difficulty_outcome = difficulty.reconcile(&mut engine);

        let mut ledger = self.ledger.lock().await;
        if !stake_outcome.is_noop() {
            self.trail.log(
                &mut ledger,
                "ParameterReconciliation",
                status::COMPLETED,
                Some(format!(
                    "min_stake={} raised_to={:?} pushed={:?}",
                    stake.value(),
                    stake_outcome.raised_to,
                    stake_outcome.pushed
                )),
            );
        }
        if !difficulty_outcome.is_noop() {
            self.trail.log(
                &mut ledger,
                "ParameterReconciliation",
                status::COMPLETED,
                Some(format!(
                    "difficulty={:#x} raised_to={:?} pushed={:?}",
                    difficulty.value(),
                    difficulty_outcome.raised_to,
                    difficulty_outcome.pushed
                )),
            );
        }
    }

    async fn fork_tick(&self) {
        let engine = self.engine.read().await;
        let mut resolver = self.fork_resolver.lock().await;
        let mut ledger = self.ledger.lock().await;

        let detected_before = resolver.detected();
        let check = resolver.check(&*engine, &mut ledger, Timestamp::now());
        if resolver.detected() > detected_before {
            self.metrics.forks_detected.inc();
        }
        if check == ForkCheck::Resolved {
            self.metrics.forks_resolved.inc();
        }
    }

    async fn lifecycle_tick(&self) {
        let mut engine = self.engine.write().await;
        let min_stake = self.stake_registry.lock().await.value();
        let mut punishments = self.punishments.lock().await;
        let mut ledger = self.ledger.lock().await;

        let report = self.lifecycle.run(
            &mut engine,
            min_stake,
            &mut punishments,
            &mut ledger,
            Timestamp::now(),
        );
        self.metrics
            .validator_rewards
            .inc_by(report.rewarded.len() as u64);
        self.metrics
            .validator_penalties
            .inc_by(report.penalized.len() as u64);
        self.metrics
            .validator_rotations
            .inc_by(report.rotations.len() as u64);
    }

    async fn security_tick(&self) {
        let mut engine = self.engine.write().await;
        let min_stake = self.stake_registry.lock().await.value();
        let mut punishments = self.punishments.lock().await;
        let mut ledger = self.ledger.lock().await;
        self.security.check(
            &mut engine,
            min_stake,
            &mut punishments,
            &mut ledger,
            Timestamp::now(),
        );
    }

    async fn refresh_metrics(&self) {
        let engine = self.engine.read().await;
        self.metrics
            .active_validators
            .set(engine.active_validators().len() as i64);
        self.metrics.set_network_health(engine.network_health());
        self.metrics
            .estimated_hashrate
            .set(engine.finalizer().estimated_hashrate());
        drop(engine);

        self.metrics
            .set_min_stake(self.stake_registry.lock().await.value());
        self.metrics
            .set_difficulty(self.difficulty_registry.lock().await.value());
    }

    fn log_decision<V: ParameterValue>(
        &self,
        ledger: &mut Ledger,
        kind: ParameterKind,
        request: &ChangeRequest<V>,
        decision: &Decision<V>,
    ) {
        self.trail.log(
            ledger,
            kind.entry_type(),
            decision.status(),
            Some(format!(
                "{} by {} priority={} override={} -> {:?}",
                request.new_value, request.requested_by, request.priority, request.is_override, decision
            )),
        );
    }
}
