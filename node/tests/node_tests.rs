//! End-to-end tests driving a node through its periodic ticks.

use std::io::Write;
use std::time::Duration;

use helix_consensus::EmergencyState;
use helix_ledger::Ledger;
use helix_node::{BlockAnnouncement, HelixNode, NodeConfig, NodeError};
use helix_types::{PipelineStage, Stage, ValidatorAddress};

fn plain_config() -> NodeConfig {
    NodeConfig {
        encrypt_ledger: false,
        ..NodeConfig::default()
    }
}

async fn entry_count(node: &HelixNode, entry_type: &str) -> usize {
    let ledger = node.ledger();
    let ledger = ledger.lock().await;
    count(&ledger, entry_type)
}

fn count(ledger: &Ledger, entry_type: &str) -> usize {
    ledger.of_type(entry_type).count()
}

#[tokio::test]
async fn node_loads_config_file_and_runs() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(
        file,
        r#"
        cycle_interval_ms = 5
        encrypt_ledger = true
        ledger_key = "{}"

        [consensus]
        min_stake = 500
        "#,
        "11".repeat(32)
    )
    .unwrap();

    let config = NodeConfig::from_toml_file(file.path().to_str().unwrap()).unwrap();
    assert_eq!(config.params.initial_min_stake, 500);

    let mut node = HelixNode::new(config).unwrap();
    node.add_validator(ValidatorAddress::new("val-a"), 500).await.unwrap();
    for i in 0..20u8 {
        node.submit_transaction(vec![i]).await;
    }

    node.start().await.unwrap();
    assert!(node.task_names().contains(&"consensus-cycle"));
    assert!(node.task_names().contains(&"metrics"));

    tokio::time::sleep(Duration::from_millis(300)).await;
    node.stop().await.unwrap();

    assert!(node.metrics.sub_blocks_certified.get() > 0);
    assert_eq!(node.metrics.active_validators.get(), 1);
    assert_eq!(node.metrics.min_stake.get(), 500);

    // first ticks fire on start; entries are sealed with the configured key
    let ledger = node.ledger();
    let ledger = ledger.lock().await;
    let health = ledger.latest_of_type("HealthReport").expect("health report");
    assert!(health.is_sealed());
}

#[tokio::test]
async fn emergency_shutdown_and_forced_resume() {
    let node = HelixNode::new(plain_config()).unwrap();
    node.add_validator(ValidatorAddress::new("val-a"), 1_000).await.unwrap();

    // every stage halted from the outside: cycles with work now fail
    {
        let engine = node.engine();
        let mut engine = engine.write().await;
        engine.sequencer_mut().halt().unwrap();
    }
    for i in 0..5u8 {
        node.submit_transaction(vec![i]).await;
        node.run_tick("consensus-cycle").await;
    }
    assert_eq!(node.metrics.failed_cycles.get(), 5);
    {
        let engine = node.engine();
        let mut engine = engine.write().await;
        assert_eq!(engine.network_health(), 0.0);
        engine.sequencer_mut().resume().unwrap();
    }

    node.run_tick("emergency").await;
    assert_eq!(node.emergency_state().await, EmergencyState::ShutDown);
    assert_eq!(node.metrics.emergency_shutdowns.get(), 1);
    {
        let engine = node.engine();
        let engine = engine.read().await;
        for stage in Stage::ALL {
            assert!(engine.stage(stage).is_halted());
        }
        assert!(node.ledger().lock().await.is_frozen());
    }

    // health is still 0.0; only the operator flag brings it back
    node.run_tick("emergency").await;
    assert_eq!(node.emergency_state().await, EmergencyState::ShutDown);

    node.force_resume().await;
    node.run_tick("emergency").await;
    assert_eq!(node.emergency_state().await, EmergencyState::Running);
    assert!(!node.ledger().lock().await.is_frozen());
    assert_eq!(entry_count(&node, "EmergencyResume").await, 1);
}

#[tokio::test]
async fn shutdown_lifts_once_failures_age_out() {
    let mut config = plain_config();
    config.params.health_window_secs = 1;
    let node = HelixNode::new(config).unwrap();
    node.add_validator(ValidatorAddress::new("val-a"), 1_000).await.unwrap();

    {
        let engine = node.engine();
        let mut engine = engine.write().await;
        engine.sequencer_mut().halt().unwrap();
    }
    for i in 0..3u8 {
        node.submit_transaction(vec![i]).await;
        node.run_tick("consensus-cycle").await;
    }
    node.run_tick("emergency").await;
    assert_eq!(node.emergency_state().await, EmergencyState::ShutDown);

    // cycles are skipped while shut down
    node.run_tick("consensus-cycle").await;
    assert_eq!(node.metrics.failed_cycles.get(), 3);

    tokio::time::sleep(Duration::from_millis(2_100)).await;
    node.run_tick("consensus-cycle").await;
    node.run_tick("emergency").await;
    assert_eq!(node.emergency_state().await, EmergencyState::Running);
    assert_eq!(entry_count(&node, "EmergencyResume").await, 1);

    node.submit_transaction(b"after".to_vec()).await;
    node.run_tick("consensus-cycle").await;
    assert!(node.metrics.sub_blocks_certified.get() > 0);
}

#[tokio::test]
async fn operator_resumes_halted_timestamps() {
    let node = HelixNode::new(plain_config()).unwrap();
    assert!(!node.resume_timestamps().await);

    {
        let engine = node.engine();
        let mut engine = engine.write().await;
        engine.sequencer_mut().halt_timestamps();
    }
    assert!(node.resume_timestamps().await);
    assert!(!node.engine().read().await.sequencer().timestamps_halted());
    assert_eq!(entry_count(&node, "TimestampResume").await, 1);
}

#[tokio::test]
async fn finalized_blocks_are_gossiped() {
    let mut config = plain_config();
    config.params.max_batch = 10;
    let mut node = HelixNode::new(config).unwrap();
    let mut outbound = node.take_outbound().unwrap();
    assert!(node.take_outbound().is_none());

    node.add_validator(ValidatorAddress::new("val-a"), 1_000).await.unwrap();
    assert!(node.connect_peer("peer-1").await.unwrap());

    for i in 0..helix_types::SUB_BLOCKS_PER_BLOCK {
        node.submit_transaction((i as u32).to_le_bytes().to_vec()).await;
        node.run_tick("consensus-cycle").await;
    }
    assert_eq!(node.metrics.blocks_finalized.get(), 1);

    node.run_tick("gossip").await;
    let (peer, bytes) = outbound.recv().await.unwrap();
    assert_eq!(peer, "peer-1");
    let announcement: BlockAnnouncement = bincode::deserialize(&bytes).unwrap();
    assert_eq!(announcement.height, 1);
    assert_eq!(node.metrics.gossip_propagated.get(), 1);
    assert_eq!(entry_count(&node, "GossipPropagation").await, 1);
}

#[tokio::test]
async fn shard_requests_logged_per_outcome() {
    let node = HelixNode::new(plain_config()).unwrap();
    node.register_shard(3).await.unwrap();
    node.register_shard(3).await.unwrap();
    node.request_shard_state(9).await.unwrap();

    node.run_tick("gossip").await;
    assert_eq!(entry_count(&node, "ShardRegistration").await, 2);
    assert_eq!(entry_count(&node, "ShardState").await, 1);
}

#[tokio::test]
async fn oversize_gossip_rejected_and_logged() {
    let mut config = plain_config();
    config.params.max_message_size = 8;
    let node = HelixNode::new(config).unwrap();
    node.connect_peer("peer-1").await.unwrap();

    node.broadcast(vec![0u8; 9]).await;
    node.run_tick("gossip").await;
    assert_eq!(node.metrics.gossip_rejected.get(), 1);
    assert_eq!(entry_count(&node, "GossipPropagation").await, 1);
}

#[tokio::test]
async fn missing_key_skips_ledger_writes() {
    let node = HelixNode::new(NodeConfig::default()).unwrap();
    node.run_tick("health").await;
    assert!(node.health_report().await.is_some());
    assert_eq!(entry_count(&node, "HealthReport").await, 0);
}

#[tokio::test]
async fn peer_limit_surfaces_as_network_error() {
    let mut config = plain_config();
    config.params.max_peers = 1;
    let node = HelixNode::new(config).unwrap();
    node.connect_peer("a").await.unwrap();
    assert!(matches!(
        node.connect_peer("b").await,
        Err(NodeError::Network(_))
    ));
}
