//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use helix_types::ConsensusParams;

use crate::{LogFormat, NodeError};

/// Configuration for a Helix node.
///
/// Loaded from a TOML file via [`NodeConfig::from_toml_file`] or built
/// programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Full parameter set; built in code. TOML tunes it through
    /// [`consensus`](Self::consensus).
    #[serde(skip)]
    pub params: ConsensusParams,

    /// Sub-block cycle period, in milliseconds.
    #[serde(default = "default_cycle_interval_ms")]
    pub cycle_interval_ms: u64,

    #[serde(default = "default_gossip_interval_secs")]
    pub gossip_interval_secs: u64,

    #[serde(default = "default_emergency_interval_secs")]
    pub emergency_interval_secs: u64,

    #[serde(default = "default_elasticity_interval_secs")]
    pub elasticity_interval_secs: u64,

    #[serde(default = "default_health_interval_secs")]
    pub health_interval_secs: u64,

    #[serde(default = "default_parameter_sync_interval_secs")]
    pub parameter_sync_interval_secs: u64,

    #[serde(default = "default_fork_check_interval_secs")]
    pub fork_check_interval_secs: u64,

    #[serde(default = "default_lifecycle_interval_secs")]
    pub lifecycle_interval_secs: u64,

    #[serde(default = "default_security_interval_secs")]
    pub security_interval_secs: u64,

    /// How often expired punishment records are pruned.
    #[serde(default = "default_punishment_prune_interval_secs")]
    pub punishment_prune_interval_secs: u64,

    #[serde(default = "default_metrics_interval_secs")]
    pub metrics_interval_secs: u64,

    /// Shard this node's chain is registered under.
    #[serde(default)]
    pub shard_id: u32,

    /// Capacity of the outbound gossip channel.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    /// Require every ledger entry to be encrypted.
    #[serde(default = "default_true")]
    pub encrypt_ledger: bool,

    /// Hex-encoded 32-byte master key for ledger encryption.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_key: Option<String>,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    #[serde(default)]
    pub consensus: ConsensusOverrides,
}

/// Consensus parameters that may be set from TOML.
///
/// Difficulty values use most of the `u64` range, which TOML integers
/// cannot hold, so they are written as hex strings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_stake: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elasticity_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_finalization_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward_amount: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub penalty_amount: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub punishment_window_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_message_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_peers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_batch: Option<usize>,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_cycle_interval_ms() -> u64 {
    100
}

fn default_gossip_interval_secs() -> u64 {
    3
}

fn default_emergency_interval_secs() -> u64 {
    10
}

fn default_elasticity_interval_secs() -> u64 {
    30
}

fn default_health_interval_secs() -> u64 {
    60
}

fn default_parameter_sync_interval_secs() -> u64 {
    60
}

fn default_fork_check_interval_secs() -> u64 {
    120
}

fn default_lifecycle_interval_secs() -> u64 {
    300
}

fn default_security_interval_secs() -> u64 {
    600
}

fn default_punishment_prune_interval_secs() -> u64 {
    3600
}

fn default_metrics_interval_secs() -> u64 {
    15
}

fn default_outbound_buffer() -> usize {
    1024
}

fn default_true() -> bool {
    true
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn parse_hex_u64(field: &str, raw: &str) -> Result<u64, NodeError> {
    let digits = raw.trim_start_matches("0x");
    u64::from_str_radix(digits, 16)
        .map_err(|e| NodeError::Config(format!("consensus.{field}: {e}")))
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        let mut config: Self = toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))?;
        config.params = config.consensus_params()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("NodeConfig is always serializable to TOML")
    }

    /// `params` with the TOML overrides applied.
    pub fn consensus_params(&self) -> Result<ConsensusParams, NodeError> {
        let o = &self.consensus;
        let mut params = self.params.clone();

        if let Some(v) = o.min_stake {
            params.initial_min_stake = v as u128;
        }
        if let Some(raw) = &o.difficulty {
            params.initial_difficulty = parse_hex_u64("difficulty", raw)?;
        }
        if let Some(raw) = &o.difficulty_step {
            params.difficulty_step = parse_hex_u64("difficulty_step", raw)?;
        }
        if let Some(v) = o.health_threshold {
            params.health_threshold = v;
        }
        if let Some(v) = o.elasticity_threshold {
            params.elasticity_threshold = v;
        }
        if let Some(v) = o.max_finalization_ms {
            params.max_finalization_ms = v;
        }
        if let Some(v) = o.reward_amount {
            params.reward_amount = v as u128;
        }
        if let Some(v) = o.penalty_amount {
            params.penalty_amount = v as u128;
        }
        if let Some(v) = o.punishment_window_secs {
            params.punishment_window_secs = v;
        }
        if let Some(v) = o.max_message_size {
            params.max_message_size = v;
        }
        if let Some(v) = o.max_peers {
            params.max_peers = v;
        }
        if let Some(v) = o.max_batch {
            params.max_batch = v;
        }

        if !(0.0..=1.0).contains(&params.health_threshold) {
            return Err(NodeError::Config(format!(
                "consensus.health_threshold must be within 0..=1, got {}",
                params.health_threshold
            )));
        }
        if params.initial_difficulty < params.min_difficulty
            || params.initial_difficulty > params.max_difficulty
        {
            return Err(NodeError::Config(format!(
                "consensus.difficulty {:#x} outside {:#x}..={:#x}",
                params.initial_difficulty, params.min_difficulty, params.max_difficulty
            )));
        }
        Ok(params)
    }

    /// Decode `ledger_key`.
    pub fn ledger_master_key(&self) -> Result<Option<[u8; 32]>, NodeError> {
        let Some(raw) = &self.ledger_key else {
            return Ok(None);
        };
        let bytes = hex::decode(raw.trim())
            .map_err(|e| NodeError::Config(format!("ledger_key: {e}")))?;
        let key: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            NodeError::Config(format!("ledger_key must be 32 bytes, got {}", b.len()))
        })?;
        Ok(Some(key))
    }

    pub fn log_format(&self) -> Result<LogFormat, NodeError> {
        self.log_format.parse()
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms.max(1))
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            params: ConsensusParams::default(),
            cycle_interval_ms: default_cycle_interval_ms(),
            gossip_interval_secs: default_gossip_interval_secs(),
            emergency_interval_secs: default_emergency_interval_secs(),
            elasticity_interval_secs: default_elasticity_interval_secs(),
            health_interval_secs: default_health_interval_secs(),
            parameter_sync_interval_secs: default_parameter_sync_interval_secs(),
            fork_check_interval_secs: default_fork_check_interval_secs(),
            lifecycle_interval_secs: default_lifecycle_interval_secs(),
            security_interval_secs: default_security_interval_secs(),
            punishment_prune_interval_secs: default_punishment_prune_interval_secs(),
            metrics_interval_secs: default_metrics_interval_secs(),
            shard_id: 0,
            outbound_buffer: default_outbound_buffer(),
            encrypt_ledger: default_true(),
            ledger_key: None,
            log_format: default_log_format(),
            log_level: default_log_level(),
            enable_metrics: default_true(),
            consensus: ConsensusOverrides::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = NodeConfig::default();
        let toml_str = config.to_toml_string();
        let parsed = NodeConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed.lifecycle_interval_secs, config.lifecycle_interval_secs);
        assert_eq!(parsed.params, config.params);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = NodeConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.lifecycle_interval_secs, 300);
        assert_eq!(config.gossip_interval_secs, 3);
        assert_eq!(config.log_format, "human");
        assert!(config.encrypt_ledger);
        assert_eq!(config.params, ConsensusParams::default());
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            health_interval_secs = 5
            log_format = "json"

            [consensus]
            min_stake = 2500
            difficulty = "0xf000000000000000"
            max_peers = 8
        "#;
        let config = NodeConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.health_interval_secs, 5);
        assert_eq!(config.log_format().unwrap(), LogFormat::Json);
        assert_eq!(config.params.initial_min_stake, 2_500);
        assert_eq!(config.params.initial_difficulty, 0xf000_0000_0000_0000);
        assert_eq!(config.params.max_peers, 8);
        assert_eq!(config.lifecycle_interval_secs, 300); // default
    }

    #[test]
    fn out_of_bounds_difficulty_rejected() {
        let toml = r#"
            [consensus]
            difficulty = "ffffffffffffffff"
        "#;
        assert!(matches!(
            NodeConfig::from_toml_str(toml),
            Err(NodeError::Config(_))
        ));
    }

    #[test]
    fn ledger_key_must_be_32_bytes() {
        let mut config = NodeConfig::default();
        assert_eq!(config.ledger_master_key().unwrap(), None);

        config.ledger_key = Some("ab".repeat(32));
        assert_eq!(config.ledger_master_key().unwrap(), Some([0xab; 32]));

        config.ledger_key = Some("abcd".into());
        assert!(matches!(config.ledger_master_key(), Err(NodeError::Config(_))));

        config.ledger_key = Some("zz".repeat(32));
        assert!(config.ledger_master_key().is_err());
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = NodeConfig::from_toml_file("/nonexistent/helix.toml");
        assert!(matches!(result, Err(NodeError::Config(_))));
    }
}
