//! Helix node: runs the consensus engine and its supervisors.
//!
//! The node owns the shared engine, ledger and parameter registries, and
//! drives each supervisor on its own schedule:
//! - sub-block cycles and block finalization
//! - validator lifecycle (scoring, rewards, rotation)
//! - parameter reconciliation
//! - fork detection and the emergency controller
//! - health, security and elasticity monitors
//! - gossip and shard polling

pub mod config;
pub mod elasticity;
pub mod error;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod security;
pub mod shutdown;
pub mod supervisor;

pub use config::{ConsensusOverrides, NodeConfig};
pub use elasticity::{Adjustment, ElasticAction, ElasticityMonitor};
pub use error::NodeError;
pub use health::{HealthMonitor, HealthReport};
pub use logging::{init_logging, LogFormat};
pub use metrics::NodeMetrics;
pub use node::{BlockAnnouncement, HelixNode};
pub use security::{SecurityMonitor, SecurityReport};
pub use shutdown::ShutdownController;
pub use supervisor::{TaskSupervisor, SHUTDOWN_TIMEOUT};
