//! Message dissemination for the Helix consensus core.
//!
//! The propagator does not own sockets: it pushes `(peer_id, bytes)` pairs
//! onto an `mpsc` channel that a transport layer drains.
//!
//! - [`gossip`] — bounded, batched propagation to connected peers.
//! - [`shard`] — shard registration and state lookups.

pub mod error;
pub mod gossip;
pub mod shard;

pub use error::NetworkError;
pub use gossip::{GossipOutcome, GossipPropagator, OutboundMessage};
pub use shard::{ShardId, REQUEST_CAPACITY, ShardOutcome, ShardRegistry, ShardState};
