//! Batched gossip propagation.
//!
//! Messages are queued with [`GossipPropagator::enqueue`] and flushed by
//! [`GossipPropagator::poll`] on a fixed interval. Each poll handles at most
//! `max_batch` messages and reports one [`GossipOutcome`] per message.

use std::collections::{BTreeSet, HashSet, VecDeque};

use helix_crypto::blake2b_256;
use helix_types::ConsensusParams;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::NetworkError;

/// `(peer_id, message_bytes)` as consumed by the transport layer.
pub type OutboundMessage = (String, Vec<u8>);

/// How many message hashes are remembered to suppress re-propagation.
const RECENT_CAPACITY: usize = 16_384;

/// Unflushed messages kept while peers are slow or absent; the oldest go first.
const QUEUE_CAPACITY: usize = 4_096;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GossipOutcome {
    /// Queued for this many peers.
    Propagated { peers: usize },
    /// Larger than the configured limit; dropped.
    Oversize { size: usize, limit: usize },
    /// No peers connected; dropped.
    NoPeers,
    /// The outbound channel refused some copies.
    ChannelFull { sent: usize, failed: usize },
    /// Already propagated recently; dropped.
    Duplicate,
}

impl GossipOutcome {
    pub fn is_propagated(&self) -> bool {
        matches!(self, Self::Propagated { .. })
    }
}

/// Rolling window of recently propagated message hashes.
struct RecentMessages {
    set: HashSet<[u8; 32]>,
    order: VecDeque<[u8; 32]>,
}

impl RecentMessages {
    fn new() -> Self {
        Self {
            set: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    fn contains(&self, hash: &[u8; 32]) -> bool {
        self.set.contains(hash)
    }

    fn insert(&mut self, hash: [u8; 32]) {
        if self.set.insert(hash) {
            self.order.push_back(hash);
            if self.order.len() > RECENT_CAPACITY {
                if let Some(old) = self.order.pop_front() {
                    self.set.remove(&old);
                }
            }
        }
    }
}

pub struct GossipPropagator {
    outbound_tx: mpsc::Sender<OutboundMessage>,
    peers: BTreeSet<String>,
    queue: VecDeque<Vec<u8>>,
    recent: RecentMessages,
    max_peers: usize,
    max_message_size: usize,
    max_batch: usize,
}

impl GossipPropagator {
    pub fn new(outbound_tx: mpsc::Sender<OutboundMessage>, params: &ConsensusParams) -> Self {
        Self {
            outbound_tx,
            peers: BTreeSet::new(),
            queue: VecDeque::new(),
            recent: RecentMessages::new(),
            max_peers: params.max_peers,
            max_message_size: params.max_message_size,
            max_batch: params.max_batch.max(1),
        }
    }

    /// Connect a peer. Returns `Ok(false)` if it was already connected.
    pub fn connect_peer(&mut self, peer_id: impl Into<String>) -> Result<bool, NetworkError> {
        let peer_id = peer_id.into();
        if self.peers.contains(&peer_id) {
            return Ok(false);
        }
        if self.peers.len() >= self.max_peers {
            tracing::debug!(%peer_id, max = self.max_peers, "peer refused, limit reached");
            return Err(NetworkError::PeerLimit { max: self.max_peers });
        }
        tracing::debug!(%peer_id, "peer connected");
        self.peers.insert(peer_id);
        Ok(true)
    }

    pub fn disconnect_peer(&mut self, peer_id: &str) -> Result<(), NetworkError> {
        if self.peers.remove(peer_id) {
            tracing::debug!(%peer_id, "peer disconnected");
            Ok(())
        } else {
            Err(NetworkError::PeerNotFound(peer_id.to_string()))
        }
    }

    pub fn peers(&self) -> impl Iterator<Item = &str> {
        self.peers.iter().map(String::as_str)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Queue a message for the next poll. Returns `false` if the oldest
    /// queued message was dropped to make room.
    pub fn enqueue(&mut self, message: Vec<u8>) -> bool {
        self.queue.push_back(message);
        if self.queue.len() > QUEUE_CAPACITY {
            self.queue.pop_front();
            tracing::warn!(capacity = QUEUE_CAPACITY, "gossip queue full, oldest message dropped");
            return false;
        }
        true
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Flush up to `max_batch` queued messages.
    pub fn poll(&mut self) -> Vec<GossipOutcome> {
        let take = self.max_batch.min(self.queue.len());
        let batch: Vec<Vec<u8>> = self.queue.drain(..take).collect();
        batch.into_iter().map(|m| self.propagate(m)).collect()
    }

    fn propagate(&mut self, message: Vec<u8>) -> GossipOutcome {
        if message.len() > self.max_message_size {
            tracing::warn!(
                size = message.len(),
                limit = self.max_message_size,
                "gossip message rejected, oversize"
            );
            return GossipOutcome::Oversize {
                size: message.len(),
                limit: self.max_message_size,
            };
        }

        let hash = blake2b_256(&message);
        if self.recent.contains(&hash) {
            return GossipOutcome::Duplicate;
        }

        if self.peers.is_empty() {
            tracing::debug!("gossip message dropped, no peers");
            return GossipOutcome::NoPeers;
        }

        let mut sent = 0;
        let mut failed = 0;
        for peer in &self.peers {
            match self.outbound_tx.try_send((peer.clone(), message.clone())) {
                Ok(()) => sent += 1,
                Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => failed += 1,
            }
        }

        if sent > 0 {
            self.recent.insert(hash);
        }
        if failed > 0 {
            tracing::warn!(sent, failed, "outbound channel refused gossip");
            GossipOutcome::ChannelFull { sent, failed }
        } else {
            GossipOutcome::Propagated { peers: sent }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ConsensusParams {
        ConsensusParams {
            max_peers: 3,
            max_message_size: 16,
            max_batch: 2,
            ..ConsensusParams::default()
        }
    }

    #[tokio::test]
    async fn propagates_to_every_connected_peer() {
        let (tx, mut rx) = mpsc::channel(64);
        let mut gossip = GossipPropagator::new(tx, &params());
        gossip.connect_peer("peer-a").unwrap();
        gossip.connect_peer("peer-b").unwrap();

        gossip.enqueue(b"block-1".to_vec());
        assert_eq!(gossip.poll(), vec![GossipOutcome::Propagated { peers: 2 }]);

        let (first, msg) = rx.recv().await.unwrap();
        assert_eq!(msg, b"block-1");
        let (second, _) = rx.recv().await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn peer_limit_enforced() {
        let (tx, _rx) = mpsc::channel(8);
        let mut gossip = GossipPropagator::new(tx, &params());
        for peer in ["a", "b", "c"] {
            assert!(gossip.connect_peer(peer).unwrap());
        }
        assert!(!gossip.connect_peer("a").unwrap());
        assert!(matches!(
            gossip.connect_peer("d"),
            Err(NetworkError::PeerLimit { max: 3 })
        ));

        gossip.disconnect_peer("a").unwrap();
        assert!(gossip.connect_peer("d").unwrap());
        assert!(matches!(
            gossip.disconnect_peer("zzz"),
            Err(NetworkError::PeerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn poll_respects_batch_size() {
        let (tx, _rx) = mpsc::channel(64);
        let mut gossip = GossipPropagator::new(tx, &params());
        gossip.connect_peer("a").unwrap();
        for i in 0..5u8 {
            gossip.enqueue(vec![i]);
        }
        assert_eq!(gossip.poll().len(), 2);
        assert_eq!(gossip.queued(), 3);
    }

    #[tokio::test]
    async fn queue_drops_oldest_when_full() {
        let (tx, _rx) = mpsc::channel(64);
        let mut gossip = GossipPropagator::new(tx, &params());
        for i in 0..QUEUE_CAPACITY as u32 {
            assert!(gossip.enqueue(i.to_be_bytes().to_vec()));
        }
        assert!(!gossip.enqueue(b"newest".to_vec()));
        assert_eq!(gossip.queued(), QUEUE_CAPACITY);
        assert_eq!(gossip.queue.front(), Some(&1u32.to_be_bytes().to_vec()));
        assert_eq!(gossip.queue.back(), Some(&b"newest".to_vec()));
    }

    #[tokio::test]
    async fn oversize_and_no_peer_messages_dropped() {
        let (tx, _rx) = mpsc::channel(64);
        let mut gossip = GossipPropagator::new(tx, &params());

        gossip.enqueue(vec![0u8; 17]);
        gossip.enqueue(b"small".to_vec());
        assert_eq!(
            gossip.poll(),
            vec![
                GossipOutcome::Oversize { size: 17, limit: 16 },
                GossipOutcome::NoPeers
            ]
        );
    }

    #[tokio::test]
    async fn full_channel_reported() {
        let (tx, _rx) = mpsc::channel(1);
        let mut gossip = GossipPropagator::new(tx, &params());
        gossip.connect_peer("a").unwrap();
        gossip.connect_peer("b").unwrap();

        gossip.enqueue(b"x".to_vec());
        assert_eq!(
            gossip.poll(),
            vec![GossipOutcome::ChannelFull { sent: 1, failed: 1 }]
        );
    }

    #[tokio::test]
    async fn duplicate_suppressed() {
        let (tx, _rx) = mpsc::channel(64);
        let mut gossip = GossipPropagator::new(tx, &params());
        gossip.connect_peer("a").unwrap();
        gossip.enqueue(b"same".to_vec());
        gossip.enqueue(b"same".to_vec());
        let outcomes = gossip.poll();
        assert!(outcomes[0].is_propagated());
        assert_eq!(outcomes[1], GossipOutcome::Duplicate);
    }
}
