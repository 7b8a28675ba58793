//! Shard registration and state lookups.
//!
//! Registration and state requests are queued and served in batches on the
//! same polling cadence as gossip.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use helix_types::{BlockHash, Timestamp};

use crate::NetworkError;

pub type ShardId = u32;

/// Pending requests per queue before new ones are refused.
pub const REQUEST_CAPACITY: usize = 1_024;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardState {
    pub shard: ShardId,
    pub height: u64,
    pub tip: BlockHash,
    pub updated_at: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShardOutcome {
    Registered(ShardId),
    AlreadyRegistered(ShardId),
    Found(ShardState),
    UnknownShard(ShardId),
}

#[derive(Default)]
pub struct ShardRegistry {
    shards: BTreeMap<ShardId, ShardState>,
    registrations: VecDeque<ShardId>,
    state_requests: VecDeque<ShardId>,
}

impl ShardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_registration(&mut self, shard: ShardId) -> Result<(), NetworkError> {
        push_bounded(&mut self.registrations, shard, "registration")
    }

    pub fn request_state(&mut self, shard: ShardId) -> Result<(), NetworkError> {
        push_bounded(&mut self.state_requests, shard, "state request")
    }

    pub fn pending_registrations(&self) -> usize {
        self.registrations.len()
    }

    pub fn pending_state_requests(&self) -> usize {
        self.state_requests.len()
    }

    /// Serve up to `max_batch` registration requests.
    pub fn poll_registrations(&mut self, max_batch: usize, now: Timestamp) -> Vec<ShardOutcome> {
        let take = max_batch.min(self.registrations.len());
        let batch: Vec<ShardId> = self.registrations.drain(..take).collect();
        batch
            .into_iter()
            .map(|shard| {
                if self.shards.contains_key(&shard) {
                    ShardOutcome::AlreadyRegistered(shard)
                } else {
                    self.shards.insert(
                        shard,
                        ShardState {
                            shard,
                            height: 0,
                            tip: BlockHash::ZERO,
                            updated_at: now,
                        },
                    );
                    tracing::info!(shard, "shard registered");
                    ShardOutcome::Registered(shard)
                }
            })
            .collect()
    }

    /// Serve up to `max_batch` state requests.
    pub fn poll_state_requests(&mut self, max_batch: usize) -> Vec<ShardOutcome> {
        let take = max_batch.min(self.state_requests.len());
        let batch: Vec<ShardId> = self.state_requests.drain(..take).collect();
        batch
            .into_iter()
            .map(|shard| match self.shards.get(&shard) {
                Some(state) => ShardOutcome::Found(state.clone()),
                None => ShardOutcome::UnknownShard(shard),
            })
            .collect()
    }

    pub fn update_state(
        &mut self,
        shard: ShardId,
        height: u64,
        tip: BlockHash,
        now: Timestamp,
    ) -> Result<(), NetworkError> {
        let state = self
            .shards
            .get_mut(&shard)
            .ok_or(NetworkError::UnknownShard(shard))?;
        state.height = height;
        state.tip = tip;
        state.updated_at = now;
        Ok(())
    }

    pub fn state(&self, shard: ShardId) -> Option<&ShardState> {
        self.shards.get(&shard)
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }
}

fn push_bounded(
    queue: &mut VecDeque<ShardId>,
    shard: ShardId,
    name: &'static str,
) -> Result<(), NetworkError> {
    if queue.len() >= REQUEST_CAPACITY {
        tracing::warn!(shard, queue = name, "shard request refused, queue full");
        return Err(NetworkError::QueueFull {
            queue: name,
            capacity: REQUEST_CAPACITY,
        });
    }
    queue.push_back(shard);
    Ok(())
}
