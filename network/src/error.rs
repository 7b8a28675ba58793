use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("peer limit of {max} reached")]
    PeerLimit { max: usize },

    #[error("peer {0} not found")]
    PeerNotFound(String),

    #[error("unknown shard {0}")]
    UnknownShard(u32),

    #[error("{queue} queue full ({capacity} pending)")]
    QueueFull { queue: &'static str, capacity: usize },

    #[error("outbound channel closed")]
    ChannelClosed,
}
