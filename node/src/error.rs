use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("ledger error: {0}")]
    Ledger(#[from] helix_ledger::LedgerError),

    #[error("network error: {0}")]
    Network(#[from] helix_network::NetworkError),

    #[error("consensus error: {0}")]
    Consensus(#[from] helix_consensus::ConsensusError),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("node already started")]
    AlreadyStarted,

    #[error("shutdown timeout; tasks still running: {0:?}")]
    ShutdownTimeout(Vec<&'static str>),
}
