use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger is frozen; append refused")]
    Frozen,

    #[error("duplicate entry id: {0}")]
    DuplicateId(String),

    #[error("no working encryption key for component {component}; write skipped")]
    EncryptionUnavailable { component: String },

    #[error("encryption error: {0}")]
    Encryption(#[from] helix_crypto::CryptoError),

    #[error("serialization error: {0}")]
    Serialization(String),
}
