//! Ledger entry and record types.

use serde::{Deserialize, Serialize};

use helix_crypto::{EntryCipher, SealedPayload};
use helix_types::Timestamp;

use crate::LedgerError;

/// Conventional status strings.
pub mod status {
    pub const COMPLETED: &str = "Completed";
    pub const FAILED: &str = "Failed";
    pub const APPLIED: &str = "Applied";
    pub const REJECTED: &str = "Rejected";
    pub const DETECTED: &str = "Detected";
    pub const UNRESOLVED: &str = "Unresolved";
}

/// An audit record as written by a component.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub timestamp: Timestamp,
    /// Category, e.g. `"ValidatorRotation"` or `"EmergencyShutdown"`.
    pub entry_type: String,
    pub status: String,
    pub details: Option<String>,
}

/// An entry whose status and details are encrypted.
///
/// `id`, `timestamp` and `entry_type` stay in the clear so the ledger can be
/// indexed without holding any component key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedEntry {
    pub id: String,
    pub timestamp: Timestamp,
    pub entry_type: String,
    pub payload: SealedPayload,
}

/// What the ledger actually stores.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerRecord {
    Plain(LedgerEntry),
    Sealed(SealedEntry),
}

impl LedgerRecord {
    /// Serialize `entry` and encrypt it under `cipher`.
    pub fn seal(entry: &LedgerEntry, cipher: &EntryCipher) -> Result<Self, LedgerError> {
        let bytes =
            bincode::serialize(entry).map_err(|e| LedgerError::Serialization(e.to_string()))?;
        let payload = cipher.seal(&bytes)?;
        Ok(Self::Sealed(SealedEntry {
            id: entry.id.clone(),
            timestamp: entry.timestamp,
            entry_type: entry.entry_type.clone(),
            payload,
        }))
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Plain(e) => &e.id,
            Self::Sealed(e) => &e.id,
        }
    }

    pub fn entry_type(&self) -> &str {
        match self {
            Self::Plain(e) => &e.entry_type,
            Self::Sealed(e) => &e.entry_type,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            Self::Plain(e) => e.timestamp,
            Self::Sealed(e) => e.timestamp,
        }
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self, Self::Sealed(_))
    }

    /// Recover the full entry. Sealed records need the writer's cipher.
    pub fn open(&self, cipher: Option<&EntryCipher>) -> Result<LedgerEntry, LedgerError> {
        match self {
            Self::Plain(e) => Ok(e.clone()),
            Self::Sealed(sealed) => {
                let cipher = cipher.ok_or_else(|| LedgerError::EncryptionUnavailable {
                    component: sealed.id.clone(),
                })?;
                let bytes = cipher.open(&sealed.payload)?;
                bincode::deserialize(&bytes).map_err(|e| LedgerError::Serialization(e.to_string()))
            }
        }
    }
}
