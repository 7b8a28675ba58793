//! Component-scoped ledger writer.
//!
//! Each supervisory component owns one [`AuditTrail`]. The trail stamps ids
//! (`<component>-<seq>`), encrypts with the component key when configured,
//! and appends to the shared [`Ledger`]. When encryption is required but no
//! working key exists, the write is skipped and logged instead of falling
//! back to plaintext.

use std::sync::atomic::{AtomicU64, Ordering};

use helix_crypto::EntryCipher;
use helix_types::Timestamp;

use crate::{Ledger, LedgerEntry, LedgerError, LedgerRecord};

/// How a trail protects the entries it writes.
#[derive(Clone, Debug)]
pub enum EntryEncryption {
    /// Entries are stored in the clear.
    Disabled,
    /// Entries are sealed with this component's cipher.
    Enabled(EntryCipher),
    /// Encryption is required but no key is available; writes are skipped.
    Unavailable,
}

#[derive(Debug)]
pub struct AuditTrail {
    component: String,
    encryption: EntryEncryption,
    seq: AtomicU64,
}

impl AuditTrail {
    pub fn new(component: impl Into<String>, encryption: EntryEncryption) -> Self {
        Self {
            component: component.into(),
            encryption,
            seq: AtomicU64::new(0),
        }
    }

    /// Trail that stores entries in the clear.
    pub fn plain(component: impl Into<String>) -> Self {
        Self::new(component, EntryEncryption::Disabled)
    }

    /// Build a trail from node-level settings.
    ///
    /// With `require_encryption` set and no master key, the trail is created
    /// in the [`EntryEncryption::Unavailable`] state.
    pub fn from_master_key(
        component: impl Into<String>,
        master_key: Option<&[u8; 32]>,
        require_encryption: bool,
    ) -> Self {
        let component = component.into();
        let encryption = match (master_key, require_encryption) {
            (Some(key), _) => EntryEncryption::Enabled(EntryCipher::for_component(key, &component)),
            (None, true) => EntryEncryption::Unavailable,
            (None, false) => EntryEncryption::Disabled,
        };
        Self::new(component, encryption)
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    /// The cipher needed to open this trail's sealed entries.
    pub fn cipher(&self) -> Option<&EntryCipher> {
        match &self.encryption {
            EntryEncryption::Enabled(cipher) => Some(cipher),
            _ => None,
        }
    }

    /// Write one entry, returning its id.
    pub fn record(
        &self,
        ledger: &mut Ledger,
        entry_type: &str,
        status: &str,
        details: Option<String>,
    ) -> Result<String, LedgerError> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let entry = LedgerEntry {
            id: format!("{}-{}", self.component, seq),
            timestamp: Timestamp::now(),
            entry_type: entry_type.to_string(),
            status: status.to_string(),
            details,
        };

        let record = match &self.encryption {
            EntryEncryption::Disabled => LedgerRecord::Plain(entry),
            EntryEncryption::Enabled(cipher) => LedgerRecord::seal(&entry, cipher)?,
            EntryEncryption::Unavailable => {
                return Err(LedgerError::EncryptionUnavailable {
                    component: self.component.clone(),
                })
            }
        };

        let id = record.id().to_string();
        ledger.append(record)?;
        Ok(id)
    }

    /// Like [`record`](Self::record), but a failed write is logged and
    /// skipped; the caller retries on its next scheduled tick.
    pub fn log(
        &self,
        ledger: &mut Ledger,
        entry_type: &str,
        status: &str,
        details: Option<String>,
    ) -> Option<String> {
        match self.record(ledger, entry_type, status, details) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(
                    component = %self.component,
                    entry_type,
                    status,
                    error = %e,
                    "ledger write skipped"
                );
                None
            }
        }
    }

    /// Open one of this trail's records.
    pub fn open(&self, record: &LedgerRecord) -> Result<LedgerEntry, LedgerError> {
        record.open(self.cipher())
    }
}
