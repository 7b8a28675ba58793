//! The append-only ledger store.

use std::collections::HashSet;

use crate::{LedgerError, LedgerRecord};

/// Write-once audit ledger.
///
/// Appends are the only mutation. While frozen, every append is refused with
/// [`LedgerError::Frozen`]; reads are always allowed.
#[derive(Debug, Default)]
pub struct Ledger {
    records: Vec<LedgerRecord>,
    ids: HashSet<String>,
    frozen: bool,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record. Ids must be unique across the whole ledger.
    pub fn append(&mut self, record: LedgerRecord) -> Result<(), LedgerError> {
        if self.frozen {
            return Err(LedgerError::Frozen);
        }
        if !self.ids.insert(record.id().to_string()) {
            return Err(LedgerError::DuplicateId(record.id().to_string()));
        }
        self.records.push(record);
        Ok(())
    }

    /// Refuse all further appends until [`unfreeze`](Self::unfreeze).
    pub fn freeze(&mut self) {
        if !self.frozen {
            tracing::warn!(entries = self.records.len(), "ledger frozen");
        }
        self.frozen = true;
    }

    pub fn unfreeze(&mut self) {
        if self.frozen {
            tracing::info!(entries = self.records.len(), "ledger unfrozen");
        }
        self.frozen = false;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn records(&self) -> &[LedgerRecord] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&LedgerRecord> {
        self.records.iter().find(|r| r.id() == id)
    }

    /// All records of one category, oldest first.
    pub fn of_type<'a>(&'a self, entry_type: &'a str) -> impl Iterator<Item = &'a LedgerRecord> {
        self.records
            .iter()
            .filter(move |r| r.entry_type() == entry_type)
    }

    /// Most recent record of one category.
    pub fn latest_of_type(&self, entry_type: &str) -> Option<&LedgerRecord> {
        self.records
            .iter()
            .rev()
            .find(|r| r.entry_type() == entry_type)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
