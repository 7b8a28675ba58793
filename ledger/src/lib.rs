//! Append-only audit ledger.
//!
//! Every supervisory decision (rotations, rewards, parameter changes, fork
//! resolution, emergency halts) lands here as a write-once entry. Entries are
//! never mutated or deleted, only superseded by later entries. The emergency
//! controller can freeze the ledger, after which every append is refused.
//!
//! - [`entry`] — entry and record types (plain or sealed).
//! - [`ledger`] — the append-only store with freeze control.
//! - [`audit`] — component-scoped writer that encrypts before appending.

pub mod audit;
pub mod entry;
pub mod error;
pub mod ledger;

pub use audit::{AuditTrail, EntryEncryption};
pub use entry::{status, LedgerEntry, LedgerRecord, SealedEntry};
pub use error::LedgerError;
pub use ledger::Ledger;
