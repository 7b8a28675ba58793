//! Validator address type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a validator in the stake pool.
///
/// Addresses are opaque strings assigned when stake is first deposited;
/// ordering is lexicographic and only used for deterministic iteration.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ValidatorAddress(String);

impl ValidatorAddress {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Return the raw address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && !self.0.chars().any(char::is_whitespace)
    }
}

impl fmt::Display for ValidatorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ValidatorAddress {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ValidatorAddress {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
