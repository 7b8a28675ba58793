//! Fork detection and recovery.
//!
//! The resolver watches chain validity. When validation fails it moves to
//! `ForkSuspected` and tries to recover by re-validating the latest block
//! through the finalizer. Nothing is deleted: a failed attempt simply stays
//! suspected and is retried on the next check.

use helix_ledger::{status, AuditTrail, Ledger};
use helix_types::{BlockHash, Timestamp};

use crate::ConsensusEngine;

/// Read-only view of a chain, as far as fork detection needs one.
pub trait ChainView {
    fn validate_chain(&self) -> bool;
    fn revalidate_latest_block(&self) -> bool;
    fn latest_block_hash(&self) -> Option<BlockHash>;
}

impl ChainView for ConsensusEngine {
    fn validate_chain(&self) -> bool {
        ConsensusEngine::validate_chain(self)
    }

    fn revalidate_latest_block(&self) -> bool {
        ConsensusEngine::revalidate_latest_block(self)
    }

    fn latest_block_hash(&self) -> Option<BlockHash> {
        self.latest_block().map(|b| b.hash)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForkState {
    Consistent,
    ForkSuspected { since: Timestamp, attempts: u32 },
}

/// Result of one [`ForkResolver::check`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForkCheck {
    /// Chain consistent and valid; nothing done.
    NoOp,
    /// A fork was suspected and resolution succeeded.
    Resolved,
    /// Resolution failed; still suspected after this many attempts.
    Unresolved { attempts: u32 },
}

pub struct ForkResolver {
    state: ForkState,
    trail: AuditTrail,
    detected: u64,
    resolved: u64,
}

impl ForkResolver {
    pub fn new(trail: AuditTrail) -> Self {
        Self {
            state: ForkState::Consistent,
            trail,
            detected: 0,
            resolved: 0,
        }
    }

    pub fn state(&self) -> ForkState {
        self.state
    }

    /// Forks detected since startup.
    pub fn detected(&self) -> u64 {
        self.detected
    }

    pub fn resolved(&self) -> u64 {
        self.resolved
    }

    pub fn check(&mut self, chain: &impl ChainView, ledger: &mut Ledger, now: Timestamp) -> ForkCheck {
        if self.state == ForkState::Consistent {
            if chain.validate_chain() {
                return ForkCheck::NoOp;
            }
            self.detected += 1;
            self.state = ForkState::ForkSuspected {
                since: now,
                attempts: 0,
            };
            let tip = chain
                .latest_block_hash()
                .map(|h| h.to_string())
                .unwrap_or_else(|| "empty".into());
            tracing::warn!(%tip, "chain validation failed, fork suspected");
            self.trail
                .log(ledger, "ForkDetected", status::DETECTED, Some(format!("tip {tip}")));
        }

        self.resolve(chain, ledger)
    }

    fn resolve(&mut self, chain: &impl ChainView, ledger: &mut Ledger) -> ForkCheck {
        let ForkState::ForkSuspected { since, attempts } = self.state else {
            return ForkCheck::NoOp;
        };

        if chain.revalidate_latest_block() {
            self.resolved += 1;
            self.state = ForkState::Consistent;
            tracing::info!(attempts = attempts + 1, "fork resolved");
            self.trail.log(
                ledger,
                "ForkResolved",
                status::COMPLETED,
                Some(format!("after {} attempt(s)", attempts + 1)),
            );
            ForkCheck::Resolved
        } else {
            let attempts = attempts + 1;
            self.state = ForkState::ForkSuspected { since, attempts };
            tracing::warn!(attempts, "fork resolution failed, will retry");
            self.trail.log(
                ledger,
                "ForkResolution",
                status::UNRESOLVED,
                Some(format!("attempt {attempts}")),
            );
            ForkCheck::Unresolved { attempts }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Chain whose validity is scripted by the test.
    struct ScriptedChain {
        chain_valid: Cell<bool>,
        latest_valid: Cell<bool>,
    }

    impl ScriptedChain {
        fn new(chain_valid: bool, latest_valid: bool) -> Self {
            Self {
                chain_valid: Cell::new(chain_valid),
                latest_valid: Cell::new(latest_valid),
            }
        }
    }

    impl ChainView for ScriptedChain {
        fn validate_chain(&self) -> bool {
            self.chain_valid.get()
        }

        fn revalidate_latest_block(&self) -> bool {
            self.latest_valid.get()
        }

        fn latest_block_hash(&self) -> Option<BlockHash> {
            Some(BlockHash::new([1; 32]))
        }
    }

    fn resolver() -> ForkResolver {
        ForkResolver::new(AuditTrail::plain("fork"))
    }

    #[test]
    fn consistent_chain_is_noop() {
        let mut r = resolver();
        let mut ledger = Ledger::new();
        let chain = ScriptedChain::new(true, true);
        for _ in 0..3 {
            assert_eq!(r.check(&chain, &mut ledger, Timestamp::new(1)), ForkCheck::NoOp);
        }
        assert!(ledger.is_empty());
        assert_eq!(r.state(), ForkState::Consistent);
    }

    #[test]
    fn detected_fork_resolved_in_one_check() {
        let mut r = resolver();
        let mut ledger = Ledger::new();
        let chain = ScriptedChain::new(false, true);

        assert_eq!(r.check(&chain, &mut ledger, Timestamp::new(1)), ForkCheck::Resolved);
        assert_eq!(r.state(), ForkState::Consistent);
        assert_eq!(ledger.of_type("ForkDetected").count(), 1);
        assert_eq!(ledger.of_type("ForkResolved").count(), 1);
        assert_eq!((r.detected(), r.resolved()), (1, 1));
    }

    #[test]
    fn failed_resolution_retried_next_check() {
        let mut r = resolver();
        let mut ledger = Ledger::new();
        let chain = ScriptedChain::new(false, false);

        assert_eq!(
            r.check(&chain, &mut ledger, Timestamp::new(1)),
            ForkCheck::Unresolved { attempts: 1 }
        );
        assert_eq!(
            r.check(&chain, &mut ledger, Timestamp::new(2)),
            ForkCheck::Unresolved { attempts: 2 }
        );
        assert_eq!(
            r.state(),
            ForkState::ForkSuspected {
                since: Timestamp::new(1),
                attempts: 2
            }
        );
        // still one detection, not one per check
        assert_eq!(ledger.of_type("ForkDetected").count(), 1);

        chain.latest_valid.set(true);
        assert_eq!(r.check(&chain, &mut ledger, Timestamp::new(3)), ForkCheck::Resolved);
        assert_eq!(r.state(), ForkState::Consistent);
    }

    #[test]
    fn frozen_ledger_does_not_block_resolution() {
        let mut r = resolver();
        let mut ledger = Ledger::new();
        ledger.freeze();
        let chain = ScriptedChain::new(false, true);
        assert_eq!(r.check(&chain, &mut ledger, Timestamp::new(1)), ForkCheck::Resolved);
        assert!(ledger.is_empty());
    }
}
