use proptest::prelude::*;

use helix_consensus::{arbitrate, ChangeRequest, Decision, ParameterKind, StakeRegistry};

const OVERRIDE_PRIORITY: u8 = 100;

proptest! {
    /// Non-override requests below the override priority never lower the value.
    #[test]
    fn ordinary_requests_never_lower(
        current in any::<u128>(),
        requested in any::<u128>(),
        priority in 0u8..OVERRIDE_PRIORITY,
    ) {
        let request = ChangeRequest::new("monitor", requested, priority);
        match arbitrate(current, &request, OVERRIDE_PRIORITY) {
            Decision::Applied { from, to } => {
                prop_assert_eq!(from, current);
                prop_assert!(to > current);
            }
            Decision::Unchanged => prop_assert_eq!(requested, current),
            Decision::Rejected(_) => prop_assert!(requested < current),
        }
    }

    /// Override or high-priority requests always take effect.
    #[test]
    fn forced_requests_always_apply(
        current in any::<u64>(),
        requested in any::<u64>(),
        priority in any::<u8>(),
        is_override in any::<bool>(),
    ) {
        prop_assume!(is_override || priority >= OVERRIDE_PRIORITY);
        let mut request = ChangeRequest::new("operator", requested, priority);
        request.is_override = is_override;
        let decision = arbitrate(current, &request, OVERRIDE_PRIORITY);
        if requested == current {
            prop_assert_eq!(decision, Decision::Unchanged);
        } else {
            prop_assert_eq!(decision, Decision::Applied { from: current, to: requested });
        }
    }

    /// Across any sequence of ordinary requests the registry value is
    /// monotonically non-decreasing.
    #[test]
    fn registry_monotonic_under_ordinary_requests(
        initial in 0u128..10_000,
        requests in prop::collection::vec((0u128..20_000, 0u8..OVERRIDE_PRIORITY), 1..50),
    ) {
        let mut registry = StakeRegistry::new(ParameterKind::MinStake, initial, OVERRIDE_PRIORITY, 90);
        let mut previous = registry.value();
        for (value, priority) in requests {
            registry.apply_change(ChangeRequest::new("monitor", value, priority));
            prop_assert!(registry.value() >= previous);
            previous = registry.value();
        }
    }
}
