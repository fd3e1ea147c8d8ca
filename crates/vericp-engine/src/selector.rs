//! Strategy selection
//!
//! A pure function of the endpoint classes, the source length and the
//! thresholds. Rules are evaluated in fixed order and the first match wins:
//!
//! 1. Either endpoint is network-mapped or unresolvable: STAGED
//! 2. Both endpoints local fixed, DIRECT_LARGE enabled and the length at or
//!    above its threshold: DIRECT_LARGE
//! 3. Both endpoints local fixed (and below the DIRECT/STAGED threshold, if
//!    one is set): DIRECT_SMALL
//! 4. Anything else, including removable media: STAGED

use crate::settings::StrategyThresholds;
use vericp_types::{CopyStrategy, LocationClass, VerificationMode, VerifyPolicy};

/// A selected strategy and the rule that selected it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    /// Selected strategy
    pub strategy: CopyStrategy,
    /// 1-based index of the matching rule
    pub rule: u8,
}

/// Select the copy strategy for one file
pub fn select_strategy(
    source: LocationClass,
    destination: LocationClass,
    length: u64,
    thresholds: &StrategyThresholds,
) -> Selection {
    let remote = |class: LocationClass| {
        matches!(
            class,
            LocationClass::NetworkMapped | LocationClass::Unresolvable
        )
    };
    if remote(source) || remote(destination) {
        return Selection {
            strategy: CopyStrategy::Staged,
            rule: 1,
        };
    }

    let both_fixed =
        source == LocationClass::LocalFixed && destination == LocationClass::LocalFixed;

    if both_fixed
        && thresholds.direct_large_enabled
        && length >= thresholds.direct_large_threshold
    {
        return Selection {
            strategy: CopyStrategy::DirectLarge,
            rule: 2,
        };
    }

    if both_fixed
        && thresholds
            .direct_staged_threshold
            .map_or(true, |limit| length < limit)
    {
        return Selection {
            strategy: CopyStrategy::DirectSmall,
            rule: 3,
        };
    }

    Selection {
        strategy: CopyStrategy::Staged,
        rule: 4,
    }
}

/// Verification mode for `strategy` under `policy`
pub fn select_verification(
    strategy: CopyStrategy,
    policy: VerifyPolicy,
    length: u64,
) -> VerificationMode {
    if policy.requires_verification(length) {
        strategy.bound_verification()
    } else {
        VerificationMode::None
    }
}

/// Whether a copy with this strategy and mode hashes anything
pub fn needs_hasher(strategy: CopyStrategy, mode: VerificationMode) -> bool {
    mode == VerificationMode::DigestCompare
        && matches!(strategy, CopyStrategy::DirectLarge | CopyStrategy::Staged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    const T: u64 = 1024 * 1024 * 1024;

    fn thresholds() -> StrategyThresholds {
        StrategyThresholds {
            direct_large_enabled: true,
            direct_large_threshold: T,
            direct_staged_threshold: None,
        }
    }

    use LocationClass::{LocalFixed, LocalRemovable, NetworkMapped, Unresolvable};

    #[rstest]
    #[case(LocalFixed, LocalFixed, T - 1, CopyStrategy::DirectSmall, 3)]
    #[case(LocalFixed, LocalFixed, T, CopyStrategy::DirectLarge, 2)]
    #[case(LocalFixed, LocalFixed, T + 1, CopyStrategy::DirectLarge, 2)]
    #[case(LocalFixed, NetworkMapped, T - 1, CopyStrategy::Staged, 1)]
    #[case(LocalFixed, NetworkMapped, T, CopyStrategy::Staged, 1)]
    #[case(LocalFixed, NetworkMapped, T + 1, CopyStrategy::Staged, 1)]
    #[case(NetworkMapped, LocalFixed, T + 1, CopyStrategy::Staged, 1)]
    #[case(Unresolvable, LocalFixed, 10, CopyStrategy::Staged, 1)]
    #[case(LocalRemovable, LocalFixed, T + 1, CopyStrategy::Staged, 4)]
    #[case(LocalFixed, LocalRemovable, 10, CopyStrategy::Staged, 4)]
    #[case(LocalFixed, LocalFixed, 0, CopyStrategy::DirectSmall, 3)]
    fn test_boundary_table(
        #[case] source: LocationClass,
        #[case] destination: LocationClass,
        #[case] length: u64,
        #[case] strategy: CopyStrategy,
        #[case] rule: u8,
    ) {
        let selection = select_strategy(source, destination, length, &thresholds());
        assert_eq!(selection, Selection { strategy, rule });
    }

    #[test]
    fn test_direct_large_disabled() {
        let thresholds = StrategyThresholds {
            direct_large_enabled: false,
            ..thresholds()
        };
        let selection = select_strategy(LocalFixed, LocalFixed, 5 * T, &thresholds);
        assert_eq!(selection.strategy, CopyStrategy::DirectSmall);
    }

    #[rstest]
    #[case(99, CopyStrategy::DirectSmall)]
    #[case(100, CopyStrategy::Staged)]
    #[case(101, CopyStrategy::Staged)]
    fn test_direct_staged_threshold(#[case] length: u64, #[case] expected: CopyStrategy) {
        let thresholds = StrategyThresholds {
            direct_staged_threshold: Some(100),
            ..thresholds()
        };
        let selection = select_strategy(LocalFixed, LocalFixed, length, &thresholds);
        assert_eq!(selection.strategy, expected);
    }

    #[test]
    fn test_skip_policy_disables_verification_and_hashing() {
        for strategy in [
            CopyStrategy::DirectSmall,
            CopyStrategy::DirectLarge,
            CopyStrategy::Staged,
        ] {
            let mode = select_verification(strategy, VerifyPolicy::SkipAll, 10);
            assert_eq!(mode, VerificationMode::None);
            assert!(!needs_hasher(strategy, mode));
        }
    }

    #[test]
    fn test_direct_small_never_hashes() {
        let mode = select_verification(CopyStrategy::DirectSmall, VerifyPolicy::VerifyAll, 10);
        assert_eq!(mode, VerificationMode::WindowCompare);
        assert!(!needs_hasher(CopyStrategy::DirectSmall, mode));
    }

    fn class() -> impl Strategy<Value = LocationClass> {
        prop_oneof![
            Just(LocalFixed),
            Just(LocalRemovable),
            Just(NetworkMapped),
            Just(Unresolvable),
        ]
    }

    proptest! {
        #[test]
        fn test_selection_is_deterministic(
            source in class(),
            destination in class(),
            length in any::<u64>(),
            threshold in 1u64..u64::MAX,
            enabled in any::<bool>()
        ) {
            let thresholds = StrategyThresholds {
                direct_large_enabled: enabled,
                direct_large_threshold: threshold,
                direct_staged_threshold: None,
            };
            let first = select_strategy(source, destination, length, &thresholds);
            let second = select_strategy(source, destination, length, &thresholds);
            prop_assert_eq!(first, second);

            if matches!(source, NetworkMapped | Unresolvable)
                || matches!(destination, NetworkMapped | Unresolvable)
            {
                prop_assert_eq!(first.strategy, CopyStrategy::Staged);
            }
        }
    }
}
