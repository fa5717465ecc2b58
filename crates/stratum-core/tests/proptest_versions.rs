// crates/stratum-core/tests/proptest_versions.rs
// ============================================================================
// Module: Version Property-Based Tests
// Description: Property tests for version parsing and ordering.
// Purpose: Detect ordering inconsistencies across wide input ranges.
// ============================================================================

//! Property-based tests for version invariants.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::cmp::Ordering;

use proptest::prelude::*;
use stratum_core::Version;

fn version_strategy() -> impl Strategy<Value = Version> {
    (0 .. 5_u32, 0 .. 30_u32, 0 .. 5_u32, 0 .. 3_u32, proptest::option::of("[a-z]{1,6}[0-9]?"))
        .prop_map(|(major, minor, patch, build, tag)| Version {
            major,
            minor,
            patch,
            build,
            tag,
        })
}

proptest! {
    #[test]
    fn display_then_parse_preserves_version(version in version_strategy()) {
        let parsed: Version = version.to_string().parse().unwrap();
        prop_assert_eq!(parsed, version);
    }

    #[test]
    fn ordering_is_antisymmetric(a in version_strategy(), b in version_strategy()) {
        prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
        prop_assert_eq!(a.cmp(&b) == Ordering::Equal, a == b);
    }

    #[test]
    fn tagged_release_precedes_untagged(version in version_strategy()) {
        let release = Version { tag: None, ..version.clone() };
        let tagged = release.clone().with_tag("beta1");
        prop_assert!(tagged < release);
        prop_assert!(tagged.is_dev());
    }
}

#[test]
fn short_forms_parse_with_zero_padding() {
    let version: Version = "1.24".parse().unwrap();
    assert_eq!(version, Version::new(1, 24, 0));
    assert_eq!(version.to_string(), "1.24.0");
    assert!("1".parse::<Version>().is_err());
    assert!("1.2.3.4.5".parse::<Version>().is_err());
    assert!("1.x".parse::<Version>().is_err());
    assert!("1.2-".parse::<Version>().is_err());
}
