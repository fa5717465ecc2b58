// crates/stratum-core/tests/metadata_sources.rs
// ============================================================================
// Module: Metadata Source Resolver Tests
// Description: Source ordering, optional capability handling, and failures.
// Purpose: Ensure override, provider, and default sources resolve in order.
// ============================================================================

//! Metadata source resolution tests.

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

mod common;

use serde_json::json;
use stratum_core::MetadataSourceResolver;
use stratum_core::ResolveError;

use crate::common::FakeCloud;
use crate::common::FakeProvider;
use crate::common::environment;
use crate::common::raw_config;
use crate::common::with_attr;

type TestResult = Result<(), String>;

const OVERRIDE: &str = "https://mirror.internal.test/tools/";
const DEFAULT: &str = "https://streams.example.test/tools/";

fn urls(sources: &[stratum_core::MetadataSource]) -> Vec<String> {
    sources.iter().map(|source| source.url.to_string()).collect()
}

#[test]
fn override_then_default_without_capability() -> TestResult {
    let cloud = FakeCloud::new();
    let env = environment("prod", FakeProvider::new(&cloud), Some(DEFAULT));
    env.set_config(&with_attr(raw_config("prod"), "agent-metadata-url", json!(OVERRIDE)))
        .map_err(|err| err.to_string())?;

    let resolver = MetadataSourceResolver::new(Some(DEFAULT.parse().map_err(|_| "bad url")?));
    let sources = resolver.resolve(&env).map_err(|err| err.to_string())?;
    assert_eq!(urls(&sources), vec![OVERRIDE.to_string(), DEFAULT.to_string()]);
    assert_eq!(sources[0].description, MetadataSourceResolver::OVERRIDE_DESCRIPTION);
    assert_eq!(sources[1].description, MetadataSourceResolver::DEFAULT_DESCRIPTION);
    Ok(())
}

#[test]
fn provider_sources_sit_between_override_and_default() -> TestResult {
    let cloud = FakeCloud::new();
    let env = environment("prod", FakeProvider::new(&cloud).with_sources(false), Some(DEFAULT));
    env.set_config(&with_attr(raw_config("prod"), "agent-metadata-url", json!(OVERRIDE)))
        .map_err(|err| err.to_string())?;

    let resolver = MetadataSourceResolver::new(Some(DEFAULT.parse().map_err(|_| "bad url")?));
    let sources = resolver.resolve(&env).map_err(|err| err.to_string())?;
    assert_eq!(
        urls(&sources),
        vec![
            OVERRIDE.to_string(),
            "https://zrh.mirror.example.test/tools/".to_string(),
            DEFAULT.to_string(),
        ]
    );
    Ok(())
}

#[test]
fn failing_capability_fails_resolution() -> TestResult {
    let cloud = FakeCloud::new();
    let env = environment("prod", FakeProvider::new(&cloud).with_sources(true), None);
    env.set_config(&raw_config("prod")).map_err(|err| err.to_string())?;

    let err = MetadataSourceResolver::default().resolve(&env).unwrap_err();
    assert!(matches!(err, ResolveError::Custom(_)));
    Ok(())
}

#[test]
fn no_sources_is_empty_not_error() -> TestResult {
    let cloud = FakeCloud::new();
    let env = environment("prod", FakeProvider::new(&cloud), None);
    env.set_config(&raw_config("prod")).map_err(|err| err.to_string())?;
    let sources = MetadataSourceResolver::new(None).resolve(&env).map_err(|err| err.to_string())?;
    assert!(sources.is_empty());
    Ok(())
}

#[test]
fn unconfigured_environment_reports_config_error() {
    let cloud = FakeCloud::new();
    let env = environment("prod", FakeProvider::new(&cloud), None);
    let err = MetadataSourceResolver::default().resolve(&env).unwrap_err();
    assert!(matches!(err, ResolveError::Environment(_)));
}
