// crates/stratum-core/tests/environment_lifecycle.rs
// ============================================================================
// Module: Environment Lifecycle Tests
// Description: Configure, reconfigure, bootstrap, and destroy transitions.
// Purpose: Ensure client/storage consistency and the terminal destroyed guard.
// ============================================================================

//! Environment lifecycle tests using the fake provider.

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

use std::sync::Arc;
use std::thread;

use serde_json::json;
use stratum_core::BootstrapParams;
use stratum_core::ConfigError;
use stratum_core::Constraints;
use stratum_core::EnvironError;
use stratum_core::EnvironPhase;
use stratum_core::OperationContext;

use crate::common::FakeCloud;
use crate::common::FakeProvider;
use crate::common::configured_environment;
use crate::common::environment;
use crate::common::raw_config;
use crate::common::with_attr;

type TestResult = Result<(), String>;

// ============================================================================
// SECTION: Configuration
// ============================================================================

#[test]
fn new_environment_is_unconfigured() -> TestResult {
    let cloud = FakeCloud::new();
    let env = environment("prod", FakeProvider::new(&cloud), None);
    assert_eq!(env.phase().map_err(|err| err.to_string())?, EnvironPhase::Unconfigured);
    assert!(matches!(env.config(), Err(EnvironError::NotConfigured(_))));
    assert_eq!(cloud.clients_created(), 0);
    Ok(())
}

#[test]
fn identical_set_config_keeps_client_and_storage() -> TestResult {
    let cloud = FakeCloud::new();
    let env = configured_environment("prod", FakeProvider::new(&cloud));
    let first = env.snapshot().map_err(|err| err.to_string())?;

    env.set_config(&first.config().to_raw()).map_err(|err| err.to_string())?;
    let second = env.snapshot().map_err(|err| err.to_string())?;

    assert!(Arc::ptr_eq(first.client(), second.client()));
    assert!(Arc::ptr_eq(first.storage(), second.storage()));
    assert_eq!(cloud.clients_created(), 1);
    Ok(())
}

#[test]
fn backend_field_change_recreates_client_and_storage() -> TestResult {
    let cloud = FakeCloud::new();
    let env = configured_environment("prod", FakeProvider::new(&cloud));
    let first = env.snapshot().map_err(|err| err.to_string())?;

    let raw = with_attr(first.config().to_raw(), "password", json!("rotated"));
    env.set_config(&raw).map_err(|err| err.to_string())?;
    let second = env.snapshot().map_err(|err| err.to_string())?;

    assert!(!Arc::ptr_eq(first.client(), second.client()));
    assert!(!Arc::ptr_eq(first.storage(), second.storage()));
    assert_eq!(second.config().get_str("password"), Some("rotated"));
    assert_eq!(cloud.clients_created(), 2);
    Ok(())
}

#[test]
fn rejected_config_leaves_state_unchanged() -> TestResult {
    let cloud = FakeCloud::new();
    let env = configured_environment("prod", FakeProvider::new(&cloud));
    let before = env.config().map_err(|err| err.to_string())?;

    let raw = with_attr(before.to_raw(), "region", json!("lvs"));
    let err = env.set_config(&raw).unwrap_err();
    assert!(matches!(err, EnvironError::Config(ConfigError::ImmutableFieldChanged { .. })));
    assert_eq!(env.config().map_err(|err| err.to_string())?, before);
    Ok(())
}

#[test]
fn set_config_rejects_foreign_environment_name() {
    let cloud = FakeCloud::new();
    let env = environment("prod", FakeProvider::new(&cloud), None);
    let err = env.set_config(&raw_config("staging")).unwrap_err();
    assert!(matches!(
        err,
        EnvironError::Config(ConfigError::ImmutableFieldChanged { ref field, .. })
            if field == "name"
    ));
}

#[test]
fn concurrent_readers_see_consistent_snapshots() -> TestResult {
    let cloud = FakeCloud::new();
    let env = Arc::new(configured_environment("prod", FakeProvider::new(&cloud)));
    let writer = {
        let env = Arc::clone(&env);
        thread::spawn(move || {
            for index in 0 .. 20 {
                let raw = with_attr(raw_config("prod"), "password", json!(format!("p{index}")));
                env.set_config(&raw).unwrap();
            }
        })
    };
    for _ in 0 .. 200 {
        let snapshot = env.snapshot().map_err(|err| err.to_string())?;
        assert_eq!(snapshot.config().name().as_str(), "prod");
    }
    writer.join().map_err(|_| "writer panicked".to_string())?;
    assert_eq!(cloud.clients_created(), 21);
    Ok(())
}

// ============================================================================
// SECTION: Region and Precheck
// ============================================================================

#[test]
fn region_resolves_through_backend() -> TestResult {
    let cloud = FakeCloud::new();
    let env = configured_environment("prod", FakeProvider::new(&cloud));
    let spec = env.region().map_err(|err| err.to_string())?;
    assert_eq!(spec.region, "zrh");
    assert_eq!(spec.endpoint, "https://zrh.example.test/api/");
    Ok(())
}

#[test]
fn unknown_region_is_reported() {
    let cloud = FakeCloud::new();
    let env = environment("prod", FakeProvider::new(&cloud), None);
    env.set_config(&with_attr(raw_config("prod"), "region", json!("atlantis"))).unwrap();
    assert_eq!(env.region().unwrap_err(), EnvironError::UnknownRegion("atlantis".to_string()));
}

#[test]
fn precheck_rejects_known_bad_constraints() {
    let cloud = FakeCloud::new();
    let env = configured_environment("prod", FakeProvider::new(&cloud));
    let good: Constraints = "arch=amd64".parse().unwrap();
    let bad: Constraints = "arch=s390x".parse().unwrap();
    assert!(env.precheck_instance("trusty", &good, None).is_ok());
    assert!(matches!(env.precheck_instance("trusty", &bad, None), Err(EnvironError::Precheck(_))));
}

// ============================================================================
// SECTION: Destroy
// ============================================================================

#[test]
fn destroy_is_terminal() -> TestResult {
    let cloud = FakeCloud::new();
    let env = configured_environment("prod", FakeProvider::new(&cloud));
    let ctx = OperationContext::new();
    env.bootstrap(&ctx, &BootstrapParams::default()).map_err(|err| err.to_string())?;
    assert_eq!(cloud.running().len(), 1);

    env.destroy(&ctx).map_err(|err| err.to_string())?;
    assert!(cloud.running().is_empty());
    assert!(cloud.objects.lock().unwrap().is_empty());
    assert_eq!(env.phase().map_err(|err| err.to_string())?, EnvironPhase::Destroyed);

    assert!(matches!(env.config(), Err(EnvironError::Destroyed(_))));
    assert!(matches!(env.set_config(&raw_config("prod")), Err(EnvironError::Destroyed(_))));
    assert!(matches!(
        env.bootstrap(&ctx, &BootstrapParams::default()),
        Err(EnvironError::Destroyed(_))
    ));
    assert!(matches!(env.destroy(&ctx), Err(EnvironError::Destroyed(_))));
    Ok(())
}

#[test]
fn destroy_finds_unrecorded_instances() -> TestResult {
    let cloud = FakeCloud::new();
    let env = configured_environment("prod", FakeProvider::new(&cloud));
    let ctx = OperationContext::new();
    env.bootstrap(&ctx, &BootstrapParams::default()).map_err(|err| err.to_string())?;
    cloud.objects.lock().unwrap().clear();

    env.destroy(&ctx).map_err(|err| err.to_string())?;
    assert!(cloud.running().is_empty());
    Ok(())
}

#[test]
fn cancelled_destroy_keeps_environment_usable() -> TestResult {
    let cloud = FakeCloud::new();
    let env = configured_environment("prod", FakeProvider::new(&cloud));
    let ctx = OperationContext::new();
    ctx.cancel();
    assert!(env.destroy(&ctx).is_err());
    assert_eq!(env.phase().map_err(|err| err.to_string())?, EnvironPhase::Configured);
    env.destroy(&OperationContext::new()).map_err(|err| err.to_string())?;
    Ok(())
}

#[test]
fn destroying_unconfigured_environment_succeeds() -> TestResult {
    let cloud = FakeCloud::new();
    let env = environment("prod", FakeProvider::new(&cloud), None);
    env.destroy(&OperationContext::new()).map_err(|err| err.to_string())?;
    assert!(matches!(env.config(), Err(EnvironError::Destroyed(_))));
    Ok(())
}
