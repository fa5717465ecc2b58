// crates/stratum-providers/tests/memory_environment.rs
// ============================================================================
// Module: Memory Environment Tests
// Description: Registry lookup and full lifecycle on the in-process provider.
// Purpose: Ensure built-in providers plug into the environment runtime.
// ============================================================================

//! End-to-end lifecycle tests over the memory provider and registry.

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

use std::sync::Arc;

use serde_json::json;
use stratum_core::BootstrapParams;
use stratum_core::EnvironError;
use stratum_core::EnvironPhase;
use stratum_core::Environment;
use stratum_core::EnvironmentName;
use stratum_core::MetadataSourceResolver;
use stratum_core::OperationContext;
use stratum_core::RawConfig;
use stratum_providers::MemoryCloud;
use stratum_providers::MemoryProvider;
use stratum_providers::ProviderRegistry;
use stratum_providers::RegistryError;
use stratum_providers::SigmaProviderConfig;
use url::Url;

type TestResult = Result<(), String>;

// ============================================================================
// SECTION: Test Helpers
// ============================================================================

fn raw(name: &str) -> RawConfig {
    RawConfig::from([
        ("name".to_string(), json!(name)),
        ("type".to_string(), json!("memory")),
    ])
}

fn registry(cloud: MemoryCloud) -> ProviderRegistry {
    ProviderRegistry::with_builtin_providers(SigmaProviderConfig::default(), cloud).unwrap()
}

fn configured(
    registry: &ProviderRegistry,
    name: &str,
    resolver: MetadataSourceResolver,
) -> Environment {
    let env = registry.open_environment(EnvironmentName::new(name), "memory", resolver).unwrap();
    env.set_config(&raw(name)).unwrap();
    env
}

// ============================================================================
// SECTION: Registry
// ============================================================================

#[test]
fn builtin_registry_lists_provider_types() {
    let registry = registry(MemoryCloud::default());
    assert_eq!(registry.provider_types().collect::<Vec<_>>(), vec!["memory", "sigma"]);
    assert!(registry.get("sigma").is_some());
    assert!(registry.get("ec2").is_none());
}

#[test]
fn duplicate_registration_is_rejected() {
    let mut registry = registry(MemoryCloud::default());
    let err = registry.register_provider(Arc::new(MemoryProvider::default())).unwrap_err();
    assert_eq!(err, RegistryError::AlreadyRegistered("memory".to_string()));
    assert_eq!(err.to_string(), "provider already registered: memory");
}

#[test]
fn unknown_provider_type_is_not_registered() {
    let registry = registry(MemoryCloud::default());
    let err = registry
        .open_environment(EnvironmentName::new("prod"), "ec2", MetadataSourceResolver::default())
        .unwrap_err();
    assert_eq!(err, RegistryError::NotRegistered("ec2".to_string()));
}

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

#[test]
fn bootstrap_installs_agent_and_records_control_instance() -> TestResult {
    let cloud = MemoryCloud::default();
    let default_source =
        Url::parse("https://streams.example.test/tools/").map_err(|err| err.to_string())?;
    let registry = registry(cloud.clone());
    let env = configured(&registry, "prod", MetadataSourceResolver::new(Some(default_source)));
    let ctx = OperationContext::new();

    let result = env.bootstrap(&ctx, &BootstrapParams::default()).map_err(|err| err.to_string())?;
    assert_eq!(result.series, "trusty");
    assert!(!result.reused);
    let instance_id = result.instance.id.clone();
    let machine = result.finalize(&ctx).map_err(|err| err.to_string())?;

    assert_eq!(env.phase().map_err(|err| err.to_string())?, EnvironPhase::Bootstrapped);
    assert_eq!(env.control_instances().map_err(|err| err.to_string())?, vec![instance_id.clone()]);
    assert_eq!(machine.metadata_urls, vec!["https://streams.example.test/tools/".to_string()]);
    assert!(machine.agent_env.is_empty());
    let installed = cloud.agent_config(&instance_id).map_err(|err| err.to_string())?;
    assert_eq!(installed, Some(machine));
    Ok(())
}

#[test]
fn mirrors_are_offered_as_custom_sources() -> TestResult {
    let mirror = Url::parse("https://mirror.example.test/").map_err(|err| err.to_string())?;
    let cloud = MemoryCloud::default().with_mirrors(vec![mirror]);
    let env = configured(&registry(cloud), "prod", MetadataSourceResolver::default());
    let ctx = OperationContext::new();

    let machine = env
        .bootstrap(&ctx, &BootstrapParams::default())
        .and_then(|result| result.finalize(&ctx).map_err(EnvironError::from))
        .map_err(|err| err.to_string())?;
    assert_eq!(machine.metadata_urls, vec!["https://mirror.example.test/".to_string()]);
    Ok(())
}

#[test]
fn environments_do_not_share_storage() -> TestResult {
    let cloud = MemoryCloud::default();
    let registry = registry(cloud);
    let prod = configured(&registry, "prod", MetadataSourceResolver::default());
    let staging = configured(&registry, "staging", MetadataSourceResolver::default());
    let ctx = OperationContext::new();

    prod.bootstrap(&ctx, &BootstrapParams::default()).map_err(|err| err.to_string())?;
    assert!(matches!(staging.control_instances(), Err(EnvironError::NotBootstrapped(_))));
    Ok(())
}

#[test]
fn destroy_stops_instances_and_clears_storage() -> TestResult {
    let cloud = MemoryCloud::default();
    let registry = registry(cloud.clone());
    let env = configured(&registry, "prod", MetadataSourceResolver::default());
    let ctx = OperationContext::new();
    env.bootstrap(&ctx, &BootstrapParams::default()).map_err(|err| err.to_string())?;
    assert_eq!(cloud.live_instances().map_err(|err| err.to_string())?.len(), 1);

    env.destroy(&ctx).map_err(|err| err.to_string())?;
    assert!(cloud.live_instances().map_err(|err| err.to_string())?.is_empty());
    assert!(matches!(env.config(), Err(EnvironError::Destroyed(_))));

    let reopened = configured(&registry, "prod", MetadataSourceResolver::default());
    let storage = reopened.storage().map_err(|err| err.to_string())?;
    assert!(storage.list("").map_err(|err| err.to_string())?.is_empty());
    Ok(())
}

#[test]
fn rebootstrap_reuses_live_control_instance() -> TestResult {
    let cloud = MemoryCloud::default();
    let env = configured(&registry(cloud.clone()), "prod", MetadataSourceResolver::default());
    let ctx = OperationContext::new();

    let first = env.bootstrap(&ctx, &BootstrapParams::default()).map_err(|err| err.to_string())?;
    let second = env.bootstrap(&ctx, &BootstrapParams::default()).map_err(|err| err.to_string())?;
    assert!(second.reused);
    assert_eq!(first.instance.id, second.instance.id);
    assert_eq!(cloud.live_instances().map_err(|err| err.to_string())?.len(), 1);
    Ok(())
}

#[test]
fn unknown_region_is_rejected_at_configure_time() {
    let registry = registry(MemoryCloud::default());
    let env = registry
        .open_environment(EnvironmentName::new("prod"), "memory", MetadataSourceResolver::default())
        .unwrap();
    let mut config = raw("prod");
    config.insert("region".to_string(), json!("mars"));
    env.set_config(&config).unwrap();
    assert!(matches!(env.region(), Err(EnvironError::UnknownRegion(region)) if region == "mars"));
}
