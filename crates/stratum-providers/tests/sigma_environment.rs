// crates/stratum-providers/tests/sigma_environment.rs
// ============================================================================
// Module: Sigma Environment Tests
// Description: The sigma provider driven through the environment lifecycle.
// Purpose: Ensure sigma config reaches client and storage, and storage stays
//          confined to its root.
// ============================================================================

//! Sigma provider tests through [`Environment`], using a temporary storage
//! root and a scripted API server.

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

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use serde_json::json;
use stratum_core::BootstrapParams;
use stratum_core::ConfigError;
use stratum_core::Constraints;
use stratum_core::EnvironError;
use stratum_core::EnvironPhase;
use stratum_core::Environment;
use stratum_core::EnvironmentName;
use stratum_core::InstanceId;
use stratum_core::MetadataSourceResolver;
use stratum_core::OperationContext;
use stratum_core::ProviderBackend;
use stratum_core::RawConfig;
use stratum_core::SchemaError;
use stratum_core::Storage;
use stratum_core::StorageError;
use stratum_core::validate;
use stratum_providers::SigmaProvider;
use stratum_providers::SigmaProviderConfig;
use stratum_providers::local_storage::STORAGE_ADDR_KEY;
use stratum_providers::local_storage::STORAGE_AUTH_KEY;
use stratum_providers::local_storage::STORAGE_DIR_KEY;
use tempfile::TempDir;
use url::Url;

use crate::common::scripted_api;

type TestResult = Result<(), String>;

// ============================================================================
// SECTION: Test Helpers
// ============================================================================

/// Endpoint nothing listens on; used where no request may be sent.
const UNUSED_ENDPOINT: &str = "http://127.0.0.1:9/api/2.0";

const DRIVES: &str = r#"{"objects":[{"series":"trusty","arch":"amd64"}]}"#;
const STARTED: &str = concat!(
    r#"{"uuid":"srv-1","status":"starting","#,
    r#""meta":{"stratum-environment":"prod","stratum-control-node":"true"}}"#
);
const LISTED: &str = concat!(
    r#"{"objects":[{"uuid":"srv-1","status":"running","#,
    r#""meta":{"stratum-environment":"prod","stratum-control-node":"true"},"#,
    r#""ips":["10.0.0.5"]}]}"#
);

fn storage_root(dir: &TempDir) -> PathBuf {
    dir.path().join("stratum-storage")
}

fn provider(dir: &TempDir, endpoint: &str) -> Arc<dyn ProviderBackend> {
    Arc::new(SigmaProvider::new(SigmaProviderConfig {
        storage_root: storage_root(dir),
        endpoint: Some(Url::parse(endpoint).unwrap()),
        timeout_ms: 5_000,
    }))
}

fn raw(name: &str) -> RawConfig {
    RawConfig::from([
        ("name".to_string(), json!(name)),
        ("type".to_string(), json!("sigma")),
        ("username".to_string(), json!("ops")),
        ("password".to_string(), json!("hunter2")),
    ])
}

fn with_attr(mut raw: RawConfig, key: &str, value: Value) -> RawConfig {
    raw.insert(key.to_string(), value);
    raw
}

fn environment(dir: &TempDir, name: &str, endpoint: &str) -> Environment {
    Environment::new(
        EnvironmentName::new(name),
        provider(dir, endpoint),
        MetadataSourceResolver::new(None),
    )
}

fn configured(dir: &TempDir, endpoint: &str) -> Environment {
    let env = environment(dir, "prod", endpoint);
    env.set_config(&raw("prod")).unwrap();
    env
}

// ============================================================================
// SECTION: Configuration Wiring
// ============================================================================

#[test]
fn storage_settings_come_from_config() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let env = environment(&dir, "prod", UNUSED_ENDPOINT);
    env.set_config(&with_attr(raw("prod"), "storage-port", json!("9040")))
        .map_err(|err| err.to_string())?;

    let config = env.config().map_err(|err| err.to_string())?;
    let auth_key = config.get_str("storage-auth-key").ok_or("auth key missing")?.to_string();
    assert!(!auth_key.is_empty());

    let storage = env.storage().map_err(|err| err.to_string())?;
    assert!(storage.is_temporary());
    let settings = storage.expose("10.0.0.5").map_err(|err| err.to_string())?;
    assert_eq!(settings[STORAGE_ADDR_KEY], "10.0.0.5:9040");
    assert_eq!(settings[STORAGE_AUTH_KEY], auth_key);
    assert_eq!(settings[STORAGE_DIR_KEY], storage_root(&dir).join("prod").display().to_string());
    assert!(storage_root(&dir).join("prod").is_dir());
    Ok(())
}

#[test]
fn credential_change_rebuilds_client_and_storage() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let env = configured(&dir, UNUSED_ENDPOINT);
    let first = env.snapshot().map_err(|err| err.to_string())?;
    let auth_key = first.config().get_str("storage-auth-key").map(str::to_string);

    env.set_config(&raw("prod")).map_err(|err| err.to_string())?;
    let same = env.snapshot().map_err(|err| err.to_string())?;
    assert!(Arc::ptr_eq(first.client(), same.client()));
    assert!(Arc::ptr_eq(first.storage(), same.storage()));

    env.set_config(&with_attr(raw("prod"), "password", json!("rotated")))
        .map_err(|err| err.to_string())?;
    let rotated = env.snapshot().map_err(|err| err.to_string())?;
    assert!(!Arc::ptr_eq(first.client(), rotated.client()));
    assert!(!Arc::ptr_eq(first.storage(), rotated.storage()));
    assert_eq!(rotated.config().get_str("storage-auth-key").map(str::to_string), auth_key);
    Ok(())
}

#[test]
fn changing_storage_port_names_the_field() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let env = configured(&dir, UNUSED_ENDPOINT);
    let before = env.config().map_err(|err| err.to_string())?;

    let err = env.set_config(&with_attr(raw("prod"), "storage-port", json!(8041))).unwrap_err();
    assert_eq!(
        err,
        EnvironError::Config(ConfigError::ImmutableFieldChanged {
            field: "storage-port".to_string(),
            old: "8040".to_string(),
            new: "8041".to_string(),
        })
    );
    assert_eq!(env.config().map_err(|err| err.to_string())?, before);
    Ok(())
}

#[test]
fn precheck_rejects_instance_type() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let env = configured(&dir, UNUSED_ENDPOINT);
    let constraints = Constraints {
        instance_type: Some("m1.small".to_string()),
        ..Constraints::default()
    };

    let err = env.precheck_instance("trusty", &constraints, None).unwrap_err();
    assert!(matches!(&err, EnvironError::Precheck(message) if message.contains("instance-type")));
    env.precheck_instance("trusty", &Constraints::default(), None)
        .map_err(|err| err.to_string())?;

    let params = BootstrapParams {
        constraints,
        ..BootstrapParams::default()
    };
    let err = env.bootstrap(&OperationContext::new(), &params).unwrap_err();
    assert!(matches!(err, EnvironError::Precheck(_)));
    assert_eq!(env.phase().map_err(|err| err.to_string())?, EnvironPhase::Configured);
    Ok(())
}

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

#[test]
fn bootstrap_exposes_local_storage_to_control_node() -> TestResult {
    let (base, handle) =
        scripted_api(vec![(200, DRIVES), (200, STARTED), (200, "{}"), (200, LISTED), (200, "{}")]);
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let env = configured(&dir, base.as_str());
    let auth_key = env
        .config()
        .map_err(|err| err.to_string())?
        .get_str("storage-auth-key")
        .ok_or("auth key missing")?
        .to_string();

    let ctx = OperationContext::new();
    let result = env.bootstrap(&ctx, &BootstrapParams::default()).map_err(|err| err.to_string())?;
    assert_eq!(result.instance.id, InstanceId::new("srv-1"));
    assert!(!result.reused);
    assert_eq!(env.phase().map_err(|err| err.to_string())?, EnvironPhase::Bootstrapped);
    assert_eq!(
        env.control_instances().map_err(|err| err.to_string())?,
        vec![InstanceId::new("srv-1")]
    );
    assert!(storage_root(&dir).join("prod").join("provider-state").is_file());

    let machine = result.finalize(&ctx).map_err(|err| err.to_string())?;
    assert_eq!(machine.agent_env[STORAGE_ADDR_KEY], "10.0.0.5:8040");
    assert_eq!(machine.agent_env[STORAGE_AUTH_KEY], auth_key);

    let observed = handle.join().map_err(|_| "server panicked".to_string())?;
    let calls: Vec<(&str, &str)> =
        observed.iter().map(|call| (call.method.as_str(), call.url.as_str())).collect();
    assert_eq!(
        calls,
        vec![
            ("GET", "/api/2.0/libdrives/"),
            ("POST", "/api/2.0/servers/"),
            ("PUT", "/api/2.0/servers/srv-1/agent/"),
            ("GET", "/api/2.0/servers/?environment=prod"),
            ("PUT", "/api/2.0/servers/srv-1/agent/"),
        ]
    );
    assert!(!observed[2].body.contains(STORAGE_ADDR_KEY));
    assert!(observed[4].body.contains("10.0.0.5:8040"));
    Ok(())
}

#[test]
fn destroy_stops_servers_and_clears_only_its_own_storage() -> TestResult {
    let (base, handle) = scripted_api(vec![(200, LISTED), (200, "{}")]);
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    fs::write(dir.path().join("victim.txt"), b"keep").map_err(|err| err.to_string())?;
    let env = configured(&dir, base.as_str());
    let storage = env.storage().map_err(|err| err.to_string())?;
    storage.put("tools.tgz", b"agent").map_err(|err| err.to_string())?;

    env.destroy(&OperationContext::new()).map_err(|err| err.to_string())?;
    assert_eq!(env.phase().map_err(|err| err.to_string())?, EnvironPhase::Destroyed);
    assert!(storage.list("").map_err(|err| err.to_string())?.is_empty());
    assert!(dir.path().join("victim.txt").is_file());

    let observed = handle.join().map_err(|_| "server panicked".to_string())?;
    assert_eq!(observed[1].method, "POST");
    assert_eq!(observed[1].url, "/api/2.0/servers/srv-1/action/?do=stop");
    Ok(())
}

// ============================================================================
// SECTION: Storage Confinement
// ============================================================================

#[test]
fn path_like_names_never_reach_the_filesystem() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let victim = dir.path().join("victim.txt");
    fs::write(&victim, b"keep").map_err(|err| err.to_string())?;
    let absolute = dir.path().display().to_string();

    for name in ["..", "/abs", absolute.as_str()] {
        let env = environment(&dir, name, UNUSED_ENDPOINT);
        let err = env.set_config(&raw(name)).unwrap_err();
        assert!(
            matches!(
                &err,
                EnvironError::Config(ConfigError::Schema(SchemaError::Invalid { field, .. }))
                    if field == "name"
            ),
            "{name}: {err:?}"
        );
        assert_eq!(env.phase().map_err(|err| err.to_string())?, EnvironPhase::Unconfigured);
        assert!(matches!(env.storage(), Err(EnvironError::NotConfigured(_))));
    }
    assert!(victim.is_file());
    assert!(!storage_root(&dir).exists());
    Ok(())
}

#[test]
fn provider_storage_rejects_names_outside_its_root() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let provider = provider(&dir, UNUSED_ENDPOINT);
    for name in ["..", "/abs"] {
        // The provider schema alone does not declare `name`, so it is carried through.
        let config = validate(&provider.schema(), &raw(name), None).map_err(|err| err.to_string())?;
        let client = provider.new_client(&config).map_err(|err| err.to_string())?;
        let result = provider.new_storage(&config, &client);
        assert!(matches!(result, Err(StorageError::InvalidName(_))), "{name}");
    }
    assert!(!storage_root(&dir).exists());
    Ok(())
}
