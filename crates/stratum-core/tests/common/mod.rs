// crates/stratum-core/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Scriptable fake provider, client, and storage for core tests.
// Purpose: Exercise the environment runtime without a real cloud backend.
// Dependencies: stratum-core
// ============================================================================

//! ## Overview
//! The fake provider records every call in a shared [`FakeCloud`] so tests
//! can assert how many clients were built, which instances were started, and
//! what agent configuration was installed. Failures are injected by setting
//! fields on the cloud before the call under test.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use serde_json::json;
use stratum_core::BackendClient;
use stratum_core::BackendError;
use stratum_core::CloudSpec;
use stratum_core::Config;
use stratum_core::ConfigSchema;
use stratum_core::Constraints;
use stratum_core::EnvironmentName;
use stratum_core::Environment;
use stratum_core::FieldSpec;
use stratum_core::ImageSpec;
use stratum_core::InstanceId;
use stratum_core::InstanceInfo;
use stratum_core::InstanceStatus;
use stratum_core::MachineConfig;
use stratum_core::MetadataSource;
use stratum_core::MetadataSourceResolver;
use stratum_core::ProviderBackend;
use stratum_core::RawConfig;
use stratum_core::StartInstanceParams;
use stratum_core::Storage;
use stratum_core::StorageError;
use stratum_core::SupportsCustomSources;
use url::Url;

// ============================================================================
// SECTION: Fake Cloud
// ============================================================================

/// Shared, inspectable state behind the fake provider.
#[derive(Default)]
pub struct FakeCloud {
    pub clients_created: AtomicUsize,
    pub storages_created: AtomicUsize,
    pub next_instance: AtomicUsize,
    pub instances: Mutex<Vec<InstanceInfo>>,
    pub installs: Mutex<Vec<MachineConfig>>,
    pub objects: Mutex<BTreeMap<String, Vec<u8>>>,
    pub exposed: Mutex<Vec<String>>,
    pub start_failure: Mutex<Option<BackendError>>,
    pub install_failure: Mutex<Option<BackendError>>,
    pub control_address: Mutex<Option<String>>,
    pub images: Mutex<Vec<ImageSpec>>,
}

impl FakeCloud {
    pub fn new() -> Arc<Self> {
        let cloud = Self::default();
        *cloud.images.lock().unwrap() =
            vec![ImageSpec::new("trusty", "amd64"), ImageSpec::new("xenial", "arm64")];
        *cloud.control_address.lock().unwrap() = Some("10.0.0.2".to_string());
        Arc::new(cloud)
    }

    pub fn clients_created(&self) -> usize {
        self.clients_created.load(Ordering::SeqCst)
    }

    pub fn running(&self) -> Vec<InstanceInfo> {
        self.instances
            .lock()
            .unwrap()
            .iter()
            .filter(|instance| instance.status != InstanceStatus::Stopped)
            .cloned()
            .collect()
    }

    pub fn installs(&self) -> Vec<MachineConfig> {
        self.installs.lock().unwrap().clone()
    }

    pub fn fail_next_start(&self, err: BackendError) {
        *self.start_failure.lock().unwrap() = Some(err);
    }
}

/// Fake backend client bound to a region.
pub struct FakeClient {
    cloud: Arc<FakeCloud>,
}

impl BackendClient for FakeClient {
    fn resolve_region(&self, region: &str) -> Result<CloudSpec, BackendError> {
        match region {
            "zrh" | "lvs" => Ok(CloudSpec {
                region: region.to_string(),
                endpoint: format!("https://{region}.example.test/api/"),
            }),
            other => Err(BackendError::UnknownRegion(other.to_string())),
        }
    }

    fn control_node_address(
        &self,
        _environment: &EnvironmentName,
    ) -> Result<Option<String>, BackendError> {
        Ok(self.cloud.control_address.lock().unwrap().clone())
    }

    fn provisionable_images(&self) -> Result<Vec<ImageSpec>, BackendError> {
        Ok(self.cloud.images.lock().unwrap().clone())
    }

    fn start_instance(&self, params: &StartInstanceParams) -> Result<InstanceInfo, BackendError> {
        if let Some(err) = self.cloud.start_failure.lock().unwrap().take() {
            return Err(err);
        }
        let index = self.cloud.next_instance.fetch_add(1, Ordering::SeqCst);
        let instance = InstanceInfo {
            id: InstanceId::new(format!("i-{index}")),
            environment: params.environment.clone(),
            status: InstanceStatus::Running,
            addresses: vec!["10.0.0.2".to_string()],
            control_node: params.control_node,
        };
        self.cloud.instances.lock().unwrap().push(instance.clone());
        Ok(instance)
    }

    fn all_instances(
        &self,
        environment: &EnvironmentName,
    ) -> Result<Vec<InstanceInfo>, BackendError> {
        Ok(self.cloud.running().into_iter().filter(|i| &i.environment == environment).collect())
    }

    fn stop_instances(&self, ids: &[InstanceId]) -> Result<(), BackendError> {
        for instance in self.cloud.instances.lock().unwrap().iter_mut() {
            if ids.contains(&instance.id) {
                instance.status = InstanceStatus::Stopped;
            }
        }
        Ok(())
    }

    fn install_agent(&self, config: &MachineConfig) -> Result<(), BackendError> {
        if let Some(err) = self.cloud.install_failure.lock().unwrap().take() {
            return Err(err);
        }
        self.cloud.installs.lock().unwrap().push(config.clone());
        Ok(())
    }
}

/// Fake storage backed by the cloud's object map.
pub struct FakeStorage {
    cloud: Arc<FakeCloud>,
    temporary: bool,
}

impl Storage for FakeStorage {
    fn put(&self, name: &str, data: &[u8]) -> Result<(), StorageError> {
        self.cloud.objects.lock().unwrap().insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        self.cloud
            .objects
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .cloud
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn remove(&self, name: &str) -> Result<(), StorageError> {
        self.cloud.objects.lock().unwrap().remove(name);
        Ok(())
    }

    fn remove_all(&self) -> Result<(), StorageError> {
        self.cloud.objects.lock().unwrap().clear();
        Ok(())
    }

    fn url(&self, name: &str) -> Result<String, StorageError> {
        Ok(format!("memory://fake/{name}"))
    }

    fn is_temporary(&self) -> bool {
        self.temporary
    }

    fn expose(&self, address: &str) -> Result<BTreeMap<String, String>, StorageError> {
        self.cloud.exposed.lock().unwrap().push(address.to_string());
        Ok(BTreeMap::from([("STORAGE_ADDR".to_string(), format!("{address}:8040"))]))
    }
}

/// Fixed custom metadata sources, optionally failing.
pub struct FakeSources {
    pub fail: bool,
}

impl SupportsCustomSources for FakeSources {
    fn custom_metadata_sources(
        &self,
        config: &Config,
    ) -> Result<Vec<MetadataSource>, BackendError> {
        if self.fail {
            return Err(BackendError::Api("catalog unreachable".to_string()));
        }
        let region = config.region().unwrap_or("zrh");
        let url = Url::parse(&format!("https://{region}.mirror.example.test/tools/"))
            .map_err(|err| BackendError::Invalid(err.to_string()))?;
        Ok(vec![MetadataSource::new("fake region mirror", url)])
    }
}

// ============================================================================
// SECTION: Fake Provider
// ============================================================================

/// Fake provider with a CloudSigma-like schema.
pub struct FakeProvider {
    pub cloud: Arc<FakeCloud>,
    pub temporary_storage: bool,
    pub sources: Option<FakeSources>,
}

impl FakeProvider {
    pub fn new(cloud: &Arc<FakeCloud>) -> Self {
        Self {
            cloud: Arc::clone(cloud),
            temporary_storage: false,
            sources: None,
        }
    }

    pub fn with_temporary_storage(mut self) -> Self {
        self.temporary_storage = true;
        self
    }

    pub fn with_sources(mut self, fail: bool) -> Self {
        self.sources = Some(FakeSources {
            fail,
        });
        self
    }
}

impl ProviderBackend for FakeProvider {
    fn provider_type(&self) -> &'static str {
        "fake"
    }

    fn schema(&self) -> ConfigSchema {
        fake_schema()
    }

    fn backend_fields(&self) -> &'static [&'static str] {
        &["username", "password", "region"]
    }

    fn new_client(&self, _config: &Config) -> Result<Arc<dyn BackendClient>, BackendError> {
        self.cloud.clients_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeClient {
            cloud: Arc::clone(&self.cloud),
        }))
    }

    fn new_storage(
        &self,
        _config: &Config,
        _client: &Arc<dyn BackendClient>,
    ) -> Result<Arc<dyn Storage>, StorageError> {
        self.cloud.storages_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeStorage {
            cloud: Arc::clone(&self.cloud),
            temporary: self.temporary_storage,
        }))
    }

    fn custom_sources(&self) -> Option<&dyn SupportsCustomSources> {
        self.sources.as_ref().map(|sources| sources as &dyn SupportsCustomSources)
    }

    fn precheck_instance(
        &self,
        _config: &Config,
        _series: &str,
        constraints: &Constraints,
        _placement: Option<&str>,
    ) -> Result<(), BackendError> {
        if constraints.arch.as_deref() == Some("s390x") {
            return Err(BackendError::Invalid("arch s390x not offered".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Provider fields mirroring the CloudSigma schema.
pub fn fake_schema() -> ConfigSchema {
    ConfigSchema::new()
        .field(FieldSpec::string("username"))
        .field(FieldSpec::string("password").secret())
        .field(FieldSpec::string("region").default_value("zrh").immutable())
        .field(FieldSpec::int("storage-port").default_value(8040).immutable())
        .field(FieldSpec::string("storage-auth-key").generated_secret().immutable())
}

/// Minimal valid raw config for the fake provider.
pub fn raw_config(name: &str) -> RawConfig {
    RawConfig::from([
        ("name".to_string(), json!(name)),
        ("type".to_string(), json!("fake")),
        ("username".to_string(), json!("a")),
        ("password".to_string(), json!("b")),
    ])
}

/// Returns `raw` with `key` set to `value`.
pub fn with_attr(mut raw: RawConfig, key: &str, value: serde_json::Value) -> RawConfig {
    raw.insert(key.to_string(), value);
    raw
}

/// Builds an unconfigured environment over `provider`.
pub fn environment(
    name: &str,
    provider: FakeProvider,
    default_source: Option<&str>,
) -> Environment {
    let default_source = default_source.map(|raw| Url::parse(raw).unwrap());
    Environment::new(
        EnvironmentName::new(name),
        Arc::new(provider),
        MetadataSourceResolver::new(default_source),
    )
}

/// Builds and configures an environment with the minimal raw config.
pub fn configured_environment(name: &str, provider: FakeProvider) -> Environment {
    let env = environment(name, provider, Some("https://streams.example.test/tools/"));
    env.set_config(&raw_config(name)).unwrap();
    env
}
