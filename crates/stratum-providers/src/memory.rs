// crates/stratum-providers/src/memory.rs
// ============================================================================
// Module: Memory Provider
// Description: In-process provider backend for dry runs and tests.
// Purpose: Exercise the environment lifecycle without a cloud account.
// Dependencies: stratum-core
// ============================================================================

//! ## Overview
//! [`MemoryCloud`] holds instances, installed agent configs, and stored
//! objects in process memory. Every [`MemoryProvider`] sharing a cloud sees
//! the same state, so a client rebuilt after reconfiguration still finds the
//! instances its predecessor started. Optional metadata mirrors make the
//! provider advertise the custom-sources capability.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use stratum_core::BackendClient;
use stratum_core::BackendError;
use stratum_core::CloudSpec;
use stratum_core::Config;
use stratum_core::ConfigSchema;
use stratum_core::EnvironmentName;
use stratum_core::FieldSpec;
use stratum_core::ImageSpec;
use stratum_core::InstanceId;
use stratum_core::InstanceInfo;
use stratum_core::InstanceStatus;
use stratum_core::MachineConfig;
use stratum_core::MetadataSource;
use stratum_core::ProviderBackend;
use stratum_core::StartInstanceParams;
use stratum_core::Storage;
use stratum_core::StorageError;
use stratum_core::SupportsCustomSources;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Provider type name.
pub const MEMORY_PROVIDER_TYPE: &str = "memory";
/// The only region the memory cloud offers.
const MEMORY_REGION: &str = "local";

// ============================================================================
// SECTION: Memory Cloud
// ============================================================================

/// Mutable cloud state.
#[derive(Debug, Default)]
struct CloudState {
    /// Next instance sequence number.
    next_instance: u64,
    /// Instances in start order.
    instances: Vec<InstanceInfo>,
    /// Latest agent config per instance.
    agents: BTreeMap<InstanceId, MachineConfig>,
    /// Stored objects per environment.
    objects: BTreeMap<EnvironmentName, BTreeMap<String, Vec<u8>>>,
}

/// Shared in-process cloud.
#[derive(Debug, Clone)]
pub struct MemoryCloud {
    /// State shared by every client and storage.
    state: Arc<Mutex<CloudState>>,
    /// Images offered for provisioning.
    images: Vec<ImageSpec>,
    /// Metadata mirrors advertised as custom sources.
    mirrors: Vec<Url>,
}

impl Default for MemoryCloud {
    fn default() -> Self {
        Self::new(vec![ImageSpec::new("trusty", "amd64"), ImageSpec::new("xenial", "amd64")])
    }
}

impl MemoryCloud {
    /// Creates an empty cloud offering `images`.
    #[must_use]
    pub fn new(images: Vec<ImageSpec>) -> Self {
        Self {
            state: Arc::new(Mutex::new(CloudState::default())),
            images,
            mirrors: Vec::new(),
        }
    }

    /// Advertises metadata mirrors through the custom-sources capability.
    #[must_use]
    pub fn with_mirrors(mut self, mirrors: Vec<Url>) -> Self {
        self.mirrors = mirrors;
        self
    }

    /// Locks the shared state.
    fn lock(&self) -> Result<MutexGuard<'_, CloudState>, String> {
        self.state.lock().map_err(|_| "memory cloud mutex poisoned".to_string())
    }

    /// Returns the instances that are not stopped.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Api`] when the state lock is poisoned.
    pub fn live_instances(&self) -> Result<Vec<InstanceInfo>, BackendError> {
        Ok(self
            .lock()
            .map_err(BackendError::Api)?
            .instances
            .iter()
            .filter(|instance| instance.status != InstanceStatus::Stopped)
            .cloned()
            .collect())
    }

    /// Returns the agent config last installed on an instance.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Api`] when the state lock is poisoned.
    pub fn agent_config(&self, id: &InstanceId) -> Result<Option<MachineConfig>, BackendError> {
        Ok(self.lock().map_err(BackendError::Api)?.agents.get(id).cloned())
    }
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Backend client over a [`MemoryCloud`].
struct MemoryClient {
    /// Shared cloud.
    cloud: MemoryCloud,
}

impl BackendClient for MemoryClient {
    fn resolve_region(&self, region: &str) -> Result<CloudSpec, BackendError> {
        if region != MEMORY_REGION {
            return Err(BackendError::UnknownRegion(region.to_string()));
        }
        Ok(CloudSpec {
            region: region.to_string(),
            endpoint: "memory://local/".to_string(),
        })
    }

    fn control_node_address(
        &self,
        environment: &EnvironmentName,
    ) -> Result<Option<String>, BackendError> {
        Ok(self
            .all_instances(environment)?
            .into_iter()
            .filter(|instance| instance.control_node)
            .find_map(|instance| instance.addresses.into_iter().next()))
    }

    fn provisionable_images(&self) -> Result<Vec<ImageSpec>, BackendError> {
        Ok(self.cloud.images.clone())
    }

    fn start_instance(&self, params: &StartInstanceParams) -> Result<InstanceInfo, BackendError> {
        if !self.cloud.images.contains(&params.image) {
            return Err(BackendError::Invalid(format!(
                "image {}/{} is not offered",
                params.image.series, params.image.arch
            )));
        }
        let mut state = self.cloud.lock().map_err(BackendError::Api)?;
        let sequence = state.next_instance;
        state.next_instance += 1;
        let instance = InstanceInfo {
            id: InstanceId::new(format!("mem-{sequence}")),
            environment: params.environment.clone(),
            status: InstanceStatus::Running,
            addresses: vec![format!("127.0.0.{}", sequence % 250 + 2)],
            control_node: params.control_node,
        };
        state.instances.push(instance.clone());
        drop(state);
        Ok(instance)
    }

    fn all_instances(
        &self,
        environment: &EnvironmentName,
    ) -> Result<Vec<InstanceInfo>, BackendError> {
        Ok(self
            .cloud
            .live_instances()?
            .into_iter()
            .filter(|instance| &instance.environment == environment)
            .collect())
    }

    fn stop_instances(&self, ids: &[InstanceId]) -> Result<(), BackendError> {
        let mut state = self.cloud.lock().map_err(BackendError::Api)?;
        for instance in &mut state.instances {
            if ids.contains(&instance.id) {
                instance.status = InstanceStatus::Stopped;
            }
        }
        Ok(())
    }

    fn install_agent(&self, config: &MachineConfig) -> Result<(), BackendError> {
        let mut state = self.cloud.lock().map_err(BackendError::Api)?;
        let known = state.instances.iter().any(|instance| {
            instance.id == config.instance_id && instance.status != InstanceStatus::Stopped
        });
        if !known {
            return Err(BackendError::Api(format!("no live instance {}", config.instance_id)));
        }
        state.agents.insert(config.instance_id.clone(), config.clone());
        drop(state);
        Ok(())
    }
}

// ============================================================================
// SECTION: Storage
// ============================================================================

/// Process-lifetime storage over a [`MemoryCloud`], scoped to one environment.
struct MemoryStorage {
    /// Shared cloud.
    cloud: MemoryCloud,
    /// Owning environment.
    environment: EnvironmentName,
}

impl MemoryStorage {
    /// Runs `f` over this environment's objects.
    fn with_objects<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, Vec<u8>>) -> T,
    ) -> Result<T, StorageError> {
        let mut state = self.cloud.lock().map_err(StorageError::Io)?;
        Ok(f(state.objects.entry(self.environment.clone()).or_default()))
    }
}

impl Storage for MemoryStorage {
    fn put(&self, name: &str, data: &[u8]) -> Result<(), StorageError> {
        if name.is_empty() {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        self.with_objects(|objects| objects.insert(name.to_string(), data.to_vec()))?;
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        self.with_objects(|objects| objects.get(name).cloned())?
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.with_objects(|objects| {
            objects.keys().filter(|key| key.starts_with(prefix)).cloned().collect()
        })
    }

    fn remove(&self, name: &str) -> Result<(), StorageError> {
        self.with_objects(|objects| objects.remove(name))?;
        Ok(())
    }

    fn remove_all(&self) -> Result<(), StorageError> {
        self.with_objects(BTreeMap::clear)
    }

    fn url(&self, name: &str) -> Result<String, StorageError> {
        if name.is_empty() {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(format!("memory://local/{}/{name}", self.environment))
    }

    fn is_temporary(&self) -> bool {
        false
    }
}

// ============================================================================
// SECTION: Provider
// ============================================================================

/// In-process provider backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    /// Shared cloud.
    cloud: MemoryCloud,
}

impl MemoryProvider {
    /// Creates a provider over `cloud`.
    #[must_use]
    pub const fn new(cloud: MemoryCloud) -> Self {
        Self {
            cloud,
        }
    }

    /// Returns the shared cloud.
    #[must_use]
    pub const fn cloud(&self) -> &MemoryCloud {
        &self.cloud
    }
}

impl SupportsCustomSources for MemoryProvider {
    fn custom_metadata_sources(
        &self,
        _config: &Config,
    ) -> Result<Vec<MetadataSource>, BackendError> {
        Ok(self
            .cloud
            .mirrors
            .iter()
            .map(|url| MetadataSource::new("memory mirror", url.clone()))
            .collect())
    }
}

impl ProviderBackend for MemoryProvider {
    fn provider_type(&self) -> &'static str {
        MEMORY_PROVIDER_TYPE
    }

    fn schema(&self) -> ConfigSchema {
        ConfigSchema::new().field(
            FieldSpec::string("region")
                .default_value(MEMORY_REGION)
                .immutable()
                .describe("region of the in-process cloud (always local)"),
        )
    }

    fn backend_fields(&self) -> &'static [&'static str] {
        &["region"]
    }

    fn new_client(&self, _config: &Config) -> Result<Arc<dyn BackendClient>, BackendError> {
        Ok(Arc::new(MemoryClient {
            cloud: self.cloud.clone(),
        }))
    }

    fn new_storage(
        &self,
        config: &Config,
        _client: &Arc<dyn BackendClient>,
    ) -> Result<Arc<dyn Storage>, StorageError> {
        Ok(Arc::new(MemoryStorage {
            cloud: self.cloud.clone(),
            environment: config.name(),
        }))
    }

    fn custom_sources(&self) -> Option<&dyn SupportsCustomSources> {
        if self.cloud.mirrors.is_empty() { None } else { Some(self) }
    }
}
