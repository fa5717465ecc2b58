// crates/stratum-core/src/interfaces/mod.rs
// ============================================================================
// Module: Stratum Interfaces
// Description: Backend-agnostic interfaces for cloud clients, storage, and state.
// Purpose: Define the contract surfaces providers implement for the runtime.
// Dependencies: crate::core, serde, thiserror
// ============================================================================

//! ## Overview
//! Interfaces describe how the environment runtime talks to a cloud without
//! embedding vendor details. A provider supplies a [`ProviderBackend`], which
//! builds a [`BackendClient`] and a [`Storage`] handle from a validated
//! [`Config`]. Optional behavior is exposed as capability accessors that
//! return `None` when unsupported.
//!
//! Implementations are shared across threads and must tolerate concurrent
//! readers; only the environment replaces them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::CloudSpec;
use crate::core::Config;
use crate::core::ConfigSchema;
use crate::core::Constraints;
use crate::core::EnvironmentName;
use crate::core::ImageSpec;
use crate::core::InstanceId;
use crate::core::InstanceInfo;
use crate::core::MachineConfig;
use crate::core::MachineId;
use crate::core::MetadataSource;
use crate::core::StartInstanceParams;

// ============================================================================
// SECTION: Backend Client
// ============================================================================

/// Backend client errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The client could not be constructed from configuration.
    #[error("backend client error: {0}")]
    Client(String),
    /// The vendor API rejected or failed a request.
    #[error("backend api error: {0}")]
    Api(String),
    /// The region is not known to the backend.
    #[error("unknown region: {0}")]
    UnknownRegion(String),
    /// The backend lacks capacity for the request.
    #[error("backend capacity exhausted: {0}")]
    Capacity(String),
    /// The request is invalid for this backend.
    #[error("invalid backend request: {0}")]
    Invalid(String),
}

impl BackendError {
    /// Returns true when retrying the same request may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Capacity(_))
    }
}

/// Vendor API client built from a validated configuration.
pub trait BackendClient: Send + Sync {
    /// Resolves a region name to a connectable endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::UnknownRegion`] when the region is not known.
    fn resolve_region(&self, region: &str) -> Result<CloudSpec, BackendError>;

    /// Returns the control node's address once it is running.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the backend cannot be queried.
    fn control_node_address(
        &self,
        environment: &EnvironmentName,
    ) -> Result<Option<String>, BackendError>;

    /// Lists the images this backend can provision.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the image catalog cannot be read.
    fn provisionable_images(&self) -> Result<Vec<ImageSpec>, BackendError>;

    /// Starts a single instance.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Capacity`] for transient placement failures and
    /// other variants for permanent ones.
    fn start_instance(&self, params: &StartInstanceParams) -> Result<InstanceInfo, BackendError>;

    /// Lists every instance the backend reports for an environment.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when instances cannot be listed.
    fn all_instances(
        &self,
        environment: &EnvironmentName,
    ) -> Result<Vec<InstanceInfo>, BackendError>;

    /// Stops the given instances. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the stop request fails.
    fn stop_instances(&self, ids: &[InstanceId]) -> Result<(), BackendError>;

    /// Applies agent configuration to a provisioned machine.
    ///
    /// Applying an identical configuration twice must be a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the configuration cannot be delivered.
    fn install_agent(&self, config: &MachineConfig) -> Result<(), BackendError>;
}

// ============================================================================
// SECTION: Storage
// ============================================================================

/// Storage errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Underlying I/O failed.
    #[error("storage io error: {0}")]
    Io(String),
    /// The named object does not exist.
    #[error("storage object not found: {0}")]
    NotFound(String),
    /// The object name is not acceptable.
    #[error("invalid storage name: {0}")]
    InvalidName(String),
    /// Stored content failed an integrity check.
    #[error("storage object corrupt: {0}")]
    Corrupt(String),
    /// The storage could not be exposed to the control node.
    #[error("storage exposure failed: {0}")]
    Expose(String),
}

/// Opaque blob storage used to host installable artifacts and provider state.
pub trait Storage: Send + Sync {
    /// Writes an object, replacing any previous content.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the write fails.
    fn put(&self, name: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Reads an object.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] when the object is absent.
    fn get(&self, name: &str) -> Result<Vec<u8>, StorageError>;

    /// Lists object names starting with `prefix`, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the listing fails.
    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Removes an object. Removing an absent object succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when removal fails.
    fn remove(&self, name: &str) -> Result<(), StorageError>;

    /// Removes every object.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when removal fails.
    fn remove_all(&self) -> Result<(), StorageError>;

    /// Returns a URL for an object.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the name is invalid.
    fn url(&self, name: &str) -> Result<String, StorageError>;

    /// Returns true for host-local stores that need exposure after bootstrap.
    fn is_temporary(&self) -> bool;

    /// Makes a temporary store reachable from the control node at `address`.
    ///
    /// Returns agent environment settings describing the exposed store.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Expose`] when the store cannot be exposed.
    fn expose(&self, address: &str) -> Result<BTreeMap<String, String>, StorageError> {
        let _ = address;
        Ok(BTreeMap::new())
    }
}

// ============================================================================
// SECTION: Provider Capabilities
// ============================================================================

/// Optional capability: provider-specific metadata sources.
pub trait SupportsCustomSources: Send + Sync {
    /// Returns provider-specific sources for the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the sources cannot be determined.
    fn custom_metadata_sources(&self, config: &Config) -> Result<Vec<MetadataSource>, BackendError>;
}

/// Factory and policy surface implemented by each cloud provider.
pub trait ProviderBackend: Send + Sync {
    /// Provider type name matched against the `type` config field.
    fn provider_type(&self) -> &'static str;

    /// Provider-specific fields, merged over the common schema.
    fn schema(&self) -> ConfigSchema;

    /// Fields whose change requires a new client and storage pair.
    fn backend_fields(&self) -> &'static [&'static str];

    /// Builds a backend client from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the client cannot be built.
    fn new_client(&self, config: &Config) -> Result<Arc<dyn BackendClient>, BackendError>;

    /// Builds a storage handle from a validated configuration and client.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when storage cannot be opened.
    fn new_storage(
        &self,
        config: &Config,
        client: &Arc<dyn BackendClient>,
    ) -> Result<Arc<dyn Storage>, StorageError>;

    /// Returns the custom metadata source capability, if supported.
    fn custom_sources(&self) -> Option<&dyn SupportsCustomSources> {
        None
    }

    /// Best-effort static validation of a provisioning request.
    ///
    /// `Ok` means "no known reason to reject", not a guarantee of success.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Invalid`] when the request would certainly fail.
    fn precheck_instance(
        &self,
        config: &Config,
        series: &str,
        constraints: &Constraints,
        placement: Option<&str>,
    ) -> Result<(), BackendError> {
        let _ = (config, series, constraints, placement);
        Ok(())
    }
}

// ============================================================================
// SECTION: Cluster State Store
// ============================================================================

/// Machine record in the cluster's canonical state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineRecord {
    /// Machine identifier.
    pub id: MachineId,
    /// Backend instance hosting the machine, once provisioned.
    pub instance_id: Option<InstanceId>,
    /// Operating system series.
    pub series: String,
}

/// Block device document attached to a machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDeviceRecord {
    /// Owning machine.
    pub machine_id: MachineId,
    /// Known block device names.
    pub devices: Vec<String>,
}

/// Cluster state store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateStoreError {
    /// Store backend failed.
    #[error("state store error: {0}")]
    Store(String),
    /// Stored data is invalid.
    #[error("state store invalid data: {0}")]
    Invalid(String),
}

/// Canonical persistent cluster state consumed by upgrade steps.
pub trait ClusterStateStore: Send + Sync {
    /// Inserts or replaces a machine record.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError`] when the write fails.
    fn upsert_machine(&self, machine: &MachineRecord) -> Result<(), StateStoreError>;

    /// Lists machines ordered by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError`] when the read fails.
    fn machines(&self) -> Result<Vec<MachineRecord>, StateStoreError>;

    /// Returns the block device document for a machine.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError`] when the read fails.
    fn block_devices(
        &self,
        machine: &MachineId,
    ) -> Result<Option<BlockDeviceRecord>, StateStoreError>;

    /// Inserts a block device document unless one exists for the machine.
    ///
    /// Returns true when a document was inserted.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError`] when the write fails.
    fn insert_block_devices_if_absent(
        &self,
        record: &BlockDeviceRecord,
    ) -> Result<bool, StateStoreError>;
}
