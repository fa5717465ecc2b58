// crates/stratum-providers/src/sigma.rs
// ============================================================================
// Module: Sigma Provider
// Description: CloudSigma-style provider backend.
// Purpose: Bind the sigma schema, HTTP client, and temporary storage together.
// Dependencies: stratum-core, crate::{sigma_client, local_storage}
// ============================================================================

//! ## Overview
//! The sigma provider declares its configuration schema, builds a
//! [`SigmaClient`] from the credential fields, and keeps bootstrap artifacts
//! in [`LocalStorage`] until the control node can serve them on
//! `storage-port` using the generated `storage-auth-key`.
//!
//! `region`, `storage-port`, and `storage-auth-key` are immutable once an
//! environment is configured. Changing `username`, `password`, or `region`
//! rebuilds the client and storage.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use stratum_core::BackendClient;
use stratum_core::BackendError;
use stratum_core::Config;
use stratum_core::ConfigSchema;
use stratum_core::Constraints;
use stratum_core::FieldSpec;
use stratum_core::ProviderBackend;
use stratum_core::Storage;
use stratum_core::StorageError;
use tracing::debug;
use url::Url;

use crate::local_storage::LocalStorage;
use crate::local_storage::LocalStorageConfig;
use crate::sigma_client::SigmaClient;
use crate::sigma_client::SigmaClientConfig;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Provider type name.
pub const SIGMA_PROVIDER_TYPE: &str = "sigma";
/// Region used when none is configured.
pub const DEFAULT_REGION: &str = "zrh";
/// Port the control node serves storage on by default.
pub const DEFAULT_STORAGE_PORT: i64 = 8040;
/// Known regions.
pub const REGIONS: [&str; 6] = ["zrh", "lvs", "wdc", "sjc", "mia", "hnl"];

/// Account username field.
const USERNAME: &str = "username";
/// Account password field.
const PASSWORD: &str = "password";
/// Region field.
const REGION: &str = "region";
/// Storage port field.
const STORAGE_PORT: &str = "storage-port";
/// Storage auth key field.
const STORAGE_AUTH_KEY: &str = "storage-auth-key";
/// Fields whose change requires a new client.
const BACKEND_FIELDS: &[&str] = &[USERNAME, PASSWORD, REGION];

// ============================================================================
// SECTION: Regions
// ============================================================================

/// Resolves a region name to its public API endpoint.
///
/// # Errors
///
/// Returns [`BackendError::UnknownRegion`] for regions outside [`REGIONS`].
pub fn resolve_endpoint(region: &str) -> Result<String, BackendError> {
    if REGIONS.contains(&region) {
        Ok(format!("https://{region}.cloudsigma.com/api/2.0/"))
    } else {
        Err(BackendError::UnknownRegion(region.to_string()))
    }
}

/// Returns the per-environment storage directory under `root`.
///
/// # Errors
///
/// Returns [`StorageError::InvalidName`] unless `environment` is exactly one
/// normal path component, so the directory can never leave `root`.
fn storage_root_for(root: &Path, environment: &str) -> Result<PathBuf, StorageError> {
    let mut components = Path::new(environment).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == environment => Ok(root.join(part)),
        _ => Err(StorageError::InvalidName(format!("environment {environment:?}"))),
    }
}

// ============================================================================
// SECTION: Provider
// ============================================================================

/// Process-level settings for the sigma provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigmaProviderConfig {
    /// Parent directory for per-environment temporary storage.
    pub storage_root: PathBuf,
    /// API endpoint override applied to every client.
    pub endpoint: Option<Url>,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for SigmaProviderConfig {
    fn default() -> Self {
        Self {
            storage_root: env::temp_dir().join("stratum-storage"),
            endpoint: None,
            timeout_ms: 30_000,
        }
    }
}

/// CloudSigma-style provider backend.
#[derive(Debug, Clone, Default)]
pub struct SigmaProvider {
    /// Provider settings.
    config: SigmaProviderConfig,
}

impl SigmaProvider {
    /// Creates a provider with the given settings.
    #[must_use]
    pub const fn new(config: SigmaProviderConfig) -> Self {
        Self {
            config,
        }
    }
}

impl ProviderBackend for SigmaProvider {
    fn provider_type(&self) -> &'static str {
        SIGMA_PROVIDER_TYPE
    }

    fn schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .field(
                FieldSpec::string(REGION)
                    .default_value(DEFAULT_REGION)
                    .immutable()
                    .describe("region holds the cloudsigma region (zrh, lvs, ...)"),
            )
            .field(
                FieldSpec::string(USERNAME)
                    .default_value("")
                    .describe("username for the CloudSigma account"),
            )
            .field(
                FieldSpec::string(PASSWORD)
                    .secret()
                    .describe("password for the CloudSigma account"),
            )
            .field(
                FieldSpec::int(STORAGE_PORT)
                    .default_value(DEFAULT_STORAGE_PORT)
                    .immutable()
                    .describe("TCP port the bootstrap machine's storage server listens on"),
            )
            .field(
                FieldSpec::string(STORAGE_AUTH_KEY)
                    .generated_secret()
                    .immutable()
                    .describe("shared key agents use to reach bootstrap storage"),
            )
    }

    fn backend_fields(&self) -> &'static [&'static str] {
        BACKEND_FIELDS
    }

    fn new_client(&self, config: &Config) -> Result<Arc<dyn BackendClient>, BackendError> {
        let mut client_config = SigmaClientConfig::new(
            config.get_str(REGION).unwrap_or(DEFAULT_REGION),
            config.get_str(USERNAME).unwrap_or_default(),
            config.get_str(PASSWORD).unwrap_or_default(),
        );
        client_config.endpoint.clone_from(&self.config.endpoint);
        client_config.timeout_ms = self.config.timeout_ms;
        debug!(region = %client_config.region, "building sigma client");
        Ok(Arc::new(SigmaClient::new(client_config)?))
    }

    fn new_storage(
        &self,
        config: &Config,
        _client: &Arc<dyn BackendClient>,
    ) -> Result<Arc<dyn Storage>, StorageError> {
        let port = config.get_int(STORAGE_PORT).unwrap_or(DEFAULT_STORAGE_PORT);
        let port = u16::try_from(port)
            .map_err(|_| StorageError::Io(format!("{STORAGE_PORT} out of range: {port}")))?;
        let auth_key = config
            .get_str(STORAGE_AUTH_KEY)
            .ok_or_else(|| StorageError::Io(format!("{STORAGE_AUTH_KEY} missing")))?;
        let root = storage_root_for(&self.config.storage_root, config.name().as_str())?;
        let storage = LocalStorage::open(LocalStorageConfig {
            root,
            port,
            auth_key: auth_key.to_string(),
        })?;
        Ok(Arc::new(storage))
    }

    fn precheck_instance(
        &self,
        _config: &Config,
        series: &str,
        constraints: &Constraints,
        placement: Option<&str>,
    ) -> Result<(), BackendError> {
        debug!(series, %constraints, placement, "sigma precheck");
        if let Some(instance_type) = &constraints.instance_type {
            return Err(BackendError::Invalid(format!(
                "instance-type {instance_type:?} is not offered; sigma servers are custom sized"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use super::*;

    #[test]
    fn known_regions_resolve_to_public_endpoints() {
        assert_eq!(resolve_endpoint("lvs").unwrap(), "https://lvs.cloudsigma.com/api/2.0/");
        assert_eq!(
            resolve_endpoint("atlantis"),
            Err(BackendError::UnknownRegion("atlantis".to_string()))
        );
    }

    #[test]
    fn storage_root_stays_under_parent() {
        let parent = Path::new("/var/tmp/stratum-storage");
        assert_eq!(storage_root_for(parent, "prod").unwrap(), parent.join("prod"));
        for name in ["..", ".", "/abs", "a/b", "prod/", "", "./prod"] {
            assert!(
                matches!(storage_root_for(parent, name), Err(StorageError::InvalidName(_))),
                "{name:?}"
            );
        }
    }

    #[test]
    fn schema_marks_storage_fields_immutable() {
        let schema = SigmaProvider::default().schema();
        let immutable: Vec<&str> = schema.immutable_fields().collect();
        assert!(immutable.contains(&REGION));
        assert!(immutable.contains(&STORAGE_PORT));
        assert!(immutable.contains(&STORAGE_AUTH_KEY));
        assert!(!immutable.contains(&USERNAME));
    }
}
