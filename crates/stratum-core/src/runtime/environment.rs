// crates/stratum-core/src/runtime/environment.rs
// ============================================================================
// Module: Environment Lifecycle
// Description: Per-deployment control object binding config, client, and storage.
// Purpose: Serialize configuration, bootstrap, and teardown for one environment.
// Dependencies: crate::{core, interfaces, runtime}, thiserror, tracing
// ============================================================================

//! ## Overview
//! An [`Environment`] moves through
//! `Unconfigured -> Configured -> Bootstrapped -> Destroyed`. A configured or
//! bootstrapped environment may be reconfigured, which returns it to
//! `Configured` without touching running infrastructure. Destroyed is
//! terminal: every later operation fails with [`EnvironError::Destroyed`].
//!
//! Invariants:
//! - `set_config`, `bootstrap` and `destroy` hold one exclusive guard for their
//!   whole duration.
//! - The `(config, client, storage)` triple is an immutable
//!   [`EnvironSnapshot`] swapped as a unit; client and storage always derive
//!   from the snapshot's config.
//! - Readers clone the current snapshot under a brief read lock and never wait
//!   on the exclusive guard.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::RwLock;

use thiserror::Error;
use tracing::debug;
use tracing::info;

use crate::core::CloudSpec;
use crate::core::Config;
use crate::core::ConfigError;
use crate::core::ConfigSchema;
use crate::core::Constraints;
use crate::core::EnvironmentName;
use crate::core::InstanceId;
use crate::core::MachineConfig;
use crate::core::RawConfig;
use crate::core::common_schema;
use crate::core::config::NAME_FIELD;
use crate::core::config::TYPE_FIELD;
use crate::core::validate;
use crate::interfaces::BackendClient;
use crate::interfaces::BackendError;
use crate::interfaces::ProviderBackend;
use crate::interfaces::Storage;
use crate::interfaces::StorageError;
use crate::interfaces::SupportsCustomSources;
use crate::runtime::bootstrap::BootstrapError;
use crate::runtime::bootstrap::BootstrapOrchestrator;
use crate::runtime::bootstrap::BootstrapParams;
use crate::runtime::bootstrap::BootstrapRecord;
use crate::runtime::bootstrap::BootstrapResult;
use crate::runtime::bootstrap::Finalizer;
use crate::runtime::context::OperationContext;
use crate::runtime::metadata::ConfigGetter;
use crate::runtime::metadata::MetadataSourceResolver;
use crate::runtime::metadata::ResolveError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Environment lifecycle errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvironError {
    /// The environment has been destroyed.
    #[error("environment {0} has been destroyed")]
    Destroyed(EnvironmentName),
    /// The environment has no configuration yet.
    #[error("environment {0} is not configured")]
    NotConfigured(EnvironmentName),
    /// The environment has no bootstrap record.
    #[error("environment {0} is not bootstrapped")]
    NotBootstrapped(EnvironmentName),
    /// Configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The backend failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// Storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The configured region cannot be resolved.
    #[error("unknown region: {0}")]
    UnknownRegion(String),
    /// Bootstrap failed.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// Metadata sources could not be resolved.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// The provisioning request would certainly fail.
    #[error("precheck failed: {0}")]
    Precheck(String),
    /// Internal state is unusable.
    #[error("environment state error: {0}")]
    State(String),
}

// ============================================================================
// SECTION: Snapshot
// ============================================================================

/// Lifecycle phase of an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironPhase {
    /// Created without configuration.
    Unconfigured,
    /// Configured; may or may not have running infrastructure.
    Configured,
    /// The generic bootstrap phase succeeded.
    Bootstrapped,
    /// Torn down; terminal.
    Destroyed,
}

/// Immutable `(config, client, storage)` triple.
///
/// # Invariants
/// - `client` and `storage` were built from `config` or from a config that
///   agrees with it on every backend-affecting field.
#[derive(Clone)]
pub struct EnvironSnapshot {
    /// Validated configuration.
    config: Config,
    /// Backend client.
    client: Arc<dyn BackendClient>,
    /// Storage handle.
    storage: Arc<dyn Storage>,
}

impl EnvironSnapshot {
    /// Builds a snapshot from its parts.
    #[must_use]
    pub fn new(config: Config, client: Arc<dyn BackendClient>, storage: Arc<dyn Storage>) -> Self {
        Self {
            config,
            client,
            storage,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the backend client.
    #[must_use]
    pub const fn client(&self) -> &Arc<dyn BackendClient> {
        &self.client
    }

    /// Returns the storage handle.
    #[must_use]
    pub const fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }
}

impl fmt::Debug for EnvironSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironSnapshot")
            .field("config", &self.config)
            .field("temporary_storage", &self.storage.is_temporary())
            .finish_non_exhaustive()
    }
}

/// Phase and snapshot, replaced together under the state lock.
struct EnvState {
    /// Current phase.
    phase: EnvironPhase,
    /// Current snapshot, absent until configured and after destroy.
    snapshot: Option<Arc<EnvironSnapshot>>,
}

// ============================================================================
// SECTION: Environment
// ============================================================================

/// Stateful control object for one deployment.
pub struct Environment {
    /// Stable environment name.
    name: EnvironmentName,
    /// Provider backend factory.
    provider: Arc<dyn ProviderBackend>,
    /// Common schema extended with the provider schema.
    schema: ConfigSchema,
    /// Generic bootstrap sequence.
    orchestrator: BootstrapOrchestrator,
    /// Exclusive guard for mutating operations.
    guard: Mutex<()>,
    /// Phase and current snapshot.
    state: RwLock<EnvState>,
}

impl Environment {
    /// Creates an unconfigured environment for `provider`.
    #[must_use]
    pub fn new(
        name: EnvironmentName,
        provider: Arc<dyn ProviderBackend>,
        resolver: MetadataSourceResolver,
    ) -> Self {
        let schema = common_schema().extend(&provider.schema());
        Self {
            name,
            provider,
            schema,
            orchestrator: BootstrapOrchestrator::new(resolver),
            guard: Mutex::new(()),
            state: RwLock::new(EnvState {
                phase: EnvironPhase::Unconfigured,
                snapshot: None,
            }),
        }
    }

    /// Returns the environment name.
    #[must_use]
    pub const fn name(&self) -> &EnvironmentName {
        &self.name
    }

    /// Returns the effective config schema.
    #[must_use]
    pub const fn schema(&self) -> &ConfigSchema {
        &self.schema
    }

    /// Returns the provider backend.
    #[must_use]
    pub fn provider(&self) -> &dyn ProviderBackend {
        self.provider.as_ref()
    }

    /// Returns the current lifecycle phase.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::State`] when the state lock is poisoned.
    pub fn phase(&self) -> Result<EnvironPhase, EnvironError> {
        Ok(self.read_state()?.0)
    }

    /// Returns the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::Destroyed`] or [`EnvironError::NotConfigured`]
    /// when no snapshot is available.
    pub fn snapshot(&self) -> Result<Arc<EnvironSnapshot>, EnvironError> {
        match self.read_state()? {
            (EnvironPhase::Destroyed, _) => Err(EnvironError::Destroyed(self.name.clone())),
            (_, Some(snapshot)) => Ok(snapshot),
            (_, None) => Err(EnvironError::NotConfigured(self.name.clone())),
        }
    }

    /// Returns the last successfully stored configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::Destroyed`] or [`EnvironError::NotConfigured`].
    pub fn config(&self) -> Result<Config, EnvironError> {
        Ok(self.snapshot()?.config().clone())
    }

    /// Returns the current storage handle.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::Destroyed`] or [`EnvironError::NotConfigured`].
    pub fn storage(&self) -> Result<Arc<dyn Storage>, EnvironError> {
        Ok(Arc::clone(self.snapshot()?.storage()))
    }

    /// Validates and stores a new configuration.
    ///
    /// A new client and storage pair is built only when no client exists or
    /// a backend-affecting field changed; otherwise the existing pair is kept.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::Config`] for rejected config, backend or storage
    /// errors while building the pair, and [`EnvironError::Destroyed`] after
    /// teardown. No state changes on error.
    pub fn set_config(&self, raw: &RawConfig) -> Result<(), EnvironError> {
        let _guard = self.lock_guard()?;
        let (phase, current) = self.read_state()?;
        if phase == EnvironPhase::Destroyed {
            return Err(EnvironError::Destroyed(self.name.clone()));
        }

        let previous = current.as_ref().map(|snapshot| snapshot.config());
        let config = validate(&self.schema, raw, previous)?;
        if config.name() != self.name {
            return Err(ConfigError::ImmutableFieldChanged {
                field: NAME_FIELD.to_string(),
                old: format!("{:?}", self.name.as_str()),
                new: format!("{:?}", config.name().as_str()),
            }
            .into());
        }
        if config.provider_type() != self.provider.provider_type() {
            return Err(ConfigError::ImmutableFieldChanged {
                field: TYPE_FIELD.to_string(),
                old: format!("{:?}", self.provider.provider_type()),
                new: format!("{:?}", config.provider_type()),
            }
            .into());
        }

        let snapshot = match current {
            Some(existing)
                if !existing.config().differs_in(&config, self.provider.backend_fields()) =>
            {
                debug!(environment = %self.name, "backend fields unchanged; keeping client");
                EnvironSnapshot::new(
                    config,
                    Arc::clone(existing.client()),
                    Arc::clone(existing.storage()),
                )
            }
            _ => {
                let client = self.provider.new_client(&config)?;
                let storage = self.provider.new_storage(&config, &client)?;
                info!(
                    environment = %self.name,
                    provider = self.provider.provider_type(),
                    "created backend client and storage"
                );
                EnvironSnapshot::new(config, client, storage)
            }
        };

        self.write_state(EnvironPhase::Configured, Some(Arc::new(snapshot)))
    }

    /// Bootstraps the environment and composes the provider follow-up.
    ///
    /// The returned finalizer runs the generic finalizer first. Only on its
    /// success, and only for temporary storage, it discovers the control
    /// node address and exposes storage to it.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::Precheck`] when the request is rejected up
    /// front and [`EnvironError::Bootstrap`] for generic bootstrap failures.
    pub fn bootstrap(
        &self,
        ctx: &OperationContext,
        params: &BootstrapParams,
    ) -> Result<BootstrapResult, EnvironError> {
        let _guard = self.lock_guard()?;
        let snapshot = self.snapshot()?;
        let series = params
            .series
            .clone()
            .unwrap_or_else(|| snapshot.config().default_series().to_string());
        self.provider
            .precheck_instance(
                snapshot.config(),
                &series,
                &params.constraints,
                params.placement.as_deref(),
            )
            .map_err(|err| EnvironError::Precheck(err.to_string()))?;

        let mut result =
            self.orchestrator.bootstrap(ctx, &snapshot, self.provider.custom_sources(), params)?;
        self.write_state(EnvironPhase::Bootstrapped, Some(Arc::clone(&snapshot)))?;

        if snapshot.storage().is_temporary() {
            let generic = std::mem::replace(&mut result.finalizer, Finalizer::noop());
            let follow_up = Arc::clone(&snapshot);
            result.finalizer = generic.then(move |_, machine| expose_storage(&follow_up, machine));
        }
        Ok(result)
    }

    /// Tears down the environment; afterwards every operation fails.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::Destroyed`] when already destroyed and
    /// [`EnvironError::Bootstrap`] when teardown fails; the phase is unchanged
    /// on failure so destroy can be retried.
    pub fn destroy(&self, ctx: &OperationContext) -> Result<(), EnvironError> {
        let _guard = self.lock_guard()?;
        let (phase, snapshot) = self.read_state()?;
        if phase == EnvironPhase::Destroyed {
            return Err(EnvironError::Destroyed(self.name.clone()));
        }
        if let Some(snapshot) = snapshot {
            self.orchestrator.destroy(ctx, &snapshot)?;
        }
        info!(environment = %self.name, "environment destroyed");
        self.write_state(EnvironPhase::Destroyed, None)
    }

    /// Best-effort static validation of a provisioning request.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::Precheck`] when the request would certainly fail.
    pub fn precheck_instance(
        &self,
        series: &str,
        constraints: &Constraints,
        placement: Option<&str>,
    ) -> Result<(), EnvironError> {
        let config = self.config()?;
        self.provider
            .precheck_instance(&config, series, constraints, placement)
            .map_err(|err| EnvironError::Precheck(err.to_string()))
    }

    /// Resolves the configured region to an endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::UnknownRegion`] when the backend cannot resolve it.
    pub fn region(&self) -> Result<CloudSpec, EnvironError> {
        let snapshot = self.snapshot()?;
        let region = snapshot
            .config()
            .region()
            .ok_or_else(|| EnvironError::UnknownRegion("no region configured".to_string()))?;
        snapshot.client().resolve_region(region).map_err(|err| match err {
            BackendError::UnknownRegion(region) => EnvironError::UnknownRegion(region),
            other => EnvironError::Backend(other),
        })
    }

    /// Returns the control instances recorded at bootstrap.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::NotBootstrapped`] when no record exists.
    pub fn control_instances(&self) -> Result<Vec<InstanceId>, EnvironError> {
        let snapshot = self.snapshot()?;
        match BootstrapRecord::load(snapshot.storage().as_ref())? {
            Some(record) if !record.control_instances.is_empty() => Ok(record.control_instances),
            _ => Err(EnvironError::NotBootstrapped(self.name.clone())),
        }
    }

    // ------------------------------------------------------------------------
    // State helpers
    // ------------------------------------------------------------------------

    /// Acquires the exclusive operation guard.
    fn lock_guard(&self) -> Result<MutexGuard<'_, ()>, EnvironError> {
        self.guard
            .lock()
            .map_err(|_| EnvironError::State("environment guard poisoned".to_string()))
    }

    /// Reads the phase and snapshot.
    fn read_state(&self) -> Result<(EnvironPhase, Option<Arc<EnvironSnapshot>>), EnvironError> {
        let state = self
            .state
            .read()
            .map_err(|_| EnvironError::State("environment state lock poisoned".to_string()))?;
        Ok((state.phase, state.snapshot.clone()))
    }

    /// Replaces the phase and snapshot together.
    fn write_state(
        &self,
        phase: EnvironPhase,
        snapshot: Option<Arc<EnvironSnapshot>>,
    ) -> Result<(), EnvironError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| EnvironError::State("environment state lock poisoned".to_string()))?;
        state.phase = phase;
        state.snapshot = snapshot;
        drop(state);
        Ok(())
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("name", &self.name)
            .field("provider", &self.provider.provider_type())
            .finish_non_exhaustive()
    }
}

impl ConfigGetter for Environment {
    fn current_config(&self) -> Result<Config, String> {
        self.config().map_err(|err| err.to_string())
    }

    fn custom_sources(&self) -> Option<&dyn SupportsCustomSources> {
        self.provider.custom_sources()
    }
}

// ============================================================================
// SECTION: Provider Follow-Up
// ============================================================================

/// Exposes temporary storage to the control node and re-applies agent config.
fn expose_storage(
    snapshot: &EnvironSnapshot,
    machine: &mut MachineConfig,
) -> Result<(), BootstrapError> {
    let environment = snapshot.config().name();
    let address = snapshot
        .client()
        .control_node_address(&environment)
        .map_err(|err| BootstrapError::AddressUnavailable(err.to_string()))?
        .ok_or_else(|| BootstrapError::AddressUnavailable(environment.to_string()))?;
    let settings = snapshot
        .storage()
        .expose(&address)
        .map_err(|err| BootstrapError::Finalize(format!("prepare storage: {err}")))?;
    machine.agent_env.extend(settings);
    snapshot
        .client()
        .install_agent(machine)
        .map_err(|err| BootstrapError::Finalize(format!("prepare storage: {err}")))?;
    info!(environment = %environment, address = %address, "exposed storage to control node");
    Ok(())
}
