// crates/stratum-core/src/runtime/bootstrap.rs
// ============================================================================
// Module: Bootstrap Orchestrator
// Description: Generic bootstrap and teardown shared by every provider.
// Purpose: Start the control instance and hand back a composable finalizer.
// Dependencies: crate::{core, interfaces}, serde, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! Bootstrap selects an image satisfying the request, starts the control
//! instance, and returns a [`Finalizer`] that completes agent setup once the
//! instance is reachable. Progress is recorded in storage under
//! [`BOOTSTRAP_RECORD_KEY`] so a retried bootstrap detects and reuses a live
//! control instance, and so teardown can find instances that never finished
//! starting.
//!
//! Invariants:
//! - The pending record is written before any instance is started.
//! - Generic failures are returned, never retried here; retry policy belongs
//!   to the caller via [`BootstrapError::is_retriable`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::core::Constraints;
use crate::core::EnvironmentName;
use crate::core::ImageSpec;
use crate::core::InstanceId;
use crate::core::InstanceInfo;
use crate::core::InstanceStatus;
use crate::core::MachineConfig;
use crate::core::MachineId;
use crate::core::StartInstanceParams;
use crate::interfaces::BackendError;
use crate::interfaces::Storage;
use crate::interfaces::StorageError;
use crate::interfaces::SupportsCustomSources;
use crate::runtime::context::ContextError;
use crate::runtime::context::OperationContext;
use crate::runtime::environment::EnvironSnapshot;
use crate::runtime::metadata::MetadataSourceResolver;
use crate::runtime::metadata::ResolveError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Storage key of the bootstrap record.
pub const BOOTSTRAP_RECORD_KEY: &str = "provider-state";
/// Machine identifier assigned to the bootstrap node.
pub const BOOTSTRAP_MACHINE_ID: &str = "0";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Bootstrap and teardown errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BootstrapError {
    /// The caller cancelled the operation.
    #[error("bootstrap cancelled")]
    Cancelled,
    /// The caller's deadline passed.
    #[error("bootstrap deadline exceeded")]
    DeadlineExceeded,
    /// No provisionable image satisfies the request.
    #[error("no matching image for series {series} and arch {arch}")]
    NoMatchingImage {
        /// Requested series.
        series: String,
        /// Requested architecture, or `any`.
        arch: String,
    },
    /// The backend could not place the instance right now.
    #[error("provisioning failed: {0}")]
    Provisioning(String),
    /// The backend failed permanently.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// Storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Metadata sources could not be resolved.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// The control node's address is not yet known.
    #[error("cannot obtain control node address: {0}")]
    AddressUnavailable(String),
    /// Provider follow-up work after the generic finalizer failed.
    #[error("bootstrap finalize failed: {0}")]
    Finalize(String),
}

impl BootstrapError {
    /// Returns true when the caller may retry bootstrap unchanged.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Provisioning(_) | Self::AddressUnavailable(_) | Self::DeadlineExceeded)
    }
}

impl From<ContextError> for BootstrapError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Cancelled => Self::Cancelled,
            ContextError::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

// ============================================================================
// SECTION: Bootstrap Record
// ============================================================================

/// Provider state persisted in environment storage during bootstrap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapRecord {
    /// Control instances known to have been started.
    pub control_instances: Vec<InstanceId>,
    /// True while a control instance start is in flight.
    pub pending: bool,
}

impl BootstrapRecord {
    /// Loads the record, returning `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the read fails or the record is malformed.
    pub fn load(storage: &dyn Storage) -> Result<Option<Self>, StorageError> {
        match storage.get(BOOTSTRAP_RECORD_KEY) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|err| StorageError::Corrupt(format!("{BOOTSTRAP_RECORD_KEY}: {err}"))),
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Saves the record.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the write fails.
    pub fn save(&self, storage: &dyn Storage) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(self).map_err(|err| StorageError::Io(err.to_string()))?;
        storage.put(BOOTSTRAP_RECORD_KEY, &bytes)
    }
}

// ============================================================================
// SECTION: Finalizer
// ============================================================================

/// Boxed one-shot finalizer body.
type FinalizerFn =
    Box<dyn FnOnce(&OperationContext, &mut MachineConfig) -> Result<(), BootstrapError> + Send>;

/// Deferred completion step run once the control instance is reachable.
pub struct Finalizer {
    /// Finalizer body.
    run: FinalizerFn,
}

impl Finalizer {
    /// Wraps a finalizer body.
    pub fn new<F>(run: F) -> Self
    where
        F: FnOnce(&OperationContext, &mut MachineConfig) -> Result<(), BootstrapError>
            + Send
            + 'static,
    {
        Self {
            run: Box::new(run),
        }
    }

    /// A finalizer that does nothing.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(|_, _| Ok(()))
    }

    /// Composes `follow_up` after this finalizer; it runs only on success.
    ///
    /// Errors from this finalizer propagate unchanged.
    #[must_use]
    pub fn then<F>(self, follow_up: F) -> Self
    where
        F: FnOnce(&OperationContext, &mut MachineConfig) -> Result<(), BootstrapError>
            + Send
            + 'static,
    {
        Self::new(move |ctx, machine| {
            self.run(ctx, machine)?;
            follow_up(ctx, machine)
        })
    }

    /// Runs the finalizer.
    ///
    /// # Errors
    ///
    /// Returns the first [`BootstrapError`] raised by a composed stage.
    pub fn run(
        self,
        ctx: &OperationContext,
        machine: &mut MachineConfig,
    ) -> Result<(), BootstrapError> {
        (self.run)(ctx, machine)
    }
}

impl fmt::Debug for Finalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Finalizer")
    }
}

// ============================================================================
// SECTION: Parameters and Results
// ============================================================================

/// Caller parameters for bootstrap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapParams {
    /// Requested series; falls back to the config `default-series`.
    pub series: Option<String>,
    /// Constraints for the control instance.
    pub constraints: Constraints,
    /// Optional placement directive.
    pub placement: Option<String>,
}

/// Outcome of the generic bootstrap phase.
#[derive(Debug)]
pub struct BootstrapResult {
    /// Selected architecture.
    pub arch: String,
    /// Selected series.
    pub series: String,
    /// The control instance.
    pub instance: InstanceInfo,
    /// True when a live control instance from an earlier attempt was reused.
    pub reused: bool,
    /// Agent configuration the finalizer completes.
    pub machine_config: MachineConfig,
    /// Completion step to run once the instance is reachable.
    pub finalizer: Finalizer,
}

impl BootstrapResult {
    /// Runs the finalizer against the carried machine config.
    ///
    /// # Errors
    ///
    /// Returns the finalizer's [`BootstrapError`].
    pub fn finalize(self, ctx: &OperationContext) -> Result<MachineConfig, BootstrapError> {
        let mut machine = self.machine_config;
        self.finalizer.run(ctx, &mut machine)?;
        Ok(machine)
    }
}

// ============================================================================
// SECTION: Orchestrator
// ============================================================================

/// Generic bootstrap sequence shared by all providers.
#[derive(Debug, Clone, Default)]
pub struct BootstrapOrchestrator {
    /// Metadata source resolver used to build agent config.
    resolver: MetadataSourceResolver,
}

impl BootstrapOrchestrator {
    /// Creates an orchestrator using `resolver` for metadata sources.
    #[must_use]
    pub const fn new(resolver: MetadataSourceResolver) -> Self {
        Self {
            resolver,
        }
    }

    /// Returns the metadata source resolver.
    #[must_use]
    pub const fn resolver(&self) -> &MetadataSourceResolver {
        &self.resolver
    }

    /// Runs the generic bootstrap phase.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError`] on cancellation, image mismatch, backend or
    /// storage failure. Only [`BootstrapError::is_retriable`] errors are worth
    /// retrying unchanged.
    pub fn bootstrap(
        &self,
        ctx: &OperationContext,
        snapshot: &EnvironSnapshot,
        custom: Option<&dyn SupportsCustomSources>,
        params: &BootstrapParams,
    ) -> Result<BootstrapResult, BootstrapError> {
        ctx.check()?;
        let config = snapshot.config();
        let environment = config.name();
        let client = snapshot.client();

        let sources = self.resolver.resolve_with(config, custom)?;
        let series = params.series.clone().unwrap_or_else(|| config.default_series().to_string());
        let arch = params.constraints.arch.as_deref();
        let image = select_image(&client.provisionable_images()?, &series, arch).ok_or_else(|| {
            BootstrapError::NoMatchingImage {
                series: series.clone(),
                arch: arch.unwrap_or("any").to_string(),
            }
        })?;
        debug!(
            environment = %environment,
            series = %image.series,
            arch = %image.arch,
            "selected image"
        );

        ctx.check()?;
        let (instance, reused) = match find_live_control_instance(snapshot, &environment)? {
            Some(instance) => {
                info!(
                    environment = %environment,
                    instance = %instance.id,
                    "reusing live control instance"
                );
                (instance, true)
            }
            None => (start_control_instance(snapshot, &environment, &image, params)?, false),
        };

        let machine_config = MachineConfig {
            machine_id: MachineId::new(BOOTSTRAP_MACHINE_ID),
            instance_id: instance.id.clone(),
            environment: environment.clone(),
            image: image.clone(),
            agent_version: None,
            metadata_urls: Vec::new(),
            control_node: true,
            agent_env: BTreeMap::new(),
        };

        let finalize_client = Arc::clone(client);
        let metadata_urls: Vec<String> =
            sources.iter().map(|source| source.url.to_string()).collect();
        let agent_version = config.agent_version();
        let finalizer = Finalizer::new(move |ctx, machine| {
            ctx.check()?;
            machine.metadata_urls = metadata_urls;
            machine.agent_version = agent_version;
            finalize_client.install_agent(machine)?;
            info!(
                environment = %machine.environment,
                instance = %machine.instance_id,
                "installed control agent"
            );
            Ok(())
        });

        Ok(BootstrapResult {
            arch: image.arch,
            series: image.series,
            instance,
            reused,
            machine_config,
            finalizer,
        })
    }

    /// Tears down everything the backend reports for the environment.
    ///
    /// Runs against partial infrastructure: instances are discovered from
    /// the backend rather than from the bootstrap record.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError`] on cancellation, backend or storage failure.
    pub fn destroy(
        &self,
        ctx: &OperationContext,
        snapshot: &EnvironSnapshot,
    ) -> Result<(), BootstrapError> {
        ctx.check()?;
        let environment = snapshot.config().name();
        let ids: Vec<InstanceId> = snapshot
            .client()
            .all_instances(&environment)?
            .into_iter()
            .map(|instance| instance.id)
            .collect();
        if !ids.is_empty() {
            info!(environment = %environment, count = ids.len(), "stopping instances");
            snapshot.client().stop_instances(&ids)?;
        }
        ctx.check()?;
        snapshot.storage().remove_all()?;
        info!(environment = %environment, "removed environment storage");
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Picks the first image matching `series` and, when given, `arch`.
fn select_image(images: &[ImageSpec], series: &str, arch: Option<&str>) -> Option<ImageSpec> {
    images
        .iter()
        .find(|image| image.series == series && arch.is_none_or(|arch| image.arch == arch))
        .cloned()
}

/// Returns a live control instance left by an earlier bootstrap attempt.
fn find_live_control_instance(
    snapshot: &EnvironSnapshot,
    environment: &EnvironmentName,
) -> Result<Option<InstanceInfo>, BootstrapError> {
    let Some(record) = BootstrapRecord::load(snapshot.storage().as_ref())? else {
        return Ok(None);
    };
    let live = snapshot.client().all_instances(environment)?.into_iter().find(|instance| {
        instance.control_node
            && instance.status != InstanceStatus::Stopped
            && (record.pending || record.control_instances.contains(&instance.id))
    });
    Ok(live)
}

/// Records intent, starts the control instance, then records its id.
fn start_control_instance(
    snapshot: &EnvironSnapshot,
    environment: &EnvironmentName,
    image: &ImageSpec,
    params: &BootstrapParams,
) -> Result<InstanceInfo, BootstrapError> {
    let storage = snapshot.storage().as_ref();
    BootstrapRecord {
        control_instances: Vec::new(),
        pending: true,
    }
    .save(storage)?;

    let request = StartInstanceParams {
        environment: environment.clone(),
        image: image.clone(),
        constraints: params.constraints.clone(),
        placement: params.placement.clone(),
        control_node: true,
    };
    let instance = snapshot.client().start_instance(&request).map_err(|err| {
        if err.is_transient() {
            warn!(environment = %environment, error = %err, "control instance start failed");
            BootstrapError::Provisioning(err.to_string())
        } else {
            BootstrapError::Backend(err)
        }
    })?;

    BootstrapRecord {
        control_instances: vec![instance.id.clone()],
        pending: false,
    }
    .save(storage)?;
    info!(environment = %environment, instance = %instance.id, "started control instance");
    Ok(instance)
}
