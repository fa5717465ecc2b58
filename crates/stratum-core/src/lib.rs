// crates/stratum-core/src/lib.rs
// ============================================================================
// Module: Stratum Core Library
// Description: Public API surface for the Stratum control-plane core.
// Purpose: Expose core types, provider interfaces, and runtime engines.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Stratum core owns the environment lifecycle state machine and the
//! versioned upgrade-step engine. Cloud backends plug in through the
//! interfaces in [`interfaces`]; nothing in this crate talks to a vendor API
//! directly.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;

pub use interfaces::BackendClient;
pub use interfaces::BackendError;
pub use interfaces::BlockDeviceRecord;
pub use interfaces::ClusterStateStore;
pub use interfaces::MachineRecord;
pub use interfaces::ProviderBackend;
pub use interfaces::StateStoreError;
pub use interfaces::Storage;
pub use interfaces::StorageError;
pub use interfaces::SupportsCustomSources;
pub use runtime::AppliedStep;
pub use runtime::BootstrapError;
pub use runtime::BootstrapOrchestrator;
pub use runtime::BootstrapParams;
pub use runtime::BootstrapRecord;
pub use runtime::BootstrapResult;
pub use runtime::ConfigGetter;
pub use runtime::ContextError;
pub use runtime::EnvironError;
pub use runtime::EnvironPhase;
pub use runtime::EnvironSnapshot;
pub use runtime::Environment;
pub use runtime::Finalizer;
pub use runtime::InMemoryClusterStateStore;
pub use runtime::MetadataSourceResolver;
pub use runtime::NodeRole;
pub use runtime::OperationContext;
pub use runtime::ResolveError;
pub use runtime::StepCatalog;
pub use runtime::StepError;
pub use runtime::Target;
pub use runtime::UpgradeError;
pub use runtime::UpgradeReport;
pub use runtime::UpgradeStep;
pub use runtime::UpgradeStepEngine;
