// crates/stratum-core/src/runtime/mod.rs
// ============================================================================
// Module: Stratum Runtime
// Description: Environment lifecycle, bootstrap, metadata resolution, and upgrades.
// Purpose: Drive provider backends through the control-plane state machines.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime modules hold the stateful parts of the control plane. Every
//! provider goes through the same [`Environment`] and
//! [`BootstrapOrchestrator`]; every node agent goes through the same
//! [`UpgradeStepEngine`].

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod bootstrap;
pub mod context;
pub mod environment;
pub mod metadata;
pub mod store;
pub mod upgrade;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use bootstrap::BOOTSTRAP_RECORD_KEY;
pub use bootstrap::BootstrapError;
pub use bootstrap::BootstrapOrchestrator;
pub use bootstrap::BootstrapParams;
pub use bootstrap::BootstrapRecord;
pub use bootstrap::BootstrapResult;
pub use bootstrap::Finalizer;
pub use context::ContextError;
pub use context::OperationContext;
pub use environment::EnvironError;
pub use environment::EnvironPhase;
pub use environment::EnvironSnapshot;
pub use environment::Environment;
pub use metadata::ConfigGetter;
pub use metadata::MetadataSourceResolver;
pub use metadata::ResolveError;
pub use store::InMemoryClusterStateStore;
pub use upgrade::AppliedStep;
pub use upgrade::NodeRole;
pub use upgrade::StepCatalog;
pub use upgrade::StepError;
pub use upgrade::Target;
pub use upgrade::UpgradeError;
pub use upgrade::UpgradeReport;
pub use upgrade::UpgradeStep;
pub use upgrade::UpgradeStepEngine;
