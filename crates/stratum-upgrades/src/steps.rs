// crates/stratum-upgrades/src/steps.rs
// ============================================================================
// Module: Upgrade Steps
// Description: Version boundaries and the steps declared at each.
// Purpose: Migrate cluster state when agents move across a boundary.
// Dependencies: stratum-core, thiserror, tracing
// ============================================================================

//! ## Overview
//! | Boundary | Step | Targets |
//! |----------|------|---------|
//! | 1.24 | add block device documents for existing machines | database master |
//!
//! Every action is idempotent: the engine keeps no completion markers, so a
//! retried upgrade repeats steps that already succeeded.

// ============================================================================
// SECTION: Imports
// ============================================================================

use stratum_core::BlockDeviceRecord;
use stratum_core::NodeRole;
use stratum_core::StateStoreError;
use stratum_core::StepCatalog;
use stratum_core::StepError;
use stratum_core::Target;
use stratum_core::UpgradeError;
use stratum_core::UpgradeReport;
use stratum_core::UpgradeStep;
use stratum_core::UpgradeStepEngine;
use stratum_core::Version;
use thiserror::Error;
use tracing::debug;
use tracing::info;

use crate::context::UpgradeContext;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Failures raised by declared step actions.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum StepFailure {
    /// Cluster state could not be read or written.
    #[error("cluster state: {0}")]
    State(#[from] StateStoreError),
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Returns the declared upgrade steps.
#[must_use]
pub fn catalog() -> StepCatalog<UpgradeContext> {
    StepCatalog::new().with_steps(Version::new(1, 24, 0), steps_for_124())
}

/// Steps introduced with 1.24.
fn steps_for_124() -> Vec<UpgradeStep<UpgradeContext>> {
    vec![UpgradeStep::new(
        "add block device documents for existing machines",
        &[Target::DatabaseMaster],
        |ctx: &UpgradeContext| add_default_block_devices(ctx).map_err(StepError::from),
    )]
}

/// Gives every machine without one an empty block device document.
fn add_default_block_devices(ctx: &UpgradeContext) -> Result<(), StepFailure> {
    let mut added = 0_usize;
    for machine in ctx.state().machines()? {
        let record = BlockDeviceRecord {
            machine_id: machine.id.clone(),
            devices: Vec::new(),
        };
        if ctx.state().insert_block_devices_if_absent(&record)? {
            debug!(machine = %machine.id, "added block device document");
            added += 1;
        }
    }
    info!(agent = %ctx.agent(), added, "block device documents ensured");
    Ok(())
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Runs the declared steps a node with `role` needs between `from` and `to`.
///
/// A downgrade or a same-version restart runs nothing.
///
/// # Errors
///
/// Returns [`UpgradeError::StepFailed`] for the first failing step.
pub fn perform_upgrade(
    from: &Version,
    to: &Version,
    role: NodeRole,
    ctx: &UpgradeContext,
) -> Result<UpgradeReport, UpgradeError> {
    info!(%from, %to, %role, agent = %ctx.agent(), "performing upgrade");
    UpgradeStepEngine::new(catalog()).run_steps(from, to, role, ctx)
}
