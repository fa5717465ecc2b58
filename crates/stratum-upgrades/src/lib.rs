// crates/stratum-upgrades/src/lib.rs
// ============================================================================
// Module: Stratum Upgrades
// Description: Declared upgrade steps and the agent-side upgrade entry point.
// Purpose: Bind the generic step engine to cluster state and concrete steps.
// Dependencies: stratum-core
// ============================================================================

//! ## Overview
//! An agent that has just been upgraded calls [`perform_upgrade`] with its
//! previous version, its new version, and its role. The declared
//! [`catalog`] decides which steps run; each step receives an
//! [`UpgradeContext`] carrying the cluster state store and the agent's
//! machine identity.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod context;
pub mod steps;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use context::UpgradeContext;
pub use steps::StepFailure;
pub use steps::catalog;
pub use steps::perform_upgrade;
