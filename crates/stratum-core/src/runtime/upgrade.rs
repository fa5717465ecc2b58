// crates/stratum-core/src/runtime/upgrade.rs
// ============================================================================
// Module: Upgrade Step Engine
// Description: Versioned, role-scoped migration steps run on every node.
// Purpose: Apply the ordered steps between two software versions exactly as declared.
// Dependencies: crate::core, thiserror, tracing
// ============================================================================

//! ## Overview
//! Steps are declared per version boundary in a [`StepCatalog`]. For a
//! transition from `from` to `to`, the engine visits every boundary `v` with
//! `from < v <= to` in ascending order, keeps the steps whose targets include
//! the node's role, and runs them in declaration order.
//!
//! Invariants:
//! - Steps run sequentially on the caller's thread.
//! - The first failure stops the run; nothing is rolled back.
//! - The engine records no completion markers. Every action must be
//!   idempotent because a retried run repeats already-applied steps.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;
use tracing::info;
use tracing::warn;

use crate::core::Version;

// ============================================================================
// SECTION: Roles and Targets
// ============================================================================

/// Role a node plays in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeRole {
    /// Ordinary workload host.
    HostMachine,
    /// Control node serving the API.
    StateServer,
    /// The single control node holding canonical persistent state.
    DatabaseMaster,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::HostMachine => "host-machine",
            Self::StateServer => "state-server",
            Self::DatabaseMaster => "database-master",
        })
    }
}

/// Set of roles an upgrade step applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Target {
    /// Every node.
    AllMachines,
    /// Workload hosts only.
    HostMachine,
    /// Every control node, including the database master.
    StateServer,
    /// The database master only.
    DatabaseMaster,
}

impl Target {
    /// Returns true when a node with `role` is in this target set.
    #[must_use]
    pub const fn includes(self, role: NodeRole) -> bool {
        match self {
            Self::AllMachines => true,
            Self::HostMachine => matches!(role, NodeRole::HostMachine),
            Self::StateServer => matches!(role, NodeRole::StateServer | NodeRole::DatabaseMaster),
            Self::DatabaseMaster => matches!(role, NodeRole::DatabaseMaster),
        }
    }
}

// ============================================================================
// SECTION: Steps
// ============================================================================

/// Error type returned by step actions.
pub type StepError = Box<dyn StdError + Send + Sync>;

/// Boxed step action over a step context `C`.
type StepAction<C> = Box<dyn Fn(&C) -> Result<(), StepError> + Send + Sync>;

/// A unit of migration work.
pub struct UpgradeStep<C> {
    /// Human-readable description.
    description: String,
    /// Roles the step applies to.
    targets: Vec<Target>,
    /// Idempotent action.
    action: StepAction<C>,
}

impl<C> UpgradeStep<C> {
    /// Declares a step.
    pub fn new<F>(description: impl Into<String>, targets: &[Target], action: F) -> Self
    where
        F: Fn(&C) -> Result<(), StepError> + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            targets: targets.to_vec(),
            action: Box::new(action),
        }
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the declared targets.
    #[must_use]
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Returns true when a node with `role` should run this step.
    #[must_use]
    pub fn applies_to(&self, role: NodeRole) -> bool {
        self.targets.iter().any(|target| target.includes(role))
    }

    /// Runs the action.
    ///
    /// # Errors
    ///
    /// Returns the action's [`StepError`].
    pub fn run(&self, ctx: &C) -> Result<(), StepError> {
        (self.action)(ctx)
    }
}

impl<C> fmt::Debug for UpgradeStep<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpgradeStep")
            .field("description", &self.description)
            .field("targets", &self.targets)
            .finish_non_exhaustive()
    }
}

/// Upgrade steps grouped by version boundary.
///
/// # Invariants
/// - Steps within a boundary keep declaration order.
pub struct StepCatalog<C> {
    /// Steps keyed by boundary.
    boundaries: BTreeMap<Version, Vec<UpgradeStep<C>>>,
}

impl<C> Default for StepCatalog<C> {
    fn default() -> Self {
        Self {
            boundaries: BTreeMap::new(),
        }
    }
}

impl<C> StepCatalog<C> {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends steps to a version boundary.
    #[must_use]
    pub fn with_steps(mut self, version: Version, steps: Vec<UpgradeStep<C>>) -> Self {
        self.boundaries.entry(version).or_default().extend(steps);
        self
    }

    /// Returns the declared boundaries in ascending order.
    pub fn versions(&self) -> impl Iterator<Item = &Version> {
        self.boundaries.keys()
    }

    /// Returns the steps declared at a boundary.
    #[must_use]
    pub fn steps_at(&self, version: &Version) -> &[UpgradeStep<C>] {
        self.boundaries.get(version).map(Vec::as_slice).unwrap_or_default()
    }

    /// Returns the steps a node with `role` runs between `from` and `to`.
    pub fn applicable<'a>(
        &'a self,
        from: &'a Version,
        to: &'a Version,
        role: NodeRole,
    ) -> impl Iterator<Item = (&'a Version, &'a UpgradeStep<C>)> + 'a {
        self.boundaries
            .iter()
            .filter(move |(version, _)| *version > from && *version <= to)
            .flat_map(move |(version, steps)| {
                steps
                    .iter()
                    .filter(move |step| step.applies_to(role))
                    .map(move |step| (version, step))
            })
    }
}

impl<C> fmt::Debug for StepCatalog<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.boundaries.iter()).finish()
    }
}

// ============================================================================
// SECTION: Reports and Errors
// ============================================================================

/// A step that completed during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedStep {
    /// Boundary the step belongs to.
    pub version: Version,
    /// Step description.
    pub description: String,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeReport {
    /// Version the node upgraded from.
    pub from: Version,
    /// Version the node upgraded to.
    pub to: Version,
    /// Role the node ran as.
    pub role: NodeRole,
    /// Steps applied, in execution order.
    pub applied: Vec<AppliedStep>,
}

/// Upgrade engine errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum UpgradeError {
    /// A step's action failed; later steps were not run.
    #[error("upgrade step {description:?} for version {version} failed: {source}")]
    StepFailed {
        /// Boundary the failing step belongs to.
        version: Version,
        /// Failing step description.
        description: String,
        /// Steps applied before the failure.
        applied: Vec<AppliedStep>,
        /// Underlying failure.
        #[source]
        source: StepError,
    },
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Runs catalog steps for a node's version transition.
pub struct UpgradeStepEngine<C> {
    /// Declared steps.
    catalog: StepCatalog<C>,
}

impl<C> UpgradeStepEngine<C> {
    /// Creates an engine over `catalog`.
    #[must_use]
    pub const fn new(catalog: StepCatalog<C>) -> Self {
        Self {
            catalog,
        }
    }

    /// Returns the catalog.
    #[must_use]
    pub const fn catalog(&self) -> &StepCatalog<C> {
        &self.catalog
    }

    /// Runs every applicable step between `from` and `to`.
    ///
    /// # Errors
    ///
    /// Returns [`UpgradeError::StepFailed`] for the first failing step.
    pub fn run_steps(
        &self,
        from: &Version,
        to: &Version,
        role: NodeRole,
        ctx: &C,
    ) -> Result<UpgradeReport, UpgradeError> {
        let mut applied = Vec::new();
        for (version, step) in self.catalog.applicable(from, to, role) {
            info!(
                version = %version,
                role = %role,
                step = step.description(),
                "running upgrade step"
            );
            if let Err(source) = step.run(ctx) {
                warn!(
                    version = %version,
                    step = step.description(),
                    error = %source,
                    "upgrade step failed"
                );
                return Err(UpgradeError::StepFailed {
                    version: version.clone(),
                    description: step.description().to_string(),
                    applied,
                    source,
                });
            }
            applied.push(AppliedStep {
                version: version.clone(),
                description: step.description().to_string(),
            });
        }
        Ok(UpgradeReport {
            from: from.clone(),
            to: to.clone(),
            role,
            applied,
        })
    }
}

impl<C> fmt::Debug for UpgradeStepEngine<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpgradeStepEngine").field("catalog", &self.catalog).finish()
    }
}
