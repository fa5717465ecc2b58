// crates/stratum-upgrades/src/context.rs
// ============================================================================
// Module: Upgrade Context
// Description: Per-run handle passed to every upgrade step.
// Purpose: Give steps the cluster state and the identity of the running agent.
// Dependencies: stratum-core
// ============================================================================

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use stratum_core::ClusterStateStore;
use stratum_core::MachineId;

// ============================================================================
// SECTION: Context
// ============================================================================

/// Context handed to upgrade steps.
#[derive(Clone)]
pub struct UpgradeContext {
    /// Cluster state the steps read and migrate.
    state: Arc<dyn ClusterStateStore>,
    /// Machine the upgrading agent runs on.
    agent: MachineId,
}

impl UpgradeContext {
    /// Creates a context for the agent on `agent`.
    #[must_use]
    pub fn new(state: Arc<dyn ClusterStateStore>, agent: MachineId) -> Self {
        Self {
            state,
            agent,
        }
    }

    /// Returns the cluster state store.
    #[must_use]
    pub fn state(&self) -> &dyn ClusterStateStore {
        self.state.as_ref()
    }

    /// Returns the upgrading agent's machine.
    #[must_use]
    pub const fn agent(&self) -> &MachineId {
        &self.agent
    }
}

impl fmt::Debug for UpgradeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpgradeContext").field("agent", &self.agent).finish_non_exhaustive()
    }
}
