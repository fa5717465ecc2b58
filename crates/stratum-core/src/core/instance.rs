// crates/stratum-core/src/core/instance.rs
// ============================================================================
// Module: Instance Descriptors
// Description: Region endpoints, images, instances, and agent machine config.
// Purpose: Describe what backends provision and what agents are told.
// Dependencies: crate::core::{constraints, identifiers, version}, serde
// ============================================================================

//! ## Overview
//! These types cross the boundary between the generic bootstrap sequence and
//! the backend client. They carry data only; backends decide how to map them
//! onto vendor API calls.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::constraints::Constraints;
use crate::core::identifiers::EnvironmentName;
use crate::core::identifiers::InstanceId;
use crate::core::identifiers::MachineId;
use crate::core::version::Version;

// ============================================================================
// SECTION: Regions and Images
// ============================================================================

/// Connectable endpoint descriptor for a region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudSpec {
    /// Region name as configured.
    pub region: String,
    /// API endpoint for the region.
    pub endpoint: String,
}

/// An image the backend can provision.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImageSpec {
    /// Operating system series, e.g. `trusty`.
    pub series: String,
    /// CPU architecture, e.g. `amd64`.
    pub arch: String,
}

impl ImageSpec {
    /// Creates a new image descriptor.
    #[must_use]
    pub fn new(series: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            series: series.into(),
            arch: arch.into(),
        }
    }
}

// ============================================================================
// SECTION: Instances
// ============================================================================

/// Lifecycle status reported by the backend for an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Requested but not yet running.
    Pending,
    /// Running.
    Running,
    /// Stopped or being torn down.
    Stopped,
    /// Status the backend could not classify.
    Unknown,
}

/// Instance descriptor returned by backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceInfo {
    /// Backend instance identifier.
    pub id: InstanceId,
    /// Environment the instance was started for.
    pub environment: EnvironmentName,
    /// Reported status.
    pub status: InstanceStatus,
    /// Known network addresses, most preferred first.
    pub addresses: Vec<String>,
    /// Whether the instance hosts the control node.
    pub control_node: bool,
}

/// Request to start a single instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartInstanceParams {
    /// Environment the instance belongs to.
    pub environment: EnvironmentName,
    /// Selected image.
    pub image: ImageSpec,
    /// Constraints the instance must satisfy.
    pub constraints: Constraints,
    /// Optional placement directive.
    pub placement: Option<String>,
    /// Whether the instance hosts the control node.
    pub control_node: bool,
}

// ============================================================================
// SECTION: Agent Machine Config
// ============================================================================

/// Agent configuration delivered to a provisioned machine.
///
/// # Invariants
/// - `metadata_urls` preserves metadata source priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineConfig {
    /// Cluster machine identifier.
    pub machine_id: MachineId,
    /// Backend instance identifier.
    pub instance_id: InstanceId,
    /// Environment the machine belongs to.
    pub environment: EnvironmentName,
    /// Selected image.
    pub image: ImageSpec,
    /// Agent version to install, when pinned by configuration.
    pub agent_version: Option<Version>,
    /// Metadata source URLs, in priority order.
    pub metadata_urls: Vec<String>,
    /// Whether the machine runs the control node.
    pub control_node: bool,
    /// Extra agent environment settings contributed by providers.
    pub agent_env: BTreeMap<String, String>,
}
