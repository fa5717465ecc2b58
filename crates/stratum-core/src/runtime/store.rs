// crates/stratum-core/src/runtime/store.rs
// ============================================================================
// Module: Stratum In-Memory State Store
// Description: Simple in-memory cluster state store for tests and dry runs.
// Purpose: Provide a deterministic store implementation without external deps.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! This module provides an in-memory implementation of [`ClusterStateStore`]
//! for tests and local dry runs. It is not intended for production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::MachineId;
use crate::interfaces::BlockDeviceRecord;
use crate::interfaces::ClusterStateStore;
use crate::interfaces::MachineRecord;
use crate::interfaces::StateStoreError;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Maps guarded by the store mutex.
#[derive(Debug, Default)]
struct StoreState {
    /// Machines by id.
    machines: BTreeMap<MachineId, MachineRecord>,
    /// Block device documents by machine id.
    block_devices: BTreeMap<MachineId, BlockDeviceRecord>,
}

/// In-memory cluster state store for tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct InMemoryClusterStateStore {
    /// State protected by a mutex.
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryClusterStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the state.
    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StateStoreError> {
        self.state
            .lock()
            .map_err(|_| StateStoreError::Store("cluster state store mutex poisoned".to_string()))
    }
}

impl ClusterStateStore for InMemoryClusterStateStore {
    fn upsert_machine(&self, machine: &MachineRecord) -> Result<(), StateStoreError> {
        self.lock()?.machines.insert(machine.id.clone(), machine.clone());
        Ok(())
    }

    fn machines(&self) -> Result<Vec<MachineRecord>, StateStoreError> {
        Ok(self.lock()?.machines.values().cloned().collect())
    }

    fn block_devices(
        &self,
        machine: &MachineId,
    ) -> Result<Option<BlockDeviceRecord>, StateStoreError> {
        Ok(self.lock()?.block_devices.get(machine).cloned())
    }

    fn insert_block_devices_if_absent(
        &self,
        record: &BlockDeviceRecord,
    ) -> Result<bool, StateStoreError> {
        let mut guard = self.lock()?;
        if guard.block_devices.contains_key(&record.machine_id) {
            return Ok(false);
        }
        guard.block_devices.insert(record.machine_id.clone(), record.clone());
        drop(guard);
        Ok(true)
    }
}
