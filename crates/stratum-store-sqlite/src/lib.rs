// crates/stratum-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Cluster State Store
// Description: Durable ClusterStateStore backend using SQLite.
// Purpose: Persist machine and block device records across upgrades.
// Dependencies: stratum-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`stratum_core::ClusterStateStore`]
//! holding the machine and block device records that upgrade steps read and
//! migrate. Writes are transactional and block device inserts are idempotent.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteClusterStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
