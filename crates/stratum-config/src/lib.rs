// crates/stratum-config/src/lib.rs
// ============================================================================
// Module: Stratum Config Library
// Description: Process configuration model and validation.
// Purpose: Single source of truth for stratum.toml semantics.
// Dependencies: stratum-core, serde, toml
// ============================================================================

//! ## Overview
//! `stratum-config` loads the process-level `stratum.toml`: the default
//! metadata source, logging settings, the cluster state store, and the
//! per-environment attribute tables handed to the config validator.
//! Loading is strict and fails closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
