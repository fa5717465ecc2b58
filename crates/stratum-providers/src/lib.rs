// crates/stratum-providers/src/lib.rs
// ============================================================================
// Module: Stratum Providers
// Description: Built-in provider backends and the provider registry.
// Purpose: Supply concrete ProviderBackend implementations for environments.
// Dependencies: stratum-core, reqwest, cap-std, sha2
// ============================================================================

//! ## Overview
//! This crate ships the providers a stratum process can drive:
//! - `sigma`: a CloudSigma-style HTTP backend with host-local temporary
//!   storage that is exposed to the control node after bootstrap.
//! - `memory`: an in-process backend for dry runs and tests.
//!
//! [`ProviderRegistry`] maps provider type names to backends.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod local_storage;
pub mod memory;
pub mod registry;
pub mod sigma;
pub mod sigma_client;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use local_storage::LocalStorage;
pub use local_storage::LocalStorageConfig;
pub use memory::MemoryCloud;
pub use memory::MemoryProvider;
pub use registry::ProviderRegistry;
pub use registry::RegistryError;
pub use sigma::SigmaProvider;
pub use sigma::SigmaProviderConfig;
pub use sigma::resolve_endpoint;
pub use sigma_client::SigmaClient;
pub use sigma_client::SigmaClientConfig;
