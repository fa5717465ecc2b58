// crates/stratum-providers/src/registry.rs
// ============================================================================
// Module: Provider Registry
// Description: Registry of provider backends keyed by provider type.
// Purpose: Turn an environment declaration into a configured Environment.
// Dependencies: stratum-core, crate::{sigma, memory}
// ============================================================================

//! ## Overview
//! The registry maps each provider type name to one shared backend. Callers
//! look up the backend named by an environment's `type` field and receive an
//! unconfigured [`Environment`] bound to it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use stratum_core::EnvironmentName;
use stratum_core::Environment;
use stratum_core::MetadataSourceResolver;
use stratum_core::ProviderBackend;
use thiserror::Error;

use crate::memory::MemoryCloud;
use crate::memory::MemoryProvider;
use crate::sigma::SigmaProvider;
use crate::sigma::SigmaProviderConfig;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Provider registry errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A backend with the same type name is already registered.
    #[error("provider already registered: {0}")]
    AlreadyRegistered(String),
    /// No backend is registered for the requested type name.
    #[error("provider not registered: {0}")]
    NotRegistered(String),
}

// ============================================================================
// SECTION: Provider Registry
// ============================================================================

/// Provider backends keyed by provider type.
///
/// # Invariants
/// - Provider type names are unique within the registry.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Backends keyed by [`ProviderBackend::provider_type`].
    providers: BTreeMap<String, Arc<dyn ProviderBackend>>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the sigma and memory providers.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when registration fails.
    pub fn with_builtin_providers(
        sigma: SigmaProviderConfig,
        memory: MemoryCloud,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        registry.register_provider(Arc::new(SigmaProvider::new(sigma)))?;
        registry.register_provider(Arc::new(MemoryProvider::new(memory)))?;
        Ok(registry)
    }

    /// Registers a backend under its provider type.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyRegistered`] for duplicate type names.
    pub fn register_provider(
        &mut self,
        provider: Arc<dyn ProviderBackend>,
    ) -> Result<(), RegistryError> {
        let provider_type = provider.provider_type().to_string();
        if self.providers.contains_key(&provider_type) {
            return Err(RegistryError::AlreadyRegistered(provider_type));
        }
        self.providers.insert(provider_type, provider);
        Ok(())
    }

    /// Returns the backend registered for `provider_type`.
    #[must_use]
    pub fn get(&self, provider_type: &str) -> Option<Arc<dyn ProviderBackend>> {
        self.providers.get(provider_type).cloned()
    }

    /// Returns registered provider type names in sorted order.
    pub fn provider_types(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    /// Creates an unconfigured environment bound to `provider_type`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotRegistered`] for unknown provider types.
    pub fn open_environment(
        &self,
        name: EnvironmentName,
        provider_type: &str,
        resolver: MetadataSourceResolver,
    ) -> Result<Environment, RegistryError> {
        let provider = self
            .get(provider_type)
            .ok_or_else(|| RegistryError::NotRegistered(provider_type.to_string()))?;
        Ok(Environment::new(name, provider, resolver))
    }
}
