// crates/stratum-core/src/runtime/metadata.rs
// ============================================================================
// Module: Metadata Source Resolver
// Description: Ordered aggregation of release-artifact metadata sources.
// Purpose: Tell bootstrap where to look for installable agent binaries.
// Dependencies: crate::{core, interfaces}, thiserror, tracing, url
// ============================================================================

//! ## Overview
//! Sources are listed in a fixed priority order:
//! 1. the environment's `agent-metadata-url` override,
//! 2. provider-specific sources from the optional custom-sources capability,
//! 3. the process default source injected at construction.
//!
//! The list is advisory: callers probe in order and may consult every entry.
//! Nothing is cached; each call reads the environment's current config.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::core::Config;
use crate::core::MetadataSource;
use crate::interfaces::BackendError;
use crate::interfaces::SupportsCustomSources;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Metadata source resolution errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The environment's configuration could not be read.
    #[error("environment config unavailable: {0}")]
    Environment(String),
    /// The provider's custom source capability failed.
    #[error("custom metadata sources failed: {0}")]
    Custom(#[source] BackendError),
}

/// Read access to an environment's current configuration and capabilities.
pub trait ConfigGetter {
    /// Returns the current validated configuration.
    ///
    /// # Errors
    ///
    /// Returns a message when the environment has no usable configuration.
    fn current_config(&self) -> Result<Config, String>;

    /// Returns the custom metadata source capability, if supported.
    fn custom_sources(&self) -> Option<&dyn SupportsCustomSources>;
}

/// Builds the ordered metadata source list for an environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataSourceResolver {
    /// Process-wide default source, absent in tests and alternate builds.
    default_source: Option<Url>,
}

impl MetadataSourceResolver {
    /// Description attached to the configured override source.
    pub const OVERRIDE_DESCRIPTION: &'static str = "agent-metadata-url";
    /// Description attached to the process default source.
    pub const DEFAULT_DESCRIPTION: &'static str = "default metadata";

    /// Creates a resolver with an optional process default source.
    #[must_use]
    pub const fn new(default_source: Option<Url>) -> Self {
        Self {
            default_source,
        }
    }

    /// Returns the injected default source.
    #[must_use]
    pub const fn default_source(&self) -> Option<&Url> {
        self.default_source.as_ref()
    }

    /// Resolves sources for an environment.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when the config is unavailable or the custom
    /// source capability fails.
    pub fn resolve(&self, env: &dyn ConfigGetter) -> Result<Vec<MetadataSource>, ResolveError> {
        let config = env.current_config().map_err(ResolveError::Environment)?;
        self.resolve_with(&config, env.custom_sources())
    }

    /// Resolves sources from an explicit config and capability.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Custom`] when the custom source capability fails.
    pub fn resolve_with(
        &self,
        config: &Config,
        custom: Option<&dyn SupportsCustomSources>,
    ) -> Result<Vec<MetadataSource>, ResolveError> {
        let mut sources = Vec::new();
        if let Some(url) = config.metadata_url() {
            sources.push(MetadataSource::new(Self::OVERRIDE_DESCRIPTION, url));
        }
        if let Some(custom) = custom {
            let provided = custom.custom_metadata_sources(config).map_err(ResolveError::Custom)?;
            sources.extend(provided);
        }
        if let Some(url) = &self.default_source {
            sources.push(MetadataSource::new(Self::DEFAULT_DESCRIPTION, url.clone()));
        }
        debug!(count = sources.len(), "resolved metadata sources");
        Ok(sources)
    }
}
