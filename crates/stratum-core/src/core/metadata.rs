// crates/stratum-core/src/core/metadata.rs
// ============================================================================
// Module: Metadata Sources
// Description: Locations searched for installable release-artifact metadata.
// Purpose: Give resolvers and bootstrap a typed, ordered source descriptor.
// Dependencies: serde, url
// ============================================================================

//! ## Overview
//! A metadata source is a base URL plus a human-readable description. Fetching
//! and parsing metadata happens outside the core; these values only record
//! where to look and in what order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use url::Url;

// ============================================================================
// SECTION: Types
// ============================================================================

/// TLS hostname verification policy for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsVerification {
    /// Verify TLS hostnames.
    Verify,
    /// Skip hostname verification (self-signed environment storage).
    NoVerify,
}

/// A location to search for release-artifact metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSource {
    /// Short description used in logs and CLI output.
    pub description: String,
    /// Base URL of the source.
    pub url: Url,
    /// Hostname verification policy.
    pub verification: TlsVerification,
}

impl MetadataSource {
    /// Creates a source that verifies TLS hostnames.
    #[must_use]
    pub fn new(description: impl Into<String>, url: Url) -> Self {
        Self {
            description: description.into(),
            url,
            verification: TlsVerification::Verify,
        }
    }
}

impl fmt::Display for MetadataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description, self.url)
    }
}
