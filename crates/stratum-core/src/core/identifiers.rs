// crates/stratum-core/src/core/identifiers.rs
// ============================================================================
// Module: Stratum Identifiers
// Description: Opaque identifiers for environments, instances, and machines.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Identifiers are opaque UTF-8 strings on the wire. Each type wraps a
//! `String` so that an instance id can never be passed where an environment
//! name is expected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum environment name length in bytes.
pub const MAX_ENVIRONMENT_NAME_LENGTH: usize = 128;

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

/// Stable name of one deployment.
///
/// # Invariants
/// - Construction does not validate; config seams call [`EnvironmentName::check`],
///   which admits only names usable as a single path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentName(String);

impl EnvironmentName {
    /// Creates a new environment name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks that `name` is acceptable for a configured environment.
    ///
    /// Accepted names start with an ASCII letter or digit, continue with
    /// ASCII letters, digits, `.`, `_` or `-`, and are at most
    /// [`MAX_ENVIRONMENT_NAME_LENGTH`] bytes. `.`, `..` and anything holding a
    /// path separator are therefore rejected.
    ///
    /// # Errors
    ///
    /// Returns a description of the violated rule.
    pub fn check(name: &str) -> Result<(), String> {
        if name.len() > MAX_ENVIRONMENT_NAME_LENGTH {
            return Err(format!("longer than {MAX_ENVIRONMENT_NAME_LENGTH} bytes"));
        }
        let mut chars = name.chars();
        match chars.next() {
            None => return Err("must not be empty".to_string()),
            Some(first) if !first.is_ascii_alphanumeric() => {
                return Err(format!("{name:?} must start with a letter or digit"));
            }
            Some(_) => {}
        }
        if let Some(bad) =
            chars.find(|ch| !(ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-')))
        {
            return Err(format!("{name:?} contains {bad:?}"));
        }
        Ok(())
    }
}

impl fmt::Display for EnvironmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for EnvironmentName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Backend-assigned instance identifier.
///
/// # Invariants
/// - Opaque UTF-8 string assigned by the backend; unique within one account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Creates a new instance identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for InstanceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Cluster-assigned machine identifier (`"0"` is the bootstrap machine).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineId(String);

impl MachineId {
    /// Creates a new machine identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for MachineId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
