// crates/stratum-core/src/core/constraints.rs
// ============================================================================
// Module: Instance Constraints
// Description: Hardware and placement constraints for provisioning requests.
// Purpose: Carry user constraints from the CLI into bootstrap and prechecks.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Constraints are written as space-separated `key=value` pairs, for example
//! `arch=amd64 mem=4G cpu-cores=2`. Unset keys impose no restriction.
//! Memory and disk sizes accept an `M`, `G` or `T` suffix and are stored in
//! megabytes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Constraint value applied when selecting or starting an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    /// Required CPU architecture.
    pub arch: Option<String>,
    /// Minimum number of CPU cores.
    pub cpu_cores: Option<u64>,
    /// Minimum memory in megabytes.
    pub mem_mb: Option<u64>,
    /// Minimum root disk size in megabytes.
    pub root_disk_mb: Option<u64>,
    /// Backend-specific instance type.
    pub instance_type: Option<String>,
}

/// Errors returned when parsing constraints.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstraintsParseError {
    /// The term is not of the form `key=value`.
    #[error("malformed constraint {0:?}")]
    Malformed(String),
    /// The key is not a known constraint.
    #[error("unknown constraint {0:?}")]
    UnknownKey(String),
    /// The value could not be parsed for the key.
    #[error("bad {key} constraint: {value:?}")]
    BadValue {
        /// Constraint key.
        key: String,
        /// Offending value.
        value: String,
    },
    /// The key was given more than once.
    #[error("duplicate constraint {0:?}")]
    Duplicate(String),
}

impl Constraints {
    /// Returns true when no constraint is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.arch.is_none()
            && self.cpu_cores.is_none()
            && self.mem_mb.is_none()
            && self.root_disk_mb.is_none()
            && self.instance_type.is_none()
    }
}

// ============================================================================
// SECTION: Parsing and Formatting
// ============================================================================

impl FromStr for Constraints {
    type Err = ConstraintsParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut constraints = Self::default();
        for term in input.split_whitespace() {
            let Some((key, value)) = term.split_once('=') else {
                return Err(ConstraintsParseError::Malformed(term.to_string()));
            };
            let bad = || ConstraintsParseError::BadValue {
                key: key.to_string(),
                value: value.to_string(),
            };
            let duplicate = match key {
                "arch" => constraints.arch.replace(value.to_string()).is_some(),
                "cpu-cores" => {
                    constraints.cpu_cores.replace(value.parse().map_err(|_| bad())?).is_some()
                }
                "mem" => {
                    let size = parse_size_mb(value).ok_or_else(bad)?;
                    constraints.mem_mb.replace(size).is_some()
                }
                "root-disk" => {
                    let size = parse_size_mb(value).ok_or_else(bad)?;
                    constraints.root_disk_mb.replace(size).is_some()
                }
                "instance-type" => constraints.instance_type.replace(value.to_string()).is_some(),
                _ => return Err(ConstraintsParseError::UnknownKey(key.to_string())),
            };
            if duplicate {
                return Err(ConstraintsParseError::Duplicate(key.to_string()));
            }
        }
        Ok(constraints)
    }
}

impl fmt::Display for Constraints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut terms = Vec::new();
        if let Some(arch) = &self.arch {
            terms.push(format!("arch={arch}"));
        }
        if let Some(cores) = self.cpu_cores {
            terms.push(format!("cpu-cores={cores}"));
        }
        if let Some(mem) = self.mem_mb {
            terms.push(format!("mem={mem}M"));
        }
        if let Some(disk) = self.root_disk_mb {
            terms.push(format!("root-disk={disk}M"));
        }
        if let Some(instance_type) = &self.instance_type {
            terms.push(format!("instance-type={instance_type}"));
        }
        f.write_str(&terms.join(" "))
    }
}

/// Parses a size with an optional `M`/`G`/`T` suffix into megabytes.
fn parse_size_mb(value: &str) -> Option<u64> {
    let (digits, multiplier) = match value.as_bytes().last()? {
        b'M' => (&value[.. value.len() - 1], 1),
        b'G' => (&value[.. value.len() - 1], 1024),
        b'T' => (&value[.. value.len() - 1], 1024 * 1024),
        _ => (value, 1),
    };
    digits.parse::<u64>().ok()?.checked_mul(multiplier)
}
