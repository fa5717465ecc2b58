// crates/stratum-core/src/core/version.rs
// ============================================================================
// Module: Stratum Software Versions
// Description: Parsed, totally ordered control-software version numbers.
// Purpose: Key upgrade boundaries and compare agent versions.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Versions take the form `major.minor[.patch[.build]][-tag]`, for example
//! `1.24`, `1.24.3` or `1.25.0-alpha1`. Missing components are zero. A tagged
//! version sorts before the untagged release with the same numbers, and tags
//! compare lexicographically among themselves.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use thiserror::Error;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Control software version number.
///
/// # Invariants
/// - `tag`, when present, is non-empty and contains no `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    /// Major component.
    pub major: u32,
    /// Minor component.
    pub minor: u32,
    /// Patch component.
    pub patch: u32,
    /// Build component.
    pub build: u32,
    /// Optional pre-release tag.
    pub tag: Option<String>,
}

/// Errors returned when parsing a [`Version`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionParseError {
    /// The version string did not contain between two and four numeric parts.
    #[error("invalid version {0:?}: expected major.minor[.patch[.build]][-tag]")]
    Malformed(String),
    /// A numeric component could not be parsed.
    #[error("invalid version {input:?}: bad component {component:?}")]
    BadComponent {
        /// Original input.
        input: String,
        /// Offending component.
        component: String,
    },
}

impl Version {
    /// The zero version, used as the "from" version of a fresh node.
    pub const ZERO: Self = Self::new(0, 0, 0);

    /// Creates a release version with a zero build number.
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            build: 0,
            tag: None,
        }
    }

    /// Returns a copy of this version carrying the given pre-release tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Returns true when the version is a pre-release.
    #[must_use]
    pub const fn is_dev(&self) -> bool {
        self.tag.is_some()
    }
}

// ============================================================================
// SECTION: Ordering
// ============================================================================

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then(self.build.cmp(&other.build))
            .then_with(|| match (&self.tag, &other.tag) {
                (None, None) => Ordering::Equal,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(left), Some(right)) => left.cmp(right),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ============================================================================
// SECTION: Parsing and Formatting
// ============================================================================

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (numbers, tag) = match input.split_once('-') {
            Some((numbers, tag)) => {
                if tag.is_empty() || tag.contains('-') {
                    return Err(VersionParseError::Malformed(input.to_string()));
                }
                (numbers, Some(tag.to_string()))
            }
            None => (input, None),
        };
        let parts: Vec<&str> = numbers.split('.').collect();
        if !(2 ..= 4).contains(&parts.len()) {
            return Err(VersionParseError::Malformed(input.to_string()));
        }
        let mut values = [0_u32; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            if part.is_empty() || !part.bytes().all(|byte| byte.is_ascii_digit()) {
                return Err(VersionParseError::BadComponent {
                    input: input.to_string(),
                    component: (*part).to_string(),
                });
            }
            *slot = part.parse().map_err(|_| VersionParseError::BadComponent {
                input: input.to_string(),
                component: (*part).to_string(),
            })?;
        }
        Ok(Self {
            major: values[0],
            minor: values[1],
            patch: values[2],
            build: values[3],
            tag,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.build > 0 {
            write!(f, ".{}", self.build)?;
        }
        if let Some(tag) = &self.tag {
            write!(f, "-{tag}")?;
        }
        Ok(())
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
