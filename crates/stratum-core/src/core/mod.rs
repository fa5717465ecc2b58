// crates/stratum-core/src/core/mod.rs
// ============================================================================
// Module: Stratum Core Types
// Description: Identifiers, versions, constraints, and validated configuration.
// Purpose: Provide stable, serializable types shared by every provider.
// Dependencies: serde, serde_json, url, uuid
// ============================================================================

//! ## Overview
//! Core types are the vocabulary of the control plane: environment and
//! instance identifiers, software versions, instance constraints, and the
//! schema-validated configuration every environment carries.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod config;
pub mod constraints;
pub mod identifiers;
pub mod instance;
pub mod metadata;
pub mod version;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::Config;
pub use config::ConfigError;
pub use config::ConfigSchema;
pub use config::FieldKind;
pub use config::FieldSpec;
pub use config::RawConfig;
pub use config::SchemaError;
pub use config::common_schema;
pub use config::validate;
pub use constraints::Constraints;
pub use constraints::ConstraintsParseError;
pub use identifiers::EnvironmentName;
pub use identifiers::InstanceId;
pub use identifiers::MachineId;
pub use instance::CloudSpec;
pub use instance::ImageSpec;
pub use instance::InstanceInfo;
pub use instance::InstanceStatus;
pub use instance::MachineConfig;
pub use instance::StartInstanceParams;
pub use metadata::MetadataSource;
pub use metadata::TlsVerification;
pub use version::Version;
pub use version::VersionParseError;
