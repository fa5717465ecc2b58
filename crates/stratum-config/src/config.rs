// crates/stratum-config/src/config.rs
// ============================================================================
// Module: Stratum Configuration
// Description: Configuration loading and validation for the stratum CLI.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: stratum-core, stratum-store-sqlite, serde, toml, url
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Unknown keys are rejected at every level except inside environment
//! attribute tables, which are validated later against the provider schema.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Number;
use serde_json::Value;
use stratum_core::EnvironmentName;
use stratum_core::MetadataSourceResolver;
use stratum_core::RawConfig;
use stratum_core::core::config::NAME_FIELD;
use stratum_core::core::config::TYPE_FIELD;
use stratum_store_sqlite::SqliteStoreConfig;
use stratum_store_sqlite::SqliteStoreMode;
use stratum_store_sqlite::SqliteSyncMode;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "stratum.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "STRATUM_CONFIG";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum number of configured environments.
pub const MAX_ENVIRONMENTS: usize = 64;
/// Default busy timeout for the sqlite state store (ms).
const DEFAULT_STORE_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Filter directives accepted as a bare logging level.
const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Stratum process configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StratumConfig {
    /// Metadata source settings.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Cluster state store settings.
    #[serde(default)]
    pub state: StateStoreConfig,
    /// Declared environments.
    #[serde(default)]
    pub environments: Vec<EnvironmentConfig>,
}

impl StratumConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// Resolution order: explicit path, then `STRATUM_CONFIG`, then
    /// `stratum.toml` in the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.metadata.validate()?;
        self.logging.validate()?;
        self.state.validate()?;
        if self.environments.len() > MAX_ENVIRONMENTS {
            return Err(ConfigError::Invalid(format!(
                "too many environments (max {MAX_ENVIRONMENTS})"
            )));
        }
        let mut seen = BTreeSet::new();
        for environment in &self.environments {
            environment.validate()?;
            if !seen.insert(environment.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate environment: {}",
                    environment.name
                )));
            }
        }
        Ok(())
    }

    /// Returns the environment declaration with the given name.
    #[must_use]
    pub fn environment(&self, name: &str) -> Option<&EnvironmentConfig> {
        self.environments.iter().find(|environment| environment.name == name)
    }
}

/// Metadata source configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetadataConfig {
    /// Injected default metadata source, consulted after all others.
    #[serde(default)]
    pub default_base_url: Option<Url>,
}

impl MetadataConfig {
    /// Builds the metadata source resolver for this configuration.
    #[must_use]
    pub fn resolver(&self) -> MetadataSourceResolver {
        MetadataSourceResolver::new(self.default_base_url.clone())
    }

    /// Validates metadata configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.default_base_url
            && !matches!(url.scheme(), "http" | "https" | "file")
        {
            return Err(ConfigError::Invalid(format!(
                "metadata.default_base_url has unsupported scheme: {}",
                url.scheme()
            )));
        }
        Ok(())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default filter level when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    /// Validates logging configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let level = self.level.trim().to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "logging.level must be one of {}",
                LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }
}

/// Returns the default log level.
fn default_log_level() -> String {
    "info".to_string()
}

/// Cluster state store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateStoreType {
    /// In-process store; contents are lost on exit.
    #[default]
    Memory,
    /// `SQLite` database file.
    Sqlite,
}

/// Cluster state store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateStoreConfig {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: StateStoreType,
    /// `SQLite` database path when using the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_store_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for StateStoreConfig {
    fn default() -> Self {
        Self {
            store_type: StateStoreType::default(),
            path: None,
            busy_timeout_ms: default_store_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl StateStoreConfig {
    /// Returns the sqlite store config, or `None` for the memory backend.
    #[must_use]
    pub fn sqlite(&self) -> Option<SqliteStoreConfig> {
        match (self.store_type, &self.path) {
            (StateStoreType::Sqlite, Some(path)) => Some(SqliteStoreConfig {
                path: path.clone(),
                busy_timeout_ms: self.busy_timeout_ms,
                journal_mode: self.journal_mode,
                sync_mode: self.sync_mode,
            }),
            _ => None,
        }
    }

    /// Validates state store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            StateStoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid(
                        "memory state store must not set path".to_string(),
                    ));
                }
                Ok(())
            }
            StateStoreType::Sqlite => {
                let path = self.path.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("sqlite state store requires path".to_string())
                })?;
                validate_path_string("state.path", &path.to_string_lossy())
            }
        }
    }
}

/// Returns the default store busy timeout.
const fn default_store_busy_timeout_ms() -> u64 {
    DEFAULT_STORE_BUSY_TIMEOUT_MS
}

/// Declared environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    /// Environment name.
    pub name: String,
    /// Provider type registered with the provider registry.
    pub provider: String,
    /// Raw attributes validated against the provider schema.
    #[serde(default)]
    pub attrs: toml::Table,
}

impl EnvironmentConfig {
    /// Returns the typed environment name.
    #[must_use]
    pub fn environment_name(&self) -> EnvironmentName {
        EnvironmentName::new(self.name.clone())
    }

    /// Converts attributes into a raw config map.
    ///
    /// `name` and `type` are filled from the declaration when absent.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when an attribute has no JSON
    /// counterpart.
    pub fn raw_config(&self) -> Result<RawConfig, ConfigError> {
        let mut raw = RawConfig::new();
        for (key, value) in &self.attrs {
            raw.insert(key.clone(), toml_to_json(&self.name, key, value)?);
        }
        raw.entry(NAME_FIELD.to_string()).or_insert_with(|| Value::String(self.name.clone()));
        raw.entry(TYPE_FIELD.to_string()).or_insert_with(|| Value::String(self.provider.clone()));
        Ok(raw)
    }

    /// Validates the environment declaration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("environment name must be non-empty".to_string()));
        }
        EnvironmentName::check(&self.name)
            .map_err(|detail| ConfigError::Invalid(format!("environment name {detail}")))?;
        if self.provider.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "environment {} provider must be non-empty",
                self.name
            )));
        }
        for (field, expected) in [(NAME_FIELD, &self.name), (TYPE_FIELD, &self.provider)] {
            match self.attrs.get(field) {
                None => {}
                Some(toml::Value::String(value)) if value == expected => {}
                Some(_) => {
                    return Err(ConfigError::Invalid(format!(
                        "environment {} attrs.{field} conflicts with its declaration",
                        self.name
                    )));
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Converts a TOML attribute into its JSON form.
fn toml_to_json(env: &str, key: &str, value: &toml::Value) -> Result<Value, ConfigError> {
    let unsupported = |kind: &str| {
        ConfigError::Invalid(format!(
            "environment {env} attrs.{key}: {kind} values are unsupported"
        ))
    };
    Ok(match value {
        toml::Value::String(text) => Value::String(text.clone()),
        toml::Value::Integer(number) => Value::Number(Number::from(*number)),
        toml::Value::Float(number) => {
            Value::Number(Number::from_f64(*number).ok_or_else(|| unsupported("non-finite"))?)
        }
        toml::Value::Boolean(flag) => Value::Bool(*flag),
        toml::Value::Datetime(_) => return Err(unsupported("datetime")),
        toml::Value::Array(items) => Value::Array(
            items.iter().map(|item| toml_to_json(env, key, item)).collect::<Result<_, _>>()?,
        ),
        toml::Value::Table(table) => Value::Object(
            table
                .iter()
                .map(|(name, item)| Ok((name.clone(), toml_to_json(env, key, item)?)))
                .collect::<Result<_, ConfigError>>()?,
        ),
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use super::*;

    #[test]
    fn validate_path_string_rejects_empty_string() {
        assert!(validate_path_string("state.path", "  ").is_err());
    }

    #[test]
    fn validate_path_rejects_long_component() {
        let long = "a".repeat(MAX_PATH_COMPONENT_LENGTH + 1);
        assert!(validate_path(Path::new(&long)).is_err());
        assert!(validate_path(Path::new("ok/stratum.toml")).is_ok());
    }

    #[test]
    fn toml_datetime_attrs_are_rejected() {
        let table: toml::Table = "when = 1979-05-27T07:32:00Z".parse().unwrap();
        assert!(toml_to_json("prod", "when", &table["when"]).is_err());
    }
}
