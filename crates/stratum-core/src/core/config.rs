// crates/stratum-core/src/core/config.rs
// ============================================================================
// Module: Environment Configuration
// Description: Declared config schemas, validated configs, and the validator.
// Purpose: Turn raw user attributes into immutable, schema-checked configs.
// Dependencies: serde_json, thiserror, url, uuid
// ============================================================================

//! ## Overview
//! Every environment is configured from a raw attribute map. [`validate`]
//! checks the map against a [`ConfigSchema`]: defaults are applied, values
//! are coerced to their declared kinds, empty values are rejected, and
//! immutable fields are compared against the previously validated config.
//! The result is a [`Config`], which is never mutated after construction;
//! reconfiguration always produces a new value.
//!
//! Invariants:
//! - Every declared, non-omittable field is present and non-empty in a [`Config`].
//!   An empty omittable value is treated as absent.
//! - The `name` field passes [`EnvironmentName::check`].
//! - Validation is re-entrant: the same raw input and previous config yield
//!   the same result (generated secrets are carried forward, never regenerated).
//! - Secret values never appear in `Debug` output or error messages.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;

use serde_json::Number;
use serde_json::Value;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::core::identifiers::EnvironmentName;
use crate::core::version::Version;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment name field.
pub const NAME_FIELD: &str = "name";
/// Provider type field.
pub const TYPE_FIELD: &str = "type";
/// User override for the agent metadata source.
pub const METADATA_URL_FIELD: &str = "agent-metadata-url";
/// Series used when bootstrap parameters do not name one.
pub const DEFAULT_SERIES_FIELD: &str = "default-series";
/// Pinned agent version.
pub const AGENT_VERSION_FIELD: &str = "agent-version";
/// Region field read by [`Config::region`].
pub const REGION_FIELD: &str = "region";
/// Series used when neither bootstrap parameters nor config choose one.
pub const DEFAULT_SERIES: &str = "trusty";
/// Placeholder written in place of secret values.
const REDACTED: &str = "<redacted>";

/// Raw, unvalidated configuration attributes.
pub type RawConfig = BTreeMap<String, Value>;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Schema violations found while validating a raw config.
///
/// # Invariants
/// - Every variant names the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A required field is absent and has no default.
    #[error("{field}: expected {expected}, got nothing")]
    Missing {
        /// Field name.
        field: String,
        /// Declared kind.
        expected: FieldKind,
    },
    /// A value could not be coerced to the declared kind.
    #[error("{field}: expected {expected}, got {detail}")]
    InvalidType {
        /// Field name.
        field: String,
        /// Declared kind.
        expected: FieldKind,
        /// Description of the rejected value.
        detail: String,
    },
    /// A declared field resolved to an empty value.
    #[error("{field}: must not be empty")]
    Empty {
        /// Field name.
        field: String,
    },
    /// A value has the declared kind but violates a field rule.
    #[error("{field}: {detail}")]
    Invalid {
        /// Field name.
        field: String,
        /// Violated rule.
        detail: String,
    },
}

impl SchemaError {
    /// Returns the name of the offending field.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::Missing {
                field, ..
            }
            | Self::InvalidType {
                field, ..
            }
            | Self::Empty {
                field,
            }
            | Self::Invalid {
                field, ..
            } => field,
        }
    }
}

/// Configuration validation errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The raw config violates the schema.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// An immutable field differs from the previous config.
    #[error("{field}: cannot change from {old} to {new}")]
    ImmutableFieldChanged {
        /// Field name.
        field: String,
        /// Previous value (redacted for secrets).
        old: String,
        /// Requested value (redacted for secrets).
        new: String,
    },
}

// ============================================================================
// SECTION: Schema
// ============================================================================

/// Declared kind of a config field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// UTF-8 string.
    String,
    /// Signed integer; numeric strings are accepted.
    Int,
    /// Boolean; `"true"` and `"false"` are accepted.
    Bool,
    /// Absolute URL stored as a string.
    Url,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Bool => "bool",
            Self::Url => "url",
        })
    }
}

impl FieldKind {
    /// Coerces a raw value to this kind.
    fn coerce(self, field: &str, value: Value) -> Result<Value, SchemaError> {
        let invalid = |detail: String| SchemaError::InvalidType {
            field: field.to_string(),
            expected: self,
            detail,
        };
        match (self, value) {
            (Self::String, Value::String(text)) => Ok(Value::String(text)),
            (Self::Int, Value::Number(number)) if number.is_i64() => Ok(Value::Number(number)),
            (Self::Int, Value::String(text)) => text
                .trim()
                .parse::<i64>()
                .map(|parsed| Value::Number(Number::from(parsed)))
                .map_err(|_| invalid(format!("{text:?}"))),
            (Self::Bool, Value::Bool(flag)) => Ok(Value::Bool(flag)),
            (Self::Bool, Value::String(text)) => match text.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(invalid(format!("{text:?}"))),
            },
            (Self::Url, Value::String(text)) => {
                if text.is_empty() {
                    return Ok(Value::String(text));
                }
                Url::parse(&text)
                    .map(|_| Value::String(text.clone()))
                    .map_err(|err| invalid(format!("{text:?} ({err})")))
            }
            (_, other) => Err(invalid(describe_value(&other))),
        }
    }
}

/// Declaration of a single config field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Field name.
    pub name: &'static str,
    /// Declared kind.
    pub kind: FieldKind,
    /// Default applied when the field is absent (ignored for secrets).
    pub default: Option<Value>,
    /// Whether the value is secret.
    pub secret: bool,
    /// Whether the value may not change after creation.
    pub immutable: bool,
    /// Whether the field may be absent after validation.
    pub omittable: bool,
    /// Whether a random value is generated when absent.
    pub generated: bool,
    /// One-line description for boilerplate output.
    pub description: &'static str,
}

impl FieldSpec {
    /// Declares a field of the given kind.
    #[must_use]
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            default: None,
            secret: false,
            immutable: false,
            omittable: false,
            generated: false,
            description: "",
        }
    }

    /// Declares a string field.
    #[must_use]
    pub const fn string(name: &'static str) -> Self {
        Self::new(name, FieldKind::String)
    }

    /// Declares an integer field.
    #[must_use]
    pub const fn int(name: &'static str) -> Self {
        Self::new(name, FieldKind::Int)
    }

    /// Declares a boolean field.
    #[must_use]
    pub const fn bool(name: &'static str) -> Self {
        Self::new(name, FieldKind::Bool)
    }

    /// Declares a URL field.
    #[must_use]
    pub const fn url(name: &'static str) -> Self {
        Self::new(name, FieldKind::Url)
    }

    /// Sets the default value.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Marks the field secret.
    #[must_use]
    pub const fn secret(mut self) -> Self {
        self.secret = true;
        self
    }

    /// Marks the field immutable after creation.
    #[must_use]
    pub const fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    /// Allows the field to be absent.
    #[must_use]
    pub const fn omittable(mut self) -> Self {
        self.omittable = true;
        self
    }

    /// Marks the field as a generated secret.
    #[must_use]
    pub const fn generated_secret(mut self) -> Self {
        self.generated = true;
        self.secret = true;
        self
    }

    /// Sets the boilerplate description.
    #[must_use]
    pub const fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }
}

/// Ordered set of field declarations.
///
/// # Invariants
/// - Field names are unique; later declarations replace earlier ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSchema {
    /// Declared fields in declaration order.
    fields: Vec<FieldSpec>,
}

impl ConfigSchema {
    /// Creates an empty schema.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            fields: Vec::new(),
        }
    }

    /// Adds a field, replacing any earlier declaration with the same name.
    #[must_use]
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.retain(|existing| existing.name != spec.name);
        self.fields.push(spec);
        self
    }

    /// Returns a schema containing this schema's fields followed by `other`'s.
    #[must_use]
    pub fn extend(self, other: &Self) -> Self {
        other.fields.iter().cloned().fold(self, Self::field)
    }

    /// Returns the declared fields.
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Looks up a field declaration.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Returns the names of immutable fields.
    pub fn immutable_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().filter(|field| field.immutable).map(|field| field.name)
    }

    /// Renders a commented sample configuration for help output.
    #[must_use]
    pub fn boilerplate(&self, provider_type: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# {provider_type} environment");
        let _ = writeln!(out, "[environments.attrs]");
        let _ = writeln!(out, "type = {provider_type:?}");
        for field in &self.fields {
            if field.name == TYPE_FIELD {
                continue;
            }
            out.push('\n');
            if !field.description.is_empty() {
                let _ = writeln!(out, "# {}", field.description);
            }
            match (&field.default, field.secret) {
                (Some(value), false) => {
                    let _ = writeln!(out, "# {} = {value}", field.name);
                }
                (_, true) if field.generated => {
                    let _ = writeln!(out, "# {} is generated when omitted", field.name);
                }
                (_, true) => {
                    let _ = writeln!(out, "# {} = <secret>", field.name);
                }
                (None, false) => {
                    let _ = writeln!(out, "# {} = <{}>", field.name, field.kind);
                }
            }
        }
        out
    }
}

/// Returns the fields every environment declares regardless of provider.
#[must_use]
pub fn common_schema() -> ConfigSchema {
    ConfigSchema::new()
        .field(
            FieldSpec::string(NAME_FIELD).immutable().describe("name identifies the environment"),
        )
        .field(FieldSpec::string(TYPE_FIELD).immutable().describe("type selects the provider"))
        .field(
            FieldSpec::url(METADATA_URL_FIELD)
                .omittable()
                .describe("agent-metadata-url overrides where agent binaries are found"),
        )
        .field(
            FieldSpec::string(DEFAULT_SERIES_FIELD)
                .default_value(DEFAULT_SERIES)
                .describe("default-series is used when bootstrap does not name one"),
        )
        .field(
            FieldSpec::string(AGENT_VERSION_FIELD)
                .omittable()
                .describe("agent-version pins the agent software version"),
        )
}

// ============================================================================
// SECTION: Validated Config
// ============================================================================

/// Shared body of a validated config.
#[derive(PartialEq)]
struct ConfigInner {
    /// Validated attributes, including carried-through unknown keys.
    attrs: RawConfig,
    /// Names of secret fields.
    secrets: BTreeSet<&'static str>,
}

/// Validated, immutable environment configuration.
///
/// # Invariants
/// - Produced only by [`validate`]; never mutated afterwards.
/// - Clones share the same attribute map.
#[derive(Clone, PartialEq)]
pub struct Config {
    /// Shared attributes.
    inner: Arc<ConfigInner>,
}

impl Config {
    /// Returns the validated attributes.
    #[must_use]
    pub fn attrs(&self) -> &RawConfig {
        &self.inner.attrs
    }

    /// Returns an owned copy of the attributes suitable for re-validation.
    #[must_use]
    pub fn to_raw(&self) -> RawConfig {
        self.inner.attrs.clone()
    }

    /// Returns the attributes with secret values replaced by a placeholder.
    #[must_use]
    pub fn redacted(&self) -> RawConfig {
        self.inner
            .attrs
            .iter()
            .map(|(key, value)| {
                let shown = if self.inner.secrets.contains(key.as_str()) {
                    Value::String(REDACTED.to_string())
                } else {
                    value.clone()
                };
                (key.clone(), shown)
            })
            .collect()
    }

    /// Returns a raw attribute value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.inner.attrs.get(name)
    }

    /// Returns a string attribute.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Returns an integer attribute.
    #[must_use]
    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    /// Returns a boolean attribute.
    #[must_use]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    /// Returns the environment name.
    #[must_use]
    pub fn name(&self) -> EnvironmentName {
        EnvironmentName::new(self.get_str(NAME_FIELD).unwrap_or_default())
    }

    /// Returns the provider type.
    #[must_use]
    pub fn provider_type(&self) -> &str {
        self.get_str(TYPE_FIELD).unwrap_or_default()
    }

    /// Returns the configured region, if the provider declares one.
    #[must_use]
    pub fn region(&self) -> Option<&str> {
        self.get_str(REGION_FIELD)
    }

    /// Returns the user-configured metadata source override.
    #[must_use]
    pub fn metadata_url(&self) -> Option<Url> {
        self.get_str(METADATA_URL_FIELD).and_then(|raw| Url::parse(raw).ok())
    }

    /// Returns the default series.
    #[must_use]
    pub fn default_series(&self) -> &str {
        self.get_str(DEFAULT_SERIES_FIELD).unwrap_or(DEFAULT_SERIES)
    }

    /// Returns the pinned agent version, when one is set and parseable.
    #[must_use]
    pub fn agent_version(&self) -> Option<Version> {
        self.get_str(AGENT_VERSION_FIELD).and_then(|raw| raw.parse().ok())
    }

    /// Returns true when any of `fields` differs between `self` and `other`.
    #[must_use]
    pub fn differs_in(&self, other: &Self, fields: &[&str]) -> bool {
        fields.iter().any(|field| self.get(field) != other.get(field))
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config").field("attrs", &self.redacted()).finish()
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates raw attributes against a schema.
///
/// When `previous` is supplied, immutable fields must match it and generated
/// secrets absent from `raw` are carried forward from it.
///
/// # Errors
///
/// Returns [`ConfigError::Schema`] for missing, mistyped or empty fields and
/// [`ConfigError::ImmutableFieldChanged`] when an immutable field differs from
/// `previous`.
pub fn validate(
    schema: &ConfigSchema,
    raw: &RawConfig,
    previous: Option<&Config>,
) -> Result<Config, ConfigError> {
    let mut attrs = raw.clone();
    attrs.retain(|_, value| !value.is_null());

    for field in schema.fields().iter().filter(|field| field.generated) {
        if attrs.contains_key(field.name) {
            continue;
        }
        let value = previous
            .and_then(|config| config.get(field.name).cloned())
            .unwrap_or_else(|| Value::String(Uuid::new_v4().to_string()));
        attrs.insert(field.name.to_string(), value);
    }

    for field in schema.fields() {
        let value = match attrs.remove(field.name) {
            Some(value) => value,
            None => match &field.default {
                Some(default) if !field.secret => default.clone(),
                _ if field.omittable => continue,
                _ => {
                    return Err(SchemaError::Missing {
                        field: field.name.to_string(),
                        expected: field.kind,
                    }
                    .into());
                }
            },
        };
        if field.omittable && value.as_str().is_some_and(str::is_empty) {
            continue;
        }
        let value = field.kind.coerce(field.name, value)?;
        if value.as_str().is_some_and(str::is_empty) {
            return Err(SchemaError::Empty {
                field: field.name.to_string(),
            }
            .into());
        }
        if field.name == NAME_FIELD {
            let name = value.as_str().unwrap_or_default();
            EnvironmentName::check(name).map_err(|detail| SchemaError::Invalid {
                field: field.name.to_string(),
                detail,
            })?;
        }
        attrs.insert(field.name.to_string(), value);
    }

    if let Some(previous) = previous {
        for field in schema.fields().iter().filter(|field| field.immutable) {
            let old = previous.get(field.name);
            let new = attrs.get(field.name);
            if old != new {
                return Err(ConfigError::ImmutableFieldChanged {
                    field: field.name.to_string(),
                    old: display_value(old, field.secret),
                    new: display_value(new, field.secret),
                });
            }
        }
    }

    let secrets =
        schema.fields().iter().filter(|field| field.secret).map(|field| field.name).collect();
    Ok(Config {
        inner: Arc::new(ConfigInner {
            attrs,
            secrets,
        }),
    })
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Formats a value for an immutability error.
fn display_value(value: Option<&Value>, secret: bool) -> String {
    match value {
        None => "<unset>".to_string(),
        Some(_) if secret => REDACTED.to_string(),
        Some(Value::String(text)) => format!("{text:?}"),
        Some(other) => other.to_string(),
    }
}

/// Describes a rejected value without echoing large payloads.
fn describe_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(flag) => format!("bool {flag}"),
        Value::Number(number) => format!("number {number}"),
        Value::String(text) => format!("{text:?}"),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    }
}
