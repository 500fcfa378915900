// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Codec configuration: the operator-supplied key/value map, the schema a
//! codec declares for it, and the resolved settings every codec shares.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::charset::Charset;
use crate::error::ConfigurationError;

/// Overrides the `source` of every decoded message with a fixed string.
pub const CK_OVERRIDE_SOURCE: &str = "override_source";
/// Charset used to turn payload bytes into text.
pub const CK_CHARSET_NAME: &str = "charset_name";

/// Raw configuration values supplied for one codec instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration {
    values: Map<String, Value>,
}

impl Configuration {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON object of configuration values.
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        serde_json::from_str(json).map_err(|e| ConfigurationError::InvalidValue {
            key: "<root>".to_string(),
            reason: e.to_string(),
        })
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// A key counts as set when it holds a non-blank string.
    pub fn string_is_set(&self, key: &str) -> bool {
        self.get_string(key).is_some()
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    /// Reads an unsigned integer, accepting numeric strings.
    ///
    /// Returns `Ok(None)` when the key is absent, null, or a blank string.
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>, ConfigurationError> {
        let invalid = |value: &Value| ConfigurationError::InvalidValue {
            key: key.to_string(),
            reason: format!("expected an unsigned integer, got {value}"),
        };

        match self.values.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => s
                .trim()
                .parse::<u64>()
                .map(Some)
                .map_err(|_| invalid(&Value::String(s.clone()))),
            Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(|| invalid(&Value::Number(n.clone()))),
            Some(other) => Err(invalid(other)),
        }
    }
}

/// How a configuration field is rendered and validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Number,
}

/// Description of one configuration option a codec recognizes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigurationField {
    pub key: &'static str,
    pub label: &'static str,
    pub default: Option<Value>,
    pub description: &'static str,
    pub optional: bool,
    pub kind: FieldKind,
}

impl ConfigurationField {
    #[must_use]
    pub fn text(
        key: &'static str,
        label: &'static str,
        default: Option<&str>,
        description: &'static str,
        optional: bool,
    ) -> Self {
        Self {
            key,
            label,
            default: default.map(|d| Value::String(d.to_string())),
            description,
            optional,
            kind: FieldKind::Text,
        }
    }

    #[must_use]
    pub fn number(
        key: &'static str,
        label: &'static str,
        default: u64,
        description: &'static str,
        optional: bool,
    ) -> Self {
        Self {
            key,
            label,
            default: Some(Value::from(default)),
            description,
            optional,
            kind: FieldKind::Number,
        }
    }
}

/// The full set of options a codec recognizes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfigurationRequest {
    fields: Vec<ConfigurationField>,
}

impl ConfigurationRequest {
    /// Adds a field, replacing any previous field with the same key.
    pub fn add_field(&mut self, field: ConfigurationField) {
        self.fields.retain(|f| f.key != field.key);
        self.fields.push(field);
    }

    pub fn get(&self, key: &str) -> Option<&ConfigurationField> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn fields(&self) -> &[ConfigurationField] {
        &self.fields
    }

    /// Checks that every mandatory field has a value.
    pub fn validate(&self, configuration: &Configuration) -> Result<(), ConfigurationError> {
        for field in self.fields.iter().filter(|f| !f.optional) {
            let present = match field.kind {
                FieldKind::Text => configuration.string_is_set(field.key),
                FieldKind::Number => configuration.get_u64(field.key)?.is_some(),
            };
            if !present {
                return Err(ConfigurationError::InvalidValue {
                    key: field.key.to_string(),
                    reason: "mandatory field is not set".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Options every codec exposes: the source override and the charset.
#[must_use]
pub fn base_configuration_request() -> ConfigurationRequest {
    let mut request = ConfigurationRequest::default();

    request.add_field(ConfigurationField::text(
        CK_OVERRIDE_SOURCE,
        "Override source",
        None,
        "The source is a hostname derived from the received packet by default. Set this if you \
         want to override it with a custom string.",
        true,
    ));

    request.add_field(ConfigurationField::text(
        CK_CHARSET_NAME,
        "Encoding",
        Some(Charset::default().name()),
        "Default encoding is UTF-8. Set this to a standard charset name if you want to override \
         the default.",
        true,
    ));

    request
}

/// Resolves the configured charset, defaulting to UTF-8 when the key or the
/// whole configuration is absent.
pub fn resolve_charset(configuration: Option<&Configuration>) -> Result<Charset, ConfigurationError> {
    match configuration.and_then(|c| c.get_string(CK_CHARSET_NAME)) {
        Some(name) => name.parse(),
        None => Ok(Charset::default()),
    }
}

/// Settings shared by every codec, resolved once at construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodecConfig {
    pub charset: Charset,
    pub override_source: Option<String>,
}

impl CodecConfig {
    pub fn from_configuration(
        configuration: Option<&Configuration>,
    ) -> Result<Self, ConfigurationError> {
        let charset = resolve_charset(configuration)?;
        let override_source = configuration
            .and_then(|c| c.get_string(CK_OVERRIDE_SOURCE))
            .map(|s| s.trim().to_string());

        Ok(Self {
            charset,
            override_source,
        })
    }
}
