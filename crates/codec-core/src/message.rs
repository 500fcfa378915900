// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Normalized structured message produced by codecs.
//!
//! A [`Message`] has a small set of first-class fields (`message`, `source`,
//! `timestamp`, and the well-known optional fields) plus an open map of
//! additional fields. The two never overlap: [`Message::add_field`] routes
//! well-known names to their slot and consults a [`FieldRegistry`] before
//! accepting anything else.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

pub const FIELD_MESSAGE: &str = "message";
pub const FIELD_SOURCE: &str = "source";
pub const FIELD_TIMESTAMP: &str = "timestamp";
pub const FIELD_FULL_MESSAGE: &str = "full_message";
pub const FIELD_FILE: &str = "file";
pub const FIELD_LINE: &str = "line";
pub const FIELD_LEVEL: &str = "level";
pub const FIELD_FACILITY: &str = "facility";

const SETTABLE_FIELDS: &[&str] = &[
    FIELD_MESSAGE,
    FIELD_SOURCE,
    FIELD_TIMESTAMP,
    "ingest_source_node",
    "ingest_source_input",
    "ingest_source_collector",
    "ingest_source_collector_input",
    "ingest_remote_ip",
    "ingest_remote_port",
    "ingest_remote_hostname",
];

const PROTECTED_FIELDS: &[&str] = &[
    // search index meta fields
    "_id",
    "_ttl",
    "_source",
    "_all",
    "_index",
    "_type",
    "_score",
    // pipeline internals
    "streams",
    "ingest_message_id",
    "ingest_accounted_message_size",
    "ingest_receive_timestamp",
    "ingest_processing_timestamp",
    "ingest_processing_duration_ms",
    "ingest_processing_error",
];

lazy_static! {
    static ref VALID_KEY_REGEX: Regex =
        Regex::new(r"^[\w\.\-@]+$").expect("failed creating regex");
}

/// Field names the downstream message model treats as structurally
/// significant.
pub trait FieldRegistry: Send + Sync + Debug {
    fn is_reserved(&self, key: &str) -> bool;

    /// Reserved fields that ordinary data is still allowed to set.
    fn is_settable(&self, key: &str) -> bool;

    /// Whether sender-supplied data may write `key`.
    fn accepts(&self, key: &str) -> bool {
        !self.is_reserved(key) || self.is_settable(key)
    }
}

/// The standard reserved and settable field sets.
#[derive(Debug, Clone)]
pub struct DefaultFieldRegistry {
    reserved: HashSet<&'static str>,
    settable: HashSet<&'static str>,
}

impl Default for DefaultFieldRegistry {
    fn default() -> Self {
        let settable: HashSet<&'static str> = SETTABLE_FIELDS.iter().copied().collect();
        let reserved = PROTECTED_FIELDS
            .iter()
            .copied()
            .chain(settable.iter().copied())
            .collect();
        Self { reserved, settable }
    }
}

impl FieldRegistry for DefaultFieldRegistry {
    fn is_reserved(&self, key: &str) -> bool {
        self.reserved.contains(key)
    }

    fn is_settable(&self, key: &str) -> bool {
        self.settable.contains(key)
    }
}

/// Value of an additional field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Long(i64),
    Double(f64),
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::String(s) => f.write_str(s),
            FieldValue::Long(v) => write!(f, "{v}"),
            FieldValue::Double(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Long(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Double(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    full_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    level: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    facility: Option<String>,
    #[serde(flatten)]
    additional_fields: HashMap<String, FieldValue>,
}

impl Message {
    #[must_use]
    pub fn new(message: impl Into<String>, source: Option<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            message: message.into(),
            source: source.filter(|s| !s.trim().is_empty()),
            timestamp,
            full_message: None,
            file: None,
            line: None,
            level: None,
            facility: None,
            additional_fields: HashMap::new(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = Some(source.into());
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn full_message(&self) -> Option<&str> {
        self.full_message.as_deref()
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    pub fn line(&self) -> Option<i64> {
        self.line
    }

    pub fn level(&self) -> Option<i64> {
        self.level
    }

    pub fn facility(&self) -> Option<&str> {
        self.facility.as_deref()
    }

    pub fn additional_fields(&self) -> &HashMap<String, FieldValue> {
        &self.additional_fields
    }

    /// Looks a field up by name, first-class fields included.
    ///
    /// `timestamp` is always set and reported as milliseconds since the epoch.
    pub fn get_field(&self, key: &str) -> Option<FieldValue> {
        match key {
            FIELD_MESSAGE => Some(FieldValue::String(self.message.clone())),
            FIELD_SOURCE => self.source.clone().map(FieldValue::String),
            FIELD_TIMESTAMP => Some(FieldValue::Long(self.timestamp.timestamp_millis())),
            FIELD_FULL_MESSAGE => self.full_message.clone().map(FieldValue::String),
            FIELD_FILE => self.file.clone().map(FieldValue::String),
            FIELD_LINE => self.line.map(FieldValue::Long),
            FIELD_LEVEL => self.level.map(FieldValue::Long),
            FIELD_FACILITY => self.facility.clone().map(FieldValue::String),
            _ => self.additional_fields.get(key).cloned(),
        }
    }

    pub fn has_field(&self, key: &str) -> bool {
        match key {
            FIELD_MESSAGE | FIELD_TIMESTAMP => true,
            FIELD_SOURCE => self.source.is_some(),
            FIELD_FULL_MESSAGE => self.full_message.is_some(),
            FIELD_FILE => self.file.is_some(),
            FIELD_LINE => self.line.is_some(),
            FIELD_LEVEL => self.level.is_some(),
            FIELD_FACILITY => self.facility.is_some(),
            _ => self.additional_fields.contains_key(key),
        }
    }

    /// Sets a field, returning whether the value was stored.
    ///
    /// Keys are trimmed and must consist of word characters, `.`, `-` or `@`.
    /// Keys the registry protects are refused. String values are trimmed and
    /// dropped when empty. Well-known names are written to their first-class
    /// slot; `timestamp` cannot be set through this method.
    pub fn add_field(
        &mut self,
        key: &str,
        value: impl Into<FieldValue>,
        registry: &dyn FieldRegistry,
    ) -> bool {
        let key = key.trim();
        if !VALID_KEY_REGEX.is_match(key) || !registry.accepts(key) {
            debug!("Ignoring invalid or reserved key {}", key);
            return false;
        }

        let value = match value.into() {
            FieldValue::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return false;
                }
                FieldValue::String(trimmed.to_string())
            }
            other => other,
        };

        match key {
            FIELD_MESSAGE => self.message = value.to_string(),
            FIELD_SOURCE => self.source = Some(value.to_string()),
            FIELD_FULL_MESSAGE => self.full_message = Some(value.to_string()),
            FIELD_FILE => self.file = Some(value.to_string()),
            FIELD_FACILITY => self.facility = Some(value.to_string()),
            FIELD_LINE | FIELD_LEVEL => {
                let Some(number) = integer_value(&value) else {
                    debug!("Ignoring non-integer value for field {}", key);
                    return false;
                };
                if key == FIELD_LINE {
                    self.line = Some(number);
                } else {
                    self.level = Some(number);
                }
            }
            FIELD_TIMESTAMP => {
                debug!("Ignoring timestamp set through add_field");
                return false;
            }
            _ => {
                self.additional_fields.insert(key.to_string(), value);
            }
        }
        true
    }
}

fn integer_value(value: &FieldValue) -> Option<i64> {
    match value {
        FieldValue::Long(v) => Some(*v),
        #[allow(clippy::cast_possible_truncation)]
        FieldValue::Double(v) if v.is_finite() => Some(v.trunc() as i64),
        FieldValue::Double(_) => None,
        FieldValue::String(s) => s.parse().ok(),
    }
}
