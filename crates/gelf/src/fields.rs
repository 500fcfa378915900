// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Coercions from JSON values to the field types a GELF message carries.

use codec_core::FieldValue;
use serde_json::{Map, Number, Value};
use tracing::debug;

/// Sentinel for integer fields that are absent or unreadable.
pub(crate) const UNSET: i64 = -1;

pub(crate) fn is_blank(s: &str) -> bool {
    s.chars().all(char::is_whitespace)
}

/// Scalar text of a value: strings as-is, numbers and booleans as their
/// literal form, everything else empty.
pub(crate) fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NULL",
        Value::Bool(_) => "BOOLEAN",
        Value::Number(_) => "NUMBER",
        Value::String(_) => "STRING",
        Value::Array(_) => "ARRAY",
        Value::Object(_) => "OBJECT",
    }
}

/// Text of a field, `None` when it is absent or null.
pub(crate) fn text_value(document: &Map<String, Value>, key: &str) -> Option<String> {
    match document.get(key) {
        None | Some(Value::Null) => None,
        Some(value) => Some(as_text(value)),
    }
}

/// Integer reading of a field, [`UNSET`] when it has none.
///
/// Floats truncate toward zero, numeric strings are parsed, booleans read as
/// 1 and 0.
pub(crate) fn long_value(document: &Map<String, Value>, key: &str) -> i64 {
    match document.get(key) {
        Some(Value::Number(n)) => number_as_long(n),
        Some(Value::String(s)) => parse_long(s).unwrap_or(UNSET),
        Some(Value::Bool(b)) => i64::from(*b),
        _ => UNSET,
    }
}

/// Like [`long_value`], but values outside the 32-bit range are unset.
pub(crate) fn int_value(document: &Map<String, Value>, key: &str) -> i64 {
    let value = long_value(document, key);
    if i32::try_from(value).is_ok() {
        value
    } else {
        UNSET
    }
}

#[allow(clippy::cast_possible_truncation)]
fn number_as_long(n: &Number) -> i64 {
    match n.as_i64() {
        Some(v) => v,
        // floats and integers above i64::MAX saturate
        None => n.as_f64().map_or(UNSET, |f| f as i64),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn parse_long(s: &str) -> Option<i64> {
    let trimmed = s.trim();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if unsigned.is_empty() {
        return None;
    }

    let digits = unsigned.strip_prefix('-').unwrap_or(unsigned);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        return unsigned.parse().ok();
    }
    unsigned.parse::<f64>().ok().map(|f| f as i64)
}

/// Epoch seconds carried in `timestamp`, `-1.0` when there are none.
pub(crate) fn timestamp_value(document: &Map<String, Value>) -> f64 {
    let seconds = match document.get(codec_core::message::FIELD_TIMESTAMP) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(-1.0),
        Some(Value::String(s)) => match s.trim().parse::<f64>() {
            Ok(seconds) => seconds,
            Err(e) => {
                debug!("Unable to parse timestamp {}: {}", s, e);
                -1.0
            }
        },
        _ => -1.0,
    };

    if seconds.is_finite() {
        seconds
    } else {
        -1.0
    }
}

/// Converts an additional field value, `None` for values that are skipped.
///
/// Containers become their JSON text. Integral numbers that do not fit in an
/// `i64` become doubles.
pub(crate) fn additional_value(key: &str, value: &Value) -> Option<FieldValue> {
    match value {
        Value::Array(_) | Value::Object(_) => Some(FieldValue::String(value.to_string())),
        Value::Number(n) if n.is_f64() => n.as_f64().map(FieldValue::Double),
        Value::Number(n) => match n.as_i64() {
            Some(v) => Some(FieldValue::Long(v)),
            None => n.as_f64().map(FieldValue::Double),
        },
        Value::String(s) => Some(FieldValue::String(s.clone())),
        Value::Null => {
            debug!("Field [{}] is NULL. Skipping.", key);
            None
        }
        Value::Bool(_) => {
            debug!("Field [{}] has unknown value type. Skipping.", key);
            None
        }
    }
}
