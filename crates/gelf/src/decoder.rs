// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! GELF decoder.
//!
//! Decoding runs in a fixed order and stops at the first failure:
//!
//! 1. inflate and charset-decode the payload ([`crate::payload`])
//! 2. parse the first JSON document leniently ([`crate::lenient`])
//! 3. report trailing documents to the bulk-dropped observer
//! 4. validate `host`, `short_message`/`message` and `timestamp`
//! 5. resolve the timestamp, falling back to the receive time
//! 6. copy the well-known GELF fields
//! 7. copy every remaining key as an additional field
//!
//! Only steps 1, 2 and 4 can fail. Everything after validation degrades to
//! "field omitted" instead.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use codec_core::message::{
    FIELD_FACILITY, FIELD_FILE, FIELD_FULL_MESSAGE, FIELD_LEVEL, FIELD_LINE,
};
use codec_core::{Charset, DecodeError, FieldRegistry, Message, RawMessage};
use serde_json::{Map, Value};
use tracing::{trace, warn};

use crate::bulk_dropped::BulkDroppedObserver;
use crate::fields::{
    additional_value, as_text, int_value, is_blank, long_value, text_value, timestamp_value,
    type_name,
};
use crate::lenient;
use crate::payload::GelfPayload;

/// Default bound on the inflated size of a compressed payload: 8 MiB.
pub const DEFAULT_DECOMPRESS_SIZE_LIMIT: u64 = 8 * 1024 * 1024;

const KEY_VERSION: &str = "version";
const KEY_HOST: &str = "host";
const KEY_SHORT_MESSAGE: &str = "short_message";
const KEY_MESSAGE: &str = "message";
const KEY_TIMESTAMP: &str = "timestamp";

// copied by copy_known_fields, never repeated as additional fields
const KNOWN_KEYS: &[&str] = &[
    FIELD_FULL_MESSAGE,
    FIELD_FILE,
    FIELD_LINE,
    FIELD_LEVEL,
    FIELD_FACILITY,
];

#[derive(Debug, Clone)]
pub struct GelfDecoder {
    decompress_size_limit: u64,
    charset: Charset,
    bulk_dropped: Arc<dyn BulkDroppedObserver>,
    registry: Arc<dyn FieldRegistry>,
}

impl GelfDecoder {
    #[must_use]
    pub fn new(
        decompress_size_limit: u64,
        charset: Charset,
        bulk_dropped: Arc<dyn BulkDroppedObserver>,
        registry: Arc<dyn FieldRegistry>,
    ) -> Self {
        Self {
            decompress_size_limit,
            charset,
            bulk_dropped,
            registry,
        }
    }

    pub fn decompress_size_limit(&self) -> u64 {
        self.decompress_size_limit
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    pub fn decode(&self, raw: &RawMessage) -> Result<Message, DecodeError> {
        let json = GelfPayload::new(raw.payload())
            .text(self.decompress_size_limit, self.charset)
            .map_err(|e| DecodeError::payload(e.to_string(), raw))?;
        trace!("Decoding GELF message {}: {}", raw, json);

        let parsed = lenient::parse(&json).map_err(|e| {
            DecodeError::syntax(
                format!("JSON is null or could not be parsed (invalid JSON): {e}"),
                raw,
                &json,
            )
        })?;
        if parsed.has_trailing_data {
            self.bulk_dropped.notify_dropped_fragment(raw);
        }

        // a non-object document has none of the mandatory fields
        let empty = Map::new();
        let document = parsed.value.as_object().unwrap_or(&empty);

        validate(document, raw).map_err(|reason| DecodeError::validation(reason, raw, &json))?;

        let mut message = Message::new(
            primary_text(document),
            text_value(document, KEY_HOST),
            resolve_timestamp(document, raw),
        );
        self.copy_known_fields(document, &mut message);
        self.copy_additional_fields(document, &mut message);

        Ok(message)
    }

    fn copy_known_fields(&self, document: &Map<String, Value>, message: &mut Message) {
        let registry = self.registry.as_ref();

        if let Some(full_message) = text_value(document, FIELD_FULL_MESSAGE) {
            message.add_field(FIELD_FULL_MESSAGE, full_message, registry);
        }

        if let Some(file) = text_value(document, FIELD_FILE).filter(|f| !f.is_empty()) {
            message.add_field(FIELD_FILE, file, registry);
        }

        let line = long_value(document, FIELD_LINE);
        if line > -1 {
            message.add_field(FIELD_LINE, line, registry);
        }

        // level and facility are filled in by the server when the client omits them
        let level = int_value(document, FIELD_LEVEL);
        if level > -1 {
            message.add_field(FIELD_LEVEL, level, registry);
        }

        if let Some(facility) = text_value(document, FIELD_FACILITY).filter(|f| !f.is_empty()) {
            message.add_field(FIELD_FACILITY, facility, registry);
        }
    }

    fn copy_additional_fields(&self, document: &Map<String, Value>, message: &mut Message) {
        let registry = self.registry.as_ref();

        for (key, value) in document {
            if key == KEY_VERSION || KNOWN_KEYS.contains(&key.as_str()) {
                continue;
            }

            // "_foo" is the GELF spelling of custom field "foo"
            let key = match key.strip_prefix('_') {
                Some(stripped) if !stripped.is_empty() => stripped,
                _ => key.as_str(),
            };

            if key == KEY_SHORT_MESSAGE || key == KEY_HOST {
                continue;
            }

            if message.has_field(key) || !registry.accepts(key) {
                continue;
            }

            if let Some(value) = additional_value(key, value) {
                message.add_field(key, value, registry);
            }
        }
    }
}

fn validate(document: &Map<String, Value>, raw: &RawMessage) -> Result<(), String> {
    let prefix = format!("GELF message {raw} ");

    match document.get(KEY_HOST) {
        None => warn!("{}is missing mandatory \"host\" field.", prefix),
        Some(Value::String(host)) if is_blank(host) => {
            return Err(format!("{prefix}has empty mandatory \"host\" field."));
        }
        Some(Value::String(_)) => {}
        Some(other) => {
            return Err(format!("{prefix}has invalid \"host\": {}", as_text(other)));
        }
    }

    let message = document.get(KEY_MESSAGE);
    match document.get(KEY_SHORT_MESSAGE) {
        Some(Value::String(short_message)) => {
            let message_blank = message.map_or(true, |m| is_blank(&as_text(m)));
            if is_blank(short_message) && message_blank {
                return Err(format!(
                    "{prefix}has empty mandatory \"short_message\" field."
                ));
            }
        }
        Some(other) => {
            return Err(format!(
                "{prefix}has invalid \"short_message\": {}",
                as_text(other)
            ));
        }
        None => match message {
            Some(Value::String(m)) if is_blank(m) => {
                return Err(format!("{prefix}has empty mandatory \"message\" field."));
            }
            Some(Value::String(_)) => {}
            Some(other) => {
                return Err(format!("{prefix}has invalid \"message\": {}", as_text(other)));
            }
            None => {
                return Err(format!(
                    "{prefix}is missing mandatory \"short_message\" or \"message\" field."
                ));
            }
        },
    }

    if let Some(timestamp) = document.get(KEY_TIMESTAMP) {
        if !timestamp.is_number() && !timestamp.is_object() && !timestamp.is_array() {
            warn!(
                "{}has invalid \"timestamp\": {}  (type: {})",
                prefix,
                as_text(timestamp),
                type_name(timestamp)
            );
        }
    }

    Ok(())
}

/// `short_message` unless it is blank, in which case `message`.
fn primary_text(document: &Map<String, Value>) -> String {
    match text_value(document, KEY_SHORT_MESSAGE) {
        Some(short_message) if !is_blank(&short_message) => short_message,
        _ => text_value(document, KEY_MESSAGE).unwrap_or_default(),
    }
}

/// A strictly positive `timestamp` is taken as epoch seconds; anything else
/// falls back to the time the payload was received.
fn resolve_timestamp(document: &Map<String, Value>, raw: &RawMessage) -> DateTime<Utc> {
    let seconds = timestamp_value(document);
    if seconds <= 0.0 {
        return raw.timestamp();
    }

    #[allow(clippy::cast_possible_truncation)]
    let millis = (seconds * 1000.0).round() as i64;
    match DateTime::<Utc>::from_timestamp_millis(millis) {
        Some(timestamp) => timestamp,
        None => {
            warn!(
                "GELF message {} has out of range \"timestamp\": {}",
                raw, seconds
            );
            raw.timestamp()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk_dropped::BulkDroppedCounter;
    use chrono::TimeZone;
    use codec_core::{DecodeErrorKind, DefaultFieldRegistry, FieldValue};
    use std::net::SocketAddr;
    use tracing_test::traced_test;

    fn receive_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    }

    fn decoder_with(counter: Arc<BulkDroppedCounter>) -> GelfDecoder {
        GelfDecoder::new(
            DEFAULT_DECOMPRESS_SIZE_LIMIT,
            Charset::Utf8,
            counter,
            Arc::new(DefaultFieldRegistry::default()),
        )
    }

    fn decoder() -> GelfDecoder {
        decoder_with(Arc::new(BulkDroppedCounter::new()))
    }

    fn raw(json: &str) -> RawMessage {
        let addr: SocketAddr = "198.51.100.7:12201".parse().unwrap();
        RawMessage::with_timestamp(json.as_bytes().to_vec(), Some(addr), receive_time())
    }

    fn decode(json: &str) -> Result<Message, DecodeError> {
        decoder().decode(&raw(json))
    }

    fn decode_err(json: &str) -> DecodeError {
        match decode(json) {
            Ok(message) => panic!("expected an error, decoded {message:?}"),
            Err(e) => e,
        }
    }

    #[test]
    fn test_minimal_message() {
        let message = decode(r#"{"version":"1.1","host":"example.org","short_message":"A short message"}"#)
            .unwrap();
        assert_eq!(message.message(), "A short message");
        assert_eq!(message.source(), Some("example.org"));
        assert_eq!(message.timestamp(), receive_time());
        assert!(message.additional_fields().is_empty());
    }

    #[test]
    fn test_full_message() {
        let message = decode(
            r#"{
                "version": "1.1",
                "host": "example.org",
                "short_message": "A short message that helps you identify what is going on",
                "full_message": "Backtrace here\n\nmore stuff",
                "timestamp": 1385053862.3072,
                "level": 1,
                "facility": "payments",
                "file": "/srv/app.rb",
                "line": 356,
                "_user_id": 9001,
                "_some_info": "foo",
                "_some_env_var": "bar"
            }"#,
        )
        .unwrap();

        assert_eq!(
            message.message(),
            "A short message that helps you identify what is going on"
        );
        assert_eq!(message.full_message(), Some("Backtrace here\n\nmore stuff"));
        assert_eq!(message.timestamp().timestamp_millis(), 1_385_053_862_307);
        assert_eq!(message.level(), Some(1));
        assert_eq!(message.facility(), Some("payments"));
        assert_eq!(message.file(), Some("/srv/app.rb"));
        assert_eq!(message.line(), Some(356));

        let fields = message.additional_fields();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields.get("user_id"), Some(&FieldValue::Long(9001)));
        assert_eq!(fields.get("some_info"), Some(&FieldValue::from("foo")));
        assert_eq!(fields.get("some_env_var"), Some(&FieldValue::from("bar")));
    }

    #[test]
    fn test_message_fallback_when_short_message_absent() {
        let message = decode(r#"{"host":"h","message":"hello"}"#).unwrap();
        assert_eq!(message.message(), "hello");
        assert!(!message.additional_fields().contains_key("message"));
    }

    #[test]
    fn test_message_fallback_when_short_message_blank() {
        let message = decode(r#"{"host":"h","short_message":"  ","message":"hello"}"#).unwrap();
        assert_eq!(message.message(), "hello");
    }

    #[test]
    fn test_blank_host_is_an_error() {
        let error = decode_err(r#"{"host":"","short_message":"x"}"#);
        assert_eq!(error.kind, DecodeErrorKind::Validation);
        assert!(error.reason.contains("has empty mandatory \"host\" field."));
        assert!(error.reason.contains("(received from <198.51.100.7:12201>)"));
        assert_eq!(error.raw_text.as_deref(), Some(r#"{"host":"","short_message":"x"}"#));
    }

    #[test]
    fn test_non_textual_host_is_an_error() {
        let error = decode_err(r#"{"host":42,"short_message":"x"}"#);
        assert_eq!(error.kind, DecodeErrorKind::Validation);
        assert!(error.reason.contains("has invalid \"host\": 42"));

        let error = decode_err(r#"{"host":null,"short_message":"x"}"#);
        assert_eq!(error.kind, DecodeErrorKind::Validation);
    }

    #[test]
    #[traced_test]
    fn test_missing_host_only_warns() {
        let message = decode(r#"{"short_message":"x"}"#).unwrap();
        assert_eq!(message.source(), None);
        assert!(logs_contain("is missing mandatory \"host\" field."));
    }

    #[test]
    fn test_both_messages_blank() {
        let error = decode_err(r#"{"short_message":"","message":""}"#);
        assert_eq!(error.kind, DecodeErrorKind::Validation);
        assert!(error.reason.contains("has empty mandatory \"short_message\" field."));

        let error = decode_err(r#"{"host":"h","short_message":" "}"#);
        assert_eq!(error.kind, DecodeErrorKind::Validation);
    }

    #[test]
    fn test_message_validation() {
        let error = decode_err(r#"{"host":"h","short_message":7}"#);
        assert!(error.reason.contains("has invalid \"short_message\": 7"));

        let error = decode_err(r#"{"host":"h","message":" "}"#);
        assert!(error.reason.contains("has empty mandatory \"message\" field."));

        let error = decode_err(r#"{"host":"h","message":["x"]}"#);
        assert!(error.reason.contains("has invalid \"message\""));

        let error = decode_err(r#"{"host":"h"}"#);
        assert!(error
            .reason
            .contains("is missing mandatory \"short_message\" or \"message\" field."));
    }

    #[test]
    fn test_non_object_document_fails_validation() {
        let error = decode_err(r#"["host","short_message"]"#);
        assert_eq!(error.kind, DecodeErrorKind::Validation);
    }

    #[test]
    fn test_syntax_errors() {
        let error = decode_err("null");
        assert_eq!(error.kind, DecodeErrorKind::Syntax);
        assert!(error.reason.starts_with("JSON is null or could not be parsed"));

        let error = decode_err(r#"{"host":"h","short_message":"#);
        assert_eq!(error.kind, DecodeErrorKind::Syntax);
        assert!(error.raw_text.is_some());
    }

    #[test]
    fn test_payload_errors() {
        let error = decoder().decode(&RawMessage::new(b"{".to_vec(), None)).unwrap_err();
        assert_eq!(error.kind, DecodeErrorKind::Payload);
        assert!(error.raw_text.is_none());
    }

    #[test]
    fn test_epoch_timestamp() {
        let message = decode(r#"{"host":"h","short_message":"m","timestamp":1000000000}"#).unwrap();
        assert_eq!(message.timestamp(), Utc.timestamp_opt(1_000_000_000, 0).unwrap());
    }

    #[test]
    #[traced_test]
    fn test_textual_timestamp() {
        let message = decode(r#"{"host":"h","short_message":"m","timestamp":"1000000000.5"}"#).unwrap();
        assert_eq!(message.timestamp().timestamp_millis(), 1_000_000_000_500);
        assert!(logs_contain("has invalid \"timestamp\": 1000000000.5  (type: STRING)"));
    }

    #[test]
    fn test_timestamp_fallbacks() {
        for json in [
            r#"{"host":"h","short_message":"m"}"#,
            r#"{"host":"h","short_message":"m","timestamp":0}"#,
            r#"{"host":"h","short_message":"m","timestamp":-12.5}"#,
            r#"{"host":"h","short_message":"m","timestamp":"yesterday"}"#,
            r#"{"host":"h","short_message":"m","timestamp":{"s":1}}"#,
            r#"{"host":"h","short_message":"m","timestamp":1e300}"#,
        ] {
            assert_eq!(decode(json).unwrap().timestamp(), receive_time(), "{json}");
        }
    }

    #[test]
    fn test_line_and_level_unset() {
        let message = decode(r#"{"host":"h","short_message":"m","line":-1,"level":"high"}"#).unwrap();
        assert_eq!(message.line(), None);
        assert_eq!(message.level(), None);
        assert!(!message.additional_fields().contains_key("line"));
        assert!(!message.additional_fields().contains_key("level"));
    }

    #[test]
    fn test_line_and_level_coercion() {
        let message = decode(r#"{"host":"h","short_message":"m","line":"12","level":3.9}"#).unwrap();
        assert_eq!(message.line(), Some(12));
        assert_eq!(message.level(), Some(3));
    }

    #[test]
    fn test_empty_known_strings_are_omitted() {
        let message = decode(
            r#"{"host":"h","short_message":"m","file":"","facility":"","full_message":null}"#,
        )
        .unwrap();
        assert_eq!(message.file(), None);
        assert_eq!(message.facility(), None);
        assert_eq!(message.full_message(), None);
        assert!(message.additional_fields().is_empty());
    }

    #[test]
    fn test_underscore_handling() {
        let message = decode(r#"{"host":"h","short_message":"m","_user_id":42,"_":"lone","__x":1}"#)
            .unwrap();
        let fields = message.additional_fields();
        assert_eq!(fields.get("user_id"), Some(&FieldValue::Long(42)));
        assert_eq!(fields.get("_"), Some(&FieldValue::from("lone")));
        assert_eq!(fields.get("_x"), Some(&FieldValue::Long(1)));
    }

    #[test]
    fn test_version_is_dropped() {
        let message = decode(r#"{"version":"1.1","host":"h","short_message":"m"}"#).unwrap();
        assert_eq!(message.get_field("version"), None);
        assert!(message.additional_fields().is_empty());
    }

    #[test]
    fn test_underscore_version_is_a_custom_field() {
        let message = decode(r#"{"version":"1.1","host":"h","short_message":"m","_version":"2"}"#)
            .unwrap();
        let fields = message.additional_fields();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get("version"), Some(&FieldValue::from("2")));
        assert!(!fields.values().any(|v| *v == FieldValue::from("1.1")));
    }

    #[test]
    fn test_reserved_and_duplicate_fields_are_dropped() {
        let message = decode(
            r#"{"host":"h","short_message":"m","_host":"other","__id":"x","streams":"s",
                "_message":"again","_timestamp":5,"_source":"src","_level":"9","level":2}"#,
        )
        .unwrap();

        assert_eq!(message.source(), Some("h"));
        assert_eq!(message.message(), "m");
        assert_eq!(message.level(), Some(2));
        assert!(message.additional_fields().is_empty(), "{:?}", message.additional_fields());
    }

    #[test]
    fn test_source_from_underscore_field_when_host_missing() {
        let message = decode(r#"{"short_message":"m","_source":"from-field"}"#).unwrap();
        assert_eq!(message.source(), Some("from-field"));
    }

    #[test]
    fn test_additional_field_types() {
        let message = decode(
            r#"{"host":"h","short_message":"m","_tags":["a","b"],"_ctx":{"k":[1,2]},
                "_ratio":0.25,"_count":7,"_nothing":null,"_flag":true,"_name":"n"}"#,
        )
        .unwrap();
        let fields = message.additional_fields();
        assert_eq!(fields.get("tags"), Some(&FieldValue::from(r#"["a","b"]"#)));
        assert_eq!(fields.get("ctx"), Some(&FieldValue::from(r#"{"k":[1,2]}"#)));
        assert_eq!(fields.get("ratio"), Some(&FieldValue::Double(0.25)));
        assert_eq!(fields.get("count"), Some(&FieldValue::Long(7)));
        assert_eq!(fields.get("name"), Some(&FieldValue::from("n")));
        assert!(!fields.contains_key("nothing"));
        assert!(!fields.contains_key("flag"));
    }

    #[test]
    fn test_concatenated_documents_notify_observer() {
        let counter = Arc::new(BulkDroppedCounter::new());
        let decoder = decoder_with(Arc::clone(&counter));

        let message = decoder
            .decode(&raw(
                r#"{"host":"h","short_message":"a"}{"host":"h","short_message":"b"}"#,
            ))
            .unwrap();
        let first = decoder
            .decode(&raw(r#"{"host":"h","short_message":"a"}"#))
            .unwrap();

        assert_eq!(message, first);
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn test_lenient_syntax() {
        let message = decode("{\"host\":\"h\",\"short_message\":\"line1\nline2\",}").unwrap();
        assert_eq!(message.message(), "line1\nline2");
    }

    #[test]
    fn test_decode_is_deterministic() {
        let decoder = decoder();
        let raw = raw(r#"{"host":"h","short_message":"m","_a":1,"_b":"two","_c":[3]}"#);
        assert_eq!(decoder.decode(&raw).unwrap(), decoder.decode(&raw).unwrap());
    }
}
