// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::net::SocketAddr;

use uuid::Uuid;

use crate::raw_message::RawMessage;

/// Errors raised while building or registering a codec.
///
/// These are construction-time failures: a codec that fails with one of them
/// must never be handed out to the ingestion path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Unsupported charset: {0}")]
    UnsupportedCharset(String),

    #[error("Codec descriptor is missing a name")]
    MissingCodecName,

    #[error("Codec {0} is already registered")]
    DuplicateCodec(String),

    #[error("No codec registered under name {0}")]
    UnknownCodec(String),

    #[error("Invalid value for configuration key {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Stage of the decode pipeline a [`DecodeError`] originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum DecodeErrorKind {
    /// Framing or decompression of the raw payload failed.
    #[display("payload")]
    Payload,
    /// The decoded text is not a usable JSON document.
    #[display("syntax")]
    Syntax,
    /// The document is well formed but misses or misshapes mandatory fields.
    #[display("validation")]
    Validation,
}

/// A message that could not be decoded.
///
/// Carries enough context to log, quarantine, or dead-letter the input
/// without holding on to the [`RawMessage`] itself.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind} error decoding message <{message_id}>: {reason}")]
pub struct DecodeError {
    pub kind: DecodeErrorKind,
    pub reason: String,
    pub message_id: Uuid,
    pub remote_address: Option<SocketAddr>,
    /// Decoded payload text, if framing got far enough to produce it.
    pub raw_text: Option<String>,
}

impl DecodeError {
    pub fn new(
        kind: DecodeErrorKind,
        reason: impl Into<String>,
        raw: &RawMessage,
        raw_text: Option<String>,
    ) -> Self {
        Self {
            kind,
            reason: reason.into(),
            message_id: raw.id(),
            remote_address: raw.remote_address(),
            raw_text,
        }
    }

    pub fn payload(reason: impl Into<String>, raw: &RawMessage) -> Self {
        Self::new(DecodeErrorKind::Payload, reason, raw, None)
    }

    pub fn syntax(reason: impl Into<String>, raw: &RawMessage, text: &str) -> Self {
        Self::new(DecodeErrorKind::Syntax, reason, raw, Some(text.to_string()))
    }

    pub fn validation(reason: impl Into<String>, raw: &RawMessage, text: &str) -> Self {
        Self::new(DecodeErrorKind::Validation, reason, raw, Some(text.to_string()))
    }
}
