// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Character encodings a codec can be configured to decode payloads with.
//!
//! Names are matched case-insensitively and accept the usual aliases, so
//! `utf8`, `UTF-8` and `utf_8` all resolve to [`Charset::Utf8`]. Decoding never
//! fails: malformed sequences are replaced with U+FFFD.

use std::char::REPLACEMENT_CHARACTER;
use std::str::FromStr;

use crate::error::ConfigurationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Charset {
    #[default]
    Utf8,
    UsAscii,
    Iso8859_1,
    /// UTF-16 with byte order taken from a BOM, big-endian when there is none.
    Utf16,
    Utf16Be,
    Utf16Le,
}

impl Charset {
    /// Canonical name of the charset.
    pub fn name(self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::UsAscii => "US-ASCII",
            Charset::Iso8859_1 => "ISO-8859-1",
            Charset::Utf16 => "UTF-16",
            Charset::Utf16Be => "UTF-16BE",
            Charset::Utf16Le => "UTF-16LE",
        }
    }

    /// Decodes `bytes` into a string.
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Charset::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Charset::UsAscii => bytes
                .iter()
                .map(|&b| {
                    if b.is_ascii() {
                        char::from(b)
                    } else {
                        REPLACEMENT_CHARACTER
                    }
                })
                .collect(),
            Charset::Iso8859_1 => bytes.iter().map(|&b| char::from(b)).collect(),
            Charset::Utf16 => match bytes {
                [0xfe, 0xff, rest @ ..] => decode_utf16(rest, u16::from_be_bytes),
                [0xff, 0xfe, rest @ ..] => decode_utf16(rest, u16::from_le_bytes),
                _ => decode_utf16(bytes, u16::from_be_bytes),
            },
            Charset::Utf16Be => decode_utf16(bytes, u16::from_be_bytes),
            Charset::Utf16Le => decode_utf16(bytes, u16::from_le_bytes),
        }
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> String {
    let chunks = bytes.chunks_exact(2);
    let dangling = !chunks.remainder().is_empty();
    let mut decoded: String = char::decode_utf16(chunks.map(|pair| unit([pair[0], pair[1]])))
        .map(|c| c.unwrap_or(REPLACEMENT_CHARACTER))
        .collect();
    if dangling {
        decoded.push(REPLACEMENT_CHARACTER);
    }
    decoded
}

impl std::fmt::Display for Charset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Charset {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" | "utf_8" => Ok(Charset::Utf8),
            "us-ascii" | "ascii" | "us_ascii" | "iso646-us" | "646" => Ok(Charset::UsAscii),
            "iso-8859-1" | "iso8859-1" | "iso_8859_1" | "iso8859_1" | "8859_1" | "latin1"
            | "l1" | "cp819" => Ok(Charset::Iso8859_1),
            "utf-16" | "utf16" | "utf_16" | "unicode" => Ok(Charset::Utf16),
            "utf-16be" | "utf16be" | "utf_16be" | "x-utf-16be" | "unicodebigunmarked" => {
                Ok(Charset::Utf16Be)
            }
            "utf-16le" | "utf16le" | "utf_16le" | "x-utf-16le" | "unicodelittleunmarked" => {
                Ok(Charset::Utf16Le)
            }
            _ => Err(ConfigurationError::UnsupportedCharset(s.to_string())),
        }
    }
}
