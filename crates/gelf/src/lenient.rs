// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Lenient JSON reading for GELF payloads.
//!
//! Several GELF client libraries emit JSON that strict parsers reject: raw
//! control characters inside strings and trailing commas before a closing
//! brace or bracket. Both are repaired before parsing.
//!
//! Only the first JSON value of the text is decoded. Whether anything follows
//! it is reported separately: with chunked transports, a payload holding two
//! concatenated documents is the signature of a lost chunk.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyntaxError {
    #[error("payload is empty")]
    Empty,

    #[error("null result")]
    NullDocument,

    #[error("{0}")]
    Json(String),

    #[error("unexpected character {0:?} after JSON document")]
    TrailingGarbage(char),

    #[error("unrecognized token {0:?} after JSON document")]
    InvalidToken(String),
}

/// The first JSON value of a payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    pub value: Value,
    /// Another JSON token follows the value.
    pub has_trailing_data: bool,
}

/// Parses the first JSON value in `text`.
pub fn parse(text: &str) -> Result<ParsedDocument, SyntaxError> {
    let repaired = repair(text.strip_prefix('\u{feff}').unwrap_or(text));
    let mut values = serde_json::Deserializer::from_str(&repaired).into_iter::<Value>();

    let value = match values.next() {
        None => return Err(SyntaxError::Empty),
        Some(Err(e)) => return Err(SyntaxError::Json(e.to_string())),
        Some(Ok(Value::Null)) => return Err(SyntaxError::NullDocument),
        Some(Ok(value)) => value,
    };

    let has_trailing_data = next_token_exists(&repaired[values.byte_offset()..])?;
    Ok(ParsedDocument {
        value,
        has_trailing_data,
    })
}

fn is_json_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

/// Whether another JSON token follows the first value.
///
/// Containers and strings count from their opening character, so a
/// truncated second document is still a token. Literals and numbers must be
/// complete and well formed up to the next delimiter.
fn next_token_exists(rest: &str) -> Result<bool, SyntaxError> {
    let rest = rest.trim_start_matches(is_json_whitespace);
    let Some(first) = rest.chars().next() else {
        return Ok(false);
    };

    match first {
        '{' | '[' | '"' => Ok(true),
        't' | 'f' | 'n' | '-' | '0'..='9' => {
            let end = rest.find(is_delimiter).unwrap_or(rest.len());
            let token = &rest[..end];
            if matches!(token, "true" | "false" | "null") || is_json_number(token) {
                Ok(true)
            } else {
                Err(SyntaxError::InvalidToken(token.to_string()))
            }
        }
        c => Err(SyntaxError::TrailingGarbage(c)),
    }
}

fn is_delimiter(c: char) -> bool {
    is_json_whitespace(c) || matches!(c, '{' | '}' | '[' | ']' | ',' | ':' | '"')
}

/// `-?(0|[1-9][0-9]*)(\.[0-9]+)?([eE][+-]?[0-9]+)?`
fn is_json_number(token: &str) -> bool {
    fn digits(bytes: &[u8]) -> usize {
        bytes.iter().take_while(|b| b.is_ascii_digit()).count()
    }

    let bytes = token.as_bytes();
    let mut i = usize::from(bytes.first() == Some(&b'-'));

    match bytes.get(i) {
        Some(b'0') => i += 1,
        Some(b'1'..=b'9') => i += digits(&bytes[i..]),
        _ => return false,
    }

    if bytes.get(i) == Some(&b'.') {
        let n = digits(&bytes[i + 1..]);
        if n == 0 {
            return false;
        }
        i += 1 + n;
    }

    if matches!(bytes.get(i), Some(b'e' | b'E')) {
        i += 1;
        if matches!(bytes.get(i), Some(b'+' | b'-')) {
            i += 1;
        }
        let n = digits(&bytes[i..]);
        if n == 0 {
            return false;
        }
        i += n;
    }

    i == bytes.len()
}

/// Escapes raw control characters inside strings and drops commas that
/// follow a value and directly precede `}` or `]`.
///
/// A comma with no value before it (`[,]`, `{,}`, `[1,,]`) is kept so the
/// parser rejects it.
fn repair(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    // last non-whitespace character written outside a string
    let mut last = None;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => {
                    escaped = false;
                    out.push(c);
                }
                '\\' => {
                    escaped = true;
                    out.push(c);
                }
                '"' => {
                    in_string = false;
                    last = Some(c);
                    out.push(c);
                }
                c if c < '\u{20}' => out.push_str(&format!("\\u{:04x}", c as u32)),
                c => out.push(c),
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = text[i + 1..].trim_start_matches(is_json_whitespace).chars().next();
                let follows_value = !matches!(last, None | Some('{' | '[' | ','));
                if !(follows_value && matches!(next, Some('}' | ']'))) {
                    out.push(c);
                    last = Some(c);
                }
            }
            c => {
                if !is_json_whitespace(c) {
                    last = Some(c);
                }
                out.push(c);
            }
        }
    }
    out
}
