// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Turns a received GELF datagram into JSON text.
//!
//! GELF senders may deliver a payload as-is, zlib- or gzip-compressed, or
//! split into chunks. The first two bytes identify which. Chunks are expected
//! to be reassembled before they get here; a chunk header reaching this stage
//! is an error.
//!
//! Decompression is bounded: the inflater stops one byte past the configured
//! limit so a compression bomb costs at most `limit` bytes of memory.

use std::io::Read;

use codec_core::Charset;
use flate2::read::{GzDecoder, ZlibDecoder};
use tracing::trace;

/// Bytes needed to tell payload types apart.
pub const HEADER_SIZE: usize = 2;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const CHUNKED_MAGIC: [u8; 2] = [0x1e, 0x0f];
const ZLIB_FIRST_BYTE: u8 = 0x78;
// no compression, fast, default, best
const ZLIB_SECOND_BYTES: [u8; 4] = [0x01, 0x5e, 0x9c, 0xda];

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum PayloadType {
    #[display("zlib")]
    Zlib,
    #[display("gzip")]
    Gzip,
    #[display("chunked")]
    Chunked,
    #[display("uncompressed")]
    Uncompressed,
}

impl PayloadType {
    pub fn detect(payload: &[u8]) -> Result<Self, PayloadError> {
        match payload {
            [first, second, ..] => Ok(match [*first, *second] {
                GZIP_MAGIC => PayloadType::Gzip,
                CHUNKED_MAGIC => PayloadType::Chunked,
                [ZLIB_FIRST_BYTE, second] if ZLIB_SECOND_BYTES.contains(&second) => {
                    PayloadType::Zlib
                }
                _ => PayloadType::Uncompressed,
            }),
            _ => Err(PayloadError::TooShort),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("GELF message is too short. Not even the type header would fit.")]
    TooShort,

    #[error("GELF chunk reached the decoder without being reassembled")]
    UnreassembledChunk,

    #[error("Failed to decompress {kind} payload: {reason}")]
    Decompression { kind: PayloadType, reason: String },

    #[error("Decompressed payload exceeds the limit of {limit} bytes")]
    SizeLimitExceeded { limit: u64 },
}

/// A raw GELF payload as received from the transport.
#[derive(Debug, Clone, Copy)]
pub struct GelfPayload<'a> {
    bytes: &'a [u8],
}

impl<'a> GelfPayload<'a> {
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn payload_type(&self) -> Result<PayloadType, PayloadError> {
        PayloadType::detect(self.bytes)
    }

    /// Decompresses the payload as needed and decodes it with `charset`.
    ///
    /// `decompress_size_limit` bounds the inflated size of compressed
    /// payloads. Uncompressed payloads are decoded as they are.
    pub fn text(&self, decompress_size_limit: u64, charset: Charset) -> Result<String, PayloadError> {
        let payload_type = self.payload_type()?;
        trace!("Decoding {} byte {} GELF payload", self.bytes.len(), payload_type);

        let text = match payload_type {
            PayloadType::Uncompressed => charset.decode(self.bytes),
            PayloadType::Gzip => charset.decode(&inflate(
                GzDecoder::new(self.bytes),
                decompress_size_limit,
                payload_type,
            )?),
            PayloadType::Zlib => charset.decode(&inflate(
                ZlibDecoder::new(self.bytes),
                decompress_size_limit,
                payload_type,
            )?),
            PayloadType::Chunked => return Err(PayloadError::UnreassembledChunk),
        };
        Ok(text)
    }
}

fn inflate<R: Read>(reader: R, limit: u64, kind: PayloadType) -> Result<Vec<u8>, PayloadError> {
    let mut inflated = Vec::new();
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut inflated)
        .map_err(|e| PayloadError::Decompression {
            kind,
            reason: e.to_string(),
        })?;

    if inflated.len() as u64 > limit {
        return Err(PayloadError::SizeLimitExceeded { limit });
    }
    Ok(inflated)
}
