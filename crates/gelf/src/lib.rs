// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # GELF codec
//!
//! Decodes Graylog Extended Log Format payloads into [`codec_core::Message`]s.
//!
//! ## Modules
//!
//! - [`payload`]: compression detection and bounded inflation of datagrams
//! - [`lenient`]: tolerant JSON reading and trailing-document detection
//! - [`decoder`]: field validation and extraction
//! - [`codec`]: the [`codec_core::Codec`] implementation and its registration
//! - [`bulk_dropped`]: observer for payloads that carried more than one document
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//!
//! use codec_core::{CodecRegistry, DefaultFieldRegistry, RawMessage};
//! use gelf::{BulkDroppedCounter, GelfContext};
//!
//! let mut registry = CodecRegistry::new();
//! gelf::register(
//!     &mut registry,
//!     GelfContext {
//!         bulk_dropped: Arc::new(BulkDroppedCounter::new()),
//!         registry: Arc::new(DefaultFieldRegistry::default()),
//!     },
//! )
//! .unwrap();
//!
//! let codec = registry.build("gelf", None).unwrap();
//! let raw = RawMessage::new(br#"{"host":"web-1","short_message":"started"}"#.to_vec(), None);
//! let message = codec.decode(&raw).unwrap();
//! assert_eq!(message.message(), "started");
//! assert_eq!(message.source(), Some("web-1"));
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod bulk_dropped;
pub mod codec;
pub mod decoder;
mod fields;
pub mod lenient;
pub mod payload;

pub use bulk_dropped::{BulkDroppedCounter, BulkDroppedObserver};
pub use codec::{register, GelfCodec, GelfContext};
pub use decoder::{GelfDecoder, DEFAULT_DECOMPRESS_SIZE_LIMIT};
pub use payload::{GelfPayload, PayloadError, PayloadType};
