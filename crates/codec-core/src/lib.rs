// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Codec contract for log ingestion.
//!
//! A codec turns one [`RawMessage`] received by a transport into one
//! structured [`Message`], or a [`DecodeError`] describing why it could not.
//! This crate defines the [`Codec`] trait, the shared configuration every
//! codec accepts, the message model codecs write into, and the
//! [`CodecRegistry`] codecs are looked up from.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod charset;
pub mod codec;
pub mod config;
pub mod error;
pub mod message;
pub mod raw_message;

pub use charset::Charset;
pub use codec::{
    apply_source_policy, AggregationResult, Codec, CodecAggregator, CodecDescriptor,
    CodecFactory, CodecRegistry,
};
pub use config::{CodecConfig, Configuration, ConfigurationField, ConfigurationRequest};
pub use error::{ConfigurationError, DecodeError, DecodeErrorKind};
pub use message::{DefaultFieldRegistry, FieldRegistry, FieldValue, Message};
pub use raw_message::RawMessage;
