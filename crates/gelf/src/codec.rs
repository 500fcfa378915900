// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use codec_core::config::{base_configuration_request, ConfigurationField};
use codec_core::{
    apply_source_policy, Codec, CodecConfig, CodecDescriptor, CodecRegistry, Configuration,
    ConfigurationError, ConfigurationRequest, DecodeError, FieldRegistry, Message, RawMessage,
};
use tracing::debug;

use crate::bulk_dropped::BulkDroppedObserver;
use crate::decoder::{GelfDecoder, DEFAULT_DECOMPRESS_SIZE_LIMIT};

pub const NAME: &str = "gelf";
pub const DISPLAY_NAME: &str = "GELF";

pub const CK_DECOMPRESS_SIZE_LIMIT: &str = "decompress_size_limit";

/// Collaborators shared by every GELF codec instance.
#[derive(Debug, Clone)]
pub struct GelfContext {
    pub bulk_dropped: Arc<dyn BulkDroppedObserver>,
    pub registry: Arc<dyn FieldRegistry>,
}

#[derive(Debug)]
pub struct GelfCodec {
    descriptor: CodecDescriptor,
    config: CodecConfig,
    decoder: GelfDecoder,
}

impl GelfCodec {
    pub fn new(
        configuration: Option<&Configuration>,
        context: &GelfContext,
    ) -> Result<Self, ConfigurationError> {
        let config = CodecConfig::from_configuration(configuration)?;
        let decompress_size_limit = decompress_size_limit(configuration)?;
        debug!(
            "Creating GELF codec with charset {} and decompress size limit {}",
            config.charset, decompress_size_limit
        );

        let decoder = GelfDecoder::new(
            decompress_size_limit,
            config.charset,
            Arc::clone(&context.bulk_dropped),
            Arc::clone(&context.registry),
        );

        Ok(Self {
            descriptor: descriptor()?,
            config,
            decoder,
        })
    }

    pub fn decompress_size_limit(&self) -> u64 {
        self.decoder.decompress_size_limit()
    }
}

impl Codec for GelfCodec {
    fn descriptor(&self) -> &CodecDescriptor {
        &self.descriptor
    }

    fn config(&self) -> &CodecConfig {
        &self.config
    }

    fn decode(&self, raw: &RawMessage) -> Result<Message, DecodeError> {
        let mut message = self.decoder.decode(raw)?;
        apply_source_policy(&mut message, &self.config, raw);
        Ok(message)
    }
}

fn descriptor() -> Result<CodecDescriptor, ConfigurationError> {
    CodecDescriptor::new(NAME, DISPLAY_NAME)
}

fn decompress_size_limit(configuration: Option<&Configuration>) -> Result<u64, ConfigurationError> {
    let limit = match configuration {
        Some(c) => c.get_u64(CK_DECOMPRESS_SIZE_LIMIT)?,
        None => None,
    };

    match limit {
        None => Ok(DEFAULT_DECOMPRESS_SIZE_LIMIT),
        Some(0) => Err(ConfigurationError::InvalidValue {
            key: CK_DECOMPRESS_SIZE_LIMIT.to_string(),
            reason: "must be greater than zero".to_string(),
        }),
        Some(limit) => Ok(limit),
    }
}

/// The shared options plus the decompression bound.
#[must_use]
pub fn configuration_request() -> ConfigurationRequest {
    let mut request = base_configuration_request();
    request.add_field(ConfigurationField::number(
        CK_DECOMPRESS_SIZE_LIMIT,
        "Decompressed size limit",
        DEFAULT_DECOMPRESS_SIZE_LIMIT,
        "The maximum number of bytes after decompression.",
        true,
    ));
    request
}

/// Registers the GELF codec under [`NAME`].
pub fn register(registry: &mut CodecRegistry, context: GelfContext) -> Result<(), ConfigurationError> {
    registry.register(
        descriptor()?,
        configuration_request(),
        Box::new(move |configuration: Option<&Configuration>| {
            Ok(Box::new(GelfCodec::new(configuration, &context)?) as Box<dyn Codec>)
        }),
    )
}
