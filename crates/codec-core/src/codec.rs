// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The codec contract and the table codecs are registered in.
//!
//! Every wire format is implemented as a [`Codec`]. Codecs are looked up by
//! name through a [`CodecRegistry`] populated at startup; a codec whose
//! descriptor has no name can never be registered, so a misdeclared codec
//! fails when the process starts rather than when the first message arrives.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::config::{CodecConfig, Configuration, ConfigurationRequest};
use crate::error::{ConfigurationError, DecodeError};
use crate::message::Message;
use crate::raw_message::RawMessage;

/// Static metadata identifying a codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecDescriptor {
    name: String,
    display_name: String,
}

impl CodecDescriptor {
    /// Fails with [`ConfigurationError::MissingCodecName`] for a blank name.
    pub fn new(name: &str, display_name: &str) -> Result<Self, ConfigurationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfigurationError::MissingCodecName);
        }
        let display_name = match display_name.trim() {
            "" => name,
            d => d,
        };
        Ok(Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

/// Outcome of feeding one raw message to a [`CodecAggregator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregationResult {
    /// A full payload is ready to be decoded.
    Complete(RawMessage),
    /// More parts are needed.
    Incomplete,
    /// The part was rejected.
    Invalid(String),
}

/// Reassembles multi-part payloads before they reach [`Codec::decode`].
pub trait CodecAggregator: Send + Sync {
    fn add_chunk(&self, raw: &RawMessage) -> AggregationResult;
}

/// A format-specific decoder.
///
/// Implementations hold only immutable state and are shared across threads:
/// `decode` may be called concurrently on the same instance.
pub trait Codec: Send + Sync {
    fn descriptor(&self) -> &CodecDescriptor;

    fn config(&self) -> &CodecConfig;

    /// Decodes one raw message into a structured message.
    fn decode(&self, raw: &RawMessage) -> Result<Message, DecodeError>;

    /// Reassembly stage for formats that split messages across datagrams.
    fn aggregator(&self) -> Option<&dyn CodecAggregator> {
        None
    }

    fn name(&self) -> &str {
        self.descriptor().name()
    }
}

/// Applies the configured source override, or falls back to the sender's
/// address when the payload named no source.
pub fn apply_source_policy(message: &mut Message, config: &CodecConfig, raw: &RawMessage) {
    if let Some(source) = &config.override_source {
        trace!("Overriding source of message {} with {}", raw.id(), source);
        message.set_source(source.as_str());
    } else if message.source().is_none() {
        if let Some(addr) = raw.remote_address() {
            debug!("Message {} has no source, using remote address {}", raw.id(), addr.ip());
            message.set_source(addr.ip().to_string());
        }
    }
}

pub type CodecFactory = Box<
    dyn Fn(Option<&Configuration>) -> Result<Box<dyn Codec>, ConfigurationError> + Send + Sync,
>;

struct Registration {
    descriptor: CodecDescriptor,
    request: ConfigurationRequest,
    factory: CodecFactory,
}

/// Maps codec names to their constructors.
#[derive(Default)]
pub struct CodecRegistry {
    codecs: HashMap<String, Registration>,
}

impl CodecRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        descriptor: CodecDescriptor,
        request: ConfigurationRequest,
        factory: CodecFactory,
    ) -> Result<(), ConfigurationError> {
        let name = descriptor.name().to_string();
        if self.codecs.contains_key(&name) {
            return Err(ConfigurationError::DuplicateCodec(name));
        }
        debug!("Registering codec {}", name);
        self.codecs.insert(
            name,
            Registration {
                descriptor,
                request,
                factory,
            },
        );
        Ok(())
    }

    /// Builds a codec instance from operator-supplied configuration.
    pub fn build(
        &self,
        name: &str,
        configuration: Option<&Configuration>,
    ) -> Result<Box<dyn Codec>, ConfigurationError> {
        let registration = self
            .codecs
            .get(name)
            .ok_or_else(|| ConfigurationError::UnknownCodec(name.to_string()))?;

        if let Some(configuration) = configuration {
            registration.request.validate(configuration)?;
        }

        let codec = (registration.factory)(configuration)?;
        if codec.name() != registration.descriptor.name() {
            return Err(ConfigurationError::InvalidValue {
                key: "name".to_string(),
                reason: format!(
                    "codec registered as {} reports name {}",
                    registration.descriptor.name(),
                    codec.name()
                ),
            });
        }
        Ok(codec)
    }

    pub fn descriptor(&self, name: &str) -> Option<&CodecDescriptor> {
        self.codecs.get(name).map(|r| &r.descriptor)
    }

    pub fn configuration_request(&self, name: &str) -> Option<&ConfigurationRequest> {
        self.codecs.get(name).map(|r| &r.request)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.codecs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("codecs", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::base_configuration_request;
    use chrono::Utc;
    use std::net::SocketAddr;

    struct PlainTextCodec {
        descriptor: CodecDescriptor,
        config: CodecConfig,
    }

    impl Codec for PlainTextCodec {
        fn descriptor(&self) -> &CodecDescriptor {
            &self.descriptor
        }

        fn config(&self) -> &CodecConfig {
            &self.config
        }

        fn decode(&self, raw: &RawMessage) -> Result<Message, DecodeError> {
            let text = self.config.charset.decode(raw.payload());
            let mut message = Message::new(text, None, raw.timestamp());
            apply_source_policy(&mut message, &self.config, raw);
            Ok(message)
        }
    }

    fn plain_text_factory(name: &'static str) -> CodecFactory {
        Box::new(move |configuration: Option<&Configuration>| {
            let codec = PlainTextCodec {
                descriptor: CodecDescriptor::new(name, "Plain text")?,
                config: CodecConfig::from_configuration(configuration)?,
            };
            Ok(Box::new(codec) as Box<dyn Codec>)
        })
    }

    fn registry() -> CodecRegistry {
        let mut registry = CodecRegistry::new();
        registry
            .register(
                CodecDescriptor::new("plain", "Plain text").unwrap(),
                base_configuration_request(),
                plain_text_factory("plain"),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_descriptor_requires_name() {
        assert_eq!(
            CodecDescriptor::new("  ", "Nameless"),
            Err(ConfigurationError::MissingCodecName)
        );
        let descriptor = CodecDescriptor::new("raw", "").unwrap();
        assert_eq!(descriptor.display_name(), "raw");
    }

    #[test]
    fn test_build_registered_codec() {
        let registry = registry();
        let codec = registry.build("plain", None).unwrap();
        assert_eq!(codec.name(), "plain");
        assert!(codec.aggregator().is_none());

        let raw = RawMessage::new(b"hello".to_vec(), None);
        assert_eq!(codec.decode(&raw).unwrap().message(), "hello");
    }

    #[test]
    fn test_unknown_and_duplicate_codecs() {
        let mut registry = registry();
        assert_eq!(
            registry.build("syslog", None).err(),
            Some(ConfigurationError::UnknownCodec("syslog".to_string()))
        );

        let result = registry.register(
            CodecDescriptor::new("plain", "Again").unwrap(),
            base_configuration_request(),
            plain_text_factory("plain"),
        );
        assert_eq!(result, Err(ConfigurationError::DuplicateCodec("plain".to_string())));
    }

    #[test]
    fn test_build_fails_on_bad_charset() {
        let registry = registry();
        let configuration = Configuration::new().with("charset_name", "nope");
        assert_eq!(
            registry.build("plain", Some(&configuration)).err(),
            Some(ConfigurationError::UnsupportedCharset("nope".to_string()))
        );
    }

    #[test]
    fn test_build_rejects_name_mismatch() {
        let mut registry = CodecRegistry::new();
        registry
            .register(
                CodecDescriptor::new("alias", "Alias").unwrap(),
                base_configuration_request(),
                plain_text_factory("plain"),
            )
            .unwrap();
        assert!(matches!(
            registry.build("alias", None),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_configuration_request_lookup() {
        let registry = registry();
        assert_eq!(registry.names(), vec!["plain"]);
        assert_eq!(registry.configuration_request("plain").unwrap().fields().len(), 2);
        assert!(registry.configuration_request("other").is_none());
        assert_eq!(registry.descriptor("plain").unwrap().display_name(), "Plain text");
    }

    #[test]
    fn test_source_policy() {
        let addr: SocketAddr = "10.1.2.3:5555".parse().unwrap();
        let raw = RawMessage::new(Vec::new(), Some(addr));

        let mut message = Message::new("m", None, Utc::now());
        apply_source_policy(&mut message, &CodecConfig::default(), &raw);
        assert_eq!(message.source(), Some("10.1.2.3"));

        let mut message = Message::new("m", Some("host-a".to_string()), Utc::now());
        apply_source_policy(&mut message, &CodecConfig::default(), &raw);
        assert_eq!(message.source(), Some("host-a"));

        let config = CodecConfig {
            override_source: Some("fixed".to_string()),
            ..Default::default()
        };
        apply_source_policy(&mut message, &config, &raw);
        assert_eq!(message.source(), Some("fixed"));

        let mut message = Message::new("m", None, Utc::now());
        apply_source_policy(&mut message, &CodecConfig::default(), &RawMessage::new(Vec::new(), None));
        assert_eq!(message.source(), None);
    }
}
