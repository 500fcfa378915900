// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Minimally processed input handed from a transport to a codec.

use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One unit of received data, before any text decoding.
///
/// A `RawMessage` is immutable once built. Codecs only ever borrow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    id: Uuid,
    payload: Vec<u8>,
    remote_address: Option<SocketAddr>,
    timestamp: DateTime<Utc>,
}

impl RawMessage {
    /// Wraps a freshly received payload, stamping it with a new id and the
    /// current time.
    #[must_use]
    pub fn new(payload: Vec<u8>, remote_address: Option<SocketAddr>) -> Self {
        Self::with_timestamp(payload, remote_address, Utc::now())
    }

    #[must_use]
    pub fn with_timestamp(
        payload: Vec<u8>,
        remote_address: Option<SocketAddr>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::from_parts(Uuid::new_v4(), payload, remote_address, timestamp)
    }

    /// Rebuilds a message whose identity was assigned elsewhere, e.g. when
    /// replaying from a journal.
    #[must_use]
    pub fn from_parts(
        id: Uuid,
        payload: Vec<u8>,
        remote_address: Option<SocketAddr>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            payload,
            remote_address,
            timestamp,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn remote_address(&self) -> Option<SocketAddr> {
        self.remote_address
    }

    /// Time the transport received the payload.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl std::fmt::Display for RawMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.remote_address {
            Some(addr) => write!(f, "<{}> (received from <{}>)", self.id, addr),
            None => write!(f, "<{}>", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_assigns_unique_ids() {
        let first = RawMessage::new(b"a".to_vec(), None);
        let second = RawMessage::new(b"a".to_vec(), None);
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn test_with_timestamp_keeps_receive_time() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let raw = RawMessage::with_timestamp(b"payload".to_vec(), None, ts);
        assert_eq!(raw.timestamp(), ts);
        assert_eq!(raw.payload(), b"payload");
    }

    #[test]
    fn test_display() {
        let id = Uuid::nil();
        let ts = Utc.timestamp_opt(0, 0).unwrap();
        let addr: SocketAddr = "192.168.1.2:12201".parse().unwrap();

        let raw = RawMessage::from_parts(id, Vec::new(), Some(addr), ts);
        assert_eq!(
            raw.to_string(),
            "<00000000-0000-0000-0000-000000000000> (received from <192.168.1.2:12201>)"
        );

        let raw = RawMessage::from_parts(id, Vec::new(), None, ts);
        assert_eq!(raw.to_string(), "<00000000-0000-0000-0000-000000000000>");
    }
}
