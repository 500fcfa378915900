// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Tracks payloads that hold more than one GELF document.
//!
//! When a chunk of a chunked GELF message goes missing, the reassembled
//! payload can end up being two messages glued together. The decoder keeps
//! the first one and reports the occurrence here so operators can see the
//! loss.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

use codec_core::RawMessage;
use tracing::warn;

/// Receives bulk-dropped notifications. Must never block.
pub trait BulkDroppedObserver: Send + Sync + Debug {
    fn notify_dropped_fragment(&self, raw: &RawMessage);
}

/// Counts occurrences and logs each one.
#[derive(Debug, Default)]
pub struct BulkDroppedCounter {
    count: AtomicU64,
}

impl BulkDroppedCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl BulkDroppedObserver for BulkDroppedCounter {
    fn notify_dropped_fragment(&self, raw: &RawMessage) {
        let total = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(
            "GELF message {} contains more than one document, following messages were dropped ({} so far)",
            raw, total
        );
    }
}
