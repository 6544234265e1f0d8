//! Message - the record payload carried by a pipeline pack
//!
//! Uses `bytes::Bytes` so the payload can be handed around without copying.

use bytes::Bytes;

/// One in-flight record
///
/// The router only cares about the payload size; everything else is the
/// producing plugin's business.
#[derive(Debug, Clone, Default)]
pub struct Message {
    /// Raw record bytes
    payload: Bytes,

    /// Record timestamp (epoch milliseconds), set by the producer
    timestamp_ms: i64,
}

impl Message {
    /// Create a message with the current wall-clock timestamp
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            timestamp_ms: now_ms(),
        }
    }

    /// Get the raw payload
    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Replace the payload, keeping the timestamp
    #[inline]
    pub fn set_payload(&mut self, payload: impl Into<Bytes>) {
        self.payload = payload.into();
    }

    /// Payload size in bytes - the quantity counted by router statistics
    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// True if the payload is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Get the record timestamp (epoch milliseconds)
    #[inline]
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    /// Set the record timestamp (epoch milliseconds)
    #[inline]
    pub fn set_timestamp_ms(&mut self, ts: i64) {
        self.timestamp_ms = ts;
    }

    /// Clear payload and timestamp, called when a pack returns to its pool
    pub(crate) fn clear(&mut self) {
        self.payload = Bytes::new();
        self.timestamp_ms = 0;
    }
}

/// Current epoch milliseconds
#[inline]
fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
