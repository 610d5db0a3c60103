//! Transport abstraction traits for threadbox.
//!
//! A transport turns whatever the broker connection produces into
//! [`Delivery`] values. Wildcard subscriptions are resolved by the transport,
//! so every delivery names one concrete topic.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use threadbox_core::{now_millis, MessageRouter};

/// One message as handed over by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Concrete topic the message arrived on.
    pub topic: String,
    /// Raw payload bytes.
    pub payload: Bytes,
}

impl Delivery {
    /// Create a new delivery.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The other side of the transport is gone.
    #[error("Transport closed")]
    Closed,

    /// Failed to receive a delivery.
    #[error("Receive failed: {0}")]
    Receive(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Callback invoked for every inbound message.
///
/// Called on the transport's delivery thread; implementations must only do
/// short in-memory work.
pub trait DeliveryHandler: Send + Sync {
    /// Handle one message received on `topic`.
    fn on_delivery(&self, topic: &str, payload: &[u8]);
}

impl DeliveryHandler for MessageRouter {
    fn on_delivery(&self, topic: &str, payload: &[u8]) {
        self.ingest(payload, topic, now_millis());
    }
}

impl<H: DeliveryHandler + ?Sized> DeliveryHandler for Arc<H> {
    fn on_delivery(&self, topic: &str, payload: &[u8]) {
        (**self).on_delivery(topic, payload);
    }
}

/// A source of deliveries.
///
/// Deliveries from one subscriber are handed over one at a time, in the
/// order the transport received them.
#[async_trait]
pub trait Subscriber: Send {
    /// Wait for the next delivery.
    ///
    /// Returns `None` once the subscriber is closed cleanly.
    async fn next_delivery(&mut self) -> Result<Option<Delivery>, TransportError>;

    /// Get the transport name (e.g., "memory").
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_new() {
        let delivery = Delivery::new("school/room-1", b"hello".to_vec());
        assert_eq!(delivery.topic, "school/room-1");
        assert_eq!(&delivery.payload[..], b"hello");
    }

    #[test]
    fn test_router_handles_deliveries() {
        let router = Arc::new(MessageRouter::new());
        let handler: Arc<dyn DeliveryHandler> = router.clone();

        handler.on_delivery("t1", br#"{"sender":"alice","message":"hi"}"#);
        handler.on_delivery("t1", b"plain text");

        let thread = router.thread("t1").unwrap();
        assert_eq!(thread.len(), 2);
        assert_eq!(thread.messages()[0].sender_id, "alice");
        assert_eq!(thread.messages()[1].content, "plain text");
    }

    #[test]
    fn test_error_display() {
        assert_eq!(TransportError::Closed.to_string(), "Transport closed");
        assert_eq!(
            TransportError::Receive("broker reset".into()).to_string(),
            "Receive failed: broker reset"
        );
    }
}
