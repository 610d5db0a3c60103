//! In-process transport.
//!
//! A bounded channel between any number of [`Publisher`]s and one
//! [`MemorySubscriber`]. Useful for embedding threadbox behind another
//! component and for tests.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::traits::{Delivery, Subscriber, TransportError};

/// Create an in-process transport with room for `capacity` pending deliveries.
///
/// # Panics
///
/// Panics if `capacity` is zero.
#[must_use]
pub fn channel(capacity: usize) -> (Publisher, MemorySubscriber) {
    let (tx, rx) = mpsc::channel(capacity);
    (Publisher { tx }, MemorySubscriber { rx })
}

/// Sending half of the in-process transport.
#[derive(Debug, Clone)]
pub struct Publisher {
    tx: mpsc::Sender<Delivery>,
}

impl Publisher {
    /// Publish a message, waiting for room if the channel is full.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] if the subscriber was dropped.
    pub async fn publish(
        &self,
        topic: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Result<(), TransportError> {
        self.tx
            .send(Delivery::new(topic, payload))
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Publish a message without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] if the subscriber was dropped, or
    /// [`TransportError::Other`] if the channel is full.
    pub fn try_publish(
        &self,
        topic: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Result<(), TransportError> {
        self.tx
            .try_send(Delivery::new(topic, payload))
            .map_err(|e| match e {
                TrySendError::Full(_) => TransportError::Other("Delivery queue full".into()),
                TrySendError::Closed(_) => TransportError::Closed,
            })
    }

    /// Check if the subscriber is gone.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half of the in-process transport.
#[derive(Debug)]
pub struct MemorySubscriber {
    rx: mpsc::Receiver<Delivery>,
}

#[async_trait]
impl Subscriber for MemorySubscriber {
    async fn next_delivery(&mut self) -> Result<Option<Delivery>, TransportError> {
        Ok(self.rx.recv().await)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_and_receive_in_order() {
        let (publisher, mut subscriber) = channel(8);

        publisher.publish("a", b"1".to_vec()).await.unwrap();
        publisher.publish("b", b"2".to_vec()).await.unwrap();

        let first = subscriber.next_delivery().await.unwrap().unwrap();
        let second = subscriber.next_delivery().await.unwrap().unwrap();
        assert_eq!(first, Delivery::new("a", b"1".to_vec()));
        assert_eq!(second, Delivery::new("b", b"2".to_vec()));
    }

    #[tokio::test]
    async fn test_closed_when_publishers_dropped() {
        let (publisher, mut subscriber) = channel(8);
        let clone = publisher.clone();
        publisher.publish("a", b"1".to_vec()).await.unwrap();
        drop(publisher);
        drop(clone);

        assert!(subscriber.next_delivery().await.unwrap().is_some());
        assert!(subscriber.next_delivery().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_try_publish_errors() {
        let (publisher, subscriber) = channel(1);

        publisher.try_publish("a", b"1".to_vec()).unwrap();
        assert!(matches!(
            publisher.try_publish("a", b"2".to_vec()),
            Err(TransportError::Other(_))
        ));

        drop(subscriber);
        assert!(publisher.is_closed());
        assert!(matches!(
            publisher.publish("a", b"3".to_vec()).await,
            Err(TransportError::Closed)
        ));
    }
}
