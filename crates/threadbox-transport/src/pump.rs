//! Delivery pump.
//!
//! Drives a [`Subscriber`] and hands each delivery to a [`DeliveryHandler`],
//! one at a time.

use tracing::{debug, info, trace};

use crate::traits::{DeliveryHandler, Subscriber, TransportError};

/// Forward deliveries from `subscriber` to `handler` until the subscriber
/// closes.
///
/// Returns the number of deliveries handed over.
///
/// # Errors
///
/// Returns the first error reported by the subscriber.
pub async fn pump<S, H>(mut subscriber: S, handler: H) -> Result<u64, TransportError>
where
    S: Subscriber,
    H: DeliveryHandler,
{
    let transport = subscriber.name();
    info!(transport, "Delivery pump started");

    let mut delivered = 0u64;
    loop {
        let delivery = match subscriber.next_delivery().await {
            Ok(Some(delivery)) => delivery,
            Ok(None) => break,
            Err(e) => {
                debug!(transport, delivered, error = %e, "Delivery pump failed");
                return Err(e);
            }
        };

        trace!(transport, topic = %delivery.topic, size = delivery.payload.len(), "Delivery");
        handler.on_delivery(&delivery.topic, &delivery.payload);
        delivered += 1;
    }

    info!(transport, delivered, "Delivery pump stopped");
    Ok(delivered)
}
