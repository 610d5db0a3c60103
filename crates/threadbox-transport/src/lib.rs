//! # threadbox-transport
//!
//! Inbound transport interface for threadbox.
//!
//! Connection handling, subscriptions and reconnects belong to the transport.
//! This crate only fixes the boundary between a transport and the router:
//!
//! - **Delivery** - One message on a concrete topic
//! - **Subscriber** - Async source of deliveries
//! - **DeliveryHandler** - Callback invoked per delivery, implemented by the router
//! - **memory** - In-process transport
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use threadbox_core::MessageRouter;
//! use threadbox_transport::{memory, pump};
//!
//! let router = Arc::new(MessageRouter::new());
//! let (publisher, subscriber) = memory::channel(1024);
//! tokio::spawn(pump(subscriber, Arc::clone(&router)));
//! publisher.publish("school/room-1", b"hello".to_vec()).await?;
//! ```

pub mod memory;
pub mod pump;
pub mod traits;

pub use memory::{MemorySubscriber, Publisher};
pub use pump::pump;
pub use traits::{Delivery, DeliveryHandler, Subscriber, TransportError};
