//! # threadbox-core
//!
//! Turns a stream of pub/sub messages into per-topic conversation threads.
//!
//! This crate provides the in-memory aggregation core:
//!
//! - **Message** - A decoded inbound message with its unread flag
//! - **MessageThread** - The ordered message log of one topic
//! - **OpenViewRegistry** - Which topics a presentation surface has open
//! - **NotificationHub** - Change notifications for presentation surfaces
//! - **MessageRouter** - Concurrency-safe owner of all of the above
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  ingest  ┌───────────────┐        ┌──────────────────┐
//! │  Transport  │─────────▶│ MessageRouter │───────▶│  MessageThread   │
//! └─────────────┘          └───────────────┘        └──────────────────┘
//!                            │           │
//!                            ▼           ▼
//!                  ┌──────────────┐ ┌─────────────────┐   ┌──────────────────────┐
//!                  │  OpenViews   │ │ NotificationHub │──▶│ ViewNotificationPort │
//!                  └──────────────┘ └─────────────────┘   └──────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use threadbox_core::{now_millis, MessageRouter};
//!
//! let router = MessageRouter::new();
//! router.ingest(br#"{"sender":"alice","message":"hi"}"#, "school/room-1", now_millis());
//!
//! let threads = router.list_threads();
//! assert_eq!(threads[0].unread_count(), 1);
//!
//! let view = router.open_view("school/room-1");
//! assert_eq!(view.snapshot.messages()[0].sender_id, "alice");
//! assert_eq!(router.list_threads()[0].unread_count(), 0);
//! ```

pub mod message;
pub mod notify;
pub mod router;
pub mod thread;
pub mod views;

pub use message::{now_millis, Message, MessageId, Timestamp};
pub use notify::{Notification, NotificationHub, Observer, ViewNotificationPort};
pub use router::{Ingested, MessageRouter, OpenedView, RouterStats};
pub use thread::{MessageThread, ThreadSummary, TopicId};
pub use views::{OpenViewRegistry, ViewHandle};
