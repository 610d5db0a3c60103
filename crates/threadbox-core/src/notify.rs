//! Change notifications for presentation surfaces.
//!
//! The router never calls presentation code directly. It records changes in a
//! [`NotificationHub`], and each surface drains its own [`Observer`] on its
//! own task or event loop, handing the notifications to a
//! [`ViewNotificationPort`].
//!
//! Two kinds of change exist:
//!
//! - **thread list changed** - a single-slot dirty flag per observer. Any
//!   number of changes before the observer wakes up arrive as one
//!   notification.
//! - **thread appended** - queued per observer, so messages for a topic are
//!   delivered in the order they were ingested.

use crate::message::Message;
use crate::thread::TopicId;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// An observer identifier.
pub type ObserverId = u64;

/// Contract implemented by presentation surfaces.
pub trait ViewNotificationPort: Send + Sync {
    /// The thread list, or an unread badge in it, may have changed.
    ///
    /// The surface should re-read the thread list.
    fn thread_list_changed(&self);

    /// A message was added to a topic whose view is open.
    ///
    /// The surface should append `message` to that view.
    fn thread_appended(&self, topic: &str, message: &Message);
}

impl<P: ViewNotificationPort + ?Sized> ViewNotificationPort for Arc<P> {
    fn thread_list_changed(&self) {
        (**self).thread_list_changed();
    }

    fn thread_appended(&self, topic: &str, message: &Message) {
        (**self).thread_appended(topic, message);
    }
}

/// A notification drained from an [`Observer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// The thread list should be re-read.
    ThreadListChanged,
    /// A message was streamed to an open view.
    ThreadAppended { topic: TopicId, message: Message },
}

impl Notification {
    /// Hand this notification to a port.
    pub fn deliver<P: ViewNotificationPort + ?Sized>(&self, port: &P) {
        match self {
            Self::ThreadListChanged => port.thread_list_changed(),
            Self::ThreadAppended { topic, message } => port.thread_appended(topic, message),
        }
    }
}

type AppendedSender = mpsc::UnboundedSender<(TopicId, Message)>;
type ObserverTable = DashMap<ObserverId, AppendedSender>;

/// Fan-out point for change notifications.
pub struct NotificationHub {
    /// Thread list generation; observers only see the latest.
    list_generation: watch::Sender<u64>,
    /// Per-observer queues for streamed messages.
    observers: Arc<ObserverTable>,
    /// Last issued observer identifier.
    last_id: AtomicU64,
}

impl NotificationHub {
    /// Create a hub with no observers.
    #[must_use]
    pub fn new() -> Self {
        let (list_generation, _) = watch::channel(0);
        Self {
            list_generation,
            observers: Arc::new(DashMap::new()),
            last_id: AtomicU64::new(0),
        }
    }

    /// Register a new observer.
    ///
    /// The observer sees changes made after this call.
    #[must_use]
    pub fn subscribe(&self) -> Observer {
        let id = self.last_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, appended) = mpsc::unbounded_channel();
        self.observers.insert(id, tx);
        debug!(observer = id, "Observer subscribed");

        Observer {
            id,
            list_changes: self.list_generation.subscribe(),
            appended,
            registry: Arc::downgrade(&self.observers),
        }
    }

    /// Get the number of registered observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Flag the thread list as changed.
    pub fn thread_list_changed(&self) {
        self.list_generation
            .send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    /// Queue a streamed message for every observer.
    ///
    /// Never blocks. Observers that were dropped are removed.
    pub fn thread_appended(&self, topic: &str, message: &Message) {
        self.observers.retain(|id, tx| {
            let alive = tx.send((topic.to_string(), message.clone())).is_ok();
            if !alive {
                debug!(observer = *id, "Observer dropped");
            }
            alive
        });
        trace!(topic = %topic, message = message.id, "Queued streamed message");
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of a [`NotificationHub`] registration.
///
/// Streamed messages are yielded before a pending list change. Once the hub
/// is gone and everything queued has been drained, the observer ends.
/// Dropping the observer unregisters it from the hub.
pub struct Observer {
    id: ObserverId,
    list_changes: watch::Receiver<u64>,
    appended: mpsc::UnboundedReceiver<(TopicId, Message)>,
    registry: Weak<ObserverTable>,
}

impl Observer {
    /// Get the observer identifier.
    #[must_use]
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Wait for the next notification.
    ///
    /// Returns `None` once the hub has been dropped and nothing is pending.
    pub async fn recv(&mut self) -> Option<Notification> {
        tokio::select! {
            biased;

            Some((topic, message)) = self.appended.recv() => {
                Some(Notification::ThreadAppended { topic, message })
            }

            Ok(()) = self.list_changes.changed() => Some(Notification::ThreadListChanged),

            else => None,
        }
    }

    /// Take the next notification without waiting.
    pub fn try_recv(&mut self) -> Option<Notification> {
        if let Ok((topic, message)) = self.appended.try_recv() {
            return Some(Notification::ThreadAppended { topic, message });
        }

        if self.list_changes.has_changed().unwrap_or(false) {
            self.list_changes.borrow_and_update();
            return Some(Notification::ThreadListChanged);
        }

        None
    }

    /// Deliver notifications to `port` until the hub is dropped.
    pub async fn run<P: ViewNotificationPort>(mut self, port: P) {
        while let Some(notification) = self.recv().await {
            notification.deliver(&port);
        }
        debug!(observer = self.id, "Observer finished");
    }

    /// Run this observer on a new tokio task.
    pub fn spawn<P>(self, port: P) -> JoinHandle<()>
    where
        P: ViewNotificationPort + 'static,
    {
        tokio::spawn(self.run(port))
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.id);
            debug!(observer = self.id, "Observer unsubscribed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn message(id: u64) -> Message {
        Message::from_payload(id, format!("m{id}").as_bytes(), 0)
    }

    #[derive(Default)]
    struct RecordingPort {
        events: Mutex<Vec<Notification>>,
    }

    impl ViewNotificationPort for RecordingPort {
        fn thread_list_changed(&self) {
            self.events.lock().unwrap().push(Notification::ThreadListChanged);
        }

        fn thread_appended(&self, topic: &str, message: &Message) {
            self.events.lock().unwrap().push(Notification::ThreadAppended {
                topic: topic.to_string(),
                message: message.clone(),
            });
        }
    }

    #[test]
    fn test_list_changes_coalesce() {
        let hub = NotificationHub::new();
        let mut observer = hub.subscribe();
        assert!(observer.try_recv().is_none());

        hub.thread_list_changed();
        hub.thread_list_changed();
        hub.thread_list_changed();

        assert_eq!(observer.try_recv(), Some(Notification::ThreadListChanged));
        assert!(observer.try_recv().is_none());
    }

    #[test]
    fn test_appended_in_order() {
        let hub = NotificationHub::new();
        let mut observer = hub.subscribe();

        for id in 1..=3 {
            hub.thread_appended("t", &message(id));
        }

        for id in 1..=3 {
            match observer.try_recv() {
                Some(Notification::ThreadAppended { topic, message }) => {
                    assert_eq!(topic, "t");
                    assert_eq!(message.id, id);
                }
                other => panic!("unexpected notification: {other:?}"),
            }
        }
        assert!(observer.try_recv().is_none());
    }

    #[test]
    fn test_fan_out_and_prune() {
        let hub = NotificationHub::new();
        let mut first = hub.subscribe();
        let second = hub.subscribe();
        assert_ne!(first.id(), second.id());
        assert_eq!(hub.observer_count(), 2);

        drop(second);
        assert_eq!(hub.observer_count(), 1);

        hub.thread_appended("t", &message(1));
        assert!(matches!(
            first.try_recv(),
            Some(Notification::ThreadAppended { .. })
        ));
    }

    #[test]
    fn test_dropped_observers_unregister() {
        let hub = NotificationHub::new();
        for _ in 0..100 {
            let observer = hub.subscribe();
            hub.thread_list_changed();
            drop(observer);
        }
        assert_eq!(hub.observer_count(), 0);

        // Dropping after the hub is gone is a no-op
        let observer = hub.subscribe();
        drop(hub);
        drop(observer);
    }

    #[test]
    fn test_late_subscriber_skips_past_changes() {
        let hub = NotificationHub::new();
        hub.thread_list_changed();

        let mut observer = hub.subscribe();
        assert!(observer.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_run_drains_then_stops() {
        let hub = NotificationHub::new();
        let observer = hub.subscribe();
        let port = Arc::new(RecordingPort::default());

        hub.thread_appended("t", &message(1));
        hub.thread_appended("t", &message(2));
        hub.thread_list_changed();
        drop(hub);

        observer.spawn(Arc::clone(&port)).await.unwrap();

        let events = port.events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], Notification::ThreadAppended { message, .. } if message.id == 1));
        assert!(matches!(&events[1], Notification::ThreadAppended { message, .. } if message.id == 2));
        assert_eq!(events[2], Notification::ThreadListChanged);
    }

    #[tokio::test]
    async fn test_recv_ends_without_hub() {
        let hub = NotificationHub::new();
        let mut observer = hub.subscribe();
        drop(hub);
        assert!(observer.recv().await.is_none());
    }
}
