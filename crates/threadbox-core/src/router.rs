//! Topic thread router for threadbox.
//!
//! The router owns every [`MessageThread`], files inbound messages into them
//! and tells observers what changed.
//!
//! ## Locking
//!
//! - The thread table (`RwLock`) guards the topic mapping and the first-seen
//!   order. Creating or removing a thread takes it for writing; everything else
//!   holds it for reading only long enough to find a thread.
//! - Each thread has its own `Mutex`. Appends, read marking and opening or
//!   closing the view of a topic all happen under it, so a message is either
//!   part of a view's opening snapshot or streamed to that view afterwards.
//! - Locks are taken in the order table, thread, admission clock.

use crate::message::{now_millis, DecodedPayload, Message, MessageId, Timestamp};
use crate::notify::{NotificationHub, Observer};
use crate::thread::{MessageThread, ThreadSummary, TopicId};
use crate::views::{OpenViewRegistry, ViewHandle};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, trace};

/// A thread plus its removal marker.
#[derive(Debug)]
struct ThreadSlot {
    thread: MessageThread,
    /// Set when the thread was removed; holders of a stale reference retry.
    retired: bool,
}

type ThreadCell = Arc<Mutex<ThreadSlot>>;

/// Topic mapping plus first-seen order.
#[derive(Debug, Default)]
struct ThreadTable {
    by_topic: HashMap<TopicId, ThreadCell>,
    order: Vec<ThreadCell>,
}

/// Issues message ids and clamps receive times.
#[derive(Debug, Default)]
struct AdmissionClock {
    last_id: MessageId,
    last_received_at: Timestamp,
}

impl AdmissionClock {
    fn admit(&mut self, now: Timestamp) -> (MessageId, Timestamp) {
        self.last_id += 1;
        self.last_received_at = self.last_received_at.max(now);
        (self.last_id, self.last_received_at)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Result of [`MessageRouter::ingest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ingested {
    /// The thread the message went to, after the append.
    pub thread: ThreadSummary,
    /// The admitted message.
    pub message: Message,
    /// Whether this message created the thread.
    pub is_new_thread: bool,
    /// Whether the message was streamed to an open view.
    pub delivered_live: bool,
}

/// Result of [`MessageRouter::open_view`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenedView {
    /// Handle of the open view.
    pub handle: ViewHandle,
    /// The thread at the moment the view opened, already marked read.
    pub snapshot: MessageThread,
    /// `false` if the view was already open.
    pub newly_opened: bool,
}

/// The central thread router.
///
/// Safe to share between a transport delivery thread and any number of
/// presentation threads. No operation blocks on I/O.
pub struct MessageRouter {
    /// Threads by topic, in first-seen order.
    table: RwLock<ThreadTable>,
    /// Topics with an open view.
    views: OpenViewRegistry,
    /// Outgoing change notifications.
    hub: NotificationHub,
    /// Message admission.
    clock: Mutex<AdmissionClock>,
}

impl MessageRouter {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self {
        info!("Creating message router");
        Self {
            table: RwLock::new(ThreadTable::default()),
            views: OpenViewRegistry::new(),
            hub: NotificationHub::new(),
            clock: Mutex::new(AdmissionClock::default()),
        }
    }

    /// Register an observer for change notifications.
    #[must_use]
    pub fn subscribe(&self) -> Observer {
        self.hub.subscribe()
    }

    /// Admit a message received on `topic`.
    ///
    /// Creates the thread on first sight of the topic. If a view is open for
    /// the topic the message is streamed to it and counts as read; otherwise
    /// it stays unread. Observers are always told the thread list changed.
    ///
    /// `now` is the ingestion instant. Receive times never go backwards: an
    /// instant earlier than the last admitted one is raised to it.
    pub fn ingest(&self, payload: &[u8], topic: &str, now: Timestamp) -> Ingested {
        let decoded = DecodedPayload::decode(payload);

        loop {
            let (cell, is_new_thread) = self.thread_cell_or_create(topic);
            let mut slot = lock(&cell);
            if slot.retired {
                continue;
            }

            let (id, received_at) = lock(&self.clock).admit(now);
            let mut message = decoded.into_message(id, received_at);

            let delivered_live = self.views.is_open(topic);
            if delivered_live {
                message.mark_read();
                self.hub.thread_appended(topic, &message);
            }

            slot.thread.push(message.clone());
            let thread = slot.thread.summary();
            drop(slot);

            self.hub.thread_list_changed();
            trace!(
                topic = %topic,
                message = id,
                live = delivered_live,
                unread = thread.unread_count,
                "Ingested message"
            );

            return Ingested {
                thread,
                message,
                is_new_thread,
                delivered_live,
            };
        }
    }

    /// Snapshot every thread in first-seen order.
    #[must_use]
    pub fn list_threads(&self) -> Vec<MessageThread> {
        let table = read(&self.table);
        table
            .order
            .iter()
            .map(|cell| lock(cell).thread.clone())
            .collect()
    }

    /// Summarize every thread in first-seen order.
    #[must_use]
    pub fn thread_summaries(&self) -> Vec<ThreadSummary> {
        let table = read(&self.table);
        table
            .order
            .iter()
            .map(|cell| lock(cell).thread.summary())
            .collect()
    }

    /// Snapshot one thread.
    #[must_use]
    pub fn thread(&self, topic: &str) -> Option<MessageThread> {
        let cell = self.thread_cell(topic)?;
        let slot = lock(&cell);
        (!slot.retired).then(|| slot.thread.clone())
    }

    /// Open a view for a topic.
    ///
    /// Marks every message in the thread read and returns them for the
    /// initial render. Opening an open view returns the existing handle.
    /// A topic without a thread yields an empty snapshot, and its first
    /// message will be streamed to the view.
    pub fn open_view(&self, topic: &str) -> OpenedView {
        let now = now_millis();

        loop {
            let Some(cell) = self.thread_cell(topic) else {
                let table = write(&self.table);
                if table.by_topic.contains_key(topic) {
                    continue;
                }
                let (handle, newly_opened) = self.views.open(topic, now);
                drop(table);

                return OpenedView {
                    handle,
                    snapshot: MessageThread::new(topic),
                    newly_opened,
                };
            };

            let mut slot = lock(&cell);
            if slot.retired {
                continue;
            }

            let (handle, newly_opened) = self.views.open(topic, now);
            let marked = slot.thread.mark_all_read();
            let snapshot = slot.thread.clone();
            drop(slot);

            if marked > 0 {
                self.hub.thread_list_changed();
            }
            debug!(topic = %topic, marked, messages = snapshot.len(), "View snapshot taken");

            return OpenedView {
                handle,
                snapshot,
                newly_opened,
            };
        }
    }

    /// Close the view for a topic.
    ///
    /// Later messages on the topic accumulate as unread again. Returns the
    /// closed handle, if a view was open.
    pub fn close_view(&self, topic: &str) -> Option<ViewHandle> {
        let cell = self.thread_cell(topic);
        let _slot = cell.as_deref().map(lock);
        self.views.close(topic)
    }

    /// Mark every message of a topic read without opening a view.
    ///
    /// Returns how many messages were unread. Unknown topics are ignored.
    pub fn mark_read(&self, topic: &str) -> usize {
        let Some(cell) = self.thread_cell(topic) else {
            return 0;
        };

        let mut slot = lock(&cell);
        if slot.retired {
            return 0;
        }
        let marked = slot.thread.mark_all_read();
        drop(slot);

        if marked > 0 {
            self.hub.thread_list_changed();
            debug!(topic = %topic, marked, "Marked thread read");
        }
        marked
    }

    /// Remove a thread and close its view.
    ///
    /// Returns the removed thread. A later message on the topic starts a new
    /// thread at the end of the list.
    pub fn remove_thread(&self, topic: &str) -> Option<MessageThread> {
        let mut table = write(&self.table);
        let cell = table.by_topic.remove(topic)?;
        table.order.retain(|c| !Arc::ptr_eq(c, &cell));

        let mut slot = lock(&cell);
        slot.retired = true;
        let thread = std::mem::replace(&mut slot.thread, MessageThread::new(topic));
        drop(slot);

        self.views.close(topic);
        drop(table);

        self.hub.thread_list_changed();
        debug!(topic = %topic, messages = thread.len(), "Removed thread");
        Some(thread)
    }

    /// Check if a view is open for a topic.
    #[must_use]
    pub fn is_view_open(&self, topic: &str) -> bool {
        self.views.is_open(topic)
    }

    /// Get router statistics.
    #[must_use]
    pub fn stats(&self) -> RouterStats {
        let table = read(&self.table);
        let (message_count, unread_count) =
            table.order.iter().fold((0, 0), |(messages, unread), cell| {
                let slot = lock(cell);
                (
                    messages + slot.thread.len(),
                    unread + slot.thread.unread_count(),
                )
            });

        RouterStats {
            thread_count: table.order.len(),
            message_count,
            unread_count,
            open_views: self.views.len(),
            observers: self.hub.observer_count(),
        }
    }

    fn thread_cell(&self, topic: &str) -> Option<ThreadCell> {
        read(&self.table).by_topic.get(topic).cloned()
    }

    fn thread_cell_or_create(&self, topic: &str) -> (ThreadCell, bool) {
        if let Some(cell) = self.thread_cell(topic) {
            return (cell, false);
        }

        let mut table = write(&self.table);
        if let Some(cell) = table.by_topic.get(topic) {
            return (Arc::clone(cell), false);
        }

        let cell = Arc::new(Mutex::new(ThreadSlot {
            thread: MessageThread::new(topic),
            retired: false,
        }));
        table.by_topic.insert(topic.to_string(), Arc::clone(&cell));
        table.order.push(Arc::clone(&cell));
        debug!(topic = %topic, threads = table.order.len(), "Created thread");

        (cell, true)
    }
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Router statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouterStats {
    /// Number of threads.
    pub thread_count: usize,
    /// Messages across all threads.
    pub message_count: usize,
    /// Unread messages across all threads.
    pub unread_count: usize,
    /// Number of open views.
    pub open_views: usize,
    /// Number of registered observers.
    pub observers: usize,
}
