//! Open view tracking for threadbox.
//!
//! The registry remembers which topics a presentation surface currently has
//! open, so new messages on those topics can be streamed to it instead of
//! piling up as unread.

use crate::message::Timestamp;
use crate::thread::TopicId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// A view identifier, unique within one registry.
pub type ViewId = u64;

/// Handle for an open view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewHandle {
    /// View identifier.
    pub id: ViewId,
    /// Topic shown by the view.
    pub topic: TopicId,
    /// When the view was opened.
    pub opened_at: Timestamp,
}

/// Registry of open views, at most one per topic.
#[derive(Debug, Default)]
pub struct OpenViewRegistry {
    /// Open views by topic.
    views: DashMap<TopicId, ViewHandle>,
    /// Last issued view identifier.
    last_id: AtomicU64,
}

impl OpenViewRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a view for a topic.
    ///
    /// Returns the handle and `true` if the view was newly opened. If a view
    /// is already open the existing handle is returned with `false`, so
    /// concurrent requests for one topic all end up with the same handle.
    pub fn open(&self, topic: &str, now: Timestamp) -> (ViewHandle, bool) {
        match self.views.entry(topic.to_string()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let handle = ViewHandle {
                    id: self.last_id.fetch_add(1, Ordering::Relaxed) + 1,
                    topic: topic.to_string(),
                    opened_at: now,
                };
                entry.insert(handle.clone());
                debug!(topic = %topic, view = handle.id, "View opened");
                (handle, true)
            }
        }
    }

    /// Close the view for a topic.
    ///
    /// Returns the closed handle, if a view was open.
    pub fn close(&self, topic: &str) -> Option<ViewHandle> {
        let closed = self.views.remove(topic).map(|(_, handle)| handle);
        if let Some(handle) = &closed {
            debug!(topic = %topic, view = handle.id, "View closed");
        }
        closed
    }

    /// Check if a view is open for a topic.
    #[must_use]
    pub fn is_open(&self, topic: &str) -> bool {
        self.views.contains_key(topic)
    }

    /// Get the handle of the view open for a topic.
    #[must_use]
    pub fn handle(&self, topic: &str) -> Option<ViewHandle> {
        self.views.get(topic).map(|h| h.clone())
    }

    /// Get every topic with an open view.
    #[must_use]
    pub fn open_topics(&self) -> Vec<TopicId> {
        self.views.iter().map(|e| e.key().clone()).collect()
    }

    /// Get the number of open views.
    #[must_use]
    pub fn len(&self) -> usize {
        self.views.len()
    }

    /// Check if no view is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_open_close() {
        let registry = OpenViewRegistry::new();

        let (handle, opened) = registry.open("t1", 10);
        assert!(opened);
        assert_eq!(handle.topic, "t1");
        assert_eq!(handle.opened_at, 10);
        assert!(registry.is_open("t1"));
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.close("t1"), Some(handle));
        assert!(!registry.is_open("t1"));
        assert!(registry.is_empty());

        // Closing again is a no-op
        assert!(registry.close("t1").is_none());
    }

    #[test]
    fn test_open_is_idempotent() {
        let registry = OpenViewRegistry::new();

        let (first, opened) = registry.open("t1", 10);
        assert!(opened);
        let (second, opened) = registry.open("t1", 20);
        assert!(!opened);
        assert_eq!(first, second);
        assert_eq!(registry.handle("t1"), Some(first.clone()));

        // Reopening after close issues a new handle
        registry.close("t1");
        let (third, opened) = registry.open("t1", 30);
        assert!(opened);
        assert_ne!(third.id, first.id);
    }

    #[test]
    fn test_open_topics() {
        let registry = OpenViewRegistry::new();
        registry.open("a", 0);
        registry.open("b", 0);

        let mut topics = registry.open_topics();
        topics.sort();
        assert_eq!(topics, ["a", "b"]);
    }

    #[test]
    fn test_concurrent_open_dedup() {
        let registry = Arc::new(OpenViewRegistry::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.open("shared", 0))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|(_, opened)| *opened).count(), 1);
        assert!(results.iter().all(|(h, _)| *h == results[0].0));
        assert_eq!(registry.len(), 1);
    }
}
