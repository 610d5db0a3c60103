//! Message threads for threadbox.
//!
//! A thread is the ordered log of every message received on one topic.

use crate::message::Message;
use serde::{Deserialize, Serialize};

/// A topic identifier.
pub type TopicId = String;

/// The messages received on one topic, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageThread {
    /// Topic this thread collects.
    topic: TopicId,
    /// Messages in arrival order.
    messages: Vec<Message>,
}

impl MessageThread {
    /// Create an empty thread.
    #[must_use]
    pub fn new(topic: impl Into<TopicId>) -> Self {
        Self {
            topic: topic.into(),
            messages: Vec::new(),
        }
    }

    /// Get the topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Get the messages in arrival order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Get the number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if the thread has no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Get the most recent message.
    #[must_use]
    pub fn latest(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Count the messages no view has shown yet.
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.messages.iter().filter(|m| m.unread).count()
    }

    /// Append a message.
    pub(crate) fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Mark every message as read.
    ///
    /// Returns the number of messages that were unread.
    pub fn mark_all_read(&mut self) -> usize {
        self.messages
            .iter_mut()
            .map(Message::mark_read)
            .filter(|was_unread| *was_unread)
            .count()
    }

    /// Build a list row for this thread.
    #[must_use]
    pub fn summary(&self) -> ThreadSummary {
        ThreadSummary {
            topic: self.topic.clone(),
            message_count: self.messages.len(),
            unread_count: self.unread_count(),
            latest: self.latest().cloned(),
        }
    }
}

/// A thread list row: topic, counters and the latest message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadSummary {
    /// Topic of the thread.
    pub topic: TopicId,
    /// Number of messages in the thread.
    pub message_count: usize,
    /// Number of unread messages, shown as the badge.
    pub unread_count: usize,
    /// Most recent message, if any.
    pub latest: Option<Message>,
}
