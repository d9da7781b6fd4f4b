//! Message queue boundary (receive / delete / send).
//!
//! Delivery is at-least-once: a received message stays invisible to other
//! receivers until it is deleted, and may be handed out again if the
//! receiver dies first. There is no dead-letter channel.

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis_streams;

pub use in_memory::InMemoryQueue;
#[cfg(feature = "redis")]
pub use redis_streams::RedisStreamQueue;

use std::time::Duration;

use async_trait::async_trait;

/// A message handed out by [`MessageQueue::receive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub message_id: String,
    /// Opaque token passed back to [`MessageQueue::delete`].
    pub receipt: String,
    pub body: String,
    /// Provider timestamp (epoch millis as text).
    pub sent_at: String,
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Queue identifier used in logs and as the message `source`.
    fn name(&self) -> &str;

    /// Long-poll for up to `max_messages`, waiting at most `wait` when the
    /// queue is empty. An empty vector means the wait elapsed.
    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError>;

    /// Acknowledge a message so it is never redelivered.
    async fn delete(&self, receipt: &str) -> Result<(), QueueError>;

    /// Publish a new message; returns its id.
    async fn send(&self, body: &str) -> Result<String, QueueError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum QueueError {
    #[error("queue connection error: {0}")]
    Connection(String),
    #[error("queue command error: {0}")]
    Command(String),
    #[error("unknown receipt: {0}")]
    UnknownReceipt(String),
}
