//! Redis Streams-backed queue (durable, at-least-once delivery).
//!
//! One stream per queue, read through a consumer group:
//! - **receive**: own pending entries first (left over from a crash), then
//!   `XREADGROUP ... BLOCK` for new ones; the block time is the long-poll bound
//! - **delete**: `XACK` + `XDEL`
//! - **send**: `XADD` with `body` and `sent_at` fields
//!
//! The consumer name should be stable across restarts so that a restarted
//! worker picks up the entries it had received but not deleted.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::streams::{StreamId, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Client};
use tracing::{debug, warn};

use super::{MessageQueue, QueueError, QueueMessage};

/// Default consumer group shared by all frameshot workers.
pub const DEFAULT_GROUP: &str = "frameshot";

#[derive(Clone)]
pub struct RedisStreamQueue {
    conn: ConnectionManager,
    stream_key: String,
    group: String,
    consumer: String,
}

impl std::fmt::Debug for RedisStreamQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStreamQueue")
            .field("stream_key", &self.stream_key)
            .field("group", &self.group)
            .field("consumer", &self.consumer)
            .finish()
    }
}

impl RedisStreamQueue {
    /// Connect and make sure the consumer group exists.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    /// * `stream_key` - stream backing this queue (e.g., "frameshot:uploads")
    /// * `consumer` - consumer name within [`DEFAULT_GROUP`]
    pub async fn connect(
        redis_url: &str,
        stream_key: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Result<Self, QueueError> {
        let client = Client::open(redis_url).map_err(|e| QueueError::Connection(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;

        let queue = Self {
            conn,
            stream_key: stream_key.into(),
            group: DEFAULT_GROUP.to_string(),
            consumer: consumer.into(),
        };
        queue.ensure_consumer_group().await?;
        Ok(queue)
    }

    /// `XGROUP CREATE ... MKSTREAM`; an existing group is not an error.
    async fn ensure_consumer_group(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let created: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(&self.stream_key, &self.group, "$")
            .await;

        match created {
            Ok(()) => Ok(()),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(QueueError::Command(format!("XGROUP CREATE failed: {e}"))),
        }
    }

    async fn read(
        &self,
        start_id: &str,
        max_messages: usize,
        block: Option<Duration>,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let mut options = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(max_messages);
        if let Some(block) = block {
            options = options.block(block.as_millis().try_into().unwrap_or(usize::MAX));
        }

        let mut conn = self.conn.clone();
        let reply: Option<StreamReadReply> = conn
            .xread_options(&[&self.stream_key], &[start_id], &options)
            .await
            .map_err(|e| QueueError::Command(format!("XREADGROUP failed: {e}")))?;

        let Some(reply) = reply else {
            return Ok(Vec::new());
        };

        let entries = reply.keys.into_iter().flat_map(|key| key.ids);
        let (messages, orphans) = split_entries(&self.stream_key, entries);
        if !orphans.is_empty() {
            self.ack_orphans(&orphans).await?;
        }
        Ok(messages)
    }

    /// Acknowledge pending entries that can never be handled, so they stop
    /// occupying the front of the pending list.
    async fn ack_orphans(&self, ids: &[String]) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: usize = conn
            .xack(&self.stream_key, &self.group, ids)
            .await
            .map_err(|e| QueueError::Command(format!("XACK of orphaned entries failed: {e}")))?;
        Ok(())
    }
}

/// Split stream entries into deliverable messages and ids of entries without
/// a body (pending entries that were deleted meanwhile come back without
/// fields).
fn split_entries(
    stream_key: &str,
    entries: impl IntoIterator<Item = StreamId>,
) -> (Vec<QueueMessage>, Vec<String>) {
    let mut messages = Vec::new();
    let mut orphans = Vec::new();

    for entry in entries {
        let Some(body) = entry.get::<String>("body") else {
            warn!(stream = %stream_key, id = %entry.id, "stream entry without body acknowledged");
            orphans.push(entry.id);
            continue;
        };
        let sent_at = entry.get::<String>("sent_at").unwrap_or_default();
        messages.push(QueueMessage {
            message_id: entry.id.clone(),
            receipt: entry.id,
            body,
            sent_at,
        });
    }

    (messages, orphans)
}

#[async_trait]
impl MessageQueue for RedisStreamQueue {
    fn name(&self) -> &str {
        &self.stream_key
    }

    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let pending = self.read("0", max_messages, None).await?;
        if !pending.is_empty() {
            debug!(stream = %self.stream_key, count = pending.len(), "redelivering pending entries");
            return Ok(pending);
        }

        // BLOCK 0 would wait forever.
        let block = (!wait.is_zero()).then_some(wait);
        self.read(">", max_messages, block).await
    }

    async fn delete(&self, receipt: &str) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .xack(&self.stream_key, &self.group, &[receipt])
            .ignore()
            .xdel(&self.stream_key, &[receipt])
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::Command(format!("XACK/XDEL failed: {e}")))?;
        Ok(())
    }

    async fn send(&self, body: &str) -> Result<String, QueueError> {
        let mut conn = self.conn.clone();
        let sent_at = Utc::now().timestamp_millis().to_string();
        conn.xadd(&self.stream_key, "*", &[("body", body), ("sent_at", sent_at.as_str())])
            .await
            .map_err(|e| QueueError::Command(format!("XADD failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn entry(id: &str, fields: &[(&str, &str)]) -> StreamId {
        StreamId {
            id: id.to_string(),
            map: fields
                .iter()
                .map(|(k, v)| (k.to_string(), redis::Value::Data(v.as_bytes().to_vec())))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn entries_without_body_are_returned_for_acknowledgement() {
        let (messages, orphans) = split_entries(
            "uploads",
            vec![
                entry("1-0", &[]),
                entry("2-0", &[("body", "{}"), ("sent_at", "1700000000000")]),
                entry("3-0", &[("sent_at", "1")]),
            ],
        );

        assert_eq!(orphans, vec!["1-0".to_string(), "3-0".to_string()]);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].receipt, "2-0");
        assert_eq!(messages[0].body, "{}");
        assert_eq!(messages[0].sent_at, "1700000000000");
    }

    #[test]
    fn missing_sent_at_defaults_to_empty() {
        let (messages, orphans) = split_entries("q", vec![entry("5-1", &[("body", "x")])]);
        assert!(orphans.is_empty());
        assert_eq!(messages[0].sent_at, "");
    }
}
