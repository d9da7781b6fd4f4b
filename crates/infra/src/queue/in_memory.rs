//! In-memory queue for tests/dev.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;
use uuid::Uuid;

use super::{MessageQueue, QueueError, QueueMessage};

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<QueueMessage>,
    in_flight: HashMap<String, QueueMessage>,
    deleted: usize,
}

/// In-memory queue with receive/delete semantics close to a hosted queue:
/// received messages move to an in-flight set until deleted.
#[derive(Debug)]
pub struct InMemoryQueue {
    name: String,
    state: Mutex<QueueState>,
    notify: Notify,
    injected_failures: AtomicUsize,
}

impl InMemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            injected_failures: AtomicUsize::new(0),
        }
    }

    pub fn arc(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(name))
    }

    /// Make the next `count` receives fail with a connection error.
    pub fn fail_next_receives(&self, count: usize) {
        self.injected_failures.store(count, Ordering::SeqCst);
    }

    /// Put every in-flight message back in front of the queue, as a hosted
    /// queue does when a receiver dies before deleting.
    pub fn requeue_in_flight(&self) -> Result<usize, QueueError> {
        let mut state = self.lock()?;
        let mut returned: Vec<_> = state.in_flight.drain().map(|(_, m)| m).collect();
        returned.sort_by(|a, b| a.message_id.cmp(&b.message_id));
        let count = returned.len();
        for message in returned.into_iter().rev() {
            state.ready.push_front(message);
        }
        drop(state);
        self.notify.notify_waiters();
        Ok(count)
    }

    /// Bodies waiting to be received, in order.
    pub fn ready_bodies(&self) -> Vec<String> {
        self.lock()
            .map(|s| s.ready.iter().map(|m| m.body.clone()).collect())
            .unwrap_or_default()
    }

    pub fn ready_len(&self) -> usize {
        self.lock().map(|s| s.ready.len()).unwrap_or(0)
    }

    pub fn in_flight_len(&self) -> usize {
        self.lock().map(|s| s.in_flight.len()).unwrap_or(0)
    }

    pub fn deleted_count(&self) -> usize {
        self.lock().map(|s| s.deleted).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, QueueState>, QueueError> {
        self.state
            .lock()
            .map_err(|_| QueueError::Connection("in-memory queue lock poisoned".to_string()))
    }

    fn take_ready(&self, max_messages: usize) -> Result<Vec<QueueMessage>, QueueError> {
        let mut state = self.lock()?;
        let take = max_messages.min(state.ready.len());
        let mut batch = Vec::with_capacity(take);
        for _ in 0..take {
            if let Some(mut message) = state.ready.pop_front() {
                message.receipt = Uuid::now_v7().to_string();
                state.in_flight.insert(message.receipt.clone(), message.clone());
                batch.push(message);
            }
        }
        Ok(batch)
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let remaining = self.injected_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.injected_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(QueueError::Connection(format!("{}: injected failure", self.name)));
        }

        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let batch = self.take_ready(max_messages)?;
        if !batch.is_empty() {
            return Ok(batch);
        }

        let _ = tokio::time::timeout(wait, notified).await;
        self.take_ready(max_messages)
    }

    async fn delete(&self, receipt: &str) -> Result<(), QueueError> {
        let mut state = self.lock()?;
        match state.in_flight.remove(receipt) {
            Some(_) => {
                state.deleted += 1;
                Ok(())
            }
            None => Err(QueueError::UnknownReceipt(receipt.to_string())),
        }
    }

    async fn send(&self, body: &str) -> Result<String, QueueError> {
        let message_id = Uuid::now_v7().to_string();
        {
            let mut state = self.lock()?;
            state.ready.push_back(QueueMessage {
                message_id: message_id.clone(),
                receipt: String::new(),
                body: body.to_string(),
                sent_at: Utc::now().timestamp_millis().to_string(),
            });
        }
        self.notify.notify_waiters();
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn receive_moves_messages_in_flight_until_deleted() {
        let queue = InMemoryQueue::new("q");
        queue.send("a").await.unwrap();
        queue.send("b").await.unwrap();

        let batch = queue.receive(5, Duration::ZERO).await.unwrap();
        assert_eq!(batch.iter().map(|m| m.body.as_str()).collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(queue.in_flight_len(), 2);

        queue.delete(&batch[0].receipt).await.unwrap();
        assert_eq!(queue.in_flight_len(), 1);
        assert_eq!(queue.deleted_count(), 1);
        assert!(matches!(
            queue.delete(&batch[0].receipt).await,
            Err(QueueError::UnknownReceipt(_))
        ));
    }

    #[tokio::test]
    async fn receive_respects_batch_size() {
        let queue = InMemoryQueue::new("q");
        for body in ["1", "2", "3"] {
            queue.send(body).await.unwrap();
        }
        assert_eq!(queue.receive(2, Duration::ZERO).await.unwrap().len(), 2);
        assert_eq!(queue.ready_len(), 1);
    }

    #[tokio::test]
    async fn empty_receive_returns_after_wait() {
        let queue = InMemoryQueue::new("q");
        let batch = queue.receive(5, Duration::from_millis(20)).await.unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn long_poll_wakes_on_send() {
        let queue = InMemoryQueue::arc("q");
        let receiver = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.receive(1, Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.send("late").await.unwrap();

        let batch = receiver.await.unwrap().unwrap();
        assert_eq!(batch[0].body, "late");
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let queue = InMemoryQueue::new("q");
        queue.fail_next_receives(2);
        assert!(queue.receive(1, Duration::ZERO).await.is_err());
        assert!(queue.receive(1, Duration::ZERO).await.is_err());
        assert!(queue.receive(1, Duration::ZERO).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn requeued_messages_are_redelivered() {
        let queue = InMemoryQueue::new("q");
        queue.send("x").await.unwrap();
        let first = queue.receive(1, Duration::ZERO).await.unwrap();

        assert_eq!(queue.requeue_in_flight().unwrap(), 1);
        let again = queue.receive(1, Duration::ZERO).await.unwrap();

        assert_eq!(again[0].message_id, first[0].message_id);
        assert_ne!(again[0].receipt, first[0].receipt);
    }
}
