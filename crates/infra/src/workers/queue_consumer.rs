//! Long-polling queue consumer.
//!
//! One consumer per queue, one message at a time:
//! receive batch -> for each message: handler, then delete -> repeat.
//!
//! A failed receive is logged and retried after a fixed delay, forever.
//! Messages are deleted once the handler returns, whatever it did; a failed
//! delete only means the message will come back.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use frameshot_events::EventMessage;

use crate::queue::{MessageQueue, QueueError, QueueMessage};

/// Consumer configuration.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Upper bound of one receive batch
    pub max_messages: usize,
    /// Long-poll bound of one receive
    pub wait_time: Duration,
    /// Pause after a failed receive
    pub retry_delay: Duration,
    /// Name for logging
    pub name: String,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_messages: 5,
            wait_time: Duration::from_secs(5),
            retry_delay: Duration::from_secs(5),
            name: "queue-consumer".to_string(),
        }
    }
}

impl ConsumerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_max_messages(mut self, max: usize) -> Self {
        self.max_messages = max.max(1);
        self
    }

    pub fn with_wait_time(mut self, wait: Duration) -> Self {
        self.wait_time = wait;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

/// Consumer runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ConsumerStats {
    pub batches: u64,
    pub messages_received: u64,
    pub messages_handled: u64,
    pub messages_deleted: u64,
    pub receive_errors: u64,
    pub delete_errors: u64,
}

/// Handle to control a running consumer.
#[derive(Debug)]
pub struct ConsumerHandle {
    name: String,
    shutdown: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
    stats: Arc<Mutex<ConsumerStats>>,
}

impl ConsumerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request shutdown and wait for the loop to exit.
    ///
    /// The loop notices the request between batches, so this can take up to
    /// one receive wait plus the handling of the current batch.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                error!(consumer = %self.name, error = %e, "consumer task ended abnormally");
            }
        }
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, |j| j.is_finished())
    }
}

/// Polls one queue and feeds every message to a handler.
pub struct QueueConsumer<F> {
    queue: Arc<dyn MessageQueue>,
    handler: F,
    config: ConsumerConfig,
    stats: Arc<Mutex<ConsumerStats>>,
}

impl<F, Fut> QueueConsumer<F>
where
    F: Fn(EventMessage) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
{
    pub fn new(queue: Arc<dyn MessageQueue>, handler: F, config: ConsumerConfig) -> Self {
        Self {
            queue,
            handler,
            config,
            stats: Arc::new(Mutex::new(ConsumerStats::default())),
        }
    }

    /// Spawn the consumer loop on the tokio runtime.
    pub fn spawn(self) -> ConsumerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = self.stats.clone();
        let name = self.config.name.clone();

        let join = tokio::spawn(self.run(shutdown_rx));

        ConsumerHandle {
            name,
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        }
    }

    /// Run until `shutdown` turns `true` (or its sender is dropped).
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(consumer = %self.config.name, queue = %self.queue.name(), "queue consumer started");

        loop {
            if stop_requested(&shutdown) {
                break;
            }

            if let Err(e) = self.poll_once().await {
                error!(
                    consumer = %self.config.name,
                    queue = %self.queue.name(),
                    error = %e,
                    "failed to receive messages"
                );
                tokio::select! {
                    _ = tokio::time::sleep(self.config.retry_delay) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }

        info!(consumer = %self.config.name, queue = %self.queue.name(), "queue consumer stopped");
    }

    /// Receive one batch and process it; returns the number of messages.
    pub async fn poll_once(&self) -> Result<usize, QueueError> {
        let received = self
            .queue
            .receive(self.config.max_messages, self.config.wait_time)
            .await;

        let batch = match received {
            Ok(batch) => batch,
            Err(e) => {
                self.update_stats(|s| s.receive_errors += 1);
                return Err(e);
            }
        };

        let count = batch.len();
        self.update_stats(|s| {
            s.batches += 1;
            s.messages_received += count as u64;
        });

        for message in batch {
            self.process(message).await;
        }

        Ok(count)
    }

    async fn process(&self, message: QueueMessage) {
        let event = EventMessage::new(
            message.message_id.as_str(),
            self.queue.name(),
            message.body,
            message.sent_at,
        );

        debug!(consumer = %self.config.name, message_id = %message.message_id, "handling message");
        let _ = (self.handler)(event).await;
        self.update_stats(|s| s.messages_handled += 1);

        match self.queue.delete(&message.receipt).await {
            Ok(()) => self.update_stats(|s| s.messages_deleted += 1),
            Err(e) => {
                self.update_stats(|s| s.delete_errors += 1);
                error!(
                    consumer = %self.config.name,
                    message_id = %message.message_id,
                    error = %e,
                    "failed to delete message"
                );
            }
        }
    }

    fn update_stats(&self, apply: impl FnOnce(&mut ConsumerStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            apply(&mut stats);
        }
    }
}

fn stop_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}
