//! Outbound side effects of the lifecycle: conversion jobs and status mails.
//!
//! Both are fire-and-forget from the lifecycle's point of view. A failure is
//! returned so it can be logged, but it never rolls back a status change.

pub mod mail;
pub mod recording;

pub use mail::{SendGridMailer, StatusMailer};
pub use recording::{DispatchCall, RecordingDispatcher, RecordingMailer};

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use frameshot_events::ConversionJob;
use frameshot_requests::Request;

use crate::queue::{MessageQueue, QueueError};

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Ask the conversion worker to process `request`'s upload.
    async fn enqueue_conversion_job(&self, request: &Request) -> Result<(), DispatchError>;

    /// Tell the owner how the conversion ended (`"sucesso"` / `"erro"`).
    async fn send_status_mail(&self, request: &Request, status_text: &str) -> Result<(), DispatchError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("failed to encode job: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to enqueue job: {0}")]
    Queue(#[from] QueueError),
    #[error("mail delivery failed: {0}")]
    Mail(String),
}

/// Production dispatcher: jobs go to a queue, mails to a [`StatusMailer`].
pub struct OutboundDispatcher {
    job_queue: Arc<dyn MessageQueue>,
    mailer: Arc<dyn StatusMailer>,
}

impl OutboundDispatcher {
    pub fn new(job_queue: Arc<dyn MessageQueue>, mailer: Arc<dyn StatusMailer>) -> Self {
        Self { job_queue, mailer }
    }
}

#[async_trait]
impl NotificationDispatcher for OutboundDispatcher {
    async fn enqueue_conversion_job(&self, request: &Request) -> Result<(), DispatchError> {
        let body = ConversionJob::from(request).to_json()?;
        let message_id = self.job_queue.send(&body).await?;
        debug!(
            request_id = %request.id,
            queue = %self.job_queue.name(),
            message_id = %message_id,
            "conversion job enqueued"
        );
        Ok(())
    }

    async fn send_status_mail(&self, request: &Request, status_text: &str) -> Result<(), DispatchError> {
        self.mailer.notify_request_status(request, status_text).await
    }
}
