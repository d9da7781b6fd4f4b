//! Recording dispatch doubles for tests/dev.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use frameshot_core::RequestId;
use frameshot_requests::Request;

use super::{DispatchError, NotificationDispatcher, StatusMailer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchCall {
    ConversionJob { request: Request },
    StatusMail { request: Request, status_text: String },
}

/// Dispatcher that records every call. Can be told to fail, in which case the
/// call is still recorded.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    calls: Mutex<Vec<DispatchCall>>,
    fail_jobs: AtomicBool,
    fail_mails: AtomicBool,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_jobs(&self, fail: bool) {
        self.fail_jobs.store(fail, Ordering::SeqCst);
    }

    pub fn fail_mails(&self, fail: bool) {
        self.fail_mails.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<DispatchCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn jobs(&self) -> Vec<Request> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                DispatchCall::ConversionJob { request } => Some(request),
                DispatchCall::StatusMail { .. } => None,
            })
            .collect()
    }

    pub fn mails(&self) -> Vec<(Request, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                DispatchCall::StatusMail { request, status_text } => Some((request, status_text)),
                DispatchCall::ConversionJob { .. } => None,
            })
            .collect()
    }

    fn record(&self, call: DispatchCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn enqueue_conversion_job(&self, request: &Request) -> Result<(), DispatchError> {
        self.record(DispatchCall::ConversionJob {
            request: request.clone(),
        });
        if self.fail_jobs.load(Ordering::SeqCst) {
            return Err(DispatchError::Queue(crate::queue::QueueError::Connection(
                "job queue unavailable".to_string(),
            )));
        }
        Ok(())
    }

    async fn send_status_mail(&self, request: &Request, status_text: &str) -> Result<(), DispatchError> {
        self.record(DispatchCall::StatusMail {
            request: request.clone(),
            status_text: status_text.to_string(),
        });
        if self.fail_mails.load(Ordering::SeqCst) {
            return Err(DispatchError::Mail("mail provider unavailable".to_string()));
        }
        Ok(())
    }
}

/// Mailer that records `(request id, status text)` pairs.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(RequestId, String)>>,
    attempts: AtomicUsize,
    failing: bool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(RequestId, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusMailer for RecordingMailer {
    async fn notify_request_status(&self, request: &Request, status_text: &str) -> Result<(), DispatchError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(DispatchError::Mail("mail provider unavailable".to_string()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((request.id, status_text.to_string()));
        }
        Ok(())
    }
}
