//! Request lifecycle: creation plus the two queue-driven transitions.
//!
//! ```text
//! Pending --upload notification--> InProgress --conversion output--> Completed | Failed
//! ```
//!
//! Handlers never return errors to the consumer. Every failure is logged and
//! the message is acknowledged anyway; there is no dead-letter path and no
//! deduplication, so a redelivered message is applied again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};

use frameshot_core::{DomainError, RequestId};
use frameshot_events::{
    Event, EventMessage, UploadRecord, decode_conversion_output, decode_upload_event,
};
use frameshot_requests::{ConversionOutcome, NewRequest, Request, RequestStatus, Upload};

use crate::dispatch::NotificationDispatcher;
use crate::storage::{ObjectStorage, StorageError};
use crate::store::{RequestStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("request not found: {0}")]
    NotFound(RequestId),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("upload failed: {0}")]
    Upload(#[from] StorageError),
}

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => LifecycleError::NotFound(id),
            StoreError::Conflict(msg) => LifecycleError::Conflict(msg),
            StoreError::Storage(msg) => LifecycleError::Storage(msg),
        }
    }
}

impl From<DomainError> for LifecycleError {
    fn from(err: DomainError) -> Self {
        LifecycleError::Validation(err.to_string())
    }
}

/// Input of [`RequestLifecycle::create`], as handed over by the HTTP layer.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub user_id: String,
    pub user_email: String,
    pub upload: Upload,
    pub content: Vec<u8>,
}

/// What an upload notification did, record by record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadReport {
    /// Requests moved to `InProgress`.
    pub started: usize,
    /// Relevant records with no matching request.
    pub unmatched: usize,
    /// Requests whose status forbids the transition.
    pub skipped: usize,
    /// Records aborted by a store error.
    pub failed: usize,
}

/// What a conversion output message did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputReport {
    /// Body did not decode.
    Dropped,
    NotFound(RequestId),
    /// Transition not allowed from the stored status.
    Skipped(RequestId),
    /// Store error; nothing was notified.
    Aborted(RequestId),
    Applied(RequestId, RequestStatus),
}

/// Drives requests through their lifecycle.
///
/// Cheap to clone; both consumers share one instance.
#[derive(Clone)]
pub struct RequestLifecycle {
    store: Arc<dyn RequestStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    storage: Arc<dyn ObjectStorage>,
}

impl RequestLifecycle {
    pub fn new(
        store: Arc<dyn RequestStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            storage,
        }
    }

    /// Validate the upload, store the file and persist a `Pending` request.
    pub async fn create(&self, input: CreateRequest) -> Result<Request, LifecycleError> {
        self.create_at(input, Utc::now()).await
    }

    /// [`create`](Self::create) with an explicit clock reading.
    #[instrument(skip(self, input), fields(user_id = %input.user_id), err)]
    pub async fn create_at(
        &self,
        input: CreateRequest,
        now: DateTime<Utc>,
    ) -> Result<Request, LifecycleError> {
        let new_request = NewRequest::for_upload(input.user_id, input.user_email, &input.upload, now)?;

        // Avoid overwriting the object of an existing request; the store's
        // unique key still decides races.
        if self.store.get_by_video_key(&new_request.video_key).await?.is_some() {
            return Err(LifecycleError::Conflict(format!(
                "video key already in use: {}",
                new_request.video_key
            )));
        }

        self.storage
            .put_object(&new_request.video_key, &input.content)
            .await?;

        let request = self.store.create(new_request).await?;
        info!(request_id = %request.id, video_key = %request.video_key, "request created");
        Ok(request)
    }

    pub async fn get(&self, id: RequestId) -> Result<Request, LifecycleError> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or(LifecycleError::NotFound(id))
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<Request>, LifecycleError> {
        Ok(self.store.list(user_id).await?)
    }

    /// Persist an externally modified request.
    pub async fn update(&self, request: &Request) -> Result<Request, LifecycleError> {
        Ok(self.store.update(request).await?)
    }

    /// Handle a storage notification: `Pending -> InProgress` and enqueue the
    /// conversion job, for each relevant record.
    #[instrument(skip(self, message), fields(message_id = %message.message_id(), source = %message.source()))]
    pub async fn handle_upload_notification(&self, message: &EventMessage) -> UploadReport {
        let mut report = UploadReport::default();

        let event = match decode_upload_event(message.body()) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "dropping undecodable upload notification");
                return report;
            }
        };

        debug!(
            event_type = event.event_type(),
            records = event.records.len(),
            "upload notification decoded"
        );
        for record in event.relevant_records() {
            self.start_conversion(record, &mut report).await;
        }

        report
    }

    async fn start_conversion(&self, record: &UploadRecord, report: &mut UploadReport) {
        let key = record.key();

        let mut request = match self.store.get_by_video_key(key).await {
            Ok(Some(request)) => request,
            Ok(None) => {
                debug!(video_key = %key, "no request for uploaded object");
                report.unmatched += 1;
                return;
            }
            Err(e) => {
                error!(video_key = %key, error = %e, "request lookup failed");
                report.failed += 1;
                return;
            }
        };

        if !allows(request.status, RequestStatus::InProgress) {
            warn!(
                request_id = %request.id,
                status = %request.status,
                "upload notification ignored for request past pending"
            );
            report.skipped += 1;
            return;
        }

        request.start_conversion();
        let request = match self.store.update(&request).await {
            Ok(saved) => saved,
            Err(e) => {
                error!(request_id = %request.id, error = %e, "failed to persist in-progress status");
                report.failed += 1;
                return;
            }
        };
        report.started += 1;

        match self.dispatcher.enqueue_conversion_job(&request).await {
            Ok(()) => info!(request_id = %request.id, "conversion started"),
            Err(e) => warn!(request_id = %request.id, error = %e, "failed to enqueue conversion job"),
        }
    }

    /// Handle the conversion worker's result: `InProgress -> Completed | Failed`
    /// and mail the owner.
    #[instrument(skip(self, message), fields(message_id = %message.message_id(), source = %message.source()))]
    pub async fn handle_conversion_output(&self, message: &EventMessage) -> OutputReport {
        let event = match decode_conversion_output(message.body()) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "dropping undecodable conversion output");
                return OutputReport::Dropped;
            }
        };
        let id = event.id;
        debug!(event_type = event.event_type(), request_id = %id, status = %event.status, "conversion output decoded");

        let mut request = match self.store.get_by_id(id).await {
            Ok(Some(request)) => request,
            Ok(None) => {
                debug!(request_id = %id, "conversion output for unknown request");
                return OutputReport::NotFound(id);
            }
            Err(e) => {
                error!(request_id = %id, error = %e, "request lookup failed");
                return OutputReport::Aborted(id);
            }
        };

        let outcome = if event.is_success() {
            ConversionOutcome::Succeeded {
                zip_url: self.storage.public_url(&event.s3_zip_file_key),
            }
        } else {
            ConversionOutcome::Failed
        };
        let target = outcome.target_status();

        if !allows(request.status, target) {
            warn!(
                request_id = %id,
                status = %request.status,
                target = %target,
                "conversion output ignored for finished request"
            );
            return OutputReport::Skipped(id);
        }

        request.finish(&outcome, Utc::now());
        let request = match self.store.update(&request).await {
            Ok(saved) => saved,
            Err(e) => {
                error!(request_id = %id, error = %e, "failed to persist conversion result");
                return OutputReport::Aborted(id);
            }
        };

        if let Err(e) = self
            .dispatcher
            .send_status_mail(&request, outcome.status_text())
            .await
        {
            warn!(request_id = %id, error = %e, "status mail not sent");
        }

        info!(request_id = %id, status = %request.status, "conversion finished");
        OutputReport::Applied(id, request.status)
    }
}

/// Forward moves, plus re-applying the current status (redelivery).
fn allows(current: RequestStatus, target: RequestStatus) -> bool {
    current == target || current.can_transition_to(target)
}
