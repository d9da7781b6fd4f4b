use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use frameshot_core::{DomainError, DomainResult, RequestId};

use crate::upload::{Upload, derive_video_key, validate_upload};

/// Lifecycle status of a conversion request.
///
/// `Pending → InProgress → {Completed, Failed}`; never backwards.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::InProgress => "IN_PROGRESS",
            RequestStatus::Completed => "COMPLETED",
            RequestStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            RequestStatus::Pending => 0,
            RequestStatus::InProgress => 1,
            RequestStatus::Completed | RequestStatus::Failed => 2,
        }
    }

    /// Whether `next` is a forward move from `self`.
    ///
    /// Terminal states have no outgoing transitions. Re-applying the current
    /// status is not a transition and returns `false`.
    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl core::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for RequestStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(RequestStatus::Pending),
            "IN_PROGRESS" => Ok(RequestStatus::InProgress),
            "COMPLETED" => Ok(RequestStatus::Completed),
            "FAILED" => Ok(RequestStatus::Failed),
            other => Err(DomainError::validation(format!("unknown request status: {other}"))),
        }
    }
}

/// Result reported by the conversion worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    /// Archive is available at the given URL.
    Succeeded { zip_url: String },
    Failed,
}

impl ConversionOutcome {
    pub fn target_status(&self) -> RequestStatus {
        match self {
            ConversionOutcome::Succeeded { .. } => RequestStatus::Completed,
            ConversionOutcome::Failed => RequestStatus::Failed,
        }
    }

    /// Text sent to the user in the status mail.
    pub fn status_text(&self) -> &'static str {
        match self {
            ConversionOutcome::Succeeded { .. } => "sucesso",
            ConversionOutcome::Failed => "erro",
        }
    }
}

/// A request that passed validation but has no store-assigned id yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    pub user_id: String,
    pub user_email: String,
    pub video_size: i64,
    pub video_key: String,
    pub created_at: DateTime<Utc>,
}

impl NewRequest {
    /// Validate `upload` and derive the correlation key from `now`.
    pub fn for_upload(
        user_id: impl Into<String>,
        user_email: impl Into<String>,
        upload: &Upload,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(DomainError::validation("user id cannot be empty"));
        }

        let extension = validate_upload(upload)?;
        let video_key = derive_video_key(&user_id, extension, now);

        Ok(Self {
            user_id,
            user_email: user_email.into(),
            video_size: upload.size,
            video_key,
            created_at: now,
        })
    }

    /// Attach the store-assigned id. Status starts at `Pending`.
    pub fn into_request(self, id: RequestId) -> Request {
        Request {
            id,
            user_id: self.user_id,
            user_email: self.user_email,
            video_size: self.video_size,
            video_key: self.video_key,
            zip_output_key: None,
            status: RequestStatus::Pending,
            created_at: self.created_at,
            finished_at: None,
        }
    }
}

/// Aggregate: a video conversion request.
///
/// Invariants (kept by the mutators below):
/// - `finished_at` is set iff the status is terminal
/// - `zip_output_key` is set only when `Completed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub user_id: String,
    pub user_email: String,
    pub video_size: i64,
    pub video_key: String,
    pub zip_output_key: Option<String>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Request {
    /// Upload landed in storage; conversion is about to be requested.
    pub fn start_conversion(&mut self) {
        self.status = RequestStatus::InProgress;
        self.zip_output_key = None;
        self.finished_at = None;
    }

    /// Apply the worker's result and stamp `finished_at`.
    pub fn finish(&mut self, outcome: &ConversionOutcome, at: DateTime<Utc>) {
        self.finished_at = Some(at);
        self.status = outcome.target_status();
        self.zip_output_key = match outcome {
            ConversionOutcome::Succeeded { zip_url } => Some(zip_url.clone()),
            ConversionOutcome::Failed => None,
        };
    }

    /// Check the aggregate invariants; used by stores before persisting.
    pub fn check_invariants(&self) -> DomainResult<()> {
        if self.status.is_terminal() != self.finished_at.is_some() {
            return Err(DomainError::validation(format!(
                "finished_at must be set iff status is terminal (status: {})",
                self.status
            )));
        }
        if self.zip_output_key.is_some() && self.status != RequestStatus::Completed {
            return Err(DomainError::validation(
                "zip_output_key is only allowed on completed requests",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn pending() -> Request {
        NewRequest::for_upload("u1", "u1@example.com", &Upload::new("clip.mp4", 2048), now())
            .unwrap()
            .into_request(RequestId::new(1))
    }

    #[test]
    fn new_request_starts_pending_with_derived_key() {
        let request = pending();
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.video_key, "videos_input/u1_2024-01-01-00-00-00.mp4");
        assert_eq!(request.video_size, 2048);
        assert!(request.finished_at.is_none());
        request.check_invariants().unwrap();
    }

    #[test]
    fn new_request_rejects_invalid_upload() {
        let err = NewRequest::for_upload("u1", "e", &Upload::new("clip.gif", 1), now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn new_request_rejects_blank_user() {
        assert!(NewRequest::for_upload(" ", "e", &Upload::new("clip.mp4", 1), now()).is_err());
    }

    #[test]
    fn transition_graph_is_forward_only() {
        use RequestStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Failed));
        assert!(Pending.can_transition_to(Completed));

        assert!(!InProgress.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(InProgress));
        assert!(!InProgress.can_transition_to(InProgress));
    }

    #[test]
    fn successful_finish_sets_url_and_timestamp() {
        let mut request = pending();
        request.start_conversion();
        request.finish(
            &ConversionOutcome::Succeeded {
                zip_url: "https://b.s3.r.amazonaws.com/out/1.zip".into(),
            },
            now(),
        );

        assert_eq!(request.status, RequestStatus::Completed);
        assert_eq!(request.finished_at, Some(now()));
        assert!(request.zip_output_key.is_some());
        request.check_invariants().unwrap();
    }

    #[test]
    fn failed_finish_leaves_zip_unset() {
        let mut request = pending();
        request.start_conversion();
        request.finish(&ConversionOutcome::Failed, now());

        assert_eq!(request.status, RequestStatus::Failed);
        assert!(request.zip_output_key.is_none());
        request.check_invariants().unwrap();
    }

    #[test]
    fn invariant_check_flags_inconsistent_rows() {
        let mut request = pending();
        request.status = RequestStatus::Completed;
        assert!(request.check_invariants().is_err());

        let mut request = pending();
        request.zip_output_key = Some("x".into());
        assert!(request.check_invariants().is_err());
    }

    #[test]
    fn status_round_trips_through_storage_text() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::InProgress,
            RequestStatus::Completed,
            RequestStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<RequestStatus>().unwrap(), status);
        }
        assert_eq!(
            serde_json::to_string(&RequestStatus::InProgress).unwrap(),
            "\"IN_PROGRESS\""
        );
        assert!("DONE".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn outcome_status_text() {
        assert_eq!(ConversionOutcome::Failed.status_text(), "erro");
        let ok = ConversionOutcome::Succeeded { zip_url: "u".into() };
        assert_eq!(ok.status_text(), "sucesso");
    }
}
