//! Upload acceptance rules and video-key derivation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use frameshot_core::{DomainError, DomainResult};

/// Extensions accepted for conversion.
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["mp4", "mkv", "avi", "webm", "mov"];

/// Upper bound on the upload size, in "MB" as computed by [`size_in_mb`].
pub const MAX_UPLOAD_MB: i64 = 500;

/// Storage prefix for uploaded source videos.
pub const VIDEO_KEY_PREFIX: &str = "videos_input/";

/// Metadata of an uploaded file, as received from the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upload {
    pub filename: String,
    /// Size in bytes.
    pub size: i64,
}

impl Upload {
    pub fn new(filename: impl Into<String>, size: i64) -> Self {
        Self {
            filename: filename.into(),
            size,
        }
    }

    /// The segment after the first `.` of the filename.
    ///
    /// `clip.final.mp4` yields `final`, which the allow-list then rejects.
    pub fn extension(&self) -> Option<&str> {
        self.filename.split('.').nth(1).filter(|ext| !ext.is_empty())
    }
}

/// `(bytes / 1024) / 1000`, truncating.
fn size_in_mb(bytes: i64) -> i64 {
    (bytes / 1024) / 1000
}

/// Validate an upload and return its extension.
///
/// The size limit is only evaluated once the extension is on the allow-list.
pub fn validate_upload(upload: &Upload) -> DomainResult<&str> {
    let extension = upload
        .extension()
        .filter(|ext| ALLOWED_EXTENSIONS.contains(ext))
        .ok_or_else(|| DomainError::validation("file extension not allowed"))?;

    if size_in_mb(upload.size) > MAX_UPLOAD_MB {
        return Err(DomainError::validation(format!(
            "file size is greater than {MAX_UPLOAD_MB}Mb"
        )));
    }

    Ok(extension)
}

/// `videos_input/{user_id}_{YYYY-MM-DD-HH-MM-SS}.{ext}` at second precision (UTC).
///
/// Two uploads of the same extension by the same user within one second map
/// to the same key; the store rejects the second one as a conflict.
pub fn derive_video_key(user_id: &str, extension: &str, at: DateTime<Utc>) -> String {
    format!(
        "{VIDEO_KEY_PREFIX}{user_id}_{}.{extension}",
        at.format("%Y-%m-%d-%H-%M-%S")
    )
}
