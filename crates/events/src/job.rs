use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use frameshot_core::RequestId;
use frameshot_requests::Request;

/// Job message asking the conversion worker to process an uploaded video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionJob {
    pub id: RequestId,
    pub id_user: String,
    pub file_size: i64,
    pub s3_file_key: String,
    pub creation_date: DateTime<Utc>,
}

impl From<&Request> for ConversionJob {
    fn from(request: &Request) -> Self {
        Self {
            id: request.id,
            id_user: request.user_id.clone(),
            file_size: request.video_size,
            s3_file_key: request.video_key.clone(),
            creation_date: request.created_at,
        }
    }
}

impl ConversionJob {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
