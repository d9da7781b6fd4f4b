//! Result message published by the conversion worker.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use frameshot_core::RequestId;

use crate::event::Event;

/// Status token meaning the archive was produced.
pub const SUCCESS_STATUS: &str = "OK";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionOutputEvent {
    pub id: RequestId,
    #[serde(default)]
    pub id_user: String,
    /// `"OK"` on success; any other value is a failure.
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub s3_zip_file_key: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub creation_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub finished_date: Option<DateTime<Utc>>,
}

impl ConversionOutputEvent {
    pub fn is_success(&self) -> bool {
        self.status == SUCCESS_STATUS
    }
}

impl Event for ConversionOutputEvent {
    const EVENT_TYPE: &'static str = "conversion.output";
}

/// RFC 3339, or a zone-less `YYYY-MM-DDTHH:MM:SS[.fff]` read as UTC.
///
/// The worker emits the zone-less form.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };

    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }

    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(|e| serde::de::Error::custom(format!("invalid timestamp {raw:?}: {e}")))
}
