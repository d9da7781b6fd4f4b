//! Storage notification sent when an object lands in the upload bucket.

use serde::{Deserialize, Deserializer, Serialize};

use crate::event::Event;

/// `configurationId` of the bucket notification that fires for uploaded
/// source videos. Records carrying any other id are ignored.
pub const UPLOAD_SENTINEL: &str = "VideoUploaded";

/// `{ "Records": [ { "s3": { ... } } ] }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadCompletedEvent {
    #[serde(rename = "Records", default, deserialize_with = "null_as_default")]
    pub records: Vec<UploadRecord>,
}

impl UploadCompletedEvent {
    /// Records produced by the upload notification, in delivery order.
    pub fn relevant_records(&self) -> impl Iterator<Item = &UploadRecord> {
        self.records.iter().filter(|r| r.is_video_upload())
    }
}

impl Event for UploadCompletedEvent {
    const EVENT_TYPE: &'static str = "storage.upload_completed";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    #[serde(rename = "eventName", default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub s3: UploadEntity,
}

impl UploadRecord {
    pub fn is_video_upload(&self) -> bool {
        self.s3.configuration_id == UPLOAD_SENTINEL
    }

    /// Object key; the correlation key of the originating request.
    pub fn key(&self) -> &str {
        &self.s3.object.key
    }

    pub fn size(&self) -> i64 {
        self.s3.object.size
    }

    pub fn bucket(&self) -> &str {
        &self.s3.bucket.name
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadEntity {
    #[serde(rename = "configurationId", default, deserialize_with = "null_as_default")]
    pub configuration_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub bucket: UploadBucket,
    #[serde(default, deserialize_with = "null_as_default")]
    pub object: UploadObject,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadBucket {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadObject {
    #[serde(default, deserialize_with = "null_as_default")]
    pub key: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub size: i64,
}

/// Explicit `null` reads like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
