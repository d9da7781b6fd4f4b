//! Structural decoding of raw queue bodies into typed events.
//!
//! Decoding is all-or-nothing: a body that does not match the target shape is
//! reported as a [`DecodeError`] and the caller drops the message.

use serde::de::DeserializeOwned;

use crate::conversion::ConversionOutputEvent;
use crate::event::Event;
use crate::upload::UploadCompletedEvent;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("empty message body")]
    Empty,
    #[error("malformed {event_type} payload: {source}")]
    Malformed {
        event_type: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Decode `body` into `E`.
pub fn decode<E>(body: &str) -> Result<E, DecodeError>
where
    E: Event + DeserializeOwned,
{
    if body.trim().is_empty() {
        return Err(DecodeError::Empty);
    }
    serde_json::from_str(body).map_err(|source| DecodeError::Malformed {
        event_type: E::EVENT_TYPE,
        source,
    })
}

pub fn decode_upload_event(body: &str) -> Result<UploadCompletedEvent, DecodeError> {
    decode(body)
}

pub fn decode_conversion_output(body: &str) -> Result<ConversionOutputEvent, DecodeError> {
    decode(body)
}
