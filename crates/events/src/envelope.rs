use serde::{Deserialize, Serialize};

/// Transport envelope for one queue message.
///
/// Built by the queue consumer and handed to a handler. It carries no identity
/// beyond what the queue provides, so the same logical message may show up
/// more than once (at-least-once delivery).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMessage {
    message_id: String,
    /// Queue the message was received from.
    source: String,
    /// Raw payload, still undecoded.
    body: String,
    /// Provider-supplied timestamp (e.g. a sent-at epoch in millis).
    date: String,
}

impl EventMessage {
    pub fn new(
        message_id: impl Into<String>,
        source: impl Into<String>,
        body: impl Into<String>,
        date: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            source: source.into(),
            body: body.into(),
            date: date.into(),
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn date(&self) -> &str {
        &self.date
    }
}
