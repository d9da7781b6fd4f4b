/// A decoded inbound event.
///
/// Events are facts reported by other systems (object storage, the
/// conversion worker); the lifecycle reacts to them but never emits them.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable name used in logs and decode errors (e.g. "storage.upload_completed").
    const EVENT_TYPE: &'static str;

    fn event_type(&self) -> &'static str {
        Self::EVENT_TYPE
    }
}
