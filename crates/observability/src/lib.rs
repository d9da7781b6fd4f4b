//! Process-wide tracing setup for frameshot binaries.

pub mod tracing;

pub use crate::tracing::LogFormat;

/// Initialize logging with the format taken from `LOG_FORMAT`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    tracing::init(LogFormat::from_env());
}
