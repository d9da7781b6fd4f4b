//! Queue messages: the transport envelope, the two inbound event shapes and
//! the outbound conversion job.

pub mod conversion;
pub mod decoder;
pub mod envelope;
pub mod event;
pub mod job;
pub mod upload;

pub use conversion::{ConversionOutputEvent, SUCCESS_STATUS};
pub use decoder::{DecodeError, decode, decode_conversion_output, decode_upload_event};
pub use envelope::EventMessage;
pub use event::Event;
pub use job::ConversionJob;
pub use upload::{UPLOAD_SENTINEL, UploadBucket, UploadCompletedEvent, UploadObject, UploadRecord};
