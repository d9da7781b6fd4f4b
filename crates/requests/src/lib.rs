//! Conversion request domain: the aggregate, its status machine and the
//! upload rules applied when a request is created.

pub mod request;
pub mod upload;

pub use request::{ConversionOutcome, NewRequest, Request, RequestStatus};
pub use upload::{
    ALLOWED_EXTENSIONS, MAX_UPLOAD_MB, Upload, VIDEO_KEY_PREFIX, derive_video_key,
    validate_upload,
};
