//! `frameshot-core`: shared domain building blocks.
//!
//! Pure domain primitives only; nothing in here performs IO.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::RequestId;
