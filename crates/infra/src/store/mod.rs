//! Request persistence boundary.
//!
//! The lifecycle only ever sees [`RequestStore`]; backends live next to it.

pub mod in_memory;
pub mod postgres;

pub use in_memory::{InMemoryRequestStore, StoreStats};
pub use postgres::PostgresRequestStore;

use async_trait::async_trait;

use frameshot_core::RequestId;
use frameshot_requests::{NewRequest, Request};

/// Request store abstraction.
///
/// Shared by both queue consumers, so implementations must be safe for
/// concurrent use.
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Persist a new request and return it with its assigned id.
    ///
    /// Fails with [`StoreError::Conflict`] when `video_key` is already taken.
    async fn create(&self, request: NewRequest) -> Result<Request, StoreError>;

    async fn get_by_id(&self, id: RequestId) -> Result<Option<Request>, StoreError>;

    /// Lookup by correlation key (the uploaded object's key).
    async fn get_by_video_key(&self, video_key: &str) -> Result<Option<Request>, StoreError>;

    /// Overwrite the mutable fields of an existing request.
    async fn update(&self, request: &Request) -> Result<Request, StoreError>;

    /// All requests of a user, oldest first.
    async fn list(&self, user_id: &str) -> Result<Vec<Request>, StoreError>;
}

/// Request store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("request not found: {0}")]
    NotFound(RequestId),
    #[error("conflicting request: {0}")]
    Conflict(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}
