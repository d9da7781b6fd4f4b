//! Infrastructure layer: request lifecycle, queue consumers and the adapters
//! behind their ports (Postgres, Redis streams, SendGrid, object storage).

pub mod config;
pub mod dispatch;
pub mod lifecycle;
pub mod queue;
pub mod storage;
pub mod store;
pub mod workers;

mod integration_tests;

pub use config::{ConfigError, WorkerConfig};
pub use lifecycle::{CreateRequest, LifecycleError, OutputReport, RequestLifecycle, UploadReport};
