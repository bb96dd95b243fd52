pub mod local;
pub mod retry;
pub mod s3;

pub use local::LocalBackend;
pub use retry::{RetryConfig, RetryingBackend, Retryable, retry_with_backoff};
pub use s3::S3Backend;
