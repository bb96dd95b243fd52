use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tidesnap_core::{Backend, BackendType, Error, ErrorKind, ObjectInfo, Result};
use tracing::{debug, warn};

/// Exponential backoff settings for [`RetryingBackend`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total tries per call, the first one included. Zero behaves like one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Stretch each delay by up to a quarter so parallel readers spread out.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(20),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (zero based).
    fn delay(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.max(1.0).powi(retry.min(i32::MAX as u32) as i32);
        let ms = (self.initial_backoff.as_millis() as f64 * factor).min(self.max_backoff.as_millis() as f64) as u64;
        if !self.jitter {
            return Duration::from_millis(ms);
        }
        Duration::from_millis(ms + rand::thread_rng().gen_range(0..=ms / 4))
    }
}

/// Whether a failed call is worth repeating unchanged.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for Error {
    fn is_retryable(&self) -> bool {
        match self.kind() {
            ErrorKind::BackendUnavailable => !self.is_missing_object(),
            ErrorKind::Other => matches!(self, Error::Io(_)),
            ErrorKind::NotFound
            | ErrorKind::AmbiguousReference
            | ErrorKind::MalformedTree
            | ErrorKind::IntegrityViolation => false,
        }
    }
}

/// Runs `operation` until it succeeds, fails permanently, or runs out of attempts.
pub async fn retry_with_backoff<F, Fut, T, E>(config: &RetryConfig, what: &str, mut operation: F) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Retryable + Display,
{
    let attempts = config.max_attempts.max(1);
    let mut tried = 1;

    loop {
        let error = match operation().await {
            Ok(value) => {
                if tried > 1 {
                    debug!(operation = what, attempts = tried, "Backend call recovered");
                }
                return Ok(value);
            }
            Err(error) if !error.is_retryable() => return Err(error),
            Err(error) => error,
        };

        if tried >= attempts {
            warn!(operation = what, attempts = tried, error = %error, "Giving up on backend call");
            return Err(error);
        }

        let delay = config.delay(tried - 1);
        warn!(
            operation = what,
            attempt = tried,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Backend call failed, retrying"
        );
        tokio::time::sleep(delay).await;
        tried += 1;
    }
}

/// A backend whose transient failures are retried before the repository sees them.
///
/// Integrity failures never originate here and missing objects are final, so
/// only availability errors are repeated.
pub struct RetryingBackend<B> {
    inner: B,
    config: RetryConfig,
}

impl<B: Backend> RetryingBackend<B> {
    pub fn new(inner: B, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }
}

#[async_trait]
impl<B: Backend> Backend for RetryingBackend<B> {
    async fn init(&self) -> Result<()> {
        retry_with_backoff(&self.config, "init", || self.inner.init()).await
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        retry_with_backoff(&self.config, "exists", || self.inner.exists(path)).await
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        retry_with_backoff(&self.config, "read", || self.inner.read(path)).await
    }

    async fn read_range(&self, path: &str, offset: u64, length: u64) -> Result<Bytes> {
        retry_with_backoff(&self.config, "read_range", || self.inner.read_range(path, offset, length)).await
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<()> {
        retry_with_backoff(&self.config, "write", || self.inner.write(path, data.clone())).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        retry_with_backoff(&self.config, "delete", || self.inner.delete(path)).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        retry_with_backoff(&self.config, "list", || self.inner.list(prefix)).await
    }

    async fn stat(&self, path: &str) -> Result<ObjectInfo> {
        retry_with_backoff(&self.config, "stat", || self.inner.stat(path)).await
    }

    fn backend_type(&self) -> BackendType {
        self.inner.backend_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tidesnap_core::{MemoryBackend, ObjectID};

    /// Fails the first `failures` reads with a connection reset.
    struct FlakyBackend {
        inner: MemoryBackend,
        failures: u32,
        reads: AtomicU32,
    }

    impl FlakyBackend {
        fn new(failures: u32) -> Self {
            Self {
                inner: MemoryBackend::new(),
                failures,
                reads: AtomicU32::new(0),
            }
        }

        fn reads(&self) -> u32 {
            self.reads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Backend for FlakyBackend {
        async fn init(&self) -> Result<()> {
            self.inner.init().await
        }

        async fn exists(&self, path: &str) -> Result<bool> {
            self.inner.exists(path).await
        }

        async fn read(&self, path: &str) -> Result<Bytes> {
            if self.reads.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(Error::backend(path, io::Error::new(io::ErrorKind::ConnectionReset, "reset")));
            }
            self.inner.read(path).await
        }

        async fn read_range(&self, path: &str, offset: u64, length: u64) -> Result<Bytes> {
            self.inner.read_range(path, offset, length).await
        }

        async fn write(&self, path: &str, data: Bytes) -> Result<()> {
            self.inner.write(path, data).await
        }

        async fn delete(&self, path: &str) -> Result<()> {
            self.inner.delete(path).await
        }

        async fn list(&self, prefix: &str) -> Result<Vec<String>> {
            self.inner.list(prefix).await
        }

        async fn stat(&self, path: &str) -> Result<ObjectInfo> {
            self.inner.stat(path).await
        }

        fn backend_type(&self) -> BackendType {
            self.inner.backend_type()
        }
    }

    fn instant(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn transient_read_failures_are_absorbed() {
        let backend = RetryingBackend::new(FlakyBackend::new(2), instant(3));
        backend.write("snapshots/a", Bytes::from_static(b"record")).await.unwrap();

        assert_eq!(&backend.read("snapshots/a").await.unwrap()[..], b"record");
        assert_eq!(backend.inner().reads(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let backend = RetryingBackend::new(FlakyBackend::new(10), instant(3));
        backend.write("snapshots/a", Bytes::from_static(b"record")).await.unwrap();

        let err = backend.read("snapshots/a").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
        assert!(!err.is_missing_object());
        assert_eq!(backend.inner().reads(), 3);
    }

    #[tokio::test]
    async fn missing_objects_fail_on_first_try() {
        let backend = RetryingBackend::new(FlakyBackend::new(0), instant(5));

        let err = backend.read("snapshots/absent").await.unwrap_err();
        assert!(err.is_missing_object());
        assert_eq!(backend.inner().reads(), 1);
    }

    #[tokio::test]
    async fn ranges_and_listing_pass_through() {
        let backend = RetryingBackend::new(MemoryBackend::new(), instant(2));
        backend.write("data/p", Bytes::from_static(b"abcdef")).await.unwrap();

        assert_eq!(&backend.read_range("data/p", 1, 3).await.unwrap()[..], b"bcd");
        assert_eq!(backend.list("data").await.unwrap(), ["data/p"]);
        assert_eq!(backend.backend_type(), BackendType::Memory);
    }

    #[test]
    fn only_availability_errors_are_retryable() {
        let reset = Error::backend("data/x", io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        let gone = Error::backend("data/x", io::Error::new(io::ErrorKind::NotFound, "gone"));
        let corrupt = Error::integrity(ObjectID::from_data(b"x"), "bad tag");
        let unknown = Error::ObjectNotFound {
            id: ObjectID::from_data(b"y"),
        };

        assert!(reset.is_retryable());
        assert!(Error::Backend("throttled".into()).is_retryable());
        assert!(!gone.is_retryable());
        assert!(!corrupt.is_retryable());
        assert!(!unknown.is_retryable());
        assert!(!Error::InvalidPassword.is_retryable());
    }

    #[test]
    fn delay_grows_until_capped() {
        let config = RetryConfig {
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(300),
            backoff_multiplier: 3.0,
            jitter: false,
            ..RetryConfig::default()
        };

        assert_eq!(config.delay(0), Duration::from_millis(50));
        assert_eq!(config.delay(1), Duration::from_millis(150));
        assert_eq!(config.delay(2), Duration::from_millis(300));
        assert_eq!(config.delay(40), Duration::from_millis(300));
    }

    #[test]
    fn jitter_adds_at_most_a_quarter() {
        let config = RetryConfig {
            initial_backoff: Duration::from_millis(400),
            jitter: true,
            ..RetryConfig::default()
        };
        for _ in 0..32 {
            let delay = config.delay(0);
            assert!(delay >= Duration::from_millis(400));
            assert!(delay <= Duration::from_millis(500));
        }
    }
}
