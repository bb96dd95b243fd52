use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Local,
    S3,
    Memory,
}

/// Byte-container collaborator underneath the repository.
///
/// Paths are `/`-separated object names such as `index/<id>` or `data/<id>.pack`.
/// Implementations report I/O failures as `Error::BackendUnavailable`; retry policy,
/// if any, is layered on top of a backend and never lives in the core.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn init(&self) -> Result<()>;

    async fn exists(&self, path: &str) -> Result<bool>;

    async fn read(&self, path: &str) -> Result<Bytes>;

    /// Reads up to `length` bytes starting at `offset`. A range running past the end
    /// of the object yields the bytes that exist; callers check the length.
    async fn read_range(&self, path: &str, offset: u64, length: u64) -> Result<Bytes>;

    async fn write(&self, path: &str, data: Bytes) -> Result<()>;

    async fn delete(&self, path: &str) -> Result<()>;

    /// Lists the objects directly under `prefix`, returned as `prefix/name`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    async fn stat(&self, path: &str) -> Result<ObjectInfo>;

    fn backend_type(&self) -> BackendType;
}

#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub path: String,
    pub size: u64,
    pub modified: chrono::DateTime<chrono::Utc>,
}
