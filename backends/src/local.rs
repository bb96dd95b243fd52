use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tidesnap_core::{Backend, BackendType, Error, ObjectInfo, Result};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Upper bound on what a range read reserves before any bytes arrive.
const READ_CHUNK: u64 = 1 << 20;

pub struct LocalBackend {
    base_path: PathBuf,
}

impl LocalBackend {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.base_path.join(path)
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| Error::backend(self.base_path.display().to_string(), e))?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        fs::try_exists(self.full_path(path))
            .await
            .map_err(|e| Error::backend(path, e))
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        let data = fs::read(self.full_path(path))
            .await
            .map_err(|e| Error::backend(path, e))?;
        Ok(Bytes::from(data))
    }

    async fn read_range(&self, path: &str, offset: u64, length: u64) -> Result<Bytes> {
        let mut file = fs::File::open(self.full_path(path))
            .await
            .map_err(|e| Error::backend(path, e))?;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| Error::backend(path, e))?;

        let mut data = Vec::with_capacity(length.min(READ_CHUNK) as usize);
        file.take(length)
            .read_to_end(&mut data)
            .await
            .map_err(|e| Error::backend(path, e))?;
        Ok(Bytes::from(data))
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<()> {
        let full_path = self.full_path(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::backend(path, e))?;
        }
        fs::write(&full_path, &data)
            .await
            .map_err(|e| Error::backend(path, e))?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path);
        if full_path.is_file() {
            fs::remove_file(&full_path)
                .await
                .map_err(|e| Error::backend(path, e))?;
        } else if full_path.is_dir() {
            fs::remove_dir_all(&full_path)
                .await
                .map_err(|e| Error::backend(path, e))?;
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let full_path = self.full_path(prefix);
        let mut results = Vec::new();

        if full_path.is_dir() {
            let mut entries = fs::read_dir(&full_path)
                .await
                .map_err(|e| Error::backend(prefix, e))?;
            while let Some(entry) = entries.next_entry().await.map_err(|e| Error::backend(prefix, e))? {
                if let Some(name) = entry.file_name().to_str() {
                    results.push(format!("{}/{}", prefix, name));
                }
            }
        }

        results.sort();
        Ok(results)
    }

    async fn stat(&self, path: &str) -> Result<ObjectInfo> {
        let metadata = fs::metadata(self.full_path(path))
            .await
            .map_err(|e| Error::backend(path, e))?;

        let modified = metadata.modified().map_err(|e| Error::backend(path, e))?;
        let modified_dt: DateTime<Utc> = modified.into();

        Ok(ObjectInfo {
            path: path.to_string(),
            size: metadata.len(),
            modified: modified_dt,
        })
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Local
    }
}
