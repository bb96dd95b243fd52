use crate::backend::{Backend, BackendType, ObjectInfo};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::io;
use std::sync::RwLock;

/// Backend holding every object in memory. Mostly useful for tests.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: RwLock<BTreeMap<String, (Bytes, DateTime<Utc>)>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn missing(path: &str) -> Error {
        Error::backend(path, io::Error::new(io::ErrorKind::NotFound, "no such object"))
    }

    fn poisoned(path: &str) -> Error {
        Error::backend(path, io::Error::other("memory backend lock poisoned"))
    }

    /// Flips one byte of a stored object in place.
    pub fn corrupt(&self, path: &str, offset: usize) -> Result<()> {
        let mut objects = self.objects.write().map_err(|_| Self::poisoned(path))?;
        let (data, _) = objects.get_mut(path).ok_or_else(|| Self::missing(path))?;
        let mut bytes = data.to_vec();
        let byte = bytes
            .get_mut(offset)
            .ok_or_else(|| Error::Backend(format!("offset {} beyond end of {}", offset, path)))?;
        *byte ^= 0xff;
        *data = Bytes::from(bytes);
        Ok(())
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let objects = self.objects.read().map_err(|_| Self::poisoned(path))?;
        Ok(objects.contains_key(path))
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        let objects = self.objects.read().map_err(|_| Self::poisoned(path))?;
        objects
            .get(path)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| Self::missing(path))
    }

    async fn read_range(&self, path: &str, offset: u64, length: u64) -> Result<Bytes> {
        let data = self.read(path).await?;
        let start = (offset as usize).min(data.len());
        let end = offset.saturating_add(length).min(data.len() as u64) as usize;
        Ok(data.slice(start..end))
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<()> {
        let mut objects = self.objects.write().map_err(|_| Self::poisoned(path))?;
        objects.insert(path.to_string(), (data, Utc::now()));
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let mut objects = self.objects.write().map_err(|_| Self::poisoned(path))?;
        objects.remove(path);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let objects = self.objects.read().map_err(|_| Self::poisoned(prefix))?;
        let dir = format!("{}/", prefix.trim_end_matches('/'));
        Ok(objects
            .keys()
            .filter(|key| key.starts_with(&dir) && !key[dir.len()..].contains('/'))
            .cloned()
            .collect())
    }

    async fn stat(&self, path: &str) -> Result<ObjectInfo> {
        let objects = self.objects.read().map_err(|_| Self::poisoned(path))?;
        let (data, modified) = objects.get(path).ok_or_else(|| Self::missing(path))?;
        Ok(ObjectInfo {
            path: path.to_string(),
            size: data.len() as u64,
            modified: *modified,
        })
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Memory
    }
}
