use crate::index::Index;
use crate::pack;
use crate::repository::Repository;
use crate::tree::Tree;
use crate::{BlobKind, Error, ObjectID, Result};
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::debug;

/// Read side of the content-addressed blob store.
///
/// Holds no mutable state: published blobs never change, so clones may load
/// concurrently without coordination. It can only be built from a loaded [`Index`].
#[derive(Clone)]
pub struct ObjectStore {
    repo: Arc<Repository>,
    index: Arc<Index>,
}

impl ObjectStore {
    pub fn new(repo: Arc<Repository>, index: Arc<Index>) -> Self {
        Self { repo, index }
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Returns the verified plaintext of blob `id`.
    ///
    /// # Errors
    ///
    /// * `Error::ObjectNotFound` - `id` is not in the index
    /// * `Error::BackendUnavailable` - the pack could not be read
    /// * `Error::IntegrityViolation` - the index disagrees with `kind`, or the bytes
    ///   fail authentication, length or hash checks
    pub async fn load(&self, id: ObjectID, kind: BlobKind) -> Result<Bytes> {
        let entry = self.index.lookup(&id).ok_or(Error::ObjectNotFound { id })?;
        if entry.kind != kind {
            return Err(Error::integrity(
                id,
                format!("index lists a {} blob where a {} blob was expected", entry.kind, kind),
            ));
        }

        debug!(blob = %id.short_string(), pack = %entry.pack_id.short_string(), offset = entry.offset, "Loading blob");
        let sealed = self
            .repo
            .read_pack_range(&entry.pack_id, entry.offset, entry.length as u64)
            .await?;

        pack::open_blob(id, entry.kind, entry.length, entry.raw_length, &sealed, self.repo.encryptor())
    }

    /// Loads several blobs concurrently, returning them in the order of `ids`.
    pub async fn load_many(&self, ids: &[ObjectID], kind: BlobKind, concurrency: usize) -> Result<Vec<Bytes>> {
        futures::stream::iter(ids.iter().copied())
            .map(|id| self.load(id, kind))
            .buffered(concurrency.max(1))
            .try_collect()
            .await
    }

    pub async fn load_tree(&self, id: ObjectID) -> Result<Tree> {
        let data = self.load(id, BlobKind::Tree).await?;
        Tree::deserialize(id, &data)
    }
}
