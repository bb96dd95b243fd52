use crate::index::IndexFile;
use crate::memory::MemoryBackend;
use crate::pack::PackWriter;
use crate::repository::tests::fast_kdf;
use crate::{BlobKind, ObjectID, Repository, Session, Snapshot, SnapshotID, Tree};
use std::sync::Arc;

/// Builds a small repository in memory through the real write codec.
pub(crate) struct Fixture {
    backend: Arc<MemoryBackend>,
    repo: Repository,
    writer: PackWriter,
}

impl Fixture {
    pub(crate) async fn new() -> Self {
        let backend = Arc::new(MemoryBackend::new());
        let repo = Repository::init_with_params(backend.clone(), "test", fast_kdf())
            .await
            .unwrap();
        Self {
            backend,
            repo,
            writer: PackWriter::new(),
        }
    }

    pub(crate) fn backend(&self) -> Arc<MemoryBackend> {
        self.backend.clone()
    }

    pub(crate) fn add_blob(&mut self, kind: BlobKind, data: &[u8]) -> ObjectID {
        self.writer.add_blob(kind, data, self.repo.encryptor()).unwrap()
    }

    pub(crate) fn add_tree(&mut self, tree: &Tree) -> ObjectID {
        let data = tree.serialize().unwrap();
        self.add_blob(BlobKind::Tree, &data)
    }

    /// Writes the pending pack and an index fragment describing it.
    pub(crate) async fn flush(&mut self) {
        let writer = std::mem::take(&mut self.writer);
        if writer.blob_count() == 0 {
            return;
        }
        let pack = writer.finish();
        self.repo.save_pack(&pack).await.unwrap();
        let mut file = IndexFile::new();
        file.add_pack(&pack);
        self.repo.save_index(&file).await.unwrap();
    }

    pub(crate) async fn add_snapshot(&mut self, snapshot: &Snapshot) -> SnapshotID {
        self.repo.save_snapshot(snapshot).await.unwrap()
    }

    pub(crate) async fn commit(mut self) -> Session {
        self.flush().await;
        Session::open(self.repo).await.unwrap()
    }
}
