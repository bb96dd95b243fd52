use crate::index::Index;
use crate::repository::Repository;
use crate::resolve::{self, SnapshotFilter, SnapshotRef};
use crate::store::ObjectStore;
use crate::walker::{TreeWalker, WalkOptions};
use crate::{Error, Result, Snapshot, SnapshotID, Tree};
use futures::{StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::debug;

/// Snapshot records decrypted concurrently while enumerating.
const SNAPSHOT_LOAD_CONCURRENCY: usize = 8;

/// A repository whose index has been fully loaded.
///
/// Building a `Session` is the only way to obtain an [`ObjectStore`], so no blob
/// lookup can run against a partially loaded index. The index is immutable for
/// the lifetime of the session and the session may be cloned across tasks.
#[derive(Clone)]
pub struct Session {
    repo: Arc<Repository>,
    store: ObjectStore,
}

impl Session {
    pub async fn open(repo: Repository) -> Result<Self> {
        let index = repo.load_index().await?;
        let repo = Arc::new(repo);
        let store = ObjectStore::new(repo.clone(), Arc::new(index));
        Ok(Self { repo, store })
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn index(&self) -> &Index {
        self.store.index()
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub async fn load_snapshot(&self, id: &SnapshotID) -> Result<Snapshot> {
        self.repo.load_snapshot(id).await
    }

    /// Every snapshot in the repository, newest first. Any unreadable record fails the call.
    pub async fn snapshots(&self) -> Result<Vec<(SnapshotID, Snapshot)>> {
        let ids = self.repo.list_snapshots().await?;
        let mut snapshots: Vec<(SnapshotID, Snapshot)> = futures::stream::iter(ids)
            .map(|id| async move { Ok::<_, Error>((id, self.repo.load_snapshot(&id).await?)) })
            .buffer_unordered(SNAPSHOT_LOAD_CONCURRENCY)
            .try_collect()
            .await?;
        snapshots.sort_by(|(a_id, a), (b_id, b)| (b.time, b_id).cmp(&(a.time, a_id)));
        Ok(snapshots)
    }

    /// Resolves a full id, a unique id prefix, or `latest` narrowed by `filter`.
    ///
    /// Prefix references only list snapshot names; `latest` decrypts every record.
    pub async fn resolve_snapshot(&self, reference: &str, filter: &SnapshotFilter) -> Result<SnapshotID> {
        let id = match SnapshotRef::parse(reference)? {
            SnapshotRef::Latest => resolve::find_latest(&self.snapshots().await?, filter)?,
            SnapshotRef::Prefix(prefix) => resolve::find_by_prefix(&prefix, &self.repo.list_snapshots().await?)?,
        };
        debug!(reference = %reference, snapshot = %id.short_string(), "Resolved snapshot reference");
        Ok(id)
    }

    pub async fn load_tree(&self, id: crate::ObjectID) -> Result<Tree> {
        self.store.load_tree(id).await
    }

    /// Starts a lazy walk over the snapshot's tree. Only the snapshot record is read here.
    pub async fn list_snapshot(&self, id: &SnapshotID, options: WalkOptions) -> Result<TreeWalker> {
        let snapshot = self.load_snapshot(id).await?;
        Ok(self.walk_snapshot(&snapshot, options))
    }

    /// Walks a snapshot that has already been loaded. Nothing is read until the first step.
    pub fn walk_snapshot(&self, snapshot: &Snapshot, options: WalkOptions) -> TreeWalker {
        TreeWalker::new(self.store.clone(), snapshot.tree, options)
    }
}
