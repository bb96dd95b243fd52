use crate::pack::{FinishedPack, PackedBlob};
use crate::{BlobKind, ObjectID, PackID};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// One persisted index fragment, stored encrypted under `index/<id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexFile {
    pub created: DateTime<Utc>,
    pub packs: Vec<PackEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackEntry {
    pub id: PackID,
    pub blobs: Vec<PackedBlob>,
}

impl IndexFile {
    pub fn new() -> Self {
        Self {
            created: Utc::now(),
            packs: Vec::new(),
        }
    }

    pub fn with_created(mut self, created: DateTime<Utc>) -> Self {
        self.created = created;
        self
    }

    pub fn add_pack(&mut self, pack: &FinishedPack) {
        self.packs.push(PackEntry {
            id: pack.id,
            blobs: pack.blobs.clone(),
        });
    }
}

impl Default for IndexFile {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a blob lives and what the index promises about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub pack_id: PackID,
    pub kind: BlobKind,
    pub offset: u64,
    pub length: u32,
    pub raw_length: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackInfo {
    pub id: PackID,
    pub size: u64,
    pub blob_count: u32,
}

/// Merged, read-only view over every index fragment of a repository.
#[derive(Debug, Default)]
pub struct Index {
    blobs: HashMap<ObjectID, IndexEntry>,
    packs: HashMap<PackID, PackInfo>,
    conflicts: usize,
}

impl Index {
    /// Merges fragments oldest first, ordered by `(created, fragment id)`, so for a
    /// blob listed more than once the most recently written fragment wins.
    pub fn from_fragments(mut fragments: Vec<(ObjectID, IndexFile)>) -> Self {
        fragments.sort_by(|(a_id, a), (b_id, b)| (a.created, a_id).cmp(&(b.created, b_id)));

        let mut index = Index::default();
        for (fragment_id, file) in fragments {
            debug!(fragment = %fragment_id.short_string(), packs = file.packs.len(), "Merging index fragment");
            for pack in file.packs {
                index.add_pack(fragment_id, pack);
            }
        }
        index
    }

    fn add_pack(&mut self, fragment_id: ObjectID, pack: PackEntry) {
        let info = PackInfo {
            id: pack.id,
            size: pack.blobs.iter().map(|b| b.length as u64).sum(),
            blob_count: pack.blobs.len() as u32,
        };
        self.packs.insert(pack.id, info);

        for blob in pack.blobs {
            let entry = IndexEntry {
                pack_id: pack.id,
                kind: blob.kind,
                offset: blob.offset,
                length: blob.length,
                raw_length: blob.raw_length,
            };
            if let Some(previous) = self.blobs.get(&blob.id) {
                if *previous != entry {
                    warn!(
                        blob = %blob.id,
                        old_pack = %previous.pack_id.short_string(),
                        new_pack = %entry.pack_id.short_string(),
                        fragment = %fragment_id.short_string(),
                        "Blob listed at conflicting locations, newer index fragment wins"
                    );
                    self.conflicts += 1;
                }
            }
            self.blobs.insert(blob.id, entry);
        }
    }

    pub fn lookup(&self, id: &ObjectID) -> Option<&IndexEntry> {
        self.blobs.get(id)
    }

    pub fn contains(&self, id: &ObjectID) -> bool {
        self.blobs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ObjectID> {
        self.blobs.keys()
    }

    pub fn pack(&self, id: &PackID) -> Option<&PackInfo> {
        self.packs.get(id)
    }

    pub fn pack_ids(&self) -> impl Iterator<Item = &PackID> {
        self.packs.keys()
    }

    /// Number of blobs that appeared at more than one location while merging.
    pub fn conflicts(&self) -> usize {
        self.conflicts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn blob(id: ObjectID, offset: u64) -> PackedBlob {
        PackedBlob {
            id,
            kind: BlobKind::Tree,
            offset,
            length: 40,
            raw_length: 12,
        }
    }

    fn fragment(created_secs: i64, pack: &[u8], blobs: Vec<PackedBlob>) -> IndexFile {
        let mut file = IndexFile::new().with_created(Utc.timestamp_opt(created_secs, 0).unwrap());
        file.packs.push(PackEntry {
            id: ObjectID::from_data(pack),
            blobs,
        });
        file
    }

    #[test]
    fn merges_all_fragments() {
        let a = ObjectID::from_data(b"a");
        let b = ObjectID::from_data(b"b");
        let index = Index::from_fragments(vec![
            (ObjectID::from_data(b"f1"), fragment(1, b"p1", vec![blob(a, 0)])),
            (ObjectID::from_data(b"f2"), fragment(2, b"p2", vec![blob(b, 0)])),
        ]);

        assert_eq!(index.len(), 2);
        assert!(index.contains(&a) && index.contains(&b));
        assert_eq!(index.pack_ids().count(), 2);
        assert_eq!(index.pack(&ObjectID::from_data(b"p1")).unwrap().blob_count, 1);
        assert_eq!(index.conflicts(), 0);
        assert!(index.lookup(&ObjectID::from_data(b"c")).is_none());
    }

    #[test]
    fn newest_fragment_wins_regardless_of_listing_order() {
        let id = ObjectID::from_data(b"blob");
        let old = (ObjectID::from_data(b"old"), fragment(10, b"old-pack", vec![blob(id, 0)]));
        let new = (ObjectID::from_data(b"new"), fragment(20, b"new-pack", vec![blob(id, 80)]));

        for fragments in [vec![old.clone(), new.clone()], vec![new.clone(), old.clone()]] {
            let index = Index::from_fragments(fragments);
            let entry = index.lookup(&id).unwrap();
            assert_eq!(entry.pack_id, ObjectID::from_data(b"new-pack"));
            assert_eq!(entry.offset, 80);
            assert_eq!(index.conflicts(), 1);
        }
    }

    #[test]
    fn equal_timestamps_fall_back_to_fragment_id() {
        let id = ObjectID::from_data(b"blob");
        let mut names = [ObjectID::from_data(b"x"), ObjectID::from_data(b"y")];
        names.sort();
        let index = Index::from_fragments(vec![
            (names[1], fragment(5, b"greater", vec![blob(id, 1)])),
            (names[0], fragment(5, b"lesser", vec![blob(id, 2)])),
        ]);

        assert_eq!(index.lookup(&id).unwrap().pack_id, ObjectID::from_data(b"greater"));
    }

    #[test]
    fn identical_duplicates_are_not_conflicts() {
        let id = ObjectID::from_data(b"blob");
        let index = Index::from_fragments(vec![
            (ObjectID::from_data(b"f1"), fragment(1, b"p", vec![blob(id, 0)])),
            (ObjectID::from_data(b"f2"), fragment(2, b"p", vec![blob(id, 0)])),
        ]);
        assert_eq!(index.conflicts(), 0);
        assert_eq!(index.len(), 1);
    }
}
