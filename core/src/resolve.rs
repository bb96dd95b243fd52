//! Selection of a single snapshot from a user supplied reference.
//!
//! A reference is either the word `latest`, optionally narrowed by a
//! [`SnapshotFilter`], or a hex prefix of a snapshot id. Both paths are pure
//! functions over the snapshot set, so the same repository state and filter
//! always select the same snapshot.

use crate::{Error, ObjectID, Result, Snapshot, SnapshotID};
use std::path::PathBuf;

pub const LATEST: &str = "latest";

/// Criteria applied when resolving `latest`. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotFilter {
    pub host: Option<String>,
    pub paths: Vec<PathBuf>,
}

impl SnapshotFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.push(path.into());
        self
    }

    pub fn matches(&self, snapshot: &Snapshot) -> bool {
        if let Some(host) = &self.host {
            if snapshot.hostname != *host {
                return false;
            }
        }
        snapshot.includes_paths(&self.paths)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotRef {
    Latest,
    /// Normalized lowercase hex prefix.
    Prefix(String),
}

impl SnapshotRef {
    pub fn parse(reference: &str) -> Result<Self> {
        if reference == LATEST {
            return Ok(SnapshotRef::Latest);
        }

        let prefix = reference.to_ascii_lowercase();
        let valid = !prefix.is_empty()
            && prefix.len() <= ObjectID::HEX_LEN
            && prefix.chars().all(|c| c.is_ascii_hexdigit());
        if !valid {
            return Err(Error::SnapshotNotFound {
                reference: reference.to_string(),
            });
        }
        Ok(SnapshotRef::Prefix(prefix))
    }
}

/// Finds the single id starting with `prefix`.
pub fn find_by_prefix(prefix: &str, ids: &[SnapshotID]) -> Result<SnapshotID> {
    let mut candidates: Vec<SnapshotID> = ids.iter().filter(|id| id.has_prefix(prefix)).copied().collect();
    candidates.sort();
    candidates.dedup();

    match candidates.len() {
        0 => Err(Error::SnapshotNotFound {
            reference: prefix.to_string(),
        }),
        1 => Ok(candidates[0]),
        _ => Err(Error::AmbiguousReference {
            reference: prefix.to_string(),
            candidates,
        }),
    }
}

/// Picks the newest snapshot accepted by `filter`; equal times go to the greater id.
pub fn find_latest(snapshots: &[(SnapshotID, Snapshot)], filter: &SnapshotFilter) -> Result<SnapshotID> {
    snapshots
        .iter()
        .filter(|(_, snapshot)| filter.matches(snapshot))
        .max_by(|(a_id, a), (b_id, b)| (a.time, a_id).cmp(&(b.time, b_id)))
        .map(|(id, _)| *id)
        .ok_or_else(|| Error::NoMatchingSnapshot {
            host: filter.host.clone(),
            paths: filter.paths.clone(),
        })
}

/// Resolves `reference` against an already enumerated snapshot set.
pub fn resolve(reference: &str, filter: &SnapshotFilter, snapshots: &[(SnapshotID, Snapshot)]) -> Result<SnapshotID> {
    match SnapshotRef::parse(reference)? {
        SnapshotRef::Latest => find_latest(snapshots, filter),
        SnapshotRef::Prefix(prefix) => {
            let ids: Vec<SnapshotID> = snapshots.iter().map(|(id, _)| *id).collect();
            find_by_prefix(&prefix, &ids)
        }
    }
}
