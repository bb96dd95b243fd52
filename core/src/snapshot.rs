use crate::{ObjectID, SnapshotID};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const UNKNOWN: &str = "unknown";

/// A point-in-time record of backed-up paths. Its id is the digest of its stored JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tree: ObjectID,
    pub paths: Vec<PathBuf>,
    pub hostname: String,
    pub username: String,
    pub time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<SnapshotID>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<String>,
}

impl Snapshot {
    pub fn new(paths: Vec<PathBuf>, tree: ObjectID) -> Self {
        Self {
            tree,
            paths,
            hostname: local_hostname(),
            username: local_username(),
            time: Utc::now(),
            parent: None,
            tags: Vec::new(),
            excludes: Vec::new(),
        }
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = time;
        self
    }

    pub fn with_parent(mut self, parent: SnapshotID) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_excludes(mut self, excludes: Vec<String>) -> Self {
        self.excludes = excludes;
        self
    }

    /// Whether every path in `paths` was part of this snapshot.
    pub fn includes_paths(&self, paths: &[PathBuf]) -> bool {
        paths.iter().all(|p| self.paths.contains(p))
    }

    pub fn summary(&self, id: &SnapshotID) -> String {
        format!(
            "{} - {} paths on {} at {}",
            id.short_string(),
            self.paths.len(),
            self.hostname,
            self.time.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}

fn local_hostname() -> String {
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(_) => UNKNOWN.to_string(),
    }
}

fn local_username() -> String {
    ["USER", "USERNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok())
        .unwrap_or_else(|| UNKNOWN.to_string())
}
