use crate::ObjectID;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Repository not found at {path}")]
    RepositoryNotFound { path: String },

    #[error("Repository already exists at {path}")]
    RepositoryExists { path: String },

    #[error("Invalid repository format version: {version}")]
    InvalidFormatVersion { version: u32 },

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Object {id} not found in index")]
    ObjectNotFound { id: ObjectID },

    #[error("No snapshot found for reference {reference:?}")]
    SnapshotNotFound { reference: String },

    #[error("No snapshot matches host {host:?} and paths {paths:?}")]
    NoMatchingSnapshot {
        host: Option<String>,
        paths: Vec<PathBuf>,
    },

    #[error("Reference {reference:?} is ambiguous, it matches {} snapshots", .candidates.len())]
    AmbiguousReference {
        reference: String,
        candidates: Vec<ObjectID>,
    },

    #[error("Malformed tree {id}: {reason}")]
    MalformedTree { id: ObjectID, reason: String },

    #[error("Integrity violation for {id}, repository may be corrupted: {reason}")]
    IntegrityViolation { id: ObjectID, reason: String },

    #[error("Backend unavailable while accessing {path}: {source}")]
    BackendUnavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Blob of {size} bytes exceeds the 4 GiB limit of a pack entry")]
    BlobTooLarge { size: usize },

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Coarse classification of [`Error`] used for reporting and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AmbiguousReference,
    MalformedTree,
    IntegrityViolation,
    BackendUnavailable,
    Other,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ObjectNotFound { .. }
            | Error::SnapshotNotFound { .. }
            | Error::NoMatchingSnapshot { .. }
            | Error::RepositoryNotFound { .. } => ErrorKind::NotFound,
            Error::AmbiguousReference { .. } => ErrorKind::AmbiguousReference,
            Error::MalformedTree { .. } => ErrorKind::MalformedTree,
            Error::IntegrityViolation { .. } => ErrorKind::IntegrityViolation,
            Error::BackendUnavailable { .. } | Error::Backend(_) => ErrorKind::BackendUnavailable,
            Error::Io(_)
            | Error::Serialization(_)
            | Error::Encryption(_)
            | Error::RepositoryExists { .. }
            | Error::InvalidFormatVersion { .. }
            | Error::InvalidPassword
            | Error::BlobTooLarge { .. } => ErrorKind::Other,
        }
    }

    pub fn backend(path: impl Into<String>, source: std::io::Error) -> Self {
        Error::BackendUnavailable {
            path: path.into(),
            source,
        }
    }

    pub fn integrity(id: ObjectID, reason: impl Into<String>) -> Self {
        Error::IntegrityViolation {
            id,
            reason: reason.into(),
        }
    }

    /// True when a backend reported that the requested object does not exist.
    pub fn is_missing_object(&self) -> bool {
        matches!(
            self,
            Error::BackendUnavailable { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
