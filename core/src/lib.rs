pub mod backend;
pub mod crypto;
pub mod error;
pub mod index;
pub mod memory;
pub mod pack;
pub mod repository;
pub mod resolve;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod tree;
pub mod types;
pub mod walker;

#[cfg(test)]
mod testutil;

pub use backend::{Backend, BackendType, ObjectInfo};
pub use error::{Error, ErrorKind, Result};
pub use index::{Index, IndexEntry, IndexFile};
pub use memory::MemoryBackend;
pub use repository::Repository;
pub use resolve::{SnapshotFilter, SnapshotRef};
pub use session::Session;
pub use snapshot::Snapshot;
pub use store::ObjectStore;
pub use tree::{Node, NodeType, Tree};
pub use types::*;
pub use walker::{TreeWalker, WalkEntry, WalkOptions};
