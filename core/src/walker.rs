use crate::store::ObjectStore;
use crate::tree::Node;
use crate::{Error, ObjectID, Result};
use futures::Stream;
use tracing::debug;

pub const DEFAULT_MAX_DEPTH: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkOptions {
    /// Maximum number of nested trees, the root tree included.
    pub max_depth: usize,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// A node together with the path of the directory containing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub parent: String,
    pub node: Node,
}

impl WalkEntry {
    pub fn path(&self) -> String {
        if self.parent.is_empty() {
            self.node.name.clone()
        } else {
            format!("{}/{}", self.parent, self.node.name)
        }
    }
}

struct Frame {
    parent: String,
    nodes: std::vec::IntoIter<Node>,
}

/// Depth-first, pre-order walk over a tree DAG.
///
/// Trees are loaded only when the walk reaches them, so a consumer that stops
/// early never touches the rest of the snapshot. The first error ends the walk.
pub struct TreeWalker {
    store: ObjectStore,
    options: WalkOptions,
    stack: Vec<Frame>,
    pending: Option<(ObjectID, String)>,
    done: bool,
}

impl TreeWalker {
    pub fn new(store: ObjectStore, root: ObjectID, options: WalkOptions) -> Self {
        Self {
            store,
            options,
            stack: Vec::new(),
            pending: Some((root, String::new())),
            done: false,
        }
    }

    pub async fn next_entry(&mut self) -> Result<Option<WalkEntry>> {
        if self.done {
            return Ok(None);
        }

        match self.step().await {
            Ok(Some(entry)) => Ok(Some(entry)),
            Ok(None) => {
                self.done = true;
                Ok(None)
            }
            Err(e) => {
                self.done = true;
                self.stack.clear();
                self.pending = None;
                Err(e)
            }
        }
    }

    async fn step(&mut self) -> Result<Option<WalkEntry>> {
        if let Some((id, parent)) = self.pending.take() {
            if self.stack.len() >= self.options.max_depth {
                return Err(Error::integrity(
                    id,
                    format!("tree nesting below {:?} exceeds {} levels", parent, self.options.max_depth),
                ));
            }

            let tree = self.store.load_tree(id).await?;
            debug!(tree = %id.short_string(), parent = %parent, nodes = tree.len(), "Entering tree");
            self.stack.push(Frame {
                parent,
                nodes: tree.nodes.into_iter(),
            });
        }

        loop {
            let Some(frame) = self.stack.last_mut() else {
                return Ok(None);
            };

            match frame.nodes.next() {
                Some(node) => {
                    let entry = WalkEntry {
                        parent: frame.parent.clone(),
                        node,
                    };
                    if entry.node.is_dir() {
                        if let Some(subtree) = entry.node.subtree {
                            self.pending = Some((subtree, entry.path()));
                        }
                    }
                    return Ok(Some(entry));
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<WalkEntry>> {
        futures::stream::unfold(self, |mut walker| async move {
            match walker.next_entry().await {
                Ok(Some(entry)) => Some((Ok(entry), walker)),
                Ok(None) => None,
                Err(e) => Some((Err(e), walker)),
            }
        })
    }
}
