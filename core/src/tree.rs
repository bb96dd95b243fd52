use crate::{Error, ObjectID, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Type of a filesystem entry. Unknown type names survive as `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeType {
    File,
    Dir,
    Symlink,
    Other(String),
}

impl NodeType {
    pub fn as_str(&self) -> &str {
        match self {
            NodeType::File => "file",
            NodeType::Dir => "dir",
            NodeType::Symlink => "symlink",
            NodeType::Other(name) => name,
        }
    }
}

impl From<&str> for NodeType {
    fn from(s: &str) -> Self {
        match s {
            "file" => NodeType::File,
            "dir" => NodeType::Dir,
            "symlink" => NodeType::Symlink,
            other => NodeType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for NodeType {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NodeType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(NodeType::from(s.as_str()))
    }
}

/// One directory entry. Nodes do not know their parent; paths are rebuilt by the walker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub mode: u32,
    #[serde(default)]
    pub uid: u32,
    #[serde(default)]
    pub gid: u32,
    #[serde(default)]
    pub size: u64,
    pub mtime: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linktarget: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtree: Option<ObjectID>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ObjectID>,
}

impl Node {
    pub fn file(name: impl Into<String>, size: u64, mtime: DateTime<Utc>) -> Self {
        Self::with_type(name, NodeType::File, 0o644, size, mtime)
    }

    pub fn dir(name: impl Into<String>, subtree: Option<ObjectID>, mtime: DateTime<Utc>) -> Self {
        Self {
            subtree,
            ..Self::with_type(name, NodeType::Dir, 0o755, 0, mtime)
        }
    }

    pub fn symlink(name: impl Into<String>, target: impl Into<String>, mtime: DateTime<Utc>) -> Self {
        Self {
            linktarget: Some(target.into()),
            ..Self::with_type(name, NodeType::Symlink, 0o777, 0, mtime)
        }
    }

    pub fn with_type(
        name: impl Into<String>,
        node_type: NodeType,
        mode: u32,
        size: u64,
        mtime: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            node_type,
            mode,
            uid: 0,
            gid: 0,
            size,
            mtime,
            linktarget: None,
            subtree: None,
            content: Vec::new(),
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self.node_type, NodeType::File)
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.node_type, NodeType::Dir)
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self.node_type, NodeType::Symlink)
    }

    /// `ls -l` style rendering of the type and permission bits.
    pub fn mode_string(&self) -> String {
        let kind = match self.node_type {
            NodeType::File => '-',
            NodeType::Dir => 'd',
            NodeType::Symlink => 'l',
            NodeType::Other(_) => '?',
        };

        let mut out = String::with_capacity(10);
        out.push(kind);
        for shift in [6u32, 3, 0] {
            let bits = (self.mode >> shift) & 0o7;
            out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
            out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
            out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
        }
        out
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.name.is_empty() {
            return Err("node with empty name".to_string());
        }
        if self.name.contains('/') || self.name == "." || self.name == ".." {
            return Err(format!("invalid node name {:?}", self.name));
        }
        if self.is_symlink() && self.linktarget.is_none() {
            return Err(format!("symlink {:?} has no link target", self.name));
        }
        if !self.is_symlink() && self.linktarget.is_some() {
            return Err(format!("{} {:?} carries a link target", self.node_type, self.name));
        }
        if !self.is_dir() && self.subtree.is_some() {
            return Err(format!("{} {:?} carries a subtree", self.node_type, self.name));
        }
        Ok(())
    }
}

/// The immediate children of one directory, in stored order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn add_node(&mut self, node: Node) {
        self.nodes.push(node);
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses and validates a tree blob. `id` is only used for error context.
    pub fn deserialize(id: ObjectID, data: &[u8]) -> Result<Self> {
        let tree: Tree = serde_json::from_slice(data).map_err(|e| Error::MalformedTree {
            id,
            reason: e.to_string(),
        })?;

        for node in &tree.nodes {
            node.validate()
                .map_err(|reason| Error::MalformedTree { id, reason })?;
        }

        Ok(tree)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use chrono::TimeZone;

    fn mtime() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()
    }

    fn parse(json: &str) -> Result<Tree> {
        Tree::deserialize(ObjectID::from_data(json.as_bytes()), json.as_bytes())
    }

    #[test]
    fn roundtrip_preserves_every_node_type_and_order() {
        let mut tree = Tree::new();
        tree.add_node(Node::file("zeta.txt", 42, mtime()));
        tree.add_node(Node::dir("alpha", Some(ObjectID::from_data(b"sub")), mtime()));
        tree.add_node(Node::dir("empty", None, mtime()));
        tree.add_node(Node::symlink("link", "../zeta.txt", mtime()));
        tree.add_node(Node::with_type("pipe", NodeType::Other("fifo".into()), 0o600, 0, mtime()));

        let bytes = tree.serialize().unwrap();
        let back = Tree::deserialize(ObjectID::from_data(&bytes), &bytes).unwrap();

        assert_eq!(back, tree);
        let names: Vec<_> = back.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["zeta.txt", "alpha", "empty", "link", "pipe"]);
    }

    #[test]
    fn empty_tree_roundtrips() {
        let bytes = Tree::new().serialize().unwrap();
        let back = Tree::deserialize(ObjectID::from_data(&bytes), &bytes).unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn unknown_type_is_kept_as_other() {
        let tree = parse(r#"{"nodes":[{"name":"dev","type":"chardev","mtime":"2024-03-01T12:30:00Z"}]}"#)
            .unwrap();
        assert_eq!(tree.nodes[0].node_type, NodeType::Other("chardev".into()));
        assert_eq!(tree.nodes[0].mode, 0);
    }

    #[test]
    fn symlink_without_target_is_malformed() {
        let err = parse(r#"{"nodes":[{"name":"l","type":"symlink","mtime":"2024-03-01T12:30:00Z"}]}"#)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedTree);
    }

    #[test]
    fn missing_required_fields_are_malformed() {
        for json in [
            r#"{"nodes":[{"type":"file","mtime":"2024-03-01T12:30:00Z"}]}"#,
            r#"{"nodes":[{"name":"a","mtime":"2024-03-01T12:30:00Z"}]}"#,
            r#"{"nodes":[{"name":"a","type":"file"}]}"#,
            r#"{"nodes":[{"name":"","type":"file","mtime":"2024-03-01T12:30:00Z"}]}"#,
            r#"{"nodes":[{"name":"a/b","type":"file","mtime":"2024-03-01T12:30:00Z"}]}"#,
            r#"not json"#,
        ] {
            let err = parse(json).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedTree, "{json}");
        }
    }

    #[test]
    fn misplaced_references_are_malformed() {
        let sub = ObjectID::from_data(b"x").to_hex();
        let json = format!(
            r#"{{"nodes":[{{"name":"f","type":"file","mtime":"2024-03-01T12:30:00Z","subtree":"{sub}"}}]}}"#
        );
        assert_eq!(parse(&json).unwrap_err().kind(), ErrorKind::MalformedTree);

        let json = r#"{"nodes":[{"name":"f","type":"file","mtime":"2024-03-01T12:30:00Z","linktarget":"x"}]}"#;
        assert_eq!(parse(json).unwrap_err().kind(), ErrorKind::MalformedTree);
    }

    #[test]
    fn mode_string_renders_permissions() {
        assert_eq!(Node::file("f", 0, mtime()).mode_string(), "-rw-r--r--");
        assert_eq!(Node::dir("d", None, mtime()).mode_string(), "drwxr-xr-x");
        assert_eq!(Node::symlink("l", "t", mtime()).mode_string(), "lrwxrwxrwx");
    }
}
