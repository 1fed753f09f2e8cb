//! Arena-backed package tree.
//!
//! Every node lives in one `Vec` owned by the [`Tree`]; `parent`, `target`
//! and `fs_parent` are plain [`NodeId`] handles into it. Several links may
//! hold the same target handle, which is how identity sharing is expressed.

mod check;
mod node;
mod print;

pub use check::tree_check;
pub use node::{DepFlags, Node, NodeId};
pub use print::PrintNode;

/// A loaded snapshot of installed packages.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Tree {
    /// Start a tree from a root node.
    #[must_use]
    pub fn new(mut root: Node) -> Self {
        root.parent = None;
        root.target = None;
        root.children.clear();
        Self {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[must_use]
    pub fn root_node(&self) -> &Node {
        self.node(self.root)
    }

    /// Get a node by handle.
    ///
    /// # Panics
    /// Panics if the handle belongs to another tree and is out of range.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub(crate) fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Attach `child` under `parent`, keyed by the child's name.
    pub(crate) fn attach(&mut self, parent: NodeId, child: NodeId) {
        let name = self.node(child).name.clone();
        self.node_mut(child).parent = Some(parent);
        self.node_mut(parent).children.insert(name, child);
    }

    /// Number of nodes, including link targets outside `node_modules`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// Direct child of `id` named `name`.
    #[must_use]
    pub fn child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.node(id).children.get(name).copied()
    }

    /// Direct child of the root named `name`.
    #[must_use]
    pub fn top(&self, name: &str) -> Option<&Node> {
        self.child(self.root, name).map(|id| self.node(id))
    }

    /// Target of a link node.
    #[must_use]
    pub fn target(&self, id: NodeId) -> Option<&Node> {
        self.node(id).target.map(|t| self.node(t))
    }

    /// Nodes reachable from the root through `children`, depth first, root included.
    #[must_use]
    pub fn structural(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            out.push(id);
            // reverse so the stack pops in name order
            stack.extend(self.node(id).children.values().rev());
        }
        out
    }

    /// Path of `id` relative to the root, `/`-separated; empty for the root.
    ///
    /// Nodes outside the root (by path and by realpath) keep their full path.
    #[must_use]
    pub fn location(&self, id: NodeId) -> String {
        let root = self.root_node();
        let node = self.node(id);
        let rel = node
            .path
            .strip_prefix(&root.path)
            .or_else(|_| node.realpath.strip_prefix(&root.realpath));
        match rel {
            Ok(rel) => rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => node.path.to_string_lossy().into_owned(),
        }
    }

    /// Node `name` resolves to when required from `from`.
    ///
    /// Checks `from`'s own children, then each ancestor's, following `parent`
    /// and falling back to `fs_parent` for nodes outside any `node_modules`.
    #[must_use]
    pub fn resolve(&self, from: NodeId, name: &str) -> Option<NodeId> {
        let mut current = Some(from);
        while let Some(id) = current {
            let node = self.node(id);
            if let Some(found) = node.children.get(name) {
                return Some(*found);
            }
            current = node.parent.or(node.fs_parent);
        }
        None
    }
}
