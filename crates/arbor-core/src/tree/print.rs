//! Deterministic, serializable view of a tree.

use super::{NodeId, Tree};
use crate::error::NodeError;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write;
use std::path::PathBuf;

/// Printable node. Children are keyed and sorted by name.
#[derive(Debug, Clone, Serialize)]
pub struct PrintNode {
    pub name: String,
    /// Path relative to the root, `/`-separated; empty for the root.
    pub location: String,
    pub path: PathBuf,
    pub realpath: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<NodeError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<Box<PrintNode>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, PrintNode>,
}

impl PrintNode {
    /// Build the view from the root.
    #[must_use]
    pub fn from_tree(tree: &Tree) -> Self {
        let mut seen = HashSet::new();
        build(tree, tree.root(), &mut seen)
    }

    /// Indented text rendering, one node per line.
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        let _ = write!(out, "{indent}{}", self.name);
        if let Some(version) = &self.version {
            let _ = write!(out, "@{version}");
        }
        if !self.flags.is_empty() {
            let _ = write!(out, " ({})", self.flags.join(", "));
        }
        if let Some(target) = &self.target {
            let _ = write!(out, " -> {}", target.realpath.display());
        }
        for error in &self.errors {
            let _ = write!(out, " [{}]", error.code);
        }
        out.push('\n');

        if let Some(target) = &self.target {
            for child in target.children.values() {
                child.render_into(out, depth + 1);
            }
        }
        for child in self.children.values() {
            child.render_into(out, depth + 1);
        }
    }
}

fn build(tree: &Tree, id: NodeId, seen: &mut HashSet<NodeId>) -> PrintNode {
    let node = tree.node(id);
    let mut out = PrintNode {
        name: node.name.clone(),
        location: tree.location(id),
        path: node.path.clone(),
        realpath: node.realpath.clone(),
        version: node.version().map(String::from),
        flags: node.flags.names(),
        errors: node.errors.clone(),
        target: None,
        children: BTreeMap::new(),
    };

    // a node reached a second time (shared target, link back to root) is a stub
    if !seen.insert(id) {
        return out;
    }

    if let Some(target) = node.target {
        out.target = Some(Box::new(build(tree, target, seen)));
    }
    for (name, &child) in &node.children {
        out.children.insert(name.clone(), build(tree, child, seen));
    }
    out
}
