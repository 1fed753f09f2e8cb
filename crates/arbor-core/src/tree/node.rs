//! A single package instance in a loaded tree.

use crate::error::NodeError;
use crate::manifest::{DepKind, Manifest};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Handle of a node inside its [`Tree`](super::Tree).
///
/// Two handles are equal iff they name the same node, so comparing the
/// `target` of two links compares identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why (or whether) a node is wanted by its parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DepFlags {
    pub extraneous: bool,
    pub dev: bool,
    pub dev_optional: bool,
    pub optional: bool,
    pub peer: bool,
}

impl DepFlags {
    /// Flags for a child declared in `kind`, or extraneous when undeclared.
    #[must_use]
    pub fn classify(kind: Option<DepKind>) -> Self {
        match kind {
            Some(DepKind::Prod) => Self::default(),
            Some(DepKind::Dev) => Self {
                dev: true,
                dev_optional: true,
                ..Self::default()
            },
            Some(DepKind::Optional) => Self {
                optional: true,
                dev_optional: true,
                ..Self::default()
            },
            Some(DepKind::Peer) => Self {
                peer: true,
                ..Self::default()
            },
            None => Self {
                extraneous: true,
                ..Self::default()
            },
        }
    }

    /// Names of the flags that are set, for display.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.extraneous {
            names.push("extraneous");
        }
        if self.dev {
            names.push("dev");
        }
        if self.dev_optional {
            names.push("devOptional");
        }
        if self.optional {
            names.push("optional");
        }
        if self.peer {
            names.push("peer");
        }
        names
    }
}

/// One package directory (or a placeholder for an entry that could not be resolved).
#[derive(Debug, Clone)]
pub struct Node {
    /// Directory name under `node_modules` (`@scope/pkg` for scoped packages).
    pub name: String,
    /// Location of this node's own entry; for a link, the symlink itself.
    pub path: PathBuf,
    /// Location of the content after resolving links.
    pub realpath: PathBuf,
    /// Decoded manifest, or the default when unreadable.
    pub package: Manifest,
    /// Installed dependencies found in this node's `node_modules`.
    pub children: BTreeMap<String, NodeId>,
    pub parent: Option<NodeId>,
    /// Nearest loaded node whose directory contains this one, for link
    /// targets that live outside every `node_modules`.
    pub fs_parent: Option<NodeId>,
    /// Node at `realpath`; set only on links.
    pub target: Option<NodeId>,
    pub flags: DepFlags,
    pub errors: Vec<NodeError>,
    /// The entry itself could not be resolved; nothing was read for it.
    pub broken: bool,
}

impl Node {
    /// Create a detached node with no relations and clear flags.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        realpath: impl Into<PathBuf>,
        package: Manifest,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            realpath: realpath.into(),
            package,
            children: BTreeMap::new(),
            parent: None,
            fs_parent: None,
            target: None,
            flags: DepFlags::default(),
            errors: Vec::new(),
            broken: false,
        }
    }

    /// Placeholder for an entry whose link could not be resolved.
    #[must_use]
    pub fn broken(name: impl Into<String>, path: &Path, error: NodeError) -> Self {
        let mut node = Self::new(name, path, path, Manifest::default());
        node.errors.push(error);
        node.broken = true;
        node
    }

    #[must_use]
    pub fn is_link(&self) -> bool {
        self.target.is_some()
    }

    /// Version from the manifest, if any.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.package.version.as_deref()
    }

    /// Copy of this node with every relation cleared.
    #[must_use]
    pub(crate) fn detached(&self) -> Self {
        Self {
            name: self.name.clone(),
            path: self.path.clone(),
            realpath: self.realpath.clone(),
            package: self.package.clone(),
            children: BTreeMap::new(),
            parent: None,
            fs_parent: None,
            target: None,
            flags: self.flags,
            errors: self.errors.clone(),
            broken: self.broken,
        }
    }
}
