//! Re-rooting a loaded tree onto another root node.

use super::TransplantFilter;
use crate::tree::{Node, NodeId, Tree};
use arbor_util::path::rebase;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Copy `source` underneath `root`.
///
/// The new root keeps its own fields; every descendant has its `path` and
/// `realpath` moved by the same offset the old root had from the new one.
/// Real paths outside the old root are kept as they are. Links that shared a
/// target in `source` share the copied target. `filter` is asked about every
/// structural child; a rejected child is dropped with its whole subtree.
#[must_use]
pub fn transplant(source: &Tree, root: Node, filter: Option<&TransplantFilter>) -> Tree {
    let old_root = source.root_node();
    let mut graft = Graft {
        source,
        from_path: old_root.path.clone(),
        from_real: old_root.realpath.clone(),
        to_path: root.path.clone(),
        to_real: root.realpath.clone(),
        out: Tree::new(root),
        memo: HashMap::new(),
        pending: vec![source.root()],
    };
    let new_root = graft.out.root();
    graft.memo.insert(source.root(), new_root);

    while let Some(src) = graft.pending.pop() {
        let dst = graft.memo[&src];
        for &child in source.node(src).children.values() {
            if filter.is_some_and(|keep| !keep(source.node(child))) {
                continue;
            }
            let copied = graft.map(child);
            graft.out.attach(dst, copied);
        }
    }

    graft.assign_fs_parents();
    graft.out
}

struct Graft<'a> {
    source: &'a Tree,
    from_path: PathBuf,
    from_real: PathBuf,
    to_path: PathBuf,
    to_real: PathBuf,
    out: Tree,
    /// source id -> copied id
    memo: HashMap<NodeId, NodeId>,
    /// copied nodes whose children are still to be visited
    pending: Vec<NodeId>,
}

impl Graft<'_> {
    /// Copied counterpart of `src`, created on first use.
    fn map(&mut self, src: NodeId) -> NodeId {
        if let Some(&id) = self.memo.get(&src) {
            return id;
        }

        let node = self.source.node(src);
        let mut copy = node.detached();
        copy.path = moved(&node.path, &self.from_path, &self.to_path);
        copy.realpath = moved(&node.realpath, &self.from_real, &self.to_real);
        let id = self.out.push(copy);
        self.memo.insert(src, id);
        self.pending.push(src);

        if let Some(target) = node.target {
            let target = self.map(target);
            self.out.node_mut(id).target = Some(target);
        }
        id
    }

    fn assign_fs_parents(&mut self) {
        let root = self.out.root();
        let by_realpath: HashMap<PathBuf, NodeId> = self
            .out
            .iter()
            .filter(|(_, node)| !node.is_link() && !node.broken)
            .map(|(id, node)| (node.realpath.clone(), id))
            .collect();
        let orphans: Vec<NodeId> = self
            .out
            .iter()
            .filter(|(id, node)| *id != root && node.parent.is_none())
            .map(|(id, _)| id)
            .collect();

        for id in orphans {
            let real = self.out.node(id).realpath.clone();
            let found = real
                .ancestors()
                .skip(1)
                .find_map(|dir| by_realpath.get(dir).copied());
            self.out.node_mut(id).fs_parent = found;
        }
    }
}

fn moved(path: &Path, from: &Path, to: &Path) -> PathBuf {
    rebase(path, from, to).unwrap_or_else(|| path.to_path_buf())
}
