//! Breadth-first walk of installed `node_modules` directories.
//!
//! Each queued node has its `node_modules` listed, then every entry is
//! resolved concurrently, merged into the arena one at a time, and the new
//! nodes' manifests are read concurrently. The merge is the only writer of
//! the realpath memo table, so two entries that reach the same directory
//! always end up sharing one node.
//!
//! When a current hidden lockfile is present, manifests it records are taken
//! from it rather than read from each package folder.

use super::hidden::HiddenLockfile;
use super::link::{realpath, resolve_entry, Entry};
use super::LoadFilter;
use crate::error::{codes, io_code, ArboristError, NodeError};
use crate::manifest::{read_manifest, Manifest};
use crate::tree::{DepFlags, Node, NodeId, Tree};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Dependency directory name.
pub const NODE_MODULES: &str = "node_modules";

/// Maximum filesystem operations in flight per directory.
const MAX_CONCURRENT_READS: usize = 32;

/// Load the tree rooted at `path`.
///
/// `path` must already be absolute. In `global` mode the root manifest is not
/// read and the root's direct children all count as wanted.
pub(crate) async fn load_tree(
    path: &Path,
    global: bool,
    filter: Option<&LoadFilter>,
) -> Result<Tree, ArboristError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| ArboristError::root_io(path, &e))?;
    if !meta.is_dir() {
        return Err(ArboristError::RootNotDirectory {
            path: path.to_path_buf(),
        });
    }
    let real = realpath(path)
        .await
        .map_err(|e| ArboristError::root_io(path, &e))?;

    let (package, error) = if global {
        (Manifest::default(), None)
    } else {
        read_manifest(&real).await
    };
    let hidden = if global {
        None
    } else {
        HiddenLockfile::load(&real).await
    };
    let name = package.name.clone().unwrap_or_else(|| dir_name(path));
    let mut root = Node::new(name, path, real.clone(), package);
    root.errors.extend(error);

    let mut walker = Walker {
        tree: Tree::new(root),
        memo: HashMap::new(),
        queue: VecDeque::new(),
        global,
        filter,
        hidden,
    };
    let root = walker.tree.root();
    walker.memo.insert(real, root);
    walker.queue.push_back(root);

    while let Some(id) = walker.queue.pop_front() {
        walker.load_children(id).await;
    }
    walker.assign_fs_parents();

    Ok(walker.tree)
}

struct Walker<'a> {
    tree: Tree,
    /// realpath -> the one node holding that content
    memo: HashMap<PathBuf, NodeId>,
    queue: VecDeque<NodeId>,
    global: bool,
    filter: Option<&'a LoadFilter>,
    hidden: Option<HiddenLockfile>,
}

impl Walker<'_> {
    async fn load_children(&mut self, parent: NodeId) {
        let (listed, base_path) = {
            let node = self.tree.node(parent);
            (
                node.realpath.join(NODE_MODULES),
                node.path.join(NODE_MODULES),
            )
        };

        let names = match read_entry_names(&listed).await {
            Ok((names, errors)) => {
                for error in errors {
                    debug!(path = %error.path.display(), code = %error.code, "cannot list scope");
                    self.tree.node_mut(parent).errors.push(error);
                }
                names
            }
            Err(e) => {
                // no node_modules at all just means no children
                if !matches!(io_code(&e), codes::ENOENT | codes::ENOTDIR) {
                    debug!(dir = %listed.display(), error = %e, "cannot list node_modules");
                    self.tree
                        .node_mut(parent)
                        .errors
                        .push(NodeError::from_io(&listed, &e));
                }
                return;
            }
        };

        let names: Vec<String> = match self.filter {
            Some(filter) => names
                .into_iter()
                .filter(|name| filter(self.tree.node(parent), name))
                .collect(),
            None => names,
        };
        if names.is_empty() {
            return;
        }

        // node_modules may itself be a link
        let dir = realpath(&listed).await.unwrap_or(listed);
        debug!(dir = %dir.display(), entries = names.len(), "loading node_modules");

        let probes: Vec<(String, Result<Entry, NodeError>)> = stream::iter(names)
            .map(|name| {
                let path = base_path.join(&name);
                async move {
                    let entry = resolve_entry(&path).await;
                    (name, entry)
                }
            })
            .buffered(MAX_CONCURRENT_READS)
            .collect()
            .await;

        let mut unread = Vec::new();
        let mut links = Vec::new();
        for (name, probe) in probes {
            let path = base_path.join(&name);
            let child = match probe {
                Err(error) => {
                    trace!(path = %path.display(), code = %error.code, "unresolved entry");
                    self.tree.push(Node::broken(name.as_str(), &path, error))
                }
                Ok(Entry::Dir) => {
                    let real = dir.join(&name);
                    match self.memo.get(&real).copied() {
                        Some(existing) if self.adoptable(existing) => {
                            let node = self.tree.node_mut(existing);
                            node.name.clone_from(&name);
                            node.path.clone_from(&path);
                            existing
                        }
                        // the same folder again, through a linked node_modules
                        Some(existing) => {
                            trace!(path = %path.display(), target = %real.display(), "revisited");
                            let mut link =
                                Node::new(name.as_str(), &path, &real, Manifest::default());
                            link.target = Some(existing);
                            let id = self.tree.push(link);
                            links.push((id, existing, false));
                            id
                        }
                        None => {
                            let id = self.tree.push(Node::new(
                                name.as_str(),
                                &path,
                                &real,
                                Manifest::default(),
                            ));
                            self.memo.insert(real, id);
                            unread.push(id);
                            id
                        }
                    }
                }
                Ok(Entry::Link(real)) => {
                    let (target, created) = match self.memo.get(&real).copied() {
                        Some(existing) => (existing, false),
                        None => {
                            let id = self.tree.push(Node::new(
                                dir_name(&real),
                                &real,
                                &real,
                                Manifest::default(),
                            ));
                            self.memo.insert(real.clone(), id);
                            unread.push(id);
                            (id, true)
                        }
                    };
                    trace!(path = %path.display(), target = %real.display(), "link");
                    let mut link = Node::new(name.as_str(), &path, &real, Manifest::default());
                    link.target = Some(target);
                    let id = self.tree.push(link);
                    links.push((id, target, created));
                    id
                }
            };

            self.tree.attach(parent, child);
            let flags = self.classify(parent, &name);
            self.tree.node_mut(child).flags = flags;
        }

        let pending: Vec<(NodeId, PathBuf, Option<Manifest>)> = unread
            .iter()
            .map(|&id| {
                let recorded = self
                    .hidden
                    .as_ref()
                    .and_then(|lock| lock.get(&self.tree.location(id)))
                    .cloned();
                (id, self.tree.node(id).realpath.clone(), recorded)
            })
            .collect();
        let manifests: Vec<(NodeId, (Manifest, Option<NodeError>))> = stream::iter(pending)
            .map(|(id, real, recorded)| async move {
                let read = match recorded {
                    Some(package) => (package, None),
                    None => read_manifest(&real).await,
                };
                (id, read)
            })
            .buffered(MAX_CONCURRENT_READS)
            .collect()
            .await;

        for (id, (package, error)) in manifests {
            let node = self.tree.node_mut(id);
            if let Some(error) = error {
                debug!(path = %error.path.display(), code = %error.code, "manifest unreadable");
                node.errors.push(error);
            }
            // link targets outside node_modules go by their own name
            if node.parent.is_none() {
                if let Some(name) = &package.name {
                    node.name.clone_from(name);
                }
            }
            node.package = package;
            self.queue.push_back(id);
        }

        for (link, target, created) in links {
            let package = self.tree.node(target).package.clone();
            let flags = self.tree.node(link).flags;
            self.tree.node_mut(link).package = package;
            if created && self.tree.node(target).parent.is_none() {
                self.tree.node_mut(target).flags = flags;
            }
        }
    }

    /// A node first met as a link target can become the structural node
    /// for its own directory.
    fn adoptable(&self, id: NodeId) -> bool {
        let node = self.tree.node(id);
        id != self.tree.root() && node.parent.is_none() && !node.is_link()
    }

    fn classify(&self, parent: NodeId, name: &str) -> DepFlags {
        if self.global && parent == self.tree.root() {
            return DepFlags::default();
        }
        DepFlags::classify(self.tree.node(parent).package.dep_kind(name))
    }

    fn assign_fs_parents(&mut self) {
        let root = self.tree.root();
        let orphans: Vec<NodeId> = self
            .tree
            .iter()
            .filter(|(id, node)| *id != root && node.parent.is_none())
            .map(|(id, _)| id)
            .collect();

        for id in orphans {
            let real = self.tree.node(id).realpath.clone();
            let found = real
                .ancestors()
                .skip(1)
                .find_map(|dir| self.memo.get(dir).copied());
            self.tree.node_mut(id).fs_parent = found;
        }
    }
}

/// List package entries of a `node_modules` directory, sorted.
///
/// Dot entries and plain files are skipped; `@scope` directories are
/// expanded into `@scope/name` entries. A scope that cannot be listed is
/// reported alongside the names instead of failing the whole directory.
async fn read_entry_names(dir: &Path) -> io::Result<(Vec<String>, Vec<NodeError>)> {
    let mut names = Vec::new();
    let mut errors = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let Ok(file_type) = entry.file_type().await else {
            continue;
        };
        if !(file_type.is_dir() || file_type.is_symlink()) {
            continue;
        }

        if name.starts_with('@') && file_type.is_dir() {
            let scope = entry.path();
            if let Err(e) = read_scope(&scope, &name, &mut names).await {
                errors.push(NodeError::from_io(&scope, &e));
            }
            continue;
        }

        names.push(name);
    }

    names.sort();
    Ok((names, errors))
}

/// Append `@scope/name` for each package directory or link in `dir`.
async fn read_scope(dir: &Path, scope: &str, names: &mut Vec<String>) -> io::Result<()> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(inner) = entries.next_entry().await? {
        let inner_name = inner.file_name().to_string_lossy().into_owned();
        if inner_name.starts_with('.') {
            continue;
        }
        let Ok(inner_type) = inner.file_type().await else {
            continue;
        };
        if inner_type.is_dir() || inner_type.is_symlink() {
            names.push(format!("{scope}/{inner_name}"));
        }
    }
    Ok(())
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
