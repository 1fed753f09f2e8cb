//! Loading the actual tree: what is installed on disk right now.
//!
//! [`Arborist`] is the entry point. It owns the published snapshot and makes
//! concurrent [`Arborist::load_actual`] calls share a single walk.

mod audit;
mod hidden;
mod link;
mod transplant;
mod walk;

pub use hidden::HIDDEN_LOCKFILE;
pub use link::{realpath, resolve_entry, Entry};
pub use transplant::transplant;
pub use walk::NODE_MODULES;

use crate::error::ArboristError;
use crate::tree::{tree_check, Node, Tree};
use arbor_util::path::{absolutize, normalize};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;
use tracing::{debug, info};

/// Predicate deciding whether `node_modules/<name>` under a parent is loaded.
pub type LoadFilter = dyn Fn(&Node, &str) -> bool + Send + Sync;

/// Predicate deciding whether a node survives a transplant.
pub type TransplantFilter = dyn Fn(&Node) -> bool + Send + Sync;

type LoadFuture = Shared<BoxFuture<'static, Result<Arc<Tree>, ArboristError>>>;

/// Construction options for [`Arborist`].
#[derive(Debug, Clone, Default)]
pub struct ArboristOptions {
    /// Project root; defaults to the current directory.
    pub path: Option<PathBuf>,
    /// Tree to serve without touching the filesystem.
    pub actual_tree: Option<Arc<Tree>>,
    /// Check every loaded tree for integrity before publishing it.
    pub debug: bool,
}

/// Options for one [`Arborist::load_actual`] call.
#[derive(Clone, Default)]
pub struct LoadOptions {
    /// The root is a global prefix: no root manifest, every top-level entry wanted.
    pub global: bool,
    /// Skip the missing-dependency audit.
    pub ignore_missing: bool,
    /// Walk again even when a snapshot is already published.
    pub fresh: bool,
    /// Graft the loaded tree onto this node instead of publishing it as-is.
    pub root: Option<Node>,
    pub filter: Option<Arc<LoadFilter>>,
    pub transplant_filter: Option<Arc<TransplantFilter>>,
}

impl LoadOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_global(mut self, global: bool) -> Self {
        self.global = global;
        self
    }

    #[must_use]
    pub fn with_ignore_missing(mut self, ignore_missing: bool) -> Self {
        self.ignore_missing = ignore_missing;
        self
    }

    #[must_use]
    pub fn with_fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }

    #[must_use]
    pub fn with_root(mut self, root: Node) -> Self {
        self.root = Some(root);
        self
    }

    #[must_use]
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Node, &str) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    #[must_use]
    pub fn with_transplant_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Node) -> bool + Send + Sync + 'static,
    {
        self.transplant_filter = Some(Arc::new(filter));
        self
    }

    /// Whether a published snapshot can answer this call.
    fn accepts_cached(&self) -> bool {
        !self.fresh && self.root.is_none()
    }
}

impl fmt::Debug for LoadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadOptions")
            .field("global", &self.global)
            .field("ignore_missing", &self.ignore_missing)
            .field("fresh", &self.fresh)
            .field("root", &self.root.as_ref().map(|n| &n.path))
            .field("filter", &self.filter.is_some())
            .field("transplant_filter", &self.transplant_filter.is_some())
            .finish()
    }
}

/// Loader for one project root. Cheap to clone; clones share the cache.
#[derive(Clone)]
pub struct Arborist {
    inner: Arc<Inner>,
}

struct Inner {
    path: PathBuf,
    debug: bool,
    actual_tree: RwLock<Option<Arc<Tree>>>,
    loading: Mutex<Option<LoadFuture>>,
}

impl Arborist {
    #[must_use]
    pub fn new(options: ArboristOptions) -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let path = match options.path {
            Some(path) => absolutize(&cwd, &path),
            None => normalize(&cwd),
        };

        Self {
            inner: Arc::new(Inner {
                path,
                debug: options.debug,
                actual_tree: RwLock::new(options.actual_tree),
                loading: Mutex::new(None),
            }),
        }
    }

    /// Absolute project root.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Last published snapshot, if any. Never a partially built tree.
    #[must_use]
    pub fn actual_tree(&self) -> Option<Arc<Tree>> {
        self.inner.published()
    }

    /// Load the installed tree, or return the published one.
    ///
    /// Calls made while a load is running wait for that load and get the same
    /// `Arc`. A call asking for `fresh` or `root` waits for any running load
    /// to finish and then starts its own.
    ///
    /// # Errors
    /// Fails only when the root itself cannot be read (or, in debug mode,
    /// when the result fails the integrity check).
    pub async fn load_actual(&self, options: LoadOptions) -> Result<Arc<Tree>, ArboristError> {
        loop {
            let (pending, started) = {
                let mut loading = self
                    .inner
                    .loading
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);

                if options.accepts_cached() {
                    if let Some(tree) = self.inner.published() {
                        return Ok(tree);
                    }
                }

                match loading.as_ref() {
                    Some(pending) => (pending.clone(), false),
                    None => {
                        let inner = Arc::clone(&self.inner);
                        let opts = options.clone();
                        let pending = async move { inner.run_load(opts).await }
                            .boxed()
                            .shared();
                        *loading = Some(pending.clone());
                        // runs to completion even if every caller goes away
                        tokio::spawn(pending.clone());
                        (pending, true)
                    }
                }
            };

            if started || options.accepts_cached() {
                return pending.await;
            }
            debug!(path = %self.inner.path.display(), "waiting for running load before reloading");
            // its outcome belongs to another caller
            let _ = pending.await;
        }
    }
}

impl fmt::Debug for Arborist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arborist")
            .field("path", &self.inner.path)
            .field("debug", &self.inner.debug)
            .field("loaded", &self.inner.published().is_some())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn published(&self) -> Option<Arc<Tree>> {
        self.actual_tree
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn run_load(self: Arc<Self>, options: LoadOptions) -> Result<Arc<Tree>, ArboristError> {
        let result = self.load(&options).await;

        // publish before the in-flight slot is cleared so no caller sees neither
        let mut loading = self.loading.lock().unwrap_or_else(PoisonError::into_inner);
        if let Ok(tree) = &result {
            *self
                .actual_tree
                .write()
                .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(tree));
        }
        *loading = None;
        result
    }

    async fn load(&self, options: &LoadOptions) -> Result<Arc<Tree>, ArboristError> {
        let start = Instant::now();

        let cached = if options.root.is_some() && !options.fresh {
            self.published()
        } else {
            None
        };
        let source = match cached {
            Some(tree) => tree,
            None => {
                let mut tree =
                    walk::load_tree(&self.path, options.global, options.filter.as_deref()).await?;
                if !options.ignore_missing {
                    audit::audit_missing(&mut tree);
                }
                Arc::new(tree)
            }
        };

        let tree = match &options.root {
            Some(root) => Arc::new(transplant(
                &source,
                root.clone(),
                options.transplant_filter.as_deref(),
            )),
            None => source,
        };

        if self.debug {
            tree_check(&tree)?;
        }

        let errors: usize = tree.iter().map(|(_, node)| node.errors.len()).sum();
        info!(
            path = %self.path.display(),
            nodes = tree.len(),
            errors,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "loaded actual tree"
        );
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;
    use crate::manifest::Manifest;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_supplied_tree_is_returned() {
        let tree = Arc::new(Tree::new(Node::new(
            "root",
            "/nowhere",
            "/nowhere",
            Manifest::default(),
        )));
        let arb = Arborist::new(ArboristOptions {
            path: Some(PathBuf::from("/nowhere")),
            actual_tree: Some(Arc::clone(&tree)),
            ..Default::default()
        });

        let loaded = arb.load_actual(LoadOptions::new()).await.unwrap();
        assert!(Arc::ptr_eq(&loaded, &tree));
    }

    #[tokio::test]
    async fn test_missing_root_is_fatal() {
        let dir = tempdir().unwrap();
        let arb = Arborist::new(ArboristOptions {
            path: Some(dir.path().join("missing")),
            ..Default::default()
        });

        let err = arb.load_actual(LoadOptions::new()).await.unwrap_err();
        assert_eq!(err.code(), codes::ENOENT);
        assert!(arb.actual_tree().is_none());
    }

    #[tokio::test]
    async fn test_fresh_replaces_snapshot() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("package.json"), r#"{"name":"fresh"}"#).unwrap();
        let arb = Arborist::new(ArboristOptions {
            path: Some(dir.path().to_path_buf()),
            debug: true,
            ..Default::default()
        });

        let first = arb.load_actual(LoadOptions::new()).await.unwrap();
        let again = arb.load_actual(LoadOptions::new()).await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        fs::create_dir_all(dir.path().join("node_modules/late")).unwrap();
        let fresh = arb
            .load_actual(LoadOptions::new().with_fresh(true))
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &fresh));
        assert!(fresh.top("late").is_some());
        assert!(Arc::ptr_eq(&arb.actual_tree().unwrap(), &fresh));
    }

    #[test]
    fn test_relative_path_is_absolutized() {
        let arb = Arborist::new(ArboristOptions {
            path: Some(PathBuf::from("some/../project")),
            ..Default::default()
        });
        assert!(arb.path().is_absolute());
        assert!(arb.path().ends_with("project"));
        assert!(!arb.path().to_string_lossy().contains(".."));
    }

    #[test]
    fn test_load_options_debug_hides_closures() {
        let opts = LoadOptions::new()
            .with_global(true)
            .with_filter(|_, name| name != "skip");
        let shown = format!("{opts:?}");
        assert!(shown.contains("global: true"));
        assert!(shown.contains("filter: true"));
    }
}
