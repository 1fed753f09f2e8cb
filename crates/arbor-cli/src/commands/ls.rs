//! `arbor ls` command implementation.
//!
//! Loads the actual tree of a project and prints it as indented text or,
//! with `--json`, as a stable JSON document.

use arbor_core::{Arborist, ArboristError, ArboristOptions, Config, LoadOptions, PrintNode, Tree};
use arbor_core::version::SCHEMA_VERSION;
use arbor_util::path::absolutize;
use miette::{IntoDiagnostic, Result};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Arguments for `arbor ls`.
#[derive(Debug, Clone, Default)]
pub struct LsArgs {
    pub path: Option<PathBuf>,
    pub global: bool,
    pub ignore_missing: bool,
    /// Top-level names to load; empty loads everything.
    pub only: Vec<String>,
}

/// Run the ls command.
pub fn run(config: &Config, args: &LsArgs) -> Result<()> {
    let root = args
        .path
        .as_ref()
        .map_or_else(|| config.cwd.clone(), |p| absolutize(&config.cwd, p));

    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    match runtime.block_on(load(config, root, args)) {
        Ok(tree) => {
            let printed = PrintNode::from_tree(&tree);
            if config.json_logs {
                println!(
                    "{}",
                    serde_json::json!({
                        "ok": true,
                        "schema_version": SCHEMA_VERSION,
                        "tree": printed,
                    })
                );
            } else {
                print!("{}", printed.render_text());
                let problems: usize = tree.iter().map(|(_, node)| node.errors.len()).sum();
                if problems > 0 {
                    eprintln!("{problems} problem(s) found");
                }
            }
            Ok(())
        }
        Err(e) => {
            if config.json_logs {
                println!(
                    "{}",
                    serde_json::json!({
                        "ok": false,
                        "error": {
                            "code": e.code(),
                            "message": e.to_string(),
                            "path": e.path(),
                        }
                    })
                );
                std::process::exit(1);
            }
            Err(e).into_diagnostic()
        }
    }
}

/// Load the tree rooted at `root`.
pub async fn load(
    config: &Config,
    root: PathBuf,
    args: &LsArgs,
) -> Result<Arc<Tree>, ArboristError> {
    let arborist = Arborist::new(ArboristOptions {
        path: Some(root),
        actual_tree: None,
        debug: config.debug,
    });

    let mut options = LoadOptions::new()
        .with_global(args.global)
        .with_ignore_missing(args.ignore_missing);
    if !args.only.is_empty() {
        let only: BTreeSet<String> = args.only.iter().cloned().collect();
        let top = arborist.path().to_path_buf();
        options = options.with_filter(move |parent, name| parent.path != top || only.contains(name));
    }
    debug!(root = %arborist.path().display(), ?options, "loading actual tree");

    arborist.load_actual(options).await
}
