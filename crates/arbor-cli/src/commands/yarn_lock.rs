//! `arbor yarn-lock` command implementation.
//!
//! With a file argument, parses it and prints the normalized rendering.
//! Without one, loads the tree under the working directory and prints the
//! lockfile describing it.

use super::ls::{self, LsArgs};
use arbor_core::{Config, YarnLock};
use arbor_util::fs::{read_to_string_lossy, strip_bom};
use arbor_util::path::absolutize;
use miette::{miette, IntoDiagnostic, Result};
use std::path::Path;

/// Run the yarn-lock command.
pub fn run(config: &Config, file: Option<&Path>) -> Result<()> {
    let lock = match file {
        Some(file) => {
            let path = absolutize(&config.cwd, file);
            let text = read_to_string_lossy(&path).into_diagnostic()?;
            match YarnLock::parse(strip_bom(&text)) {
                Ok(lock) => lock,
                Err(e) => {
                    if config.json_logs {
                        println!(
                            "{}",
                            serde_json::json!({
                                "ok": false,
                                "error": {
                                    "code": e.code(),
                                    "message": e.to_string(),
                                    "line": e.line,
                                    "position": e.position,
                                }
                            })
                        );
                        std::process::exit(1);
                    }
                    return Err(miette!("{}: {e}", path.display()));
                }
            }
        }
        None => {
            let args = LsArgs {
                ignore_missing: true,
                ..LsArgs::default()
            };
            let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
            let tree = runtime
                .block_on(ls::load(config, config.cwd.clone(), &args))
                .into_diagnostic()?;
            YarnLock::from_tree(&tree)
        }
    };

    if config.json_logs {
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "entries": lock.len(),
                "lockfile": lock.to_string(),
            })
        );
    } else {
        print!("{lock}");
    }
    Ok(())
}
