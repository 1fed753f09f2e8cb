#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

mod commands;
mod logging;

use arbor_core::Config;
use clap::Parser;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "arbor")]
#[command(author, version, about = "Inspect the packages actually installed under node_modules", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Load and print the installed package tree
    Ls {
        /// Project root (defaults to the working directory)
        path: Option<PathBuf>,

        /// Treat the root as a global prefix
        #[arg(long)]
        global: bool,

        /// Do not report declared dependencies that are not installed
        #[arg(long)]
        ignore_missing: bool,

        /// Only load these top-level packages
        #[arg(long, value_delimiter = ',', value_name = "NAME")]
        only: Vec<String>,
    },

    /// Normalize a yarn.lock, or write one for the installed tree
    YarnLock {
        /// Lockfile to parse and re-render (omit to build from node_modules)
        file: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine working directory
    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let config = Config::from_env(cwd)
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);

    logging::init(config.verbosity, config.json_logs, config.debug);

    match cli.command {
        Some(Commands::Version) | None => commands::version::run(config.json_logs),
        Some(Commands::Ls {
            path,
            global,
            ignore_missing,
            only,
        }) => commands::ls::run(
            &config,
            &commands::ls::LsArgs {
                path,
                global,
                ignore_missing,
                only,
            },
        ),
        Some(Commands::YarnLock { file }) => commands::yarn_lock::run(&config, file.as_deref()),
    }
}
