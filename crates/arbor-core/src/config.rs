use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable that forces debug mode on (`1`) or off (`0`).
pub const DEBUG_ENV: &str = "ARBOR_DEBUG";

/// Runtime configuration for arbor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Current working directory.
    pub cwd: PathBuf,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,

    /// Debug mode: verbose logging and integrity checks on loaded trees.
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            json_logs: false,
            verbosity: 0,
            debug: false,
        }
    }
}

impl Config {
    /// Create a new config with the given working directory.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            ..Default::default()
        }
    }

    /// Create a config whose debug flag comes from the process environment.
    #[must_use]
    pub fn from_env(cwd: PathBuf) -> Self {
        Self::new(cwd).with_debug(debug_enabled(|key| std::env::var(key).ok()))
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }

    /// Set debug mode.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Decide whether debug mode is on.
///
/// `ARBOR_DEBUG=0` always wins. Otherwise debug is on for `ARBOR_DEBUG=1`,
/// for a `NODE_DEBUG` list naming `arbor`, or while arbor's own test and
/// snapshot scripts run.
pub fn debug_enabled<F>(lookup: F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    let forced = lookup(DEBUG_ENV);
    if forced.as_deref() == Some("0") {
        return false;
    }
    if forced.as_deref() == Some("1") {
        return true;
    }

    let node_debug = lookup("NODE_DEBUG").unwrap_or_default();
    if node_debug
        .split(|c: char| c == ',' || c.is_whitespace())
        .any(|word| word == "arbor")
    {
        return true;
    }

    let event = lookup("npm_lifecycle_event");
    let package = lookup("npm_package_name");
    matches!(event.as_deref(), Some("test" | "snap")) && package.as_deref() == Some("arbor")
}
