//! The hidden lockfile, `node_modules/.package-lock.json`.
//!
//! The installer that wrote `node_modules` leaves a record of every package
//! folder it placed, keyed by location relative to the project root. When
//! that record is newer than every folder it describes, the walk takes each
//! package's metadata from it instead of reading `package.json` again.
//! Directory listing and link resolution still happen on disk, so the tree
//! has the same shape either way.

use super::walk::NODE_MODULES;
use crate::manifest::Manifest;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::SystemTime;
use tracing::debug;

/// File name inside the root's `node_modules`.
pub const HIDDEN_LOCKFILE: &str = ".package-lock.json";

/// Oldest lockfile format that records packages by location.
const MIN_LOCKFILE_VERSION: u64 = 2;

/// Stats in flight while checking freshness.
const MAX_CONCURRENT_STATS: usize = 32;

/// Entry keys that describe placement rather than the package itself.
const PLACEMENT_KEYS: [&str; 7] = [
    "link",
    "dev",
    "optional",
    "devOptional",
    "peer",
    "extraneous",
    "inBundle",
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Contents {
    #[serde(default)]
    lockfile_version: Option<u64>,
    #[serde(default)]
    packages: BTreeMap<String, Value>,
}

/// Package metadata recorded at install time, by location.
#[derive(Debug, Clone, Default)]
pub(crate) struct HiddenLockfile {
    packages: BTreeMap<String, Manifest>,
}

impl HiddenLockfile {
    /// Read the hidden lockfile under `root`, if present and still current.
    ///
    /// Returns `None` when the file is missing, does not parse, predates the
    /// location-keyed format, or any folder it lists is gone or was modified
    /// after the file was written.
    pub(crate) async fn load(root: &Path) -> Option<Self> {
        let file = root.join(NODE_MODULES).join(HIDDEN_LOCKFILE);
        let written = tokio::fs::metadata(&file).await.ok()?.modified().ok()?;
        let bytes = tokio::fs::read(&file).await.ok()?;

        let lock = match Self::from_slice(&bytes) {
            Ok(lock) => lock,
            Err(reason) => {
                debug!(path = %file.display(), %reason, "ignoring hidden lockfile");
                return None;
            }
        };

        if let Some(stale) = lock.stale_folder(root, written).await {
            debug!(path = %file.display(), folder = %stale, "hidden lockfile is out of date");
            return None;
        }
        debug!(path = %file.display(), packages = lock.len(), "using hidden lockfile");
        Some(lock)
    }

    /// Decode lockfile bytes.
    ///
    /// Link entries and the root entry carry no package metadata and are left
    /// out.
    pub(crate) fn from_slice(bytes: &[u8]) -> Result<Self, String> {
        let contents: Contents = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
        match contents.lockfile_version {
            Some(v) if v >= MIN_LOCKFILE_VERSION => {}
            other => return Err(format!("unsupported lockfileVersion {other:?}")),
        }

        let mut packages = BTreeMap::new();
        for (location, entry) in contents.packages {
            if location.is_empty() {
                continue;
            }
            let Value::Object(mut entry) = entry else {
                return Err(format!("entry {location:?} is not an object"));
            };
            if entry.get("link").and_then(Value::as_bool) == Some(true) {
                continue;
            }
            for key in PLACEMENT_KEYS {
                entry.remove(key);
            }
            // installers record these under underscored keys in package.json
            for key in ["resolved", "integrity"] {
                if let Some(value) = entry.remove(key) {
                    entry.insert(format!("_{key}"), value);
                }
            }
            if !entry.contains_key("name") {
                if let Some(name) = installed_name(&location) {
                    entry.insert("name".to_string(), Value::String(name.to_string()));
                }
            }
            if let Some(manifest) = Manifest::from_value(Value::Object(entry)) {
                packages.insert(location, manifest);
            }
        }
        Ok(Self { packages })
    }

    /// Recorded metadata for the package folder at `location`.
    pub(crate) fn get(&self, location: &str) -> Option<&Manifest> {
        self.packages.get(location)
    }

    pub(crate) fn len(&self) -> usize {
        self.packages.len()
    }

    /// First listed folder, or `node_modules` directory holding one, that is
    /// missing or newer than `written`.
    async fn stale_folder(&self, root: &Path, written: SystemTime) -> Option<String> {
        let mut checks: Vec<(String, bool)> = vec![(NODE_MODULES.to_string(), false)];
        for location in self.packages.keys() {
            checks.push((location.clone(), true));
            checks.push((format!("{location}/{NODE_MODULES}"), false));
        }

        let results: Vec<Option<String>> = stream::iter(checks)
            .map(|(location, required)| {
                let path = root.join(&location);
                async move {
                    match tokio::fs::symlink_metadata(&path).await {
                        Ok(meta) => match meta.modified() {
                            Ok(modified) if modified <= written => None,
                            _ => Some(location),
                        },
                        Err(_) if required => Some(location),
                        Err(_) => None,
                    }
                }
            })
            .buffered(MAX_CONCURRENT_STATS)
            .collect()
            .await;
        results.into_iter().flatten().next()
    }
}

/// Package name implied by a location such as `node_modules/@s/a`.
fn installed_name(location: &str) -> Option<&str> {
    let (_, name) = location.rsplit_once(&format!("{NODE_MODULES}/"))?;
    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::tempdir;

    fn lockfile(packages: Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "name": "root",
            "lockfileVersion": 3,
            "requires": true,
            "packages": packages,
        }))
        .unwrap()
    }

    #[test]
    fn test_entries_become_manifests() {
        let lock = HiddenLockfile::from_slice(&lockfile(json!({
            "": { "name": "root", "dependencies": { "a": "^1" } },
            "node_modules/a": {
                "version": "1.0.0",
                "resolved": "https://registry.example/a/-/a-1.0.0.tgz",
                "integrity": "sha512-abc",
                "dev": true,
                "dependencies": { "@s/b": "^2" }
            },
            "node_modules/a/node_modules/@s/b": { "version": "2.1.0" },
            "node_modules/ws": { "resolved": "packages/ws", "link": true },
            "packages/ws": { "name": "ws", "version": "0.1.0" }
        })))
        .unwrap();

        assert_eq!(lock.len(), 3);
        assert!(lock.get("").is_none());
        assert!(lock.get("node_modules/ws").is_none());

        let a = lock.get("node_modules/a").unwrap();
        assert_eq!(a.name.as_deref(), Some("a"));
        assert_eq!(a.version.as_deref(), Some("1.0.0"));
        assert_eq!(a.dependencies["@s/b"], "^2");
        assert_eq!(a.get_str("_integrity"), Some("sha512-abc"));
        assert!(a.other.get("dev").is_none());

        let b = lock.get("node_modules/a/node_modules/@s/b").unwrap();
        assert_eq!(b.name.as_deref(), Some("@s/b"));
        assert_eq!(lock.get("packages/ws").unwrap().name.as_deref(), Some("ws"));
    }

    #[test]
    fn test_old_format_rejected() {
        let bytes = serde_json::to_vec(&json!({ "lockfileVersion": 1, "dependencies": {} })).unwrap();
        assert!(HiddenLockfile::from_slice(&bytes).is_err());
        assert!(HiddenLockfile::from_slice(b"{ nope").is_err());
    }

    #[test]
    fn test_installed_name() {
        assert_eq!(installed_name("node_modules/a"), Some("a"));
        assert_eq!(installed_name("node_modules/a/node_modules/@s/b"), Some("@s/b"));
        assert_eq!(installed_name("packages/ws"), None);
    }

    #[tokio::test]
    async fn test_missing_folder_makes_it_stale() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("node_modules/a")).unwrap();
        fs::write(
            root.join("node_modules").join(HIDDEN_LOCKFILE),
            lockfile(json!({
                "node_modules/a": { "version": "1.0.0" },
                "node_modules/gone": { "version": "1.0.0" }
            })),
        )
        .unwrap();
        assert!(HiddenLockfile::load(root).await.is_none());
    }

    #[tokio::test]
    async fn test_newer_folder_makes_it_stale() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("node_modules/a")).unwrap();
        let file = root.join("node_modules").join(HIDDEN_LOCKFILE);
        fs::write(&file, lockfile(json!({ "node_modules/a": { "version": "1.0.0" } }))).unwrap();
        assert!(HiddenLockfile::load(root).await.is_some());

        fs::File::options()
            .write(true)
            .open(&file)
            .unwrap()
            .set_modified(UNIX_EPOCH + Duration::from_secs(1))
            .unwrap();
        assert!(HiddenLockfile::load(root).await.is_none());
    }
}
