//! `package.json` decoding.
//!
//! The loader only needs the four dependency sections and a few identity
//! fields; everything else is kept verbatim in [`Manifest::other`].

use crate::error::NodeError;
use arbor_util::fs::strip_bom_bytes;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Manifest file name.
pub const MANIFEST_NAME: &str = "package.json";

/// Section a dependency was declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DepKind {
    Prod,
    Dev,
    Optional,
    Peer,
}

impl DepKind {
    /// Lookup order used when classifying a child; first match wins.
    pub const PRECEDENCE: [DepKind; 4] = [Self::Prod, Self::Dev, Self::Optional, Self::Peer];

    /// `package.json` key holding this section.
    #[must_use]
    pub fn section(self) -> &'static str {
        match self {
            Self::Prod => "dependencies",
            Self::Dev => "devDependencies",
            Self::Optional => "optionalDependencies",
            Self::Peer => "peerDependencies",
        }
    }
}

/// Decoded `package.json`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub name: Option<String>,
    pub version: Option<String>,
    pub dependencies: BTreeMap<String, String>,
    pub dev_dependencies: BTreeMap<String, String>,
    pub optional_dependencies: BTreeMap<String, String>,
    pub peer_dependencies: BTreeMap<String, String>,
    /// Every other top-level field, untouched.
    pub other: Map<String, Value>,
}

impl Manifest {
    /// Build a manifest from decoded JSON.
    ///
    /// Returns `None` unless the value is an object. Dependency entries whose
    /// range is not a string are dropped.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut obj) = value else {
            return None;
        };

        let mut manifest = Self {
            name: take_string(&mut obj, "name"),
            version: take_string(&mut obj, "version"),
            ..Self::default()
        };
        for kind in DepKind::PRECEDENCE {
            if let Some(section) = obj.remove(kind.section()) {
                *manifest.section_mut(kind) = extract_section(&section);
            }
        }
        manifest.other = obj;
        Some(manifest)
    }

    /// Decode manifest bytes. A leading BOM is ignored.
    ///
    /// # Errors
    /// Returns a message when the bytes are not a JSON object.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, String> {
        let value: Value =
            serde_json::from_slice(strip_bom_bytes(bytes)).map_err(|e| e.to_string())?;
        Self::from_value(value).ok_or_else(|| "package.json must be a JSON object".to_string())
    }

    /// Dependency map for one section.
    #[must_use]
    pub fn section(&self, kind: DepKind) -> &BTreeMap<String, String> {
        match kind {
            DepKind::Prod => &self.dependencies,
            DepKind::Dev => &self.dev_dependencies,
            DepKind::Optional => &self.optional_dependencies,
            DepKind::Peer => &self.peer_dependencies,
        }
    }

    fn section_mut(&mut self, kind: DepKind) -> &mut BTreeMap<String, String> {
        match kind {
            DepKind::Prod => &mut self.dependencies,
            DepKind::Dev => &mut self.dev_dependencies,
            DepKind::Optional => &mut self.optional_dependencies,
            DepKind::Peer => &mut self.peer_dependencies,
        }
    }

    /// First section, in precedence order, that declares `name`.
    #[must_use]
    pub fn dep_kind(&self, name: &str) -> Option<DepKind> {
        DepKind::PRECEDENCE
            .into_iter()
            .find(|kind| self.section(*kind).contains_key(name))
    }

    /// Passthrough string field, e.g. `_resolved`.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.other.get(key).and_then(Value::as_str)
    }
}

fn take_string(obj: &mut Map<String, Value>, key: &str) -> Option<String> {
    match obj.remove(key) {
        Some(Value::String(s)) => Some(s),
        Some(other) => {
            // keep odd values visible to callers that care
            obj.insert(key.to_string(), other);
            None
        }
        None => None,
    }
}

fn extract_section(section: &Value) -> BTreeMap<String, String> {
    let Some(obj) = section.as_object() else {
        return BTreeMap::new();
    };
    obj.iter()
        .filter_map(|(name, range)| range.as_str().map(|r| (name.clone(), r.to_string())))
        .collect()
}

/// Read `<dir>/package.json`.
///
/// Never fails the caller: on any error the default manifest is returned
/// together with a diagnostic (`ENOENT`, `EJSONPARSE`, or the native code).
pub async fn read_manifest(dir: &Path) -> (Manifest, Option<NodeError>) {
    let path = dir.join(MANIFEST_NAME);
    match tokio::fs::read(&path).await {
        Ok(bytes) => match Manifest::from_slice(&bytes) {
            Ok(manifest) => (manifest, None),
            Err(message) => (
                Manifest::default(),
                Some(NodeError::json_parse(&path, message)),
            ),
        },
        Err(e) => (Manifest::default(), Some(NodeError::from_io(&path, &e))),
    }
}
