//! Yarn v1 lockfile (`yarn.lock`).
//!
//! The format is line based: an unindented `spec, spec:` line opens an entry,
//! two-space lines carry `key value` fields or open a `key:` section, and
//! four-space lines fill the open section. A blank line closes the entry.

use crate::error::codes;
use crate::manifest::DepKind;
use crate::tree::{NodeId, Tree};
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Lockfile file name.
pub const YARN_LOCK_NAME: &str = "yarn.lock";

/// Text every rendered lockfile starts with.
pub const HEADER: &str =
    "# THIS IS AN AUTOGENERATED FILE. DO NOT EDIT THIS FILE DIRECTLY.\n# yarn lockfile v1\n\n\n";

/// A line that could not be understood.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid yarn.lock line {line}: {}", content.trim_end())]
pub struct YarnLockError {
    /// The offending line, newline included.
    pub content: String,
    /// 1-based line number.
    pub line: usize,
    /// Byte offset of the start of the line.
    pub position: usize,
}

impl YarnLockError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        codes::EYARNLOCK
    }
}

/// One resolved package, shared by every spec listed for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct YarnLockEntry {
    pub specs: BTreeSet<String>,
    /// Scalar fields such as `version`, `resolved`, `integrity`.
    pub fields: BTreeMap<String, String>,
    /// Nested maps such as `dependencies`.
    pub sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl YarnLockEntry {
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.field("version")
    }

    #[must_use]
    pub fn resolved(&self) -> Option<&str> {
        self.field("resolved")
    }

    #[must_use]
    pub fn integrity(&self) -> Option<&str> {
        self.field("integrity")
    }

    #[must_use]
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn section(&self, key: &str) -> Option<&BTreeMap<String, String>> {
        self.sections.get(key)
    }
}

impl fmt::Display for YarnLockEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let specs: Vec<String> = self.specs.iter().map(|s| quote(s)).collect();
        write!(f, "{}:", specs.join(", "))?;
        for (key, value) in &self.fields {
            write!(f, "\n  {} {}", quote(key), quote(value))?;
        }
        for (key, values) in self.sections.iter().filter(|(_, v)| !v.is_empty()) {
            write!(f, "\n  {key}:")?;
            for (name, value) in values {
                write!(f, "\n    {} {}", quote(name), quote(value))?;
            }
        }
        Ok(())
    }
}

/// Parsed lockfile. Entries are kept in rendering order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct YarnLock {
    entries: Vec<YarnLockEntry>,
    /// spec -> index into `entries`
    index: BTreeMap<String, usize>,
}

struct Patterns {
    entry_start: Regex,
    subkey: Regex,
    subval: Regex,
    metadata: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        entry_start: Regex::new(r"^[^\s].*:$").expect("valid pattern"),
        subkey: Regex::new(r"^ {2}[^\s]+:$").expect("valid pattern"),
        subval: Regex::new(r"^ {4}[^\s]+ .+$").expect("valid pattern"),
        metadata: Regex::new(r"^ {2}[^\s]+ .+$").expect("valid pattern"),
    })
}

impl YarnLock {
    /// Parse lockfile text.
    ///
    /// # Errors
    /// Fails on the first line that fits none of the line shapes, or whose
    /// `key value` pair does not split into exactly two tokens.
    pub fn parse(data: &str) -> Result<Self, YarnLockError> {
        let p = patterns();
        let mut entries = Vec::new();
        let mut current: Option<YarnLockEntry> = None;
        let mut section: Option<String> = None;
        let mut offset = 0;

        for (i, raw) in data.split('\n').enumerate() {
            let start = offset;
            offset += raw.len() + 1;
            let line = raw.strip_suffix('\r').unwrap_or(raw);
            let fail = || YarnLockError {
                content: format!("{line}\n"),
                line: i + 1,
                position: start,
            };

            if line.trim().is_empty() {
                entries.extend(current.take());
                section = None;
                continue;
            }
            if line.trim_start().starts_with('#') {
                continue;
            }

            if p.entry_start.is_match(line) {
                entries.extend(current.take());
                section = None;
                let specs = split_quoted(&line[..line.len() - 1], ',');
                current = Some(YarnLockEntry {
                    specs: specs.into_iter().collect(),
                    ..YarnLockEntry::default()
                });
                continue;
            }

            let Some(entry) = current.as_mut() else {
                return Err(fail());
            };

            if p.subkey.is_match(line) {
                let key = line.trim()[..line.trim().len() - 1].to_string();
                entry.sections.entry(key.clone()).or_default();
                section = Some(key);
            } else if p.subval.is_match(line) {
                let Some(key) = &section else {
                    return Err(fail());
                };
                let (name, value) = pair(line).ok_or_else(fail)?;
                entry
                    .sections
                    .entry(key.clone())
                    .or_default()
                    .insert(name, value);
            } else if p.metadata.is_match(line) {
                section = None;
                let (key, mut value) = pair(line).ok_or_else(fail)?;
                if key == "resolved" {
                    // drop the `#sha1` suffix yarn appends to tarball urls
                    if let Some(hash) = value.find('#') {
                        value.truncate(hash);
                    }
                }
                entry.fields.insert(key, value);
            } else {
                return Err(fail());
            }
        }
        entries.extend(current);

        Ok(Self::from_entries(entries))
    }

    /// Build a lockfile describing every installed package in `tree`.
    ///
    /// Each package lists the `name@range` specs that resolve to it from its
    /// dependents; a package nobody declares is listed as `name@version`.
    #[must_use]
    pub fn from_tree(tree: &Tree) -> Self {
        let root = tree.root();
        let mut specs: HashMap<NodeId, BTreeSet<String>> = HashMap::new();

        for (id, node) in tree.iter() {
            if node.is_link() || node.broken {
                continue;
            }
            for kind in DepKind::PRECEDENCE {
                for (name, range) in node.package.section(kind) {
                    let Some(found) = tree.resolve(id, name) else {
                        continue;
                    };
                    let found = tree.node(found).target.unwrap_or(found);
                    if found == root || tree.node(found).broken {
                        continue;
                    }
                    specs
                        .entry(found)
                        .or_default()
                        .insert(format!("{name}@{range}"));
                }
            }
        }

        let entries = tree
            .iter()
            .filter(|(id, node)| *id != root && !node.is_link() && !node.broken)
            .map(|(id, node)| {
                let specs = specs.remove(&id).unwrap_or_else(|| {
                    BTreeSet::from([format!("{}@{}", node.name, node.version().unwrap_or("*"))])
                });

                let mut fields = BTreeMap::new();
                if let Some(version) = node.version() {
                    fields.insert("version".to_string(), version.to_string());
                }
                for (key, source) in [("resolved", "_resolved"), ("integrity", "_integrity")] {
                    if let Some(value) = node.package.get_str(source) {
                        fields.insert(key.to_string(), value.to_string());
                    }
                }

                let mut sections = BTreeMap::new();
                for kind in [DepKind::Prod, DepKind::Optional] {
                    let deps = node.package.section(kind);
                    if !deps.is_empty() {
                        sections.insert(kind.section().to_string(), deps.clone());
                    }
                }

                YarnLockEntry {
                    specs,
                    fields,
                    sections,
                }
            })
            .collect();

        Self::from_entries(entries)
    }

    /// Entry a spec (e.g. `lodash@^4.0.0`) resolved to.
    #[must_use]
    pub fn get(&self, spec: &str) -> Option<&YarnLockEntry> {
        self.index.get(spec).map(|&i| &self.entries[i])
    }

    #[must_use]
    pub fn entries(&self) -> &[YarnLockEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sort by rendered text and drop what rendering would drop, so a parsed
    /// rendering compares equal to its source.
    fn from_entries(entries: Vec<YarnLockEntry>) -> Self {
        let mut keyed: Vec<(String, YarnLockEntry)> = entries
            .into_iter()
            .map(|mut entry| {
                entry.sections.retain(|_, values| !values.is_empty());
                (entry.to_string(), entry)
            })
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        keyed.dedup_by(|a, b| a.0 == b.0);

        let entries: Vec<YarnLockEntry> = keyed.into_iter().map(|(_, entry)| entry).collect();
        let mut index = BTreeMap::new();
        for (i, entry) in entries.iter().enumerate() {
            for spec in &entry.specs {
                index.insert(spec.clone(), i);
            }
        }
        Self { entries, index }
    }
}

impl fmt::Display for YarnLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(HEADER)?;
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str("\n\n")?;
            }
            write!(f, "{entry}")?;
        }
        f.write_str("\n")
    }
}

fn quote(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

/// Split a `key value` line into exactly two tokens.
fn pair(line: &str) -> Option<(String, String)> {
    let mut tokens = split_quoted(line.trim(), ' ').into_iter();
    match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(key), Some(value), None) => Some((key, value)),
        _ => None,
    }
}

/// Split on `delim`, keeping double-quoted runs together and unquoting them.
fn split_quoted(s: &str, delim: char) -> Vec<String> {
    let mut out = Vec::new();
    let mut chunks = s.split(delim);

    while let Some(chunk) = chunks.next() {
        let chunk = chunk.trim();
        if chunk.is_empty() {
            continue;
        }
        if !chunk.starts_with('"') {
            out.push(chunk.to_string());
            continue;
        }

        let mut quoted = chunk.to_string();
        while !closes_quote(&quoted) {
            let Some(next) = chunks.next() else {
                break;
            };
            quoted.push(delim);
            quoted.push_str(next);
        }
        out.push(unquote(quoted.trim_end()));
    }
    out
}

fn closes_quote(quoted: &str) -> bool {
    match quoted[1..].strip_suffix('"') {
        Some(body) => body.chars().rev().take_while(|&c| c == '\\').count() % 2 == 0,
        None => false,
    }
}

fn unquote(quoted: &str) -> String {
    serde_json::from_str::<String>(quoted).unwrap_or_else(|_| {
        let inner = quoted.strip_prefix('"').unwrap_or(quoted);
        inner.strip_suffix('"').unwrap_or(inner).to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;
    use crate::tree::Node;
    use std::path::PathBuf;

    const BABEL: &str = r#"# THIS IS AN AUTOGENERATED FILE. DO NOT EDIT THIS FILE DIRECTLY.
# yarn lockfile v1


"@babel/code-frame@^7.0.0", "@babel/code-frame@^7.5.5":
  version "7.5.5"
  resolved "https://registry.yarnpkg.com/@babel/code-frame/-/code-frame-7.5.5.tgz#bc0782f6d69f7b7d49531219699b988f669a8f9d"
  integrity sha512-27d4lZlF/3cXCo9r0KTCoGOQwGf3dTXk5KM3pNDhHqWzJM/jl1nvxO+0zIaw+FjhdUOhlmALaE2KbUVBgFjpA==
  dependencies:
    "@babel/highlight" "^7.0.0"

"@babel/highlight@^7.0.0":
  version "7.5.0"
  resolved "https://registry.yarnpkg.com/@babel/highlight/-/highlight-7.5.0.tgz"
  dependencies:
    chalk "^2.0.0"
    js-tokens "^4.0.0"

chalk@^2.0.0, chalk@^2.4.2:
  version "2.4.2"
"#;

    #[test]
    fn test_parse_entries() {
        let lock = YarnLock::parse(BABEL).unwrap();
        assert_eq!(lock.len(), 3);

        let frame = lock.get("@babel/code-frame@^7.5.5").unwrap();
        assert_eq!(frame.version(), Some("7.5.5"));
        assert_eq!(
            frame.resolved(),
            Some("https://registry.yarnpkg.com/@babel/code-frame/-/code-frame-7.5.5.tgz")
        );
        assert!(frame.integrity().unwrap().starts_with("sha512-"));
        assert_eq!(frame.section("dependencies").unwrap()["@babel/highlight"], "^7.0.0");
        assert_eq!(lock.get("@babel/code-frame@^7.0.0"), Some(frame));

        let chalk = lock.get("chalk@^2.4.2").unwrap();
        assert_eq!(chalk.specs.len(), 2);
    }

    #[test]
    fn test_render_then_parse_is_equal() {
        let lock = YarnLock::parse(BABEL).unwrap();
        let rendered = lock.to_string();
        assert!(rendered.starts_with(HEADER));
        assert!(rendered.contains("\"@babel/code-frame@^7.0.0\", \"@babel/code-frame@^7.5.5\":\n"));
        assert!(rendered.contains("\n  dependencies:\n    \"chalk\" \"^2.0.0\"\n"));

        let again = YarnLock::parse(&rendered).unwrap();
        assert_eq!(again, lock);
        assert_eq!(again.to_string(), rendered);
    }

    #[test]
    fn test_garbage_fails_with_location() {
        let err = YarnLock::parse(
            r#"
asdf@foo:
  this !is not vlid
            i mean
what even is it??
   not yarn lock, that's for sure
      {"maybe":"json"}?
 - or: even
 - yaml?
 - NO
"#,
        )
        .unwrap_err();

        assert_eq!(err.content, "  this !is not vlid\n");
        assert_eq!(err.line, 3);
        assert_eq!(err.position, 11);
    }

    #[test]
    fn test_invalid_subkey_value_fails() {
        let err = YarnLock::parse(
            "\nasdf@foo:\n  dependencies:\n    foo bar baz blork\n",
        )
        .unwrap_err();

        assert_eq!(err.content, "    foo bar baz blork\n");
        assert_eq!(err.line, 4);
    }

    #[test]
    fn test_field_outside_entry_fails() {
        let err = YarnLock::parse("  version \"1.0.0\"\n").unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(err.position, 0);
    }

    #[test]
    fn test_empty_section_omitted() {
        let lock = YarnLock::parse(
            r#"
foo@bar:
  version "1.2.3"
  resolved "https://registry.local/foo/-/foo-1.2.3.tgz"
  dependencies:

# Note: do not require a \n at the end of the file, just add it if missing
# Also: comments are not preserved.

bar@foo:
  version "1.2.3""#,
        )
        .unwrap();

        assert_eq!(
            lock.to_string(),
            r#"# THIS IS AN AUTOGENERATED FILE. DO NOT EDIT THIS FILE DIRECTLY.
# yarn lockfile v1


"bar@foo":
  "version" "1.2.3"

"foo@bar":
  "resolved" "https://registry.local/foo/-/foo-1.2.3.tgz"
  "version" "1.2.3"
"#
        );
    }

    #[test]
    fn test_split_quoted() {
        assert_eq!(split_quoted(r#"a@1, "b@2""#, ','), vec!["a@1", "b@2"]);
        assert_eq!(
            split_quoted(r#"key "two words""#, ' '),
            vec!["key", "two words"]
        );
        assert_eq!(
            split_quoted(r#""say \"hi\"" x"#, ' '),
            vec![r#"say "hi""#, "x"]
        );
        assert_eq!(split_quoted(r#""" x"#, ' '), vec!["", "x"]);
    }

    fn node(name: &str, path: &str, package: serde_json::Value) -> Node {
        Node::new(
            name,
            PathBuf::from(path),
            PathBuf::from(path),
            Manifest::from_value(package).unwrap(),
        )
    }

    #[test]
    fn test_from_tree() {
        let mut tree = Tree::new(node(
            "root",
            "/r",
            serde_json::json!({ "dependencies": { "a": "^1.0.0" } }),
        ));
        let a = tree.push(node(
            "a",
            "/r/node_modules/a",
            serde_json::json!({
                "name": "a",
                "version": "1.2.0",
                "_resolved": "https://registry.local/a/-/a-1.2.0.tgz",
                "_integrity": "sha512-aaa",
                "dependencies": { "b": "~2.0.0" }
            }),
        ));
        tree.attach(tree.root(), a);
        let b = tree.push(node(
            "b",
            "/r/node_modules/b",
            serde_json::json!({ "name": "b", "version": "2.0.1" }),
        ));
        tree.attach(tree.root(), b);
        let stray = tree.push(node(
            "stray",
            "/r/node_modules/stray",
            serde_json::json!({ "name": "stray", "version": "0.0.1" }),
        ));
        tree.attach(tree.root(), stray);

        let lock = YarnLock::from_tree(&tree);
        assert_eq!(lock.len(), 3);

        let a = lock.get("a@^1.0.0").unwrap();
        assert_eq!(a.version(), Some("1.2.0"));
        assert_eq!(a.resolved(), Some("https://registry.local/a/-/a-1.2.0.tgz"));
        assert_eq!(a.integrity(), Some("sha512-aaa"));
        assert_eq!(a.section("dependencies").unwrap()["b"], "~2.0.0");

        assert_eq!(lock.get("b@~2.0.0").unwrap().version(), Some("2.0.1"));
        assert!(lock.get("stray@0.0.1").is_some());

        let text = lock.to_string();
        assert_eq!(YarnLock::parse(&text).unwrap(), lock);
    }
}
