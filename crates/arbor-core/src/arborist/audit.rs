//! Missing-dependency audit over a loaded tree.

use crate::error::NodeError;
use crate::manifest::DepKind;
use crate::tree::{NodeId, Tree};
use std::collections::HashSet;
use tracing::debug;

/// Sections checked on the root, in reporting order.
const ROOT_KINDS: [DepKind; 3] = [DepKind::Prod, DepKind::Dev, DepKind::Peer];
/// Sections checked everywhere else; dev deps of installed packages are never installed.
const DEP_KINDS: [DepKind; 2] = [DepKind::Prod, DepKind::Peer];

/// Record `EMISSINGDEP` on every structural node whose declared dependency
/// does not resolve to a usable installed node.
///
/// Optional dependencies are never reported. A name declared in several
/// sections is reported at most once.
pub(crate) fn audit_missing(tree: &mut Tree) -> usize {
    let root = tree.root();
    let mut findings: Vec<(NodeId, NodeError)> = Vec::new();

    for id in tree.structural() {
        let node = tree.node(id);
        if node.is_link() || node.broken {
            continue;
        }

        let kinds: &[DepKind] = if id == root { &ROOT_KINDS } else { &DEP_KINDS };
        let mut checked: HashSet<&str> = node
            .package
            .optional_dependencies
            .keys()
            .map(String::as_str)
            .collect();

        for &kind in kinds {
            for (name, range) in node.package.section(kind) {
                if !checked.insert(name.as_str()) {
                    continue;
                }
                let usable = tree
                    .resolve(id, name)
                    .is_some_and(|found| !tree.node(found).broken);
                if !usable {
                    findings.push((id, NodeError::missing_dep(&node.path, name, range)));
                }
            }
        }
    }

    let count = findings.len();
    for (id, error) in findings {
        debug!(path = %error.path.display(), dependency = ?error.dependency, "missing dependency");
        tree.node_mut(id).errors.push(error);
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;
    use crate::manifest::Manifest;
    use crate::tree::Node;
    use std::path::{Path, PathBuf};

    fn node(name: &str, path: &str, package: serde_json::Value) -> Node {
        Node::new(
            name,
            PathBuf::from(path),
            PathBuf::from(path),
            Manifest::from_value(package).unwrap(),
        )
    }

    fn missing(tree: &Tree, id: NodeId) -> Vec<String> {
        tree.node(id)
            .errors
            .iter()
            .filter(|e| e.code == codes::EMISSINGDEP)
            .filter_map(|e| e.dependency.clone())
            .collect()
    }

    #[test]
    fn test_root_sections() {
        let mut tree = Tree::new(node(
            "root",
            "/r",
            serde_json::json!({
                "dependencies": { "a": "1", "gone": "^1" },
                "devDependencies": { "dev-gone": "2" },
                "optionalDependencies": { "opt-gone": "3" },
                "peerDependencies": { "peer-gone": "4" }
            }),
        ));
        let a = tree.push(node("a", "/r/node_modules/a", serde_json::json!({})));
        tree.attach(tree.root(), a);

        assert_eq!(audit_missing(&mut tree), 3);
        assert_eq!(
            missing(&tree, tree.root()),
            vec!["gone@^1", "dev-gone@2", "peer-gone@4"]
        );
    }

    #[test]
    fn test_nested_resolves_upward_and_skips_dev() {
        let mut tree = Tree::new(node("root", "/r", serde_json::json!({})));
        let a = tree.push(node(
            "a",
            "/r/node_modules/a",
            serde_json::json!({
                "dependencies": { "b": "1" },
                "devDependencies": { "tap": "1" }
            }),
        ));
        tree.attach(tree.root(), a);
        let b = tree.push(node("b", "/r/node_modules/b", serde_json::json!({})));
        tree.attach(tree.root(), b);

        assert_eq!(audit_missing(&mut tree), 0);
        assert!(tree.node(a).errors.is_empty());
    }

    #[test]
    fn test_optional_declaration_suppresses_peer() {
        let mut tree = Tree::new(node(
            "root",
            "/r",
            serde_json::json!({
                "optionalDependencies": { "x": "1" },
                "peerDependencies": { "x": "1" }
            }),
        ));
        assert_eq!(audit_missing(&mut tree), 0);
    }

    #[test]
    fn test_broken_resolution_counts_as_missing() {
        let mut tree = Tree::new(node(
            "root",
            "/r",
            serde_json::json!({ "dependencies": { "loop": "1" } }),
        ));
        let path = Path::new("/r/node_modules/loop");
        let broken = tree.push(Node::broken(
            "loop",
            path,
            NodeError::new(codes::ELOOP, path, "loop"),
        ));
        tree.attach(tree.root(), broken);

        assert_eq!(audit_missing(&mut tree), 1);
        assert_eq!(missing(&tree, tree.root()), vec!["loop@1"]);
        assert_eq!(tree.node(broken).errors.len(), 1);
    }

    #[test]
    fn test_links_not_audited() {
        let mut tree = Tree::new(node("root", "/r", serde_json::json!({})));
        let target = tree.push(node(
            "ws",
            "/r/packages/ws",
            serde_json::json!({ "dependencies": { "nope": "1" } }),
        ));
        let mut link = node(
            "ws",
            "/r/node_modules/ws",
            serde_json::json!({ "dependencies": { "nope": "1" } }),
        );
        link.realpath = PathBuf::from("/r/packages/ws");
        link.target = Some(target);
        let link = tree.push(link);
        tree.attach(tree.root(), link);

        // the target is not structurally reachable, the link is skipped
        assert_eq!(audit_missing(&mut tree), 0);
    }
}
