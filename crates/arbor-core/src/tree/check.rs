//! Integrity check for loaded trees.

use super::Tree;
use crate::error::ArboristError;
use std::collections::HashMap;

/// Verify the structural invariants of a tree.
///
/// # Errors
/// Returns `ETREECHECK` naming the first offending node.
pub fn tree_check(tree: &Tree) -> Result<(), ArboristError> {
    let mut by_realpath = HashMap::new();

    for (id, node) in tree.iter() {
        for (key, &child_id) in &node.children {
            let Some(child) = tree.get(child_id) else {
                return Err(ArboristError::tree_check(
                    &node.path,
                    format!("child {key} points outside the tree"),
                ));
            };
            if child.name != *key {
                return Err(ArboristError::tree_check(
                    &child.path,
                    format!("child stored as {key} is named {}", child.name),
                ));
            }
            if child.parent != Some(id) {
                return Err(ArboristError::tree_check(
                    &child.path,
                    "child does not point back at its parent",
                ));
            }
        }

        if let Some(target_id) = node.target {
            let Some(target) = tree.get(target_id) else {
                return Err(ArboristError::tree_check(
                    &node.path,
                    "link target points outside the tree",
                ));
            };
            if target.realpath != node.realpath {
                return Err(ArboristError::tree_check(
                    &node.path,
                    format!("link target lives at {}", target.realpath.display()),
                ));
            }
            if !node.children.is_empty() {
                return Err(ArboristError::tree_check(&node.path, "link has children"));
            }
            continue;
        }

        if node.broken {
            if !node.children.is_empty() {
                return Err(ArboristError::tree_check(
                    &node.path,
                    "unresolved entry has children",
                ));
            }
            continue;
        }

        if let Some(other) = by_realpath.insert(node.realpath.clone(), id) {
            return Err(ArboristError::tree_check(
                &node.path,
                format!(
                    "realpath already loaded at {}",
                    tree.node(other).path.display()
                ),
            ));
        }
    }

    for id in tree.structural() {
        if id != tree.root() && tree.node(id).parent.is_none() {
            return Err(ArboristError::tree_check(
                &tree.node(id).path,
                "reachable node has no parent",
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;
    use crate::manifest::Manifest;
    use crate::tree::Node;
    use std::path::PathBuf;

    fn node(name: &str, path: &str) -> Node {
        Node::new(name, PathBuf::from(path), PathBuf::from(path), Manifest::default())
    }

    #[test]
    fn test_clean_tree_passes() {
        let mut tree = Tree::new(node("root", "/r"));
        let a = tree.push(node("a", "/r/node_modules/a"));
        tree.attach(tree.root(), a);
        let target = tree.push(node("ws", "/r/packages/ws"));
        let mut link = node("ws", "/r/node_modules/ws");
        link.realpath = PathBuf::from("/r/packages/ws");
        link.target = Some(target);
        let link = tree.push(link);
        tree.attach(tree.root(), link);

        assert!(tree_check(&tree).is_ok());
    }

    #[test]
    fn test_wrong_link_realpath_fails() {
        let mut tree = Tree::new(node("root", "/r"));
        let target = tree.push(node("ws", "/r/packages/ws"));
        let mut link = node("ws", "/r/node_modules/ws");
        link.target = Some(target);
        let link = tree.push(link);
        tree.attach(tree.root(), link);

        let err = tree_check(&tree).unwrap_err();
        assert_eq!(err.code(), codes::ETREECHECK);
        assert_eq!(err.path(), PathBuf::from("/r/node_modules/ws"));
    }

    #[test]
    fn test_duplicate_realpath_fails() {
        let mut tree = Tree::new(node("root", "/r"));
        let a = tree.push(node("a", "/r/node_modules/a"));
        tree.attach(tree.root(), a);
        let dup = tree.push(node("a", "/r/node_modules/a"));
        tree.attach(a, dup);

        assert!(tree_check(&tree).is_err());
    }

    #[test]
    fn test_mismatched_key_fails() {
        let mut tree = Tree::new(node("root", "/r"));
        let a = tree.push(node("a", "/r/node_modules/a"));
        tree.attach(tree.root(), a);
        tree.node_mut(a).name = "renamed".to_string();

        assert!(tree_check(&tree).is_err());
    }
}
