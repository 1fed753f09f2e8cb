//! Integration tests for `arbor ls` and `arbor yarn-lock`.
//!
//! These tests create node_modules structures and verify the JSON output.

use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn cargo_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO"));
    cmd.args(["run", "-q", "-p", "arbor-cli", "--bin", "arbor", "--"]);
    cmd
}

/// Write a package.json into `dir`, creating it.
fn write_pkg(dir: &Path, name: &str, version: &str, deps: &[(&str, &str)]) {
    fs::create_dir_all(dir).unwrap();
    let deps: serde_json::Map<String, serde_json::Value> = deps
        .iter()
        .map(|(n, r)| ((*n).to_string(), serde_json::json!(r)))
        .collect();
    let pkg = serde_json::json!({
        "name": name,
        "version": version,
        "dependencies": deps,
    });
    fs::write(dir.join("package.json"), pkg.to_string()).unwrap();
}

/// Project with one plain dep (`a`) that needs an uninstalled `missing`.
fn create_project() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_pkg(root, "proj", "1.0.0", &[("a", "^1.0.0")]);
    write_pkg(
        &root.join("node_modules/a"),
        "a",
        "1.2.0",
        &[("missing", "^2.0.0")],
    );
    write_pkg(&root.join("node_modules/stray"), "stray", "0.1.0", &[]);
    dir
}

fn run_json(args: &[&str], cwd: &Path) -> (bool, serde_json::Value) {
    let output = cargo_bin()
        .args(args)
        .arg("--json")
        .arg("--cwd")
        .arg(cwd)
        .output()
        .expect("Failed to run arbor");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let json: serde_json::Value = serde_json::from_str(stdout.trim())
        .unwrap_or_else(|e| panic!("invalid JSON ({e}): {stdout}"));
    (output.status.success(), json)
}

#[test]
fn test_ls_json_output() {
    let project = create_project();
    let (success, json) = run_json(&["ls"], project.path());

    assert!(success);
    assert_eq!(json["ok"], true);
    assert_eq!(json["schema_version"], 1);

    let tree = &json["tree"];
    assert_eq!(tree["name"], "proj");
    assert_eq!(tree["location"], "");

    let a = &tree["children"]["a"];
    assert_eq!(a["version"], "1.2.0");
    assert_eq!(a["location"], "node_modules/a");
    assert!(a.get("flags").is_none());
    assert_eq!(a["errors"][0]["code"], "EMISSINGDEP");
    assert_eq!(a["errors"][0]["dependency"], "missing@^2.0.0");

    let stray = &tree["children"]["stray"];
    assert_eq!(stray["flags"][0], "extraneous");
}

#[test]
fn test_ls_ignore_missing_and_only() {
    let project = create_project();
    let (success, json) = run_json(&["ls", "--ignore-missing", "--only", "a"], project.path());

    assert!(success);
    let children = json["tree"]["children"].as_object().unwrap();
    assert_eq!(children.len(), 1);
    assert!(children["a"].get("errors").is_none());
}

#[test]
fn test_ls_missing_root_fails() {
    let project = create_project();
    let (success, json) = run_json(&["ls", "does-not-exist"], project.path());

    assert!(!success);
    assert_eq!(json["ok"], false);
    assert_eq!(json["error"]["code"], "ENOENT");
}

#[test]
fn test_yarn_lock_from_tree() {
    let project = create_project();
    let (success, json) = run_json(&["yarn-lock"], project.path());

    assert!(success);
    assert_eq!(json["entries"], 2);
    let text = json["lockfile"].as_str().unwrap();
    assert!(text.starts_with("# THIS IS AN AUTOGENERATED FILE."));
    assert!(text.contains("\"a@^1.0.0\":\n  \"version\" \"1.2.0\""));
    assert!(text.contains("\"stray@0.1.0\":"));
}

#[test]
fn test_yarn_lock_parse_error_location() {
    let project = create_project();
    fs::write(
        project.path().join("yarn.lock"),
        "\nasdf@foo:\n  dependencies:\n    foo bar baz blork\n",
    )
    .unwrap();
    let (success, json) = run_json(&["yarn-lock", "yarn.lock"], project.path());

    assert!(!success);
    assert_eq!(json["error"]["code"], "EYARNLOCK");
    assert_eq!(json["error"]["line"], 4);
}

#[test]
fn test_version_json() {
    let output = cargo_bin()
        .args(["version", "--json"])
        .output()
        .expect("Failed to run arbor");
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["ok"], true);
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}
