//! Integration tests for the `copy-production-deps` binary.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_copy-production-deps"))
}

fn create_package_json(dir: &Path, name: &str, version: &str, deps: &[(&str, &str)]) {
    fs::create_dir_all(dir).unwrap();
    let deps: serde_json::Map<String, serde_json::Value> = deps
        .iter()
        .map(|(n, v)| ((*n).to_string(), serde_json::json!(v)))
        .collect();
    let package_json = serde_json::json!({
        "name": name,
        "version": version,
        "dependencies": deps
    });
    fs::write(
        dir.join("package.json"),
        serde_json::to_string_pretty(&package_json).unwrap(),
    )
    .unwrap();
    fs::write(dir.join("index.js"), "module.exports = {};").unwrap();
}

/// `app` depending on `a`, which depends on `b`.
fn setup_app() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let app = dunce::canonicalize(dir.path()).unwrap().join("app");
    create_package_json(&app, "app", "1.0.0", &[("a", "^1.0.0")]);
    create_package_json(&app.join("node_modules/a"), "a", "1.0.0", &[("b", "^2.0.0")]);
    create_package_json(&app.join("node_modules/b"), "b", "2.3.0", &[]);
    (dir, app)
}

fn run_in(dir: &Path, args: &[&str]) -> Output {
    bin()
        .current_dir(dir)
        .args(["--workspace-root", "."])
        .args(args)
        .output()
        .expect("Failed to run copy-production-deps")
}

#[test]
fn test_copies_with_default_paths() {
    let (_dir, app) = setup_app();

    let output = run_in(&app, &[]);

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(app.join("dist/node_modules/a/index.js").exists());
    assert!(app.join("dist/node_modules/b/package.json").exists());
}

#[test]
fn test_explicit_paths() {
    let (dir, app) = setup_app();
    let out = dir.path().join("deploy");

    let output = bin()
        .arg(&app)
        .arg(&out)
        .args(["--workspace-root"])
        .arg(&app)
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(out.join("node_modules/a/index.js").exists());
}

#[test]
fn test_missing_dependency_exits_2_with_report() {
    let (_dir, app) = setup_app();
    create_package_json(
        &app.join("node_modules/a"),
        "a",
        "1.0.0",
        &[("b", "^2.0.0"), ("gone", "*")],
    );
    create_package_json(&app, "app", "1.0.0", &[("a", "^1.0.0"), ("left-pad", "^1.0.0")]);

    let output = run_in(&app, &[]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr.contains("copy-production-deps: failed"), "stderr: {stderr}");
    assert!(
        stderr.contains("left-pad@^1.0.0 not found as needed by ."),
        "stderr: {stderr}"
    );
    assert!(
        stderr.contains("gone@* not found as needed by node_modules/a"),
        "stderr: {stderr}"
    );
    assert!(!app.join("dist").exists());
}

#[test]
fn test_dry_run_prints_plan() {
    let (_dir, app) = setup_app();

    for flag in ["--dry-run", "-n", "--dryRun"] {
        let output = run_in(&app, &[flag]);
        let stdout = String::from_utf8_lossy(&output.stdout);

        assert!(output.status.success());
        assert!(
            stdout.contains("node_modules/a -> dist/node_modules/a"),
            "stdout for {flag}: {stdout}"
        );
        assert!(stdout.contains("node_modules/b -> dist/node_modules/b"));
        assert!(!app.join("dist").exists());
    }
}

#[test]
fn test_dry_run_marks_excluded_packages() {
    let (_dir, app) = setup_app();

    let output = run_in(&app, &["-n", "--exclude", "**/b"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(
        stdout.contains("node_modules/b -> dist/node_modules/b (excluded)"),
        "stdout: {stdout}"
    );
    assert!(stdout.contains("node_modules/a -> dist/node_modules/a\n"));
    assert!(!app.join("dist").exists());
}

#[test]
fn test_json_outcome() {
    let (_dir, app) = setup_app();

    let output = run_in(&app, &["--json"]);
    assert!(output.status.success());

    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be valid JSON");
    let packages = json["packages"].as_array().unwrap();
    assert_eq!(packages.len(), 2);
    assert_eq!(packages[0]["name"], "a");
    assert_eq!(packages[0]["rule"], "hoisted");
    assert_eq!(json["report"]["packages_copied"], 2);
}

#[test]
fn test_exclude_flag() {
    let (_dir, app) = setup_app();
    fs::write(app.join("node_modules/a/CHANGELOG.md"), "# changes").unwrap();

    let output = run_in(&app, &["--exclude", "*.md", "--exclude", "**/b"]);

    assert!(output.status.success());
    assert!(app.join("dist/node_modules/a/index.js").exists());
    assert!(!app.join("dist/node_modules/a/CHANGELOG.md").exists());
    assert!(!app.join("dist/node_modules/b").exists());
}

#[test]
fn test_missing_exclude_file_fails() {
    let (_dir, app) = setup_app();

    let output = run_in(&app, &["--exclude-from", "nope.txt"]);

    assert_eq!(output.status.code(), Some(2));
    assert!(!app.join("dist").exists());
}

#[test]
fn test_version_flag() {
    let output = bin().arg("--version").output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}
