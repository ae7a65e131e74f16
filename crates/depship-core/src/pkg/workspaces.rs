//! Workspace root detection.
//!
//! The workspace root bounds the upward `node_modules` search when no
//! explicit boundary is configured.

use super::manifest::PACKAGE_JSON;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Find the workspace root by walking up the directory tree.
///
/// Returns the first directory containing a package.json with a "workspaces" field.
#[must_use]
pub fn find_workspace_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        if declares_workspaces(&current.join(PACKAGE_JSON)) {
            return Some(current);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Unreadable or malformed manifests simply don't count.
fn declares_workspaces(package_json: &Path) -> bool {
    let Ok(content) = std::fs::read_to_string(package_json) else {
        return false;
    };
    serde_json::from_str::<Value>(&content)
        .ok()
        .is_some_and(|package| package.get("workspaces").is_some())
}
