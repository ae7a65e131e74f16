//! Production dependency discovery, placement and copying.

pub mod deploy;
pub mod discover;
pub mod graph;
pub mod ignore;
pub mod manifest;
pub mod materialize;
pub mod place;
pub mod version;
pub mod workspaces;

pub use deploy::{copy_production_deps, plan, DeployOptions, DeployOutcome, DeployPlan};
pub use discover::discover;
pub use graph::{DependencyGraph, GraphEntry, NodeId, PackageNode, UnresolvedRequirement};
pub use ignore::{IgnoreRule, IgnoreRules, DEFAULT_IGNORES, IGNORE_FILE};
pub use manifest::{DependencyRequirement, FsManifestReader, Manifest, ManifestReader, PACKAGE_JSON};
pub use materialize::{materialize, MaterializeOptions, MaterializeReport};
pub use place::{place, resolvable, PlacedPackage, Placement, PlacementRule, SlotId};
pub use version::{version_satisfies, SemverMatcher, VersionMatcher};
pub use workspaces::find_workspace_root;

use std::path::{Path, PathBuf};

/// Directory holding installed dependencies.
pub const NODE_MODULES: &str = "node_modules";

/// Directory of package `name` inside a `node_modules` container.
///
/// Scoped names (`@scope/pkg`) map to two nested directories.
#[must_use]
pub fn package_path(container: &Path, name: &str) -> PathBuf {
    let mut path = container.to_path_buf();
    path.extend(name.split('/'));
    path
}

/// `<owner>/node_modules/<name>`.
#[must_use]
pub fn node_modules_entry(owner: &Path, name: &str) -> PathBuf {
    package_path(&owner.join(NODE_MODULES), name)
}
