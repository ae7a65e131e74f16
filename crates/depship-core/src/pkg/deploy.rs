//! The deploy pipeline: discover, check, place, materialize.

use super::discover::discover;
use super::graph::DependencyGraph;
use super::ignore::IgnoreRules;
use super::manifest::FsManifestReader;
use super::materialize::{materialize, MaterializeOptions, MaterializeReport};
use super::place::{place, PlacedPackage, Placement};
use super::version::SemverMatcher;
use super::workspaces::find_workspace_root;
use crate::config::{default_jobs, Config};
use crate::error::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Options for [`copy_production_deps`] and [`plan`].
#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub dry_run: bool,
    pub jobs: usize,
    /// Global exclusion patterns.
    pub exclude: Vec<String>,
    /// Files holding more global exclusion patterns.
    pub exclude_from: Vec<PathBuf>,
    /// Explicit search boundary. Detected from the workspace when unset.
    pub workspace_root: Option<PathBuf>,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: default_jobs(),
            exclude: Vec::new(),
            exclude_from: Vec::new(),
            workspace_root: None,
        }
    }
}

impl DeployOptions {
    /// Options carrying the run-wide settings of `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            dry_run: config.dry_run,
            jobs: config.jobs,
            ..Self::default()
        }
    }
}

/// Discovery and placement, before anything is copied.
#[derive(Debug, Clone)]
pub struct DeployPlan {
    pub package_dir: PathBuf,
    pub dist_dir: PathBuf,
    /// Last directory searched for `node_modules`, `None` for the filesystem root.
    pub boundary: Option<PathBuf>,
    pub graph: DependencyGraph,
    pub placement: Placement,
}

/// Summary of a completed deploy.
#[derive(Debug, Clone, Serialize)]
pub struct DeployOutcome {
    pub package_dir: PathBuf,
    pub dist_dir: PathBuf,
    pub boundary: Option<PathBuf>,
    pub dry_run: bool,
    pub packages: Vec<PlacedPackage>,
    /// Target directories of packages skipped by the global exclusion.
    pub excluded: Vec<PathBuf>,
    pub report: MaterializeReport,
}

/// Build the copy plan for `package_dir` without touching the output.
///
/// # Errors
/// Returns [`Error::Boundary`] when an explicit workspace root is not an
/// ancestor of `package_dir`, [`Error::Unresolved`] listing every requirement
/// no ancestor `node_modules` satisfies, or any discovery or placement error.
pub fn plan(package_dir: &Path, dist_dir: &Path, options: &DeployOptions) -> Result<DeployPlan> {
    let package_dir =
        dunce::canonicalize(package_dir).map_err(|e| Error::io(package_dir, e))?;
    let dist_dir = absolute_dist(dist_dir)?;

    let boundary = match &options.workspace_root {
        Some(root) => {
            let root = dunce::canonicalize(root).map_err(|e| Error::io(root, e))?;
            if !package_dir.starts_with(&root) {
                return Err(Error::Boundary {
                    boundary: root,
                    package: package_dir,
                });
            }
            Some(root)
        }
        None => find_workspace_root(&package_dir),
    };

    info!(
        package = %package_dir.display(),
        boundary = ?boundary,
        "collecting production packages"
    );

    let graph = discover(
        &package_dir,
        boundary.as_deref(),
        &FsManifestReader,
        &SemverMatcher,
    )?;
    if !graph.is_resolved() {
        return Err(Error::Unresolved(graph.unresolved_reports()));
    }
    info!(packages = graph.package_count(), "found packages");

    let placement = place(&graph, &dist_dir)?;
    for (user, dep) in placement.unreachable_edges(&graph) {
        let user = graph.node(user);
        let dep = graph.node(dep);
        warn!(
            package = %format!("{}@{}", dep.name, dep.version),
            user = %user.source_dir.display(),
            "placed where one of its users cannot resolve it"
        );
    }

    Ok(DeployPlan {
        package_dir,
        dist_dir,
        boundary,
        graph,
        placement,
    })
}

/// Copy the production dependency tree of `package_dir` into
/// `<dist_dir>/node_modules`.
///
/// # Errors
/// Everything [`plan`] returns, plus [`Error::ExcludeFile`] for an unreadable
/// pattern file and materialization errors.
pub fn copy_production_deps(
    package_dir: &Path,
    dist_dir: &Path,
    options: &DeployOptions,
) -> Result<DeployOutcome> {
    let exclude = IgnoreRules::global(&options.exclude, &options.exclude_from)?;
    let plan = plan(package_dir, dist_dir, options)?;

    let excluded: Vec<PathBuf> = plan
        .placement
        .packages()
        .iter()
        .filter(|p| exclude.is_excluded(&p.source_dir, true))
        .map(|p| p.target_dir.clone())
        .collect();

    let report = materialize(
        &plan.placement,
        &MaterializeOptions {
            dry_run: options.dry_run,
            jobs: options.jobs,
            exclude,
        },
    )?;

    Ok(DeployOutcome {
        package_dir: plan.package_dir,
        dist_dir: plan.dist_dir,
        boundary: plan.boundary,
        dry_run: options.dry_run,
        packages: plan.placement.packages().to_vec(),
        excluded,
        report,
    })
}

/// Canonical output path. The directory itself may not exist yet.
fn absolute_dist(dist_dir: &Path) -> Result<PathBuf> {
    if dist_dir.exists() {
        return dunce::canonicalize(dist_dir).map_err(|e| Error::io(dist_dir, e));
    }

    let absolute = if dist_dir.is_absolute() {
        dist_dir.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| Error::io(dist_dir, e))?
            .join(dist_dir)
    };

    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) if parent.exists() => Ok(dunce::canonicalize(parent)
            .map_err(|e| Error::io(parent, e))?
            .join(name)),
        _ => Ok(absolute),
    }
}
