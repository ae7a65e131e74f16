//! Copying placed packages into the output tree.

use super::ignore::IgnoreRules;
use super::place::{PlacedPackage, Placement};
use super::NODE_MODULES;
use crate::error::{Error, Result};
use depship_util::fs::{copy_file, reset_dir};
use rayon::prelude::*;
use serde::Serialize;
use std::io;
use std::path::Path;
use tracing::{debug, info, trace};
use walkdir::WalkDir;

/// Options for [`materialize`].
#[derive(Debug, Clone)]
pub struct MaterializeOptions {
    /// Log every decision without touching the filesystem.
    pub dry_run: bool,
    /// Packages copied concurrently.
    pub jobs: usize,
    /// Global exclusions, matched against absolute source paths.
    pub exclude: IgnoreRules,
}

impl Default for MaterializeOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: crate::config::default_jobs(),
            exclude: IgnoreRules::default(),
        }
    }
}

/// Totals for a materialization run. In a dry run these are what would
/// have been copied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaterializeReport {
    pub packages_copied: usize,
    pub packages_skipped: usize,
    pub files_copied: usize,
    pub files_ignored: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct CopyStats {
    files_copied: usize,
    files_ignored: usize,
}

/// Reset `<root>/node_modules` and copy every placed package into it.
///
/// Packages whose source directory matches the global exclusion are skipped
/// entirely. Reused slots appear once in the placement and are copied once.
///
/// # Errors
/// Returns [`Error::Io`] if the output directory cannot be reset and
/// [`Error::Copy`] for the first package (in placement order) whose copy failed.
pub fn materialize(placement: &Placement, options: &MaterializeOptions) -> Result<MaterializeReport> {
    let node_modules = placement.root_target().join(NODE_MODULES);
    if options.dry_run {
        info!(dir = %node_modules.display(), "dry run: would reset");
    } else {
        debug!(dir = %node_modules.display(), "resetting");
        reset_dir(&node_modules).map_err(|e| Error::io(&node_modules, e))?;
    }

    let (skipped, selected): (Vec<&PlacedPackage>, Vec<&PlacedPackage>) = placement
        .packages()
        .iter()
        .partition(|p| options.exclude.is_excluded(&p.source_dir, true));

    for package in &skipped {
        debug!(
            name = %package.name,
            source = %package.source_dir.display(),
            "excluded package"
        );
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.jobs.max(1))
        .build()
        .map_err(|e| Error::io(&node_modules, io::Error::other(e)))?;

    let results: Vec<Result<CopyStats>> = pool.install(|| {
        selected
            .par_iter()
            .map(|package| copy_package(package, options))
            .collect()
    });

    let mut report = MaterializeReport {
        packages_skipped: skipped.len(),
        ..MaterializeReport::default()
    };
    for result in results {
        let stats = result?;
        report.packages_copied += 1;
        report.files_copied += stats.files_copied;
        report.files_ignored += stats.files_ignored;
    }

    info!(
        packages = report.packages_copied,
        skipped = report.packages_skipped,
        files = report.files_copied,
        "materialized"
    );
    Ok(report)
}

/// Copy one package tree, applying its own ignore rules and the global
/// exclusion. The package's own `node_modules` is never copied.
fn copy_package(package: &PlacedPackage, options: &MaterializeOptions) -> Result<CopyStats> {
    let fail = |source: io::Error| Error::Copy {
        name: package.name.clone(),
        version: package.version.clone(),
        target: package.target_dir.clone(),
        source,
    };

    info!(
        source = %package.source_dir.display(),
        target = %package.target_dir.display(),
        "copy"
    );

    let rules = IgnoreRules::for_package(&package.source_dir).map_err(fail)?;
    if !options.dry_run {
        std::fs::create_dir_all(&package.target_dir).map_err(fail)?;
    }

    let root = package.source_dir.as_path();
    let mut files_ignored = 0;
    let mut files_copied = 0;

    let walker = WalkDir::new(root)
        .follow_links(true)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
            let is_dir = entry.file_type().is_dir();
            let keep = rel != Path::new(NODE_MODULES)
                && !rules.is_excluded(rel, is_dir)
                && !options.exclude.is_excluded(entry.path(), is_dir);
            if !keep {
                trace!(path = %entry.path().display(), "ignored");
                files_ignored += 1;
            }
            keep
        });

    for entry in walker {
        let entry = entry.map_err(|e| fail(e.into()))?;
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let dest = package.target_dir.join(rel);

        if entry.file_type().is_dir() {
            if !options.dry_run {
                std::fs::create_dir_all(&dest).map_err(fail)?;
            }
            continue;
        }

        trace!(from = %entry.path().display(), to = %dest.display(), "file");
        if !options.dry_run {
            copy_file(entry.path(), &dest).map_err(fail)?;
        }
        files_copied += 1;
    }

    Ok(CopyStats {
        files_copied,
        files_ignored,
    })
}
