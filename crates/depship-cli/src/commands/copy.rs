//! The copy command: deploy production dependencies and report the outcome.

use depship_core::error::UnresolvedReport;
use depship_core::pkg::{copy_production_deps, DeployOptions, DeployOutcome};
use depship_core::version::BIN_NAME;
use depship_core::{Config, Error};
use std::path::{Path, PathBuf};
use tracing::info;

/// Paths and patterns from the command line.
#[derive(Debug, Clone)]
pub struct CopyArgs {
    pub package_dir: PathBuf,
    pub dist_dir: PathBuf,
    pub exclude: Vec<String>,
    pub exclude_from: Vec<PathBuf>,
    pub workspace_root: Option<PathBuf>,
}

/// Run the deploy. Relative paths are taken against `config.cwd`.
pub fn run(config: &Config, args: &CopyArgs) -> Result<DeployOutcome, Error> {
    let mut options = DeployOptions::from_config(config);
    options.exclude.clone_from(&args.exclude);
    options.exclude_from = args
        .exclude_from
        .iter()
        .map(|p| config.cwd.join(p))
        .collect();
    options.workspace_root = args.workspace_root.as_ref().map(|p| config.cwd.join(p));

    let outcome = copy_production_deps(
        &config.cwd.join(&args.package_dir),
        &config.cwd.join(&args.dist_dir),
        &options,
    )?;

    info!(
        packages = outcome.packages.len(),
        dist = %display_path(&config.cwd, &outcome.dist_dir),
        "done"
    );
    Ok(outcome)
}

/// Print the outcome to stdout: the JSON document with `--json`, the copy
/// plan for a dry run, nothing otherwise. Excluded packages are marked in
/// the plan.
pub fn print_outcome(config: &Config, outcome: &DeployOutcome) -> Result<(), Error> {
    if config.json_logs {
        let json = serde_json::to_string_pretty(outcome)
            .map_err(|e| Error::io(&outcome.dist_dir, e.into()))?;
        println!("{json}");
    } else if outcome.dry_run {
        for package in &outcome.packages {
            let mark = if outcome.excluded.contains(&package.target_dir) {
                " (excluded)"
            } else {
                ""
            };
            println!(
                "{} -> {}{mark}",
                display_path(&config.cwd, &package.source_dir),
                display_path(&config.cwd, &package.target_dir)
            );
        }
    }
    Ok(())
}

/// Print a failure to stderr, followed by one line per unresolved requirement.
pub fn report_failure(config: &Config, err: Error) {
    let lines: Vec<String> = err
        .unresolved()
        .iter()
        .map(|report| unresolved_line(&config.cwd, report))
        .collect();

    eprintln!("{BIN_NAME}: failed: {:?}", miette::Report::new(err));
    for line in lines {
        eprintln!("{line}");
    }
}

fn unresolved_line(cwd: &Path, report: &UnresolvedReport) -> String {
    let requesters: Vec<String> = report
        .requested_by
        .iter()
        .map(|p| display_path(cwd, p))
        .collect();
    format!(
        "{}@{} not found as needed by {}",
        report.name,
        report.range,
        requesters.join(", ")
    )
}

/// `path` relative to `cwd` when inside it, `.` for `cwd` itself.
fn display_path(cwd: &Path, path: &Path) -> String {
    match path.strip_prefix(cwd) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel.display().to_string(),
        Err(_) => path.display().to_string(),
    }
}
