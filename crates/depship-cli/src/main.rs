#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::struct_excessive_bools)]

mod commands;
mod logging;

use clap::Parser;
use commands::copy::CopyArgs;
use depship_core::Config;
use std::path::PathBuf;

/// Exit code for any failed run.
const EXIT_FAILURE: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "copy-production-deps")]
#[command(
    author,
    version,
    about = "Copy the production dependencies of a workspace package into a self-contained node_modules",
    long_about = None
)]
struct Cli {
    /// Package whose production dependencies are copied
    #[arg(default_value = ".")]
    package_dir: PathBuf,

    /// Output directory; its node_modules is replaced
    #[arg(default_value = "./dist")]
    dist_dir: PathBuf,

    /// Print what would be copied without touching the filesystem
    #[arg(short = 'n', long, visible_alias = "dryRun")]
    dry_run: bool,

    /// Increase logging verbosity (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Exclude matching source paths (repeatable)
    #[arg(long, value_name = "GLOB")]
    exclude: Vec<String>,

    /// Read exclude patterns from a file (repeatable)
    #[arg(long, value_name = "FILE")]
    exclude_from: Vec<PathBuf>,

    /// Last directory searched for node_modules (defaults to the workspace root)
    #[arg(long, value_name = "DIR")]
    workspace_root: Option<PathBuf>,

    /// Packages copied concurrently (0 = automatic)
    #[arg(short, long, default_value_t = 0)]
    jobs: usize,

    /// Emit JSON logs and print the outcome as JSON
    #[arg(long)]
    json: bool,

    /// Override the working directory
    #[arg(long, value_name = "PATH")]
    cwd: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    let cwd = dunce::canonicalize(&cwd).unwrap_or(cwd);

    let config = Config::new(cwd)
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json)
        .with_dry_run(cli.dry_run)
        .with_jobs(cli.jobs);

    logging::init(config.verbosity, config.json_logs);

    let args = CopyArgs {
        package_dir: cli.package_dir,
        dist_dir: cli.dist_dir,
        exclude: cli.exclude,
        exclude_from: cli.exclude_from,
        workspace_root: cli.workspace_root,
    };

    let result = commands::copy::run(&config, &args)
        .and_then(|outcome| commands::copy::print_outcome(&config, &outcome));

    if let Err(err) = result {
        commands::copy::report_failure(&config, err);
        std::process::exit(EXIT_FAILURE);
    }
}
