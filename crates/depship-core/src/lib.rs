#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::return_self_not_must_use)]

//! Production dependency deployment for Node workspaces.
//!
//! Finds the packages Node would load for a package's production
//! dependencies and copies them into a self-contained `node_modules` tree.

pub mod config;
pub mod error;
pub mod pkg;
pub mod version;

pub use config::Config;
pub use error::{Error, Result};
pub use pkg::{copy_production_deps, plan, DeployOptions, DeployOutcome};
pub use version::VERSION;
