use miette::Diagnostic;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Stable error codes.
pub mod codes {
    pub const DEPSHIP_MANIFEST_INVALID: &str = "DEPSHIP_MANIFEST_INVALID";
    pub const DEPSHIP_UNRESOLVED: &str = "DEPSHIP_UNRESOLVED";
    pub const DEPSHIP_PLACEMENT_FAULT: &str = "DEPSHIP_PLACEMENT_FAULT";
    pub const DEPSHIP_COPY_FAILED: &str = "DEPSHIP_COPY_FAILED";
    pub const DEPSHIP_EXCLUDE_FILE: &str = "DEPSHIP_EXCLUDE_FILE";
    pub const DEPSHIP_BOUNDARY: &str = "DEPSHIP_BOUNDARY";
    pub const DEPSHIP_IO: &str = "DEPSHIP_IO";
}

/// A requirement no ancestor `node_modules` could satisfy, as reported to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedReport {
    /// Requested package name.
    pub name: String,
    /// Requested version range, verbatim from package.json.
    pub range: String,
    /// Source directories of every package that asked for it.
    pub requested_by: Vec<PathBuf>,
}

/// Core error type for depship operations.
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Invalid manifest at {path}: {message}")]
    #[diagnostic(
        code(DEPSHIP_MANIFEST_INVALID),
        help("every package directory must contain a readable package.json with name and version")
    )]
    Manifest { path: PathBuf, message: String },

    #[error("{} dependencies not found", .0.len())]
    #[diagnostic(
        code(DEPSHIP_UNRESOLVED),
        help("run your package manager install in the workspace first")
    )]
    Unresolved(Vec<UnresolvedReport>),

    /// Moving to the next placement ancestor did not shorten the path.
    #[error("Cannot place {name}@{version}: climb made no progress at {path}")]
    #[diagnostic(code(DEPSHIP_PLACEMENT_FAULT))]
    PlacementFault {
        name: String,
        version: String,
        path: PathBuf,
    },

    #[error("Failed to copy {name}@{version} to {target}: {source}")]
    #[diagnostic(code(DEPSHIP_COPY_FAILED))]
    Copy {
        name: String,
        version: String,
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read exclude file {path}: {source}")]
    #[diagnostic(code(DEPSHIP_EXCLUDE_FILE))]
    ExcludeFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Workspace root {boundary} does not contain {package}")]
    #[diagnostic(
        code(DEPSHIP_BOUNDARY),
        help("--workspace-root must be the package directory or one of its ancestors")
    )]
    Boundary { boundary: PathBuf, package: PathBuf },

    #[error("IO error at {path}: {source}")]
    #[diagnostic(code(DEPSHIP_IO))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Create a manifest error.
    pub fn manifest(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Manifest {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an I/O error bound to a path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Get the stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Manifest { .. } => codes::DEPSHIP_MANIFEST_INVALID,
            Self::Unresolved(_) => codes::DEPSHIP_UNRESOLVED,
            Self::PlacementFault { .. } => codes::DEPSHIP_PLACEMENT_FAULT,
            Self::Copy { .. } => codes::DEPSHIP_COPY_FAILED,
            Self::ExcludeFile { .. } => codes::DEPSHIP_EXCLUDE_FILE,
            Self::Boundary { .. } => codes::DEPSHIP_BOUNDARY,
            Self::Io { .. } => codes::DEPSHIP_IO,
        }
    }

    /// Unresolved requirements carried by this error (empty for other kinds).
    #[must_use]
    pub fn unresolved(&self) -> &[UnresolvedReport] {
        match self {
            Self::Unresolved(list) => list,
            _ => &[],
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
