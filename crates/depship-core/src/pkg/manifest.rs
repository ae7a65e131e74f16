//! package.json reading.
//!
//! Only the fields discovery needs are extracted: `name`, `version` and the
//! production `dependencies` section, in declaration order.

use crate::error::{Error, Result};
use depship_util::fs::read_to_string_lossy;
use serde::Serialize;
use serde_json::{Map, Value};
use std::io;
use std::path::Path;

/// Manifest file name inside every package directory.
pub const PACKAGE_JSON: &str = "package.json";

/// A declared dependency, not yet resolved to a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyRequirement {
    /// Package name (e.g., "react" or "@types/node").
    pub name: String,
    /// Version range exactly as written in package.json.
    pub range: String,
}

impl DependencyRequirement {
    /// Create a new requirement.
    pub fn new(name: impl Into<String>, range: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            range: range.into(),
        }
    }
}

/// The subset of package.json used by discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub name: Option<String>,
    pub version: Option<String>,
    /// Production dependencies in declaration order.
    pub dependencies: Vec<DependencyRequirement>,
}

impl Manifest {
    /// Parse manifest text. `path` is only used for error messages.
    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        let json: Value = serde_json::from_str(content)
            .map_err(|e| Error::manifest(path, format!("Invalid JSON: {e}")))?;

        let root = json
            .as_object()
            .ok_or_else(|| Error::manifest(path, "package.json must be a JSON object"))?;

        Ok(Self {
            name: string_field(path, root, "name")?,
            version: string_field(path, root, "version")?,
            dependencies: dependencies_section(path, root)?,
        })
    }
}

/// Source of manifests for discovery.
///
/// Implementations must be pure with respect to a single discovery run.
pub trait ManifestReader: std::fmt::Debug {
    /// Read the manifest of the package rooted at `dir`.
    ///
    /// Returns `Ok(None)` if the directory has no package.json.
    fn read(&self, dir: &Path) -> Result<Option<Manifest>>;
}

/// Reads `package.json` files from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsManifestReader;

impl ManifestReader for FsManifestReader {
    fn read(&self, dir: &Path) -> Result<Option<Manifest>> {
        let path = dir.join(PACKAGE_JSON);
        let content = match read_to_string_lossy(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::manifest(&path, format!("Failed to read: {e}"))),
        };
        Manifest::parse(&path, &content).map(Some)
    }
}

fn string_field(path: &Path, root: &Map<String, Value>, field: &str) -> Result<Option<String>> {
    match root.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(Error::manifest(
            path,
            format!("'{field}' must be a string, got {}", json_type_name(other)),
        )),
    }
}

fn dependencies_section(
    path: &Path,
    root: &Map<String, Value>,
) -> Result<Vec<DependencyRequirement>> {
    let Some(section) = root.get("dependencies") else {
        return Ok(Vec::new());
    };

    let Some(section) = section.as_object() else {
        return Err(Error::manifest(
            path,
            format!(
                "'dependencies' must be an object, got {}",
                json_type_name(section)
            ),
        ));
    };

    section
        .iter()
        .map(|(name, range)| match range.as_str() {
            Some(range) => Ok(DependencyRequirement::new(name.clone(), range)),
            None => Err(Error::manifest(
                path,
                format!(
                    "Invalid range for '{name}': expected string, got {}",
                    json_type_name(range)
                ),
            )),
        })
        .collect()
}

/// Get a human-readable type name for a JSON value.
fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
