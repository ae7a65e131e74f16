//! Discovery: find the package Node's resolution would pick for every
//! production requirement, starting from a root package directory.
//!
//! Each requirement is searched in `<dir>/node_modules/<name>`, climbing to the
//! directory owning the enclosing `node_modules` (or to the parent directory)
//! until the search boundary is reached. Nodes are expanded once, on creation,
//! so dependency cycles terminate.

use super::graph::{DependencyGraph, NodeId};
use super::manifest::{DependencyRequirement, Manifest, ManifestReader, PACKAGE_JSON};
use super::version::VersionMatcher;
use super::{node_modules_entry, NODE_MODULES};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, trace};

/// A requirement matched to a directory.
#[derive(Debug)]
struct Found {
    version: String,
    source_dir: PathBuf,
}

/// State for a single discovery run.
struct Discovery<'a> {
    reader: &'a dyn ManifestReader,
    matcher: &'a dyn VersionMatcher,
    boundary: Option<&'a Path>,
    /// Manifests by directory, `None` when the directory has no package.json.
    manifests: HashMap<PathBuf, Option<Manifest>>,
}

/// Build the dependency graph of the package at `root_dir`.
///
/// `boundary` is the last directory whose `node_modules` is searched; `None`
/// searches up to the filesystem root. Directories are expected to be
/// canonical.
///
/// Unsatisfied requirements are recorded in the graph, not returned as errors.
///
/// # Errors
/// Returns [`Error::Manifest`] if the root manifest or the manifest of a
/// matched candidate cannot be read or parsed, and [`Error::Io`] if a matched
/// directory cannot be canonicalized.
pub fn discover(
    root_dir: &Path,
    boundary: Option<&Path>,
    reader: &dyn ManifestReader,
    matcher: &dyn VersionMatcher,
) -> Result<DependencyGraph> {
    let mut session = Discovery {
        reader,
        matcher,
        boundary,
        manifests: HashMap::new(),
    };
    let mut graph = DependencyGraph::new(root_dir.to_path_buf());

    // Pre-order walk: a node's requirements are all resolved before any of
    // its new dependencies is expanded, in declaration order.
    let mut stack = vec![NodeId::ROOT];
    while let Some(id) = stack.pop() {
        let dir = graph.node(id).source_dir.clone();
        let requirements = session.requirements(&dir)?;

        let mut created = Vec::new();
        for req in &requirements {
            match session.search(&dir, req)? {
                Some(found) => {
                    let (dep, is_new) =
                        graph.add_package(&req.name, &found.version, &found.source_dir, id);
                    debug!(
                        name = %req.name,
                        range = %req.range,
                        version = %found.version,
                        dir = %found.source_dir.display(),
                        new = is_new,
                        "resolved dependency"
                    );
                    if is_new {
                        created.push(dep);
                    }
                }
                None => {
                    debug!(
                        name = %req.name,
                        range = %req.range,
                        from = %dir.display(),
                        "dependency not found"
                    );
                    graph.add_unresolved(&req.name, &req.range, id);
                }
            }
        }

        stack.extend(created.into_iter().rev());
    }

    Ok(graph)
}

impl Discovery<'_> {
    /// Production requirements of the package at `dir`, which must exist.
    fn requirements(&mut self, dir: &Path) -> Result<Vec<DependencyRequirement>> {
        match self.manifest(dir)? {
            Some(manifest) => Ok(manifest.dependencies.clone()),
            None => Err(Error::manifest(
                dir.join(PACKAGE_JSON),
                "package.json not found",
            )),
        }
    }

    /// Read (once) the manifest in `dir`.
    fn manifest(&mut self, dir: &Path) -> Result<Option<&Manifest>> {
        if !self.manifests.contains_key(dir) {
            let manifest = self.reader.read(dir)?;
            self.manifests.insert(dir.to_path_buf(), manifest);
        }
        Ok(self.manifests.get(dir).and_then(Option::as_ref))
    }

    /// Search upward from `from` for a package satisfying `req`.
    fn search(&mut self, from: &Path, req: &DependencyRequirement) -> Result<Option<Found>> {
        let mut dir = from.to_path_buf();
        loop {
            let candidate = node_modules_entry(&dir, &req.name);
            if let Some(found) = self.probe(&candidate, req)? {
                return Ok(Some(found));
            }

            match self.next_search_dir(&dir) {
                Some(next) => dir = next,
                None => return Ok(None),
            }
        }
    }

    /// Check whether `candidate` holds a version satisfying `req`.
    fn probe(&mut self, candidate: &Path, req: &DependencyRequirement) -> Result<Option<Found>> {
        let matcher = self.matcher;
        let Some(manifest) = self.manifest(candidate)? else {
            return Ok(None);
        };

        let Some(version) = manifest.version.clone() else {
            return Err(Error::manifest(
                candidate.join(PACKAGE_JSON),
                "missing \"version\"",
            ));
        };

        if !matcher.satisfies(&version, &req.range) {
            trace!(
                name = %req.name,
                range = %req.range,
                version = %version,
                dir = %candidate.display(),
                "candidate does not satisfy range"
            );
            return Ok(None);
        }

        // Node resolves symlinked packages (workspace links) to their real path
        let source_dir =
            dunce::canonicalize(candidate).map_err(|e| Error::io(candidate, e))?;
        if source_dir != candidate {
            let manifest = manifest.clone();
            self.manifests.insert(source_dir.clone(), Some(manifest));
        }

        Ok(Some(Found {
            version,
            source_dir,
        }))
    }

    /// The next directory whose `node_modules` should be searched after `dir`.
    fn next_search_dir(&self, dir: &Path) -> Option<PathBuf> {
        if self.boundary == Some(dir) {
            return None;
        }
        owner_of_enclosing_node_modules(dir).or_else(|| dir.parent().map(Path::to_path_buf))
    }
}

/// For a path inside a `node_modules` tree, the directory owning the innermost
/// `node_modules` segment.
fn owner_of_enclosing_node_modules(dir: &Path) -> Option<PathBuf> {
    let components: Vec<Component<'_>> = dir.components().collect();
    let pos = components
        .iter()
        .rposition(|c| c.as_os_str() == NODE_MODULES)?;
    Some(components[..pos].iter().collect())
}
