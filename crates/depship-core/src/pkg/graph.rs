//! Dependency graph produced by discovery.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`], so the
//! `deps`/`users` back-references never need shared ownership.

use crate::error::UnresolvedReport;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Name of the synthetic root node.
pub const ROOT_NAME: &str = "root";

/// Version of the synthetic root node.
pub const ROOT_VERSION: &str = "n/a";

/// Handle of a node in a [`DependencyGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(usize);

impl NodeId {
    /// The synthetic root package.
    pub const ROOT: NodeId = NodeId(0);

    /// Position of this node in the arena.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// A concrete package instance found on disk.
#[derive(Debug, Clone, Serialize)]
pub struct PackageNode {
    pub name: String,
    pub version: String,
    /// Canonical directory the package is read from.
    pub source_dir: PathBuf,
    /// Resolved production dependencies, in declaration order.
    pub deps: Vec<NodeId>,
    /// Every node that required this one, once per requirement.
    pub users: Vec<NodeId>,
    /// Shortest number of dependency hops from the root.
    pub depth: usize,
}

impl PackageNode {
    /// Identity triple of this node.
    #[must_use]
    pub fn key(&self) -> (&str, &str, &Path) {
        (&self.name, &self.version, &self.source_dir)
    }
}

/// A requirement no ancestor directory could satisfy.
#[derive(Debug, Clone, Serialize)]
pub struct UnresolvedRequirement {
    pub name: String,
    pub range: String,
    pub users: Vec<NodeId>,
}

/// One entry of the graph, in the order discovery created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GraphEntry {
    Package(NodeId),
    Unresolved(usize),
}

type NodeKey = (String, String, PathBuf);

/// Append-only result of discovery.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: Vec<PackageNode>,
    unresolved: Vec<UnresolvedRequirement>,
    order: Vec<GraphEntry>,
    by_key: HashMap<NodeKey, NodeId>,
    unresolved_by_req: HashMap<(String, String), usize>,
}

impl DependencyGraph {
    /// Create a graph holding only the synthetic root for `root_dir`.
    #[must_use]
    pub fn new(root_dir: PathBuf) -> Self {
        let root = PackageNode {
            name: ROOT_NAME.to_string(),
            version: ROOT_VERSION.to_string(),
            source_dir: root_dir,
            deps: Vec::new(),
            users: Vec::new(),
            depth: 0,
        };
        Self {
            nodes: vec![root],
            unresolved: Vec::new(),
            order: Vec::new(),
            by_key: HashMap::new(),
            unresolved_by_req: HashMap::new(),
        }
    }

    /// The synthetic root node.
    #[must_use]
    pub fn root(&self) -> &PackageNode {
        &self.nodes[NodeId::ROOT.0]
    }

    /// Look up a node by handle.
    ///
    /// # Panics
    /// Panics if `id` does not belong to this graph.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &PackageNode {
        &self.nodes[id.0]
    }

    /// Find a discovered package by identity.
    #[must_use]
    pub fn find(&self, name: &str, version: &str, source_dir: &Path) -> Option<NodeId> {
        self.by_key
            .get(&(name.to_string(), version.to_string(), source_dir.to_path_buf()))
            .copied()
    }

    /// All discovered packages (root excluded), in discovery order.
    pub fn packages(&self) -> impl Iterator<Item = (NodeId, &PackageNode)> {
        self.nodes
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, node)| (NodeId(i), node))
    }

    /// Number of discovered packages (root excluded).
    #[must_use]
    pub fn package_count(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Requirements that could not be satisfied.
    #[must_use]
    pub fn unresolved(&self) -> &[UnresolvedRequirement] {
        &self.unresolved
    }

    /// True when every requirement resolved.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.unresolved.is_empty()
    }

    /// Every entry in creation order.
    #[must_use]
    pub fn entries(&self) -> &[GraphEntry] {
        &self.order
    }

    /// Packages grouped by name, each group in discovery order.
    #[must_use]
    pub fn versions_by_name(&self) -> BTreeMap<&str, Vec<NodeId>> {
        let mut groups: BTreeMap<&str, Vec<NodeId>> = BTreeMap::new();
        for (id, node) in self.packages() {
            groups.entry(node.name.as_str()).or_default().push(id);
        }
        groups
    }

    /// Reports for all unresolved requirements, with requester directories.
    #[must_use]
    pub fn unresolved_reports(&self) -> Vec<UnresolvedReport> {
        self.unresolved
            .iter()
            .map(|req| UnresolvedReport {
                name: req.name.clone(),
                range: req.range.clone(),
                requested_by: req
                    .users
                    .iter()
                    .map(|u| self.node(*u).source_dir.clone())
                    .collect(),
            })
            .collect()
    }

    /// Record that `user` requires the package `(name, version, source_dir)`.
    ///
    /// Returns the node handle and whether it was newly created. An existing
    /// node gains `user` as another user and keeps the shallower depth.
    pub(crate) fn add_package(
        &mut self,
        name: &str,
        version: &str,
        source_dir: &Path,
        user: NodeId,
    ) -> (NodeId, bool) {
        let depth = self.nodes[user.0].depth + 1;
        let key = (name.to_string(), version.to_string(), source_dir.to_path_buf());

        if let Some(&id) = self.by_key.get(&key) {
            let node = &mut self.nodes[id.0];
            node.users.push(user);
            node.depth = node.depth.min(depth);
            self.nodes[user.0].deps.push(id);
            return (id, false);
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(PackageNode {
            name: key.0.clone(),
            version: key.1.clone(),
            source_dir: key.2.clone(),
            deps: Vec::new(),
            users: vec![user],
            depth,
        });
        self.by_key.insert(key, id);
        self.order.push(GraphEntry::Package(id));
        self.nodes[user.0].deps.push(id);
        (id, true)
    }

    /// Record a requirement of `user` that nothing satisfied.
    ///
    /// Identical `(name, range)` pairs share one entry listing all users.
    pub(crate) fn add_unresolved(&mut self, name: &str, range: &str, user: NodeId) {
        let key = (name.to_string(), range.to_string());
        if let Some(&idx) = self.unresolved_by_req.get(&key) {
            self.unresolved[idx].users.push(user);
            return;
        }

        let idx = self.unresolved.len();
        self.unresolved.push(UnresolvedRequirement {
            name: key.0.clone(),
            range: key.1.clone(),
            users: vec![user],
        });
        self.unresolved_by_req.insert(key, idx);
        self.order.push(GraphEntry::Unresolved(idx));
    }
}
