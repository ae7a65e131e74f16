//! Placement: choose one output directory per discovered package.
//!
//! Packages are assigned breadth-first from the root. Each one is hoisted to
//! the output root when that cannot shadow another version, reuses an
//! identical copy its consumer can already reach, or is nested as shallowly as
//! its placed users allow.

use super::graph::{DependencyGraph, NodeId};
use super::{package_path, NODE_MODULES};
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Handle of a directory in the output tree. Slot 0 is the output root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SlotId(usize);

impl SlotId {
    /// The output root (the dist directory).
    pub const ROOT: SlotId = SlotId(0);
}

/// Which rule produced a placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlacementRule {
    /// Only version of its name, or required by the root.
    Hoisted,
    /// Single user, nested under it.
    Nested,
    /// Shallowest ancestor every placed user resolves.
    Searched,
    /// No ancestor satisfied every placed user.
    BestEffort,
}

/// A package with its output directory.
#[derive(Debug, Clone, Serialize)]
pub struct PlacedPackage {
    pub node: NodeId,
    pub name: String,
    pub version: String,
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    /// Slot whose `node_modules` contains `target_dir`.
    pub parent: SlotId,
    pub rule: PlacementRule,
}

/// Result of placement, in assignment order.
#[derive(Debug, Clone)]
pub struct Placement {
    root_target: PathBuf,
    packages: Vec<PlacedPackage>,
    by_node: HashMap<NodeId, SlotId>,
}

impl Placement {
    fn new(root_target: &Path) -> Self {
        let mut by_node = HashMap::new();
        by_node.insert(NodeId::ROOT, SlotId::ROOT);
        Self {
            root_target: root_target.to_path_buf(),
            packages: Vec::new(),
            by_node,
        }
    }

    /// The output root.
    #[must_use]
    pub fn root_target(&self) -> &Path {
        &self.root_target
    }

    /// Every placed package, in assignment order.
    #[must_use]
    pub fn packages(&self) -> &[PlacedPackage] {
        &self.packages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Slot a node was assigned to. Reused nodes share their twin's slot.
    #[must_use]
    pub fn slot_of(&self, node: NodeId) -> Option<SlotId> {
        self.by_node.get(&node).copied()
    }

    /// The package occupying `slot`, or `None` for the root slot.
    #[must_use]
    pub fn get(&self, slot: SlotId) -> Option<&PlacedPackage> {
        slot.0.checked_sub(1).and_then(|i| self.packages.get(i))
    }

    /// Output directory of `slot`.
    ///
    /// # Panics
    /// Panics if `slot` does not belong to this placement.
    #[must_use]
    pub fn target_dir(&self, slot: SlotId) -> &Path {
        match slot.0 {
            0 => &self.root_target,
            i => &self.packages[i - 1].target_dir,
        }
    }

    /// Slot containing `slot`, `None` for the root.
    #[must_use]
    pub fn parent(&self, slot: SlotId) -> Option<SlotId> {
        self.get(slot).map(|p| p.parent)
    }

    /// Dependency edges `(user, dep)` whose dependency cannot be reached
    /// from the user's output directory.
    ///
    /// Empty unless a best-effort placement was needed.
    #[must_use]
    pub fn unreachable_edges(&self, graph: &DependencyGraph) -> Vec<(NodeId, NodeId)> {
        let users = std::iter::once(NodeId::ROOT).chain(graph.packages().map(|(id, _)| id));

        let mut edges = Vec::new();
        for user in users {
            let Some(user_slot) = self.slot_of(user) else {
                continue;
            };
            for &dep in &graph.node(user).deps {
                let Some(dep_slot) = self.slot_of(dep) else {
                    continue;
                };
                if !resolvable(
                    self.target_dir(dep_slot),
                    &graph.node(dep).name,
                    self.target_dir(user_slot),
                ) {
                    edges.push((user, dep));
                }
            }
        }
        edges
    }
}

/// True if a package named `name` at `target` is found by the upward
/// `node_modules` search starting at `consumer`.
///
/// The consumer must live inside the directory owning the `node_modules`
/// that contains `target`.
#[must_use]
pub fn resolvable(target: &Path, name: &str, consumer: &Path) -> bool {
    // name components plus the node_modules segment itself
    let levels = name.split('/').count() + 1;
    let owner = target.ancestors().nth(levels);
    owner.is_some_and(|owner| consumer.starts_with(owner))
}

/// Outcome of deciding where a node goes.
#[derive(Debug, Clone, Copy)]
enum Decision {
    /// Share an existing slot.
    Reuse(SlotId),
    /// New slot under `parent`.
    Place { parent: SlotId, rule: PlacementRule },
}

struct Planner<'g> {
    graph: &'g DependencyGraph,
    versions: BTreeMap<&'g str, Vec<NodeId>>,
    placement: Placement,
    /// container `node_modules` dir -> name -> slot
    index: HashMap<PathBuf, HashMap<String, SlotId>>,
}

/// Assign an output directory under `root_target` to every package of `graph`.
///
/// The graph is expected to be fully resolved. A node that reuses a placed
/// twin takes over the twin's dependencies as well; its own are not queued.
///
/// # Errors
/// Returns [`Error::PlacementFault`] when the upward walk stops making
/// progress.
pub fn place(graph: &DependencyGraph, root_target: &Path) -> Result<Placement> {
    let mut planner = Planner {
        graph,
        versions: graph.versions_by_name(),
        placement: Placement::new(root_target),
        index: HashMap::new(),
    };

    let mut queue: VecDeque<(NodeId, SlotId)> = graph
        .root()
        .deps
        .iter()
        .map(|&dep| (dep, SlotId::ROOT))
        .collect();

    while let Some((id, consumer)) = queue.pop_front() {
        if planner.placement.slot_of(id).is_some() {
            continue;
        }

        match planner.decide(id, consumer)? {
            Decision::Reuse(slot) => {
                let node = graph.node(id);
                debug!(
                    name = %node.name,
                    version = %node.version,
                    target = %planner.placement.target_dir(slot).display(),
                    "reusing placed copy"
                );
                planner.placement.by_node.insert(id, slot);
            }
            Decision::Place { parent, rule } => {
                let slot = planner.commit(id, parent, rule);
                queue.extend(graph.node(id).deps.iter().map(|&dep| (dep, slot)));
            }
        }
    }

    Ok(planner.placement)
}

impl Planner<'_> {
    fn decide(&self, id: NodeId, consumer: SlotId) -> Result<Decision> {
        let node = self.graph.node(id);
        let same_name = self
            .versions
            .get(node.name.as_str())
            .map_or(&[][..], Vec::as_slice);

        let users = distinct(&node.users);

        if (same_name.len() <= 1 || node.users.contains(&NodeId::ROOT))
            && self.is_free(SlotId::ROOT, &node.name)
        {
            return Ok(Decision::Place {
                parent: SlotId::ROOT,
                rule: PlacementRule::Hoisted,
            });
        }

        if let Some(slot) = self.reusable(id, consumer, same_name) {
            return Ok(Decision::Reuse(slot));
        }

        if users.len() == 1 && self.is_free(consumer, &node.name) {
            return Ok(Decision::Place {
                parent: consumer,
                rule: PlacementRule::Nested,
            });
        }

        self.search(id, consumer, &users)
    }

    fn is_free(&self, parent: SlotId, name: &str) -> bool {
        let container = self.placement.target_dir(parent).join(NODE_MODULES);
        !self.is_occupied(&container, name)
    }

    /// First slot at or below `level` whose `node_modules/<name>` is free,
    /// descending through the packages already holding `name`.
    fn free_below(&self, mut level: SlotId, name: &str) -> SlotId {
        loop {
            let container = self.placement.target_dir(level).join(NODE_MODULES);
            match self.index.get(&container).and_then(|names| names.get(name)) {
                Some(&occupant) => level = occupant,
                None => return level,
            }
        }
    }

    /// A placed twin (same name and version) reachable from `consumer`.
    fn reusable(&self, id: NodeId, consumer: SlotId, same_name: &[NodeId]) -> Option<SlotId> {
        let node = self.graph.node(id);
        let consumer_dir = self.placement.target_dir(consumer);

        same_name
            .iter()
            .filter(|&&other| other != id && self.graph.node(other).version == node.version)
            .filter_map(|&other| self.placement.slot_of(other))
            .find(|&slot| resolvable(self.placement.target_dir(slot), &node.name, consumer_dir))
    }

    /// Climb from `consumer` toward the root for a slot every placed user
    /// can reach.
    fn search(&self, id: NodeId, consumer: SlotId, users: &[NodeId]) -> Result<Decision> {
        let name = &self.graph.node(id).name;
        let placed_users: Vec<&Path> = users
            .iter()
            .filter_map(|&u| self.placement.slot_of(u))
            .map(|slot| self.placement.target_dir(slot))
            .collect();

        let mut level = consumer;
        let mut deeper: Option<SlotId> = None;
        loop {
            let level_dir = self.placement.target_dir(level);
            let container = level_dir.join(NODE_MODULES);
            let candidate = package_path(&container, name);

            if self.is_occupied(&container, name) {
                let parent = deeper.unwrap_or_else(|| self.free_below(level, name));
                return Ok(Decision::Place {
                    parent,
                    rule: PlacementRule::BestEffort,
                });
            }

            let score = placed_users
                .iter()
                .filter(|user| resolvable(&candidate, name, user))
                .count();
            if score == placed_users.len() {
                return Ok(Decision::Place {
                    parent: level,
                    rule: PlacementRule::Searched,
                });
            }

            let Some(parent) = self.placement.parent(level) else {
                return Ok(Decision::Place {
                    parent: level,
                    rule: PlacementRule::BestEffort,
                });
            };

            let parent_dir = self.placement.target_dir(parent);
            if parent_dir == level_dir || !level_dir.starts_with(parent_dir) {
                return Err(self.fault(id, level_dir.to_path_buf()));
            }

            deeper = Some(level);
            level = parent;
        }
    }

    fn is_occupied(&self, container: &Path, name: &str) -> bool {
        self.index
            .get(container)
            .is_some_and(|names| names.contains_key(name))
    }

    fn commit(&mut self, id: NodeId, parent: SlotId, rule: PlacementRule) -> SlotId {
        let node = self.graph.node(id);
        let container = self.placement.target_dir(parent).join(NODE_MODULES);
        let target_dir = package_path(&container, &node.name);
        let slot = SlotId(self.placement.packages.len() + 1);

        debug!(
            name = %node.name,
            version = %node.version,
            target = %target_dir.display(),
            ?rule,
            "placed package"
        );

        self.placement.packages.push(PlacedPackage {
            node: id,
            name: node.name.clone(),
            version: node.version.clone(),
            source_dir: node.source_dir.clone(),
            target_dir,
            parent,
            rule,
        });
        self.index
            .entry(container)
            .or_default()
            .insert(node.name.clone(), slot);
        self.placement.by_node.insert(id, slot);
        slot
    }

    fn fault(&self, id: NodeId, path: PathBuf) -> Error {
        let node = self.graph.node(id);
        Error::PlacementFault {
            name: node.name.clone(),
            version: node.version.clone(),
            path,
        }
    }
}

fn distinct(ids: &[NodeId]) -> Vec<NodeId> {
    let mut seen = Vec::with_capacity(ids.len());
    for &id in ids {
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const DIST: &str = "/out";

    fn add(graph: &mut DependencyGraph, name: &str, version: &str, dir: &str, user: NodeId) -> NodeId {
        graph.add_package(name, version, Path::new(dir), user).0
    }

    fn target(placement: &Placement, node: NodeId) -> PathBuf {
        let slot = placement.slot_of(node).unwrap();
        placement.target_dir(slot).to_path_buf()
    }

    fn assert_collision_free(placement: &Placement) {
        let mut seen = HashSet::new();
        for p in placement.packages() {
            assert!(
                seen.insert(p.target_dir.clone()),
                "duplicate target {}",
                p.target_dir.display()
            );
        }
    }

    #[test]
    fn test_single_versions_are_hoisted() {
        let mut graph = DependencyGraph::new(PathBuf::from("/w/app"));
        let a = add(&mut graph, "a", "1.0.0", "/w/node_modules/a", NodeId::ROOT);
        let b = add(&mut graph, "b", "1.0.0", "/w/node_modules/b", NodeId::ROOT);
        add(&mut graph, "b", "1.0.0", "/w/node_modules/b", a);
        let c = add(&mut graph, "c", "1.0.0", "/w/node_modules/c", b);

        let placement = place(&graph, Path::new(DIST)).unwrap();

        assert_eq!(placement.len(), 3);
        assert_eq!(target(&placement, a), Path::new("/out/node_modules/a"));
        assert_eq!(target(&placement, b), Path::new("/out/node_modules/b"));
        assert_eq!(target(&placement, c), Path::new("/out/node_modules/c"));
        assert!(placement
            .packages()
            .iter()
            .all(|p| p.rule == PlacementRule::Hoisted && p.parent == SlotId::ROOT));
        assert!(placement.unreachable_edges(&graph).is_empty());
    }

    #[test]
    fn test_conflicting_versions_hoist_shared_and_nest_single_user() {
        let mut graph = DependencyGraph::new(PathBuf::from("/w/app"));
        let r1 = add(&mut graph, "r1", "1.0.0", "/w/app/node_modules/r1", NodeId::ROOT);
        let r2 = add(&mut graph, "r2", "1.0.0", "/w/app/node_modules/r2", NodeId::ROOT);
        let r3 = add(&mut graph, "r3", "1.0.0", "/w/app/node_modules/r3", NodeId::ROOT);
        let s1 = add(&mut graph, "s", "1.0.0", "/w/app/node_modules/s", r1);
        add(&mut graph, "s", "1.0.0", "/w/app/node_modules/s", r2);
        let s2 = add(
            &mut graph,
            "s",
            "2.0.0",
            "/w/app/node_modules/r3/node_modules/s",
            r3,
        );

        let placement = place(&graph, Path::new(DIST)).unwrap();

        assert_eq!(target(&placement, s1), Path::new("/out/node_modules/s"));
        assert_eq!(
            target(&placement, s2),
            Path::new("/out/node_modules/r3/node_modules/s")
        );

        let s1_placed = placement.get(placement.slot_of(s1).unwrap()).unwrap();
        assert_eq!(s1_placed.rule, PlacementRule::Searched);
        assert_eq!(s1_placed.parent, SlotId::ROOT);
        let s2_placed = placement.get(placement.slot_of(s2).unwrap()).unwrap();
        assert_eq!(s2_placed.rule, PlacementRule::Nested);
        assert_eq!(s2_placed.parent, placement.slot_of(r3).unwrap());

        assert_collision_free(&placement);
        assert!(placement.unreachable_edges(&graph).is_empty());
    }

    #[test]
    fn test_root_version_wins_root_slot() {
        let mut graph = DependencyGraph::new(PathBuf::from("/w/app"));
        let a = add(&mut graph, "a", "1.0.0", "/w/node_modules/a", NodeId::ROOT);
        let b01 = add(&mut graph, "b", "0.1.0", "/w/app/node_modules/b", NodeId::ROOT);
        let b1 = add(&mut graph, "b", "1.0.0", "/w/node_modules/b", a);

        let placement = place(&graph, Path::new(DIST)).unwrap();

        assert_eq!(target(&placement, b01), Path::new("/out/node_modules/b"));
        assert_eq!(
            target(&placement, b1),
            Path::new("/out/node_modules/a/node_modules/b")
        );
        assert!(placement.unreachable_edges(&graph).is_empty());
    }

    #[test]
    fn test_reuses_reachable_identical_version() {
        let mut graph = DependencyGraph::new(PathBuf::from("/s/app"));
        let a = add(&mut graph, "a", "1.0.0", "/s/nm/a", NodeId::ROOT);
        add(&mut graph, "b", "2.0.0", "/s/nm/b", NodeId::ROOT);
        add(&mut graph, "d", "2.0.0", "/s/nm/d", NodeId::ROOT);
        let x = add(&mut graph, "b", "1.0.0", "/s/nm/a/nm/b", a);
        let d1 = add(&mut graph, "d", "1.0.0", "/s/nm/a/nm/d", a);
        let y = add(&mut graph, "b", "1.0.0", "/s/nm/a/nm/d/nm/b", d1);

        let placement = place(&graph, Path::new(DIST)).unwrap();

        assert_eq!(placement.len(), 5);
        assert_eq!(placement.slot_of(y), placement.slot_of(x));
        assert_eq!(
            target(&placement, d1),
            Path::new("/out/node_modules/a/node_modules/d")
        );
        assert_collision_free(&placement);
        assert!(placement.unreachable_edges(&graph).is_empty());
    }

    #[test]
    fn test_reused_twin_keeps_its_own_dependencies() {
        let mut graph = DependencyGraph::new(PathBuf::from("/s/app"));
        let a = add(&mut graph, "a", "1.0.0", "/s/nm/a", NodeId::ROOT);
        add(&mut graph, "b", "2.0.0", "/s/nm/b", NodeId::ROOT);
        add(&mut graph, "d", "2.0.0", "/s/nm/d", NodeId::ROOT);
        add(&mut graph, "c", "2.0.0", "/s/nm/c", NodeId::ROOT);
        let x = add(&mut graph, "b", "1.0.0", "/s/nm/a/nm/b", a);
        let d1 = add(&mut graph, "d", "1.0.0", "/s/nm/a/nm/d", a);
        let y = add(&mut graph, "b", "1.0.0", "/s/nm/a/nm/d/nm/b", d1);
        let c10 = add(&mut graph, "c", "1.0.0", "/s/nm/a/nm/b/nm/c", x);
        let c11 = add(&mut graph, "c", "1.1.0", "/s/nm/a/nm/d/nm/b/nm/c", y);

        let placement = place(&graph, Path::new(DIST)).unwrap();

        assert_eq!(placement.slot_of(y), placement.slot_of(x));
        assert_eq!(
            target(&placement, c10),
            Path::new("/out/node_modules/a/node_modules/b/node_modules/c")
        );
        assert_eq!(placement.slot_of(c11), None);
        assert_collision_free(&placement);
        assert!(placement.unreachable_edges(&graph).is_empty());
    }

    #[test]
    fn test_occupied_slot_nests_below_occupant() {
        let mut graph = DependencyGraph::new(PathBuf::from("/w"));
        let first = add(&mut graph, "b", "1.0.0", "/w/nm/b", NodeId::ROOT);
        let second = add(&mut graph, "b", "2.0.0", "/w/nm/other/b", NodeId::ROOT);

        let mut planner = Planner {
            graph: &graph,
            versions: graph.versions_by_name(),
            placement: Placement::new(Path::new(DIST)),
            index: HashMap::new(),
        };
        let held = planner.commit(first, SlotId::ROOT, PlacementRule::Hoisted);

        match planner.decide(second, SlotId::ROOT).unwrap() {
            Decision::Place { parent, rule } => {
                assert_eq!(parent, held);
                assert_eq!(rule, PlacementRule::BestEffort);
            }
            Decision::Reuse(_) => panic!("expected a new placement"),
        }
    }

    #[test]
    fn test_cycle_places_each_once() {
        let mut graph = DependencyGraph::new(PathBuf::from("/w"));
        let a = add(&mut graph, "a", "1.0.0", "/w/node_modules/a", NodeId::ROOT);
        let b = add(&mut graph, "b", "1.0.0", "/w/node_modules/b", NodeId::ROOT);
        add(&mut graph, "b", "1.0.0", "/w/node_modules/b", a);
        add(&mut graph, "a", "1.0.0", "/w/node_modules/a", b);

        let placement = place(&graph, Path::new(DIST)).unwrap();
        assert_eq!(placement.len(), 2);
        assert_collision_free(&placement);
    }

    #[test]
    fn test_scoped_packages() {
        let mut graph = DependencyGraph::new(PathBuf::from("/w"));
        let a = add(&mut graph, "a", "1.0.0", "/w/nm/a", NodeId::ROOT);
        add(&mut graph, "@s/p", "2.0.0", "/w/nm/@s/p", NodeId::ROOT);
        let p1 = add(&mut graph, "@s/p", "1.0.0", "/w/nm/a/nm/@s/p", a);

        let placement = place(&graph, Path::new(DIST)).unwrap();
        assert_eq!(
            target(&placement, p1),
            Path::new("/out/node_modules/a/node_modules/@s/p")
        );
        assert!(placement.unreachable_edges(&graph).is_empty());
    }

    #[test]
    fn test_resolvable() {
        let dist = Path::new("/out");
        assert!(resolvable(Path::new("/out/node_modules/a"), "a", dist));
        assert!(resolvable(
            Path::new("/out/node_modules/a"),
            "a",
            Path::new("/out/node_modules/x/node_modules/y")
        ));
        assert!(resolvable(
            Path::new("/out/node_modules/a/node_modules/b"),
            "b",
            Path::new("/out/node_modules/a")
        ));
        assert!(!resolvable(
            Path::new("/out/node_modules/a/node_modules/b"),
            "b",
            Path::new("/out/node_modules/c")
        ));
        assert!(!resolvable(
            Path::new("/out/node_modules/a/node_modules/b"),
            "b",
            Path::new("/out/node_modules/ab")
        ));
    }

    #[test]
    fn test_resolvable_scoped() {
        assert!(resolvable(
            Path::new("/out/node_modules/@s/p"),
            "@s/p",
            Path::new("/out")
        ));
        assert!(resolvable(
            Path::new("/out/node_modules/a/node_modules/@s/p"),
            "@s/p",
            Path::new("/out/node_modules/a/node_modules/b")
        ));
        assert!(!resolvable(
            Path::new("/out/node_modules/a/node_modules/@s/p"),
            "@s/p",
            Path::new("/out/node_modules/c")
        ));
    }

    /// The root slot is taken by another version and the deeper slot only
    /// serves one of two users. This is a heuristic fallback: one user is
    /// left unable to resolve the package.
    #[test]
    fn test_best_effort_when_no_slot_serves_all_users() {
        let mut graph = DependencyGraph::new(PathBuf::from("/w"));
        add(&mut graph, "b", "2.0.0", "/w/nm/b", NodeId::ROOT);
        let p = add(&mut graph, "p", "1.0.0", "/w/nm/p", NodeId::ROOT);
        let q = add(&mut graph, "q", "1.0.0", "/w/nm/q", NodeId::ROOT);
        let x = add(&mut graph, "b", "1.0.0", "/w/nm/shared/b", p);
        add(&mut graph, "b", "1.0.0", "/w/nm/shared/b", q);

        let placement = place(&graph, Path::new(DIST)).unwrap();

        let placed = placement.get(placement.slot_of(x).unwrap()).unwrap();
        assert_eq!(placed.rule, PlacementRule::BestEffort);
        assert_eq!(
            placed.target_dir,
            Path::new("/out/node_modules/p/node_modules/b")
        );
        assert_eq!(placement.unreachable_edges(&graph), vec![(q, x)]);
        assert_collision_free(&placement);
    }

    #[test]
    fn test_empty_graph() {
        let graph = DependencyGraph::new(PathBuf::from("/w"));
        let placement = place(&graph, Path::new(DIST)).unwrap();
        assert!(placement.is_empty());
        assert_eq!(placement.slot_of(NodeId::ROOT), Some(SlotId::ROOT));
        assert_eq!(placement.target_dir(SlotId::ROOT), Path::new(DIST));
        assert!(placement.get(SlotId::ROOT).is_none());
    }
}
