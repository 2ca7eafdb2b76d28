//! The dependency graph: nodes, parent/child edges, rank-bucketed dirty
//! propagation, and the downstream-closure scan that tells the solver and
//! plotter exactly which nodes a mutation batch actually touched.
//!
//! Every node's `rank` is one more than the greatest rank among its parents,
//! so iterating dirty nodes in ascending rank order is always a valid
//! topological solve order — no per-frame sort is needed, only the rank
//! bookkeeping kept current as edges are added and removed.

pub mod undo;

use geo_compiler::{BindingSlot, RpnToken};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

/// What kind of visual representation a node has, if any — drives plot
/// dispatch. Distinct from [`Payload`], which carries the data a solver or
/// plotter actually needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderType {
    None,
    Scalar,
    Point,
    Line,
    Circle,
    Explicit,
    Parametric,
    Implicit,
    Text,
}

/// A compiled formula: bytecode plus the binding slots that must be
/// rewritten from parent results before each evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Formula {
    pub bytecode: Vec<RpnToken>,
    pub bindings: Vec<BindingSlot>,
}

/// Type-specific payload carried by a node, per the data model's tagged
/// variant. `geo-solve` reads this (plus parents' `result`s) to compute
/// `result`; `geo-plot` reads it to drive sampling.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Scalar(Formula),
    Point,
    Line { is_infinite: bool },
    Circle,
    SingleRpn(Formula),
    DualRpn {
        x: Formula,
        y: Formula,
        t_min: f64,
        t_max: f64,
    },
    IntersectionPoint { num_targets: usize },
    AnalyticalIntersection { branch_sign: i8 },
    TextLabel,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeResult {
    Unresolved,
    Scalar(f64),
    Point { x: f64, y: f64 },
    Circle { cx: f64, cy: f64, r: f64 },
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SolverError {
    #[error("division by zero")]
    DivideByZero,
    #[error("three points are collinear")]
    CollinearPoints,
    #[error("no intersection found")]
    NoIntersection,
    #[error("value outside the function's domain")]
    DomainViolation,
    #[error("line is degenerate (coincident endpoints)")]
    DegenerateLine,
    #[error("iterative solve did not converge")]
    NonConvergent,
    #[error("input to this node is itself invalid")]
    InvalidInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Ok,
    Cyclic,
}

/// Presentation-only attributes a node carries alongside its geometry —
/// never read by `geo-solve` or `geo-plot`, only copied onto the node by a
/// `Style` mutation so undo/redo covers appearance changes the same way it
/// covers formula edits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Style {
    pub color: u32,
    pub thickness: f32,
    pub is_visible: bool,
    pub show_label: bool,
}

impl Default for Style {
    fn default() -> Self {
        Self { color: 0x000000ff, thickness: 1.0, is_visible: true, show_label: false }
    }
}

#[derive(Debug, Clone)]
pub struct GeoNode {
    pub id: NodeId,
    pub name: String,
    pub active: bool,
    pub render_type: RenderType,
    pub payload: Payload,
    /// The raw formula text this node was constructed from, if any (free
    /// points and some derived objects have none).
    pub formula_source: Option<String>,
    pub parents: Vec<NodeId>,
    pub children: Vec<NodeId>,
    pub rank: usize,
    pub dirty: bool,
    pub result: NodeResult,
    pub status: NodeStatus,
    pub style: Style,
    pub solver_error: Option<SolverError>,
    pub buffer_offset: usize,
    pub current_point_count: usize,
    pub last_update_frame: u64,
}

impl GeoNode {
    fn new(id: NodeId, name: String, render_type: RenderType, payload: Payload) -> Self {
        Self {
            id,
            name,
            active: false,
            render_type,
            payload,
            formula_source: None,
            parents: Vec::new(),
            children: Vec::new(),
            rank: 0,
            dirty: true,
            result: NodeResult::Unresolved,
            status: NodeStatus::Ok,
            style: Style::default(),
            solver_error: None,
            buffer_offset: 0,
            current_point_count: 0,
            last_update_frame: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.solver_error.is_none()
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GraphError {
    #[error("adding this dependency would create a cycle")]
    WouldCycle,
    #[error("node does not exist")]
    UnknownNode,
}

/// Owns every live node plus the rank-bucketed dirty set used to drive
/// incremental solves.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Option<GeoNode>>,
    free_list: Vec<u32>,
    name_cursor: u32,
    dirty_by_rank: BTreeMap<usize, BTreeSet<NodeId>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: NodeId) -> Option<&GeoNode> {
        self.nodes.get(id.0 as usize).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut GeoNode> {
        self.nodes.get_mut(id.0 as usize).and_then(|s| s.as_mut())
    }

    /// Letter-then-cycle-suffix scheme: A..Z, then A1..Z1, A2..Z2, ... —
    /// names stay short for the common case of a handful of live objects.
    fn generate_next_name(&mut self) -> String {
        loop {
            let idx = self.name_cursor;
            self.name_cursor += 1;
            let letter = (b'A' + (idx % 26) as u8) as char;
            let cycle = idx / 26;
            let candidate = if cycle == 0 {
                letter.to_string()
            } else {
                format!("{letter}{cycle}")
            };
            if !self.nodes.iter().flatten().any(|n| n.name == candidate) {
                return candidate;
            }
        }
    }

    /// Allocate a new, inactive node. Per the lifecycle, a node only becomes
    /// visible to solvers/plotters once a mutation sets `active = true`; the
    /// pool slot is never recycled by this path (see [`Graph::gc_remove`]).
    pub fn allocate_node(&mut self, render_type: RenderType, payload: Payload) -> NodeId {
        let name = self.generate_next_name();
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(GeoNode::new(id, name, render_type, payload)));
        id
    }

    pub fn set_active(&mut self, id: NodeId, active: bool) {
        if let Some(node) = self.get_mut(id) {
            node.active = active;
        }
        self.touch_node(id);
    }

    /// Hard-remove a node and recycle its slot. Only used by an explicit
    /// garbage-collection pass, never by ordinary deletion (which only
    /// flips `active`, per the lifecycle's undo-friendly design).
    pub fn gc_remove(&mut self, id: NodeId) {
        let (children, parents) =
            if let Some(node) = self.nodes.get(id.0 as usize).and_then(|s| s.as_ref()) {
                (node.children.clone(), node.parents.clone())
            } else {
                (Vec::new(), Vec::new())
            };
        for &child in &children {
            if let Some(c) = self.get_mut(child) {
                c.parents.retain(|&p| p != id);
            }
        }
        for &parent in &parents {
            if let Some(p) = self.get_mut(parent) {
                p.children.retain(|&c| c != id);
            }
        }
        if let Some(rank) = self.get(id).map(|n| n.rank) {
            if let Some(set) = self.dirty_by_rank.get_mut(&rank) {
                set.remove(&id);
            }
        }
        self.nodes[id.0 as usize] = None;
        self.free_list.push(id.0);
    }

    /// Link `parent -> child` (child depends on parent). Rejects the edge if
    /// `parent` is already reachable from `child`, which would otherwise
    /// close a cycle.
    pub fn add_dependency(&mut self, child: NodeId, parent: NodeId) -> Result<(), GraphError> {
        if self.get(child).is_none() || self.get(parent).is_none() {
            return Err(GraphError::UnknownNode);
        }
        if parent == child || self.is_reachable(child, parent) {
            return Err(GraphError::WouldCycle);
        }
        self.get_mut(parent).unwrap().children.push(child);
        self.get_mut(child).unwrap().parents.push(parent);
        self.update_rank_recursive(child);
        Ok(())
    }

    pub fn remove_dependency(&mut self, child: NodeId, parent: NodeId) {
        if let Some(p) = self.get_mut(parent) {
            p.children.retain(|&c| c != child);
        }
        if let Some(c) = self.get_mut(child) {
            c.parents.retain(|&p| p != parent);
        }
        self.update_rank_recursive(child);
    }

    fn is_reachable(&self, from: NodeId, target: NodeId) -> bool {
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::from([from]);
        while let Some(n) = queue.pop_front() {
            if n == target {
                return true;
            }
            if !visited.insert(n) {
                continue;
            }
            if let Some(node) = self.get(n) {
                queue.extend(node.children.iter().copied());
            }
        }
        false
    }

    /// Recompute `node`'s rank from its parents, then propagate to every
    /// descendant whose rank this changes. Detects cycles defensively (the
    /// edge-add path already rejects them, but deletion/rewiring sequences
    /// could in principle re-derive one) by capping the walk depth.
    fn update_rank_recursive(&mut self, node: NodeId) {
        let mut stack = vec![node];
        let mut guard = 0usize;
        let cap = self.nodes.len().saturating_mul(2).max(64);
        while let Some(n) = stack.pop() {
            guard += 1;
            if guard > cap {
                if let Some(node) = self.get_mut(n) {
                    node.status = NodeStatus::Cyclic;
                }
                break;
            }
            let new_rank = self
                .get(n)
                .map(|node| {
                    node.parents
                        .iter()
                        .filter_map(|&p| self.get(p).map(|pn| pn.rank + 1))
                        .max()
                        .unwrap_or(0)
                })
                .unwrap_or(0);
            let old_rank = self.get(n).map(|node| node.rank);
            if old_rank != Some(new_rank) {
                if let Some(old) = old_rank {
                    if let Some(set) = self.dirty_by_rank.get_mut(&old) {
                        if set.remove(&n) {
                            self.dirty_by_rank.entry(new_rank).or_default().insert(n);
                        }
                    }
                }
                if let Some(node) = self.get_mut(n) {
                    node.rank = new_rank;
                }
                if let Some(children) = self.get(n).map(|node| node.children.clone()) {
                    stack.extend(children);
                }
            }
        }
    }

    /// Mark a node dirty and enqueue it into its rank's dirty bucket. Does
    /// not touch descendants — callers drive that via [`Graph::fast_scan`]
    /// before re-solving, so a batch of several mutated nodes only walks the
    /// union of their downstream closures once.
    pub fn touch_node(&mut self, id: NodeId) {
        if let Some(node) = self.get_mut(id) {
            node.dirty = true;
            let rank = node.rank;
            self.dirty_by_rank.entry(rank).or_default().insert(id);
        }
    }

    /// Forward BFS over `children` from every node in `dirty`, returning the
    /// full downstream closure (each node visited once, dirty seeds
    /// included) so the caller knows exactly which nodes a mutation batch
    /// could possibly affect without re-walking the whole graph.
    pub fn fast_scan(&self, dirty: &[NodeId]) -> Vec<NodeId> {
        let mut visited = BTreeSet::new();
        let mut queue: VecDeque<NodeId> = dirty.iter().copied().collect();
        let mut order = Vec::new();
        while let Some(n) = queue.pop_front() {
            if !visited.insert(n) {
                continue;
            }
            order.push(n);
            if let Some(node) = self.get(n) {
                queue.extend(node.children.iter().copied());
            }
        }
        order
    }

    /// All currently-dirty nodes, grouped into ranked batches: each batch is
    /// safe to evaluate in parallel, but batch `k` must fully complete before
    /// batch `k+1` starts since those nodes may read `k`'s results.
    pub fn required_ranked_batches(&self) -> Vec<Vec<NodeId>> {
        self.dirty_by_rank
            .iter()
            .filter(|(_, set)| !set.is_empty())
            .map(|(_, set)| set.iter().copied().collect())
            .collect()
    }

    pub fn clear_dirty(&mut self, id: NodeId) {
        if let Some(node) = self.get_mut(id) {
            let rank = node.rank;
            node.dirty = false;
            if let Some(set) = self.dirty_by_rank.get_mut(&rank) {
                set.remove(&id);
            }
        }
    }

    /// Slots freed by [`Graph::gc_remove`] and not yet reused — exposed for
    /// an eventual compaction pass; `allocate_node` never consumes these.
    pub fn free_slot_count(&self) -> usize {
        self.free_list.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .flatten()
            .find(|n| n.name == name)
            .map(|n| n.id)
    }

    /// Every active node with a renderable type, in allocation order — the
    /// walk a global replot uses to re-enter every plot kernel from scratch.
    pub fn active_render_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .flatten()
            .filter(|n| n.active && n.render_type != RenderType::None)
            .map(|n| n.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(g: &mut Graph) -> NodeId {
        let id = g.allocate_node(RenderType::Point, Payload::Point);
        g.set_active(id, true);
        id
    }

    #[test]
    fn allocate_assigns_sequential_letter_names() {
        let mut g = Graph::new();
        let a = point(&mut g);
        let b = point(&mut g);
        assert_eq!(g.get(a).unwrap().name, "A");
        assert_eq!(g.get(b).unwrap().name, "B");
    }

    #[test]
    fn dependency_raises_child_rank_above_parent() {
        let mut g = Graph::new();
        let p = point(&mut g);
        let c = point(&mut g);
        g.add_dependency(c, p).unwrap();
        assert!(g.get(c).unwrap().rank > g.get(p).unwrap().rank);
    }

    #[test]
    fn rejects_cycle() {
        let mut g = Graph::new();
        let a = point(&mut g);
        let b = point(&mut g);
        g.add_dependency(b, a).unwrap();
        assert_eq!(g.add_dependency(a, b), Err(GraphError::WouldCycle));
    }

    #[test]
    fn fast_scan_finds_full_downstream_closure() {
        let mut g = Graph::new();
        let a = point(&mut g);
        let b = point(&mut g);
        let c = point(&mut g);
        g.add_dependency(b, a).unwrap();
        g.add_dependency(c, b).unwrap();
        let scan = g.fast_scan(&[a]);
        assert_eq!(scan.len(), 3);
        assert!(scan.contains(&a) && scan.contains(&b) && scan.contains(&c));
    }

    #[test]
    fn ranked_batches_are_ordered_ascending() {
        let mut g = Graph::new();
        let a = point(&mut g);
        let b = point(&mut g);
        g.add_dependency(b, a).unwrap();
        let batches = g.required_ranked_batches();
        assert_eq!(batches.len(), 2);
        assert!(batches[0].contains(&a));
        assert!(batches[1].contains(&b));
    }

    #[test]
    fn gc_remove_unlinks_from_neighbours() {
        let mut g = Graph::new();
        let a = point(&mut g);
        let b = point(&mut g);
        g.add_dependency(b, a).unwrap();
        g.gc_remove(a);
        assert!(g.get(a).is_none());
        assert!(g.get(b).unwrap().parents.is_empty());
    }

    #[test]
    fn deleting_only_deactivates_and_preserves_the_id() {
        let mut g = Graph::new();
        let a = point(&mut g);
        g.set_active(a, false);
        assert!(g.get(a).is_some());
        assert!(!g.get(a).unwrap().active);
    }
}
