//! Transaction/mutation manager: a FIFO task queue plus undo/redo stacks,
//! drained once per frame by [`CommandManager::commit`] into graph mutations
//! and a replot decision.
//!
//! Undo/redo bookkeeping reuses [`geo_dag::undo::UndoEngine`] exactly as it
//! is used anywhere else in this engine: each call to [`CommandManager::submit`]
//! archives the transaction it displaces, `undo`/`redo` walk the stack, and
//! every transition is `tracing::trace!`d under a stable target.

use geo_dag::undo::UndoEngine;
use geo_dag::{Formula, Graph, NodeId, Payload, Style};
use geo_plot::VertexBuffer;
use geo_view::Viewport;
use std::collections::VecDeque;
use tracing::trace;

/// One field-level change to a single node, captured with both the value it
/// replaces and the value it sets so the same record can be replayed either
/// direction: forward (`new`) for an ordinary commit or redo, backward
/// (`old`) when its owning transaction is undone.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationValue {
    Formula(Formula),
    FormulaX(Formula),
    FormulaY(Formula),
    Active(bool),
    Style(Style),
}

impl MutationValue {
    fn hash_into<H: std::hash::Hasher>(&self, state: &mut H) {
        use std::hash::Hash;
        match self {
            MutationValue::Formula(f) => {
                0u8.hash(state);
                hash_formula(f, state);
            }
            MutationValue::FormulaX(f) => {
                1u8.hash(state);
                hash_formula(f, state);
            }
            MutationValue::FormulaY(f) => {
                2u8.hash(state);
                hash_formula(f, state);
            }
            MutationValue::Active(b) => {
                3u8.hash(state);
                b.hash(state);
            }
            MutationValue::Style(s) => {
                4u8.hash(state);
                s.color.hash(state);
                s.thickness.to_bits().hash(state);
                s.is_visible.hash(state);
                s.show_label.hash(state);
            }
        }
    }
}

fn hash_formula<H: std::hash::Hasher>(f: &Formula, state: &mut H) {
    use std::hash::Hash;
    f.bytecode.len().hash(state);
    for tok in &f.bytecode {
        tok.value.to_bits().hash(state);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub node: NodeId,
    pub old: MutationValue,
    pub new: MutationValue,
}

/// A group of [`Mutation`]s that are undone/redone as one unit — the undo
/// history's unit of granularity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Transaction {
    pub mutations: Vec<Mutation>,
}

impl std::hash::Hash for Transaction {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.mutations.len().hash(state);
        for m in &self.mutations {
            m.node.0.hash(state);
            m.new.hash_into(state);
        }
    }
}

/// Pan/zoom/resize never dirty a graph node, so they bypass [`Transaction`]
/// history entirely and always force a global replot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewportOp {
    Pan { dx: f64, dy: f64 },
    ZoomAbout { factor: f64, anchor_x: f64, anchor_y: f64 },
    Resize { width: f64, height: f64 },
    /// Assign pan offset and zoom directly rather than stepping relative to
    /// the current view — how a restored or externally-specified view state
    /// (as opposed to a drag/scroll gesture) reaches the viewport.
    Set { offset_x: f64, offset_y: f64, zoom: f64 },
}

#[derive(Debug, Clone, PartialEq)]
enum TaskKind {
    Graph(Transaction),
    Viewport(ViewportOp),
}

#[derive(Debug, Clone, PartialEq)]
struct Task {
    kind: TaskKind,
    is_undo_op: bool,
}

/// What a drained commit requires of the caller's plot pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplotKind {
    None,
    /// Only these nodes (already expanded to their downstream DAG closure)
    /// need to be re-solved and re-plotted.
    Incremental(Vec<NodeId>),
    /// A viewport mutation occurred: every active render-capable node must
    /// be re-solved and re-entered into its plot kernel.
    Global,
}

#[derive(Debug, Default)]
pub struct CommandManager {
    pending: VecDeque<Task>,
    history: UndoEngine<Transaction>,
    /// The transaction this manager currently considers "applied most
    /// recently" — the reference point the next `undo`/`redo` call needs to
    /// hand to [`UndoEngine`] as its `current`.
    last_applied: Option<Transaction>,
}

impl CommandManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn undo_depth(&self) -> usize {
        self.history.undo_depth()
    }

    pub fn redo_depth(&self) -> usize {
        self.history.redo_depth()
    }

    /// Enqueue `tx` as a normal forward edit and clear any redo history.
    pub fn submit(&mut self, tx: Transaction) {
        if let Some(displaced) = self.last_applied.take() {
            self.history.push_snapshot(displaced);
        }
        self.last_applied = Some(tx.clone());
        self.pending.push_back(Task { kind: TaskKind::Graph(tx), is_undo_op: false });
        trace!(target: "command.manager", op = "submit", "submit");
    }

    pub fn submit_viewport(&mut self, op: ViewportOp) {
        self.pending.push_back(Task { kind: TaskKind::Viewport(op), is_undo_op: false });
        trace!(target: "command.manager", op = "submit_viewport", "submit_viewport");
    }

    /// Reverse-enqueue the most recently applied transaction. Returns
    /// `false` with no effect if there is nothing left to undo.
    pub fn undo(&mut self) -> bool {
        let Some(current) = self.last_applied.take() else {
            return false;
        };
        match self.history.undo(current.clone()) {
            Some(previous) => {
                self.last_applied = Some(previous);
                self.pending.push_back(Task { kind: TaskKind::Graph(current), is_undo_op: true });
                trace!(target: "command.manager", op = "undo", depth = self.history.undo_depth(), "undo");
                true
            }
            None => {
                self.last_applied = Some(current);
                false
            }
        }
    }

    /// Re-enqueue the most recently undone transaction, forward. Returns
    /// `false` with no effect if there is nothing left to redo.
    pub fn redo(&mut self) -> bool {
        let Some(current) = self.last_applied.take() else {
            return false;
        };
        match self.history.redo(current.clone()) {
            Some(next) => {
                self.last_applied = Some(next.clone());
                self.pending.push_back(Task { kind: TaskKind::Graph(next), is_undo_op: false });
                trace!(target: "command.manager", op = "redo", depth = self.history.redo_depth(), "redo");
                true
            }
            None => {
                self.last_applied = Some(current);
                false
            }
        }
    }

    /// Drain the pending queue, apply every mutation to `graph` and `view`,
    /// then solve and replot exactly the nodes the commit requires: the full
    /// active set on a global replot, or the dirty nodes' downstream DAG
    /// closure on an incremental one. `draw_order` fixes iteration order for
    /// a global replot so vertex offsets stay stable frame to frame absent
    /// further edits.
    pub fn commit(
        &mut self,
        graph: &mut Graph,
        view: &mut Viewport,
        vertex_buffer: &mut VertexBuffer,
        draw_order: &[NodeId],
    ) -> ReplotKind {
        let mut dirty_seeds = Vec::new();
        let mut saw_viewport = false;

        while let Some(task) = self.pending.pop_front() {
            match task.kind {
                TaskKind::Viewport(op) => {
                    apply_viewport(view, op);
                    saw_viewport = true;
                }
                TaskKind::Graph(tx) => {
                    let order: Box<dyn Iterator<Item = &Mutation>> = if task.is_undo_op {
                        Box::new(tx.mutations.iter().rev())
                    } else {
                        Box::new(tx.mutations.iter())
                    };
                    for m in order {
                        let value = if task.is_undo_op { &m.old } else { &m.new };
                        apply_mutation(graph, m.node, value);
                        dirty_seeds.push(m.node);
                    }
                }
            }
        }

        if saw_viewport {
            self.replot_global(graph, view, vertex_buffer, draw_order);
            ReplotKind::Global
        } else if !dirty_seeds.is_empty() {
            let closure = graph.fast_scan(&dirty_seeds);
            self.replot_incremental(graph, view, vertex_buffer, &closure);
            ReplotKind::Incremental(closure)
        } else {
            ReplotKind::None
        }
    }

    fn replot_global(&self, graph: &mut Graph, view: &Viewport, vertex_buffer: &mut VertexBuffer, draw_order: &[NodeId]) {
        vertex_buffer.clear();
        for &id in draw_order {
            graph.touch_node(id);
        }
        solve_dirty(graph);
        for &id in draw_order {
            replot_one(graph, view, vertex_buffer, id);
        }
    }

    fn replot_incremental(&self, graph: &mut Graph, view: &Viewport, vertex_buffer: &mut VertexBuffer, closure: &[NodeId]) {
        for &id in closure {
            graph.touch_node(id);
        }
        solve_dirty(graph);
        for &id in closure {
            replot_one(graph, view, vertex_buffer, id);
        }
    }
}

fn solve_dirty(graph: &mut Graph) {
    for batch in graph.required_ranked_batches() {
        for id in batch {
            geo_solve::solve_node(graph, id);
        }
    }
}

fn replot_one(graph: &mut Graph, view: &Viewport, vertex_buffer: &mut VertexBuffer, id: NodeId) {
    match geo_plot::plot_node(graph, view, id) {
        Ok(points) if !points.is_empty() => {
            let slice = vertex_buffer.append(&points);
            if let Some(node) = graph.get_mut(id) {
                node.buffer_offset = slice.offset;
                node.current_point_count = slice.count;
            }
        }
        Ok(_) => {
            if let Some(node) = graph.get_mut(id) {
                node.current_point_count = 0;
            }
        }
        Err(_) => {
            if let Some(node) = graph.get_mut(id) {
                node.current_point_count = 0;
            }
        }
    }
}

fn apply_viewport(view: &mut Viewport, op: ViewportOp) {
    match op {
        ViewportOp::Pan { dx, dy } => view.pan(dx, dy),
        ViewportOp::ZoomAbout { factor, anchor_x, anchor_y } => view.zoom_about(factor, anchor_x, anchor_y),
        ViewportOp::Resize { width, height } => view.resize(width, height),
        ViewportOp::Set { offset_x, offset_y, zoom } => view.set_view(offset_x, offset_y, zoom),
    }
}

fn apply_mutation(graph: &mut Graph, id: NodeId, value: &MutationValue) {
    if let Some(node) = graph.get_mut(id) {
        match value {
            MutationValue::Formula(f) => match &mut node.payload {
                Payload::Scalar(slot) | Payload::SingleRpn(slot) => *slot = f.clone(),
                _ => {}
            },
            MutationValue::FormulaX(f) => {
                if let Payload::DualRpn { x, .. } = &mut node.payload {
                    *x = f.clone();
                }
            }
            MutationValue::FormulaY(f) => {
                if let Payload::DualRpn { y, .. } = &mut node.payload {
                    *y = f.clone();
                }
            }
            MutationValue::Active(active) => node.active = *active,
            MutationValue::Style(style) => node.style = *style,
        }
    }
    graph.touch_node(id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_compiler::compile;
    use geo_dag::RenderType;

    fn scalar_node(graph: &mut Graph, value: f64) -> NodeId {
        let c = compile(&value.to_string()).unwrap();
        let id = graph.allocate_node(RenderType::Scalar, Payload::Scalar(Formula { bytecode: c.bytecode, bindings: c.bindings }));
        graph.set_active(id, true);
        id
    }

    fn formula(src: &str) -> Formula {
        let c = compile(src).unwrap();
        Formula { bytecode: c.bytecode, bindings: c.bindings }
    }

    #[test]
    fn submit_then_commit_applies_formula_and_solves() {
        let mut graph = Graph::new();
        let mut view = Viewport::new(400.0, 400.0);
        let mut vbuf = VertexBuffer::new();
        let id = scalar_node(&mut graph, 1.0);
        geo_solve::solve_node(&mut graph, id);

        let mut mgr = CommandManager::new();
        mgr.submit(Transaction {
            mutations: vec![Mutation {
                node: id,
                old: MutationValue::Formula(formula("1")),
                new: MutationValue::Formula(formula("5")),
            }],
        });
        let kind = mgr.commit(&mut graph, &mut view, &mut vbuf, &[]);
        assert!(matches!(kind, ReplotKind::Incremental(_)));
        assert_eq!(graph.get(id).unwrap().result, geo_dag::NodeResult::Scalar(5.0));
    }

    #[test]
    fn undo_restores_the_previous_value() {
        let mut graph = Graph::new();
        let mut view = Viewport::new(400.0, 400.0);
        let mut vbuf = VertexBuffer::new();
        let id = scalar_node(&mut graph, 1.0);
        geo_solve::solve_node(&mut graph, id);

        let mut mgr = CommandManager::new();
        mgr.submit(Transaction {
            mutations: vec![Mutation {
                node: id,
                old: MutationValue::Formula(formula("1")),
                new: MutationValue::Formula(formula("5")),
            }],
        });
        mgr.commit(&mut graph, &mut view, &mut vbuf, &[]);
        assert!(mgr.undo());
        mgr.commit(&mut graph, &mut view, &mut vbuf, &[]);
        assert_eq!(graph.get(id).unwrap().result, geo_dag::NodeResult::Scalar(1.0));
    }

    #[test]
    fn redo_reapplies_the_undone_value() {
        let mut graph = Graph::new();
        let mut view = Viewport::new(400.0, 400.0);
        let mut vbuf = VertexBuffer::new();
        let id = scalar_node(&mut graph, 1.0);
        geo_solve::solve_node(&mut graph, id);

        let mut mgr = CommandManager::new();
        mgr.submit(Transaction {
            mutations: vec![Mutation {
                node: id,
                old: MutationValue::Formula(formula("1")),
                new: MutationValue::Formula(formula("5")),
            }],
        });
        mgr.commit(&mut graph, &mut view, &mut vbuf, &[]);
        mgr.undo();
        mgr.commit(&mut graph, &mut view, &mut vbuf, &[]);
        assert!(mgr.redo());
        mgr.commit(&mut graph, &mut view, &mut vbuf, &[]);
        assert_eq!(graph.get(id).unwrap().result, geo_dag::NodeResult::Scalar(5.0));
    }

    #[test]
    fn viewport_mutation_forces_global_replot() {
        let mut graph = Graph::new();
        let mut view = Viewport::new(400.0, 400.0);
        let mut vbuf = VertexBuffer::new();
        let mut mgr = CommandManager::new();
        mgr.submit_viewport(ViewportOp::Pan { dx: 1.0, dy: 0.0 });
        let kind = mgr.commit(&mut graph, &mut view, &mut vbuf, &[]);
        assert_eq!(kind, ReplotKind::Global);
        assert_eq!(view.world_origin(), (1.0, 0.0));
    }

    #[test]
    fn no_pending_tasks_yields_no_replot() {
        let mut graph = Graph::new();
        let mut view = Viewport::new(400.0, 400.0);
        let mut vbuf = VertexBuffer::new();
        let mut mgr = CommandManager::new();
        assert_eq!(mgr.commit(&mut graph, &mut view, &mut vbuf, &[]), ReplotKind::None);
    }
}
