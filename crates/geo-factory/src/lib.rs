//! High-level object constructors: compile the formula text a caller hands
//! in, allocate the node(s) it needs, wire parent edges, and submit an
//! activating [`geo_command::Transaction`] through the command manager in
//! one call — a caller never hand-builds a mutation list.
//!
//! Every constructor rejects the whole call on a [`geo_compiler::CompileError`]
//! before touching the graph, per the rule that a bad command produces no
//! mutation at all.

use geo_command::{CommandManager, Mutation, MutationValue, Transaction};
use geo_compiler::{compile, CompileError};
use geo_dag::{Formula, Graph, GraphError, NodeId, Payload, RenderType, Style};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FactoryError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("referenced node does not exist or is the wrong kind")]
    UnknownNode,
    #[error(transparent)]
    Link(#[from] GraphError),
}

fn formula(src: &str) -> Result<Formula, FactoryError> {
    let c = compile(src)?;
    Ok(Formula { bytecode: c.bytecode, bindings: c.bindings })
}

/// Allocate `node`, link it to every id in `parents`, and submit the single
/// `Active: false -> true` mutation every constructor needs to make the node
/// visible to solve/plot — the activation step the factory never skips.
fn activate(graph: &mut Graph, cmd: &mut CommandManager, node: NodeId, parents: &[NodeId]) -> Result<NodeId, FactoryError> {
    for &p in parents {
        graph.add_dependency(node, p)?;
    }
    cmd.submit(Transaction {
        mutations: vec![Mutation { node, old: MutationValue::Active(false), new: MutationValue::Active(true) }],
    });
    Ok(node)
}

/// Activate several freshly allocated nodes as one [`Transaction`], so a
/// multi-node constructor (a free point's two coordinate scalars plus the
/// point itself) produces a single undo step rather than one per node.
fn activate_all(cmd: &mut CommandManager, nodes: &[NodeId]) {
    let mutations = nodes
        .iter()
        .map(|&node| Mutation { node, old: MutationValue::Active(false), new: MutationValue::Active(true) })
        .collect();
    cmd.submit(Transaction { mutations });
}

pub fn scalar(graph: &mut Graph, cmd: &mut CommandManager, expr: &str) -> Result<NodeId, FactoryError> {
    let f = formula(expr)?;
    let node = graph.allocate_node(RenderType::Scalar, Payload::Scalar(f));
    activate(graph, cmd, node, &[])
}

/// A draggable point: two hidden scalar nodes hold its `x`/`y` coordinates,
/// and the point itself reads them each frame via `geo-solve`'s
/// `Payload::Point` two-scalar-parent case — dragging the point is just
/// rewriting those two scalars' formulas through [`update_formula`].
pub fn free_point(graph: &mut Graph, cmd: &mut CommandManager, x: f64, y: f64) -> Result<NodeId, FactoryError> {
    let x_formula = formula(&x.to_string())?;
    let y_formula = formula(&y.to_string())?;
    let x_node = graph.allocate_node(RenderType::Scalar, Payload::Scalar(x_formula));
    let y_node = graph.allocate_node(RenderType::Scalar, Payload::Scalar(y_formula));
    let point = graph.allocate_node(RenderType::Point, Payload::Point);
    graph.add_dependency(point, x_node)?;
    graph.add_dependency(point, y_node)?;
    activate_all(cmd, &[x_node, y_node, point]);
    Ok(point)
}

/// A point locked to a parametric host curve's `(x(t), y(t))` at a fixed
/// parameter. `geo-dag`'s payload model has no "point riding a curve"
/// variant, so this samples the host's own bytecode once at construction via
/// `geo-eval` and drops in a plain free point at that location — moving it
/// afterwards is indistinguishable from any other free point. Noted as a
/// scope simplification: a truly live-constrained point would need a new
/// `Payload` variant and solver arm.
pub fn point_on_formula(graph: &mut Graph, cmd: &mut CommandManager, host_id: NodeId, t: f64) -> Result<NodeId, FactoryError> {
    let host = graph.get(host_id).ok_or(FactoryError::UnknownNode)?;
    let Payload::DualRpn { x, y, .. } = &host.payload else {
        return Err(FactoryError::UnknownNode);
    };
    let frame = geo_eval::Frame { x: 0.0, y: 0.0, t };
    let px = geo_eval::eval_scalar(&x.bytecode, frame).map_err(|_| FactoryError::UnknownNode)?;
    let py = geo_eval::eval_scalar(&y.bytecode, frame).map_err(|_| FactoryError::UnknownNode)?;
    free_point(graph, cmd, px, py)
}

pub fn segment(graph: &mut Graph, cmd: &mut CommandManager, p1: NodeId, p2: NodeId) -> Result<NodeId, FactoryError> {
    line_of_kind(graph, cmd, p1, p2, false)
}

/// The midpoint of `a` and `b`. `geo-solve`'s `Payload::Point` two-point-parent
/// case only ever computes the 0.5 ratio (a general `ratio_point` helper
/// exists in that crate but nothing currently feeds it a caller-chosen `t`),
/// so unlike [`free_point`] this node stays live: moving either endpoint
/// re-solves the midpoint automatically.
pub fn midpoint(graph: &mut Graph, cmd: &mut CommandManager, a: NodeId, b: NodeId) -> Result<NodeId, FactoryError> {
    let is_point = graph.get(a).map(|n| n.render_type) == Some(RenderType::Point);
    if !is_point || graph.get(b).is_none() {
        return Err(FactoryError::UnknownNode);
    }
    let node = graph.allocate_node(RenderType::Point, Payload::Point);
    activate(graph, cmd, node, &[a, b])
}

pub fn line(graph: &mut Graph, cmd: &mut CommandManager, p1: NodeId, p2: NodeId, infinite: bool) -> Result<NodeId, FactoryError> {
    line_of_kind(graph, cmd, p1, p2, infinite)
}

fn line_of_kind(graph: &mut Graph, cmd: &mut CommandManager, p1: NodeId, p2: NodeId, is_infinite: bool) -> Result<NodeId, FactoryError> {
    if graph.get(p1).is_none() || graph.get(p2).is_none() {
        return Err(FactoryError::UnknownNode);
    }
    let node = graph.allocate_node(RenderType::Line, Payload::Line { is_infinite });
    activate(graph, cmd, node, &[p1, p2])
}

pub fn circle_centre_radius(graph: &mut Graph, cmd: &mut CommandManager, centre_id: NodeId, radius_expr: &str) -> Result<NodeId, FactoryError> {
    if graph.get(centre_id).is_none() {
        return Err(FactoryError::UnknownNode);
    }
    let radius_formula = formula(radius_expr)?;
    let radius_node = graph.allocate_node(RenderType::Scalar, Payload::Scalar(radius_formula));
    let node = graph.allocate_node(RenderType::Circle, Payload::Circle);
    graph.add_dependency(node, centre_id)?;
    graph.add_dependency(node, radius_node)?;
    activate_all(cmd, &[radius_node, node]);
    Ok(node)
}

pub fn circle_three_point(graph: &mut Graph, cmd: &mut CommandManager, p1: NodeId, p2: NodeId, p3: NodeId) -> Result<NodeId, FactoryError> {
    for p in [p1, p2, p3] {
        if graph.get(p).is_none() {
            return Err(FactoryError::UnknownNode);
        }
    }
    let node = graph.allocate_node(RenderType::Circle, Payload::Circle);
    activate(graph, cmd, node, &[p1, p2, p3])
}

pub fn explicit_curve(graph: &mut Graph, cmd: &mut CommandManager, expr: &str) -> Result<NodeId, FactoryError> {
    let f = formula(expr)?;
    let node = graph.allocate_node(RenderType::Explicit, Payload::SingleRpn(f));
    activate(graph, cmd, node, &[])
}

pub fn implicit_curve(graph: &mut Graph, cmd: &mut CommandManager, expr: &str) -> Result<NodeId, FactoryError> {
    let f = formula(expr)?;
    let node = graph.allocate_node(RenderType::Implicit, Payload::SingleRpn(f));
    activate(graph, cmd, node, &[])
}

pub fn parametric_curve(
    graph: &mut Graph,
    cmd: &mut CommandManager,
    x_expr: &str,
    y_expr: &str,
    t_min: f64,
    t_max: f64,
) -> Result<NodeId, FactoryError> {
    let x = formula(x_expr)?;
    let y = formula(y_expr)?;
    let node = graph.allocate_node(RenderType::Parametric, Payload::DualRpn { x, y, t_min, t_max });
    activate(graph, cmd, node, &[])
}

/// A point constrained to lie where `curve_a` and `curve_b` meet, seeded
/// with an initial guess; the solver refines it iteratively each frame, so
/// both curves are parent dependencies.
pub fn intersection_point(
    graph: &mut Graph,
    cmd: &mut CommandManager,
    curve_a: NodeId,
    curve_b: NodeId,
    guess_x: f64,
    guess_y: f64,
) -> Result<NodeId, FactoryError> {
    if graph.get(curve_a).is_none() || graph.get(curve_b).is_none() {
        return Err(FactoryError::UnknownNode);
    }
    let gx_formula = formula(&guess_x.to_string())?;
    let gy_formula = formula(&guess_y.to_string())?;
    let gx_node = graph.allocate_node(RenderType::Scalar, Payload::Scalar(gx_formula));
    let gy_node = graph.allocate_node(RenderType::Scalar, Payload::Scalar(gy_formula));
    let node = graph.allocate_node(RenderType::Point, Payload::IntersectionPoint { num_targets: 2 });
    graph.add_dependency(node, curve_a)?;
    graph.add_dependency(node, curve_b)?;
    graph.add_dependency(node, gx_node)?;
    graph.add_dependency(node, gy_node)?;
    activate_all(cmd, &[gx_node, gy_node, node]);
    Ok(node)
}

/// Deactivate a node without freeing its pool slot, so undo can resurrect it.
/// Downstream nodes are left wired; they simply observe an
/// inactive parent and produce no result until a redo reactivates it.
pub fn delete(graph: &Graph, cmd: &mut CommandManager, id: NodeId) -> Result<(), FactoryError> {
    if graph.get(id).is_none() {
        return Err(FactoryError::UnknownNode);
    }
    cmd.submit(Transaction {
        mutations: vec![Mutation { node: id, old: MutationValue::Active(true), new: MutationValue::Active(false) }],
    });
    Ok(())
}

pub fn update_style(graph: &Graph, cmd: &mut CommandManager, id: NodeId, style: Style) -> Result<(), FactoryError> {
    let node = graph.get(id).ok_or(FactoryError::UnknownNode)?;
    cmd.submit(Transaction {
        mutations: vec![Mutation { node: id, old: MutationValue::Style(node.style), new: MutationValue::Style(style) }],
    });
    Ok(())
}

pub fn update_formula(graph: &Graph, cmd: &mut CommandManager, id: NodeId, expr: &str) -> Result<(), FactoryError> {
    let node = graph.get(id).ok_or(FactoryError::UnknownNode)?;
    let new = formula(expr)?;
    let old = match &node.payload {
        Payload::Scalar(f) | Payload::SingleRpn(f) => f.clone(),
        _ => return Err(FactoryError::UnknownNode),
    };
    cmd.submit(Transaction {
        mutations: vec![Mutation { node: id, old: MutationValue::Formula(old), new: MutationValue::Formula(new) }],
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_view::Viewport;
    use geo_plot::VertexBuffer;

    #[test]
    fn scalar_activates_and_solves() {
        let mut graph = Graph::new();
        let mut cmd = CommandManager::new();
        let id = scalar(&mut graph, &mut cmd, "2 + 3").unwrap();
        let mut view = Viewport::new(400.0, 400.0);
        let mut vbuf = VertexBuffer::new();
        cmd.commit(&mut graph, &mut view, &mut vbuf, &[id]);
        assert!(graph.get(id).unwrap().active);
        assert_eq!(graph.get(id).unwrap().result, geo_dag::NodeResult::Scalar(5.0));
    }

    #[test]
    fn segment_links_both_endpoints() {
        let mut graph = Graph::new();
        let mut cmd = CommandManager::new();
        let p1 = free_point(&mut graph, &mut cmd, 0.0, 0.0).unwrap();
        let p2 = free_point(&mut graph, &mut cmd, 1.0, 1.0).unwrap();
        let seg = segment(&mut graph, &mut cmd, p1, p2).unwrap();
        assert_eq!(graph.get(seg).unwrap().parents, vec![p1, p2]);
    }

    #[test]
    fn midpoint_tracks_moving_endpoints() {
        let mut graph = Graph::new();
        let mut cmd = CommandManager::new();
        let p1 = free_point(&mut graph, &mut cmd, 0.0, 0.0).unwrap();
        let p2 = free_point(&mut graph, &mut cmd, 2.0, 0.0).unwrap();
        let mid = midpoint(&mut graph, &mut cmd, p1, p2).unwrap();
        let mut view = Viewport::new(400.0, 400.0);
        let mut vbuf = VertexBuffer::new();
        cmd.commit(&mut graph, &mut view, &mut vbuf, &[p1, p2, mid]);
        assert_eq!(graph.get(mid).unwrap().result, geo_dag::NodeResult::Point { x: 1.0, y: 0.0 });
    }

    #[test]
    fn delete_deactivates_without_freeing_the_slot() {
        let mut graph = Graph::new();
        let mut cmd = CommandManager::new();
        let id = scalar(&mut graph, &mut cmd, "1").unwrap();
        let mut view = Viewport::new(400.0, 400.0);
        let mut vbuf = VertexBuffer::new();
        cmd.commit(&mut graph, &mut view, &mut vbuf, &[id]);
        delete(&graph, &mut cmd, id).unwrap();
        cmd.commit(&mut graph, &mut view, &mut vbuf, &[id]);
        assert!(!graph.get(id).unwrap().active);
        assert!(graph.get(id).is_some());
    }

    #[test]
    fn unknown_parent_is_rejected_before_any_mutation() {
        let mut graph = Graph::new();
        let mut cmd = CommandManager::new();
        let ghost = NodeId(999);
        let err = circle_centre_radius(&mut graph, &mut cmd, ghost, "1").unwrap_err();
        assert_eq!(err, FactoryError::UnknownNode);
    }

    #[test]
    fn update_style_is_undoable() {
        let mut graph = Graph::new();
        let mut cmd = CommandManager::new();
        let id = scalar(&mut graph, &mut cmd, "1").unwrap();
        let mut view = Viewport::new(400.0, 400.0);
        let mut vbuf = VertexBuffer::new();
        cmd.commit(&mut graph, &mut view, &mut vbuf, &[id]);
        let original = graph.get(id).unwrap().style;
        let changed = geo_dag::Style { color: 0xff0000ff, thickness: 2.0, is_visible: true, show_label: true };
        update_style(&graph, &mut cmd, id, changed).unwrap();
        cmd.commit(&mut graph, &mut view, &mut vbuf, &[id]);
        assert_eq!(graph.get(id).unwrap().style, changed);
        cmd.undo();
        cmd.commit(&mut graph, &mut view, &mut vbuf, &[id]);
        assert_eq!(graph.get(id).unwrap().style, original);
    }

    #[test]
    fn bad_expression_is_rejected() {
        let mut graph = Graph::new();
        let mut cmd = CommandManager::new();
        let err = scalar(&mut graph, &mut cmd, "2 + + 3").unwrap_err();
        assert!(matches!(err, FactoryError::Compile(_)));
    }
}
