//! Per-node solvers: pure functions from a node's parents' cached results to
//! its own `result`, dispatched by [`solve_node`] over a node's
//! `render_type`/`payload` pair.
//!
//! Every solver reads parents' `result` fields only — it never re-solves a
//! parent — and never panics; a geometric failure (collinear points, a
//! negative discriminant, a non-converging Newton step) is reported as a
//! [`geo_dag::SolverError`] stored on the node rather than propagated as a
//! Rust error, so a bad node simply stops contributing results downstream
//! instead of aborting the frame.

use geo_compiler::BindingKind;
use geo_dag::{Formula, Graph, NodeId, NodeResult, NodeStatus, Payload, SolverError};
use geo_eval::{Frame, eval_scalar};

const EPSILON: f64 = 1e-9;
const NEWTON_MAX_ITERS: usize = 50;
const NEWTON_TOLERANCE: f64 = 1e-10;
const NEWTON_STEP: f64 = 1e-6;

/// Resolve every `Variable` binding slot in `formula` by name against `graph`,
/// rewrite the corresponding `PUSH_CONST` slot, then run the scalar
/// evaluator. `Function` slots are never emitted by the compiler today (see
/// its own doc comment); encountering one here is treated as an unresolved
/// input rather than a panic.
pub fn eval_formula_scalar(graph: &Graph, formula: &Formula) -> Result<f64, SolverError> {
    let mut bytecode = formula.bytecode.clone();
    for slot in &formula.bindings {
        match slot.kind {
            BindingKind::Variable => {
                let parent = graph
                    .find_by_name(&slot.source_name)
                    .and_then(|id| graph.get(id))
                    .ok_or(SolverError::InvalidInput)?;
                let NodeResult::Scalar(v) = parent.result else {
                    return Err(SolverError::InvalidInput);
                };
                bytecode[slot.rpn_index].value = v;
            }
            BindingKind::Function => return Err(SolverError::InvalidInput),
        }
    }
    eval_scalar(&bytecode, Frame { x: 0.0, y: 0.0, t: 0.0 }).map_err(|_| SolverError::InvalidInput)
}

fn scalar_of(graph: &Graph, id: NodeId) -> Result<f64, SolverError> {
    match graph.get(id).ok_or(SolverError::InvalidInput)?.result {
        NodeResult::Scalar(v) => Ok(v),
        _ => Err(SolverError::InvalidInput),
    }
}

fn point_of(graph: &Graph, id: NodeId) -> Result<(f64, f64), SolverError> {
    match graph.get(id).ok_or(SolverError::InvalidInput)?.result {
        NodeResult::Point { x, y } => Ok((x, y)),
        _ => Err(SolverError::InvalidInput),
    }
}

fn circle_of(graph: &Graph, id: NodeId) -> Result<(f64, f64, f64), SolverError> {
    match graph.get(id).ok_or(SolverError::InvalidInput)?.result {
        NodeResult::Circle { cx, cy, r } => Ok((cx, cy, r)),
        _ => Err(SolverError::InvalidInput),
    }
}

/// A free point's position comes from two scalar parents, `(x, y)`.
pub fn free_point(graph: &Graph, x_id: NodeId, y_id: NodeId) -> Result<(f64, f64), SolverError> {
    Ok((scalar_of(graph, x_id)?, scalar_of(graph, y_id)?))
}

/// Linear combination of two point parents: `t=0.5` is the midpoint,
/// anything else a ratio point along the chord.
pub fn ratio_point(graph: &Graph, a: NodeId, b: NodeId, t: f64) -> Result<(f64, f64), SolverError> {
    let (ax, ay) = point_of(graph, a)?;
    let (bx, by) = point_of(graph, b)?;
    Ok((ax + (bx - ax) * t, ay + (by - ay) * t))
}

pub fn midpoint(graph: &Graph, a: NodeId, b: NodeId) -> Result<(f64, f64), SolverError> {
    ratio_point(graph, a, b, 0.5)
}

/// Circle from a centre-point parent and a radius scalar parent.
pub fn circle_centre_radius(
    graph: &Graph,
    centre: NodeId,
    radius: NodeId,
) -> Result<(f64, f64, f64), SolverError> {
    let (cx, cy) = point_of(graph, centre)?;
    let r = scalar_of(graph, radius)?;
    if r < 0.0 {
        return Err(SolverError::InvalidInput);
    }
    Ok((cx, cy, r))
}

/// Circumscribed circle through three points; fails when they're collinear
/// (determinant of the perpendicular-bisector system too small to invert
/// safely).
pub fn circle_three_points(
    graph: &Graph,
    a: NodeId,
    b: NodeId,
    c: NodeId,
) -> Result<(f64, f64, f64), SolverError> {
    let (ax, ay) = point_of(graph, a)?;
    let (bx, by) = point_of(graph, b)?;
    let (cx, cy) = point_of(graph, c)?;

    let d = 2.0 * (ax * (by - cy) + bx * (cy - ay) + cx * (ay - by));
    if d.abs() < EPSILON {
        return Err(SolverError::CollinearPoints);
    }
    let a_sq = ax * ax + ay * ay;
    let b_sq = bx * bx + by * by;
    let c_sq = cx * cx + cy * cy;
    let ux = (a_sq * (by - cy) + b_sq * (cy - ay) + c_sq * (ay - by)) / d;
    let uy = (a_sq * (cx - bx) + b_sq * (ax - cx) + c_sq * (bx - ax)) / d;
    let r = ((ax - ux).powi(2) + (ay - uy).powi(2)).sqrt();
    Ok((ux, uy, r))
}

/// Intersection of two (finite or infinite) lines given as point pairs.
/// `branch_sign` is unused for lines (a single solution exists unless they're
/// parallel) but kept for call-site symmetry with the circle variants.
pub fn line_line_intersection(
    graph: &Graph,
    a1: NodeId,
    a2: NodeId,
    b1: NodeId,
    b2: NodeId,
) -> Result<(f64, f64), SolverError> {
    let (x1, y1) = point_of(graph, a1)?;
    let (x2, y2) = point_of(graph, a2)?;
    let (x3, y3) = point_of(graph, b1)?;
    let (x4, y4) = point_of(graph, b2)?;

    let denom = (x1 - x2) * (y3 - y4) - (y1 - y2) * (x3 - x4);
    if denom.abs() < EPSILON {
        return Err(SolverError::NoIntersection);
    }
    let a = x1 * y2 - y1 * x2;
    let b = x3 * y4 - y3 * x4;
    let px = (a * (x3 - x4) - (x1 - x2) * b) / denom;
    let py = (a * (y3 - y4) - (y1 - y2) * b) / denom;
    Ok((px, py))
}

/// Intersection of a line (through two points) and a circle. `branch_sign`
/// selects which of the (up to) two roots to report: `<= 0` picks the root
/// nearer the line's first point, `> 0` the other.
pub fn line_circle_intersection(
    graph: &Graph,
    p1: NodeId,
    p2: NodeId,
    circle: NodeId,
    branch_sign: i8,
) -> Result<(f64, f64), SolverError> {
    let (x1, y1) = point_of(graph, p1)?;
    let (x2, y2) = point_of(graph, p2)?;
    let (cx, cy, r) = circle_of(graph, circle)?;

    let dx = x2 - x1;
    let dy = y2 - y1;
    let fx = x1 - cx;
    let fy = y1 - cy;

    let a = dx * dx + dy * dy;
    if a < EPSILON {
        return Err(SolverError::DegenerateLine);
    }
    let b = 2.0 * (fx * dx + fy * dy);
    let c = fx * fx + fy * fy - r * r;
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return Err(SolverError::NoIntersection);
    }
    let sqrt_disc = disc.sqrt();
    let t = if branch_sign <= 0 {
        (-b - sqrt_disc) / (2.0 * a)
    } else {
        (-b + sqrt_disc) / (2.0 * a)
    };
    Ok((x1 + t * dx, y1 + t * dy))
}

/// Intersection of two circles. `branch_sign <= 0` picks the point to the
/// right of the centre-to-centre axis (the cross product of the axis and the
/// offset to the candidate is negative), `> 0` the other.
pub fn circle_circle_intersection(
    graph: &Graph,
    c1: NodeId,
    c2: NodeId,
    branch_sign: i8,
) -> Result<(f64, f64), SolverError> {
    let (x1, y1, r1) = circle_of(graph, c1)?;
    let (x2, y2, r2) = circle_of(graph, c2)?;

    let dx = x2 - x1;
    let dy = y2 - y1;
    let d = (dx * dx + dy * dy).sqrt();
    if d < EPSILON || d > r1 + r2 || d < (r1 - r2).abs() {
        return Err(SolverError::NoIntersection);
    }
    let a = (r1 * r1 - r2 * r2 + d * d) / (2.0 * d);
    let h_sq = r1 * r1 - a * a;
    if h_sq < 0.0 {
        return Err(SolverError::NoIntersection);
    }
    let h = h_sq.sqrt();
    let mx = x1 + a * dx / d;
    let my = y1 + a * dy / d;
    let (ox, oy) = (-dy / d * h, dx / d * h);
    Ok(if branch_sign <= 0 {
        (mx - ox, my - oy)
    } else {
        (mx + ox, my + oy)
    })
}

/// Newton refinement of two curve formulas' simultaneous zero, starting from
/// a stored `(x, y)` guess. Used for intersections that have no closed form
/// (e.g. two arbitrary implicit curves). The Jacobian is estimated by
/// central finite differences since the curves are opaque RPN bytecode.
pub fn graphical_intersection(
    graph: &Graph,
    f1: &Formula,
    f2: &Formula,
    guess_x: f64,
    guess_y: f64,
) -> Result<(f64, f64), SolverError> {
    let eval = |formula: &Formula, x: f64, y: f64| -> Result<f64, SolverError> {
        let mut bytecode = formula.bytecode.clone();
        for slot in &formula.bindings {
            match slot.kind {
                BindingKind::Variable => {
                    let parent = graph
                        .find_by_name(&slot.source_name)
                        .and_then(|id| graph.get(id))
                        .ok_or(SolverError::InvalidInput)?;
                    let NodeResult::Scalar(v) = parent.result else {
                        return Err(SolverError::InvalidInput);
                    };
                    bytecode[slot.rpn_index].value = v;
                }
                BindingKind::Function => return Err(SolverError::InvalidInput),
            }
        }
        eval_scalar(&bytecode, Frame { x, y, t: 0.0 }).map_err(|_| SolverError::InvalidInput)
    };

    let mut x = guess_x;
    let mut y = guess_y;
    for _ in 0..NEWTON_MAX_ITERS {
        let f1v = eval(f1, x, y)?;
        let f2v = eval(f2, x, y)?;
        if f1v.abs() < NEWTON_TOLERANCE && f2v.abs() < NEWTON_TOLERANCE {
            return Ok((x, y));
        }
        let h = NEWTON_STEP;
        let d_f1_dx = (eval(f1, x + h, y)? - eval(f1, x - h, y)?) / (2.0 * h);
        let d_f1_dy = (eval(f1, x, y + h)? - eval(f1, x, y - h)?) / (2.0 * h);
        let d_f2_dx = (eval(f2, x + h, y)? - eval(f2, x - h, y)?) / (2.0 * h);
        let d_f2_dy = (eval(f2, x, y + h)? - eval(f2, x, y - h)?) / (2.0 * h);

        let det = d_f1_dx * d_f2_dy - d_f1_dy * d_f2_dx;
        if det.abs() < EPSILON {
            return Err(SolverError::NonConvergent);
        }
        let dx = (f1v * d_f2_dy - f2v * d_f1_dy) / det;
        let dy = (f2v * d_f1_dx - f1v * d_f2_dx) / det;
        x -= dx;
        y -= dy;
    }
    Err(SolverError::NonConvergent)
}

/// Orthogonal projection of a point onto the (infinite) line through two
/// other points.
pub fn perpendicular_foot(
    graph: &Graph,
    point: NodeId,
    line_p1: NodeId,
    line_p2: NodeId,
) -> Result<(f64, f64), SolverError> {
    let (px, py) = point_of(graph, point)?;
    let (x1, y1) = point_of(graph, line_p1)?;
    let (x2, y2) = point_of(graph, line_p2)?;
    let dx = x2 - x1;
    let dy = y2 - y1;
    let len_sq = dx * dx + dy * dy;
    if len_sq < EPSILON {
        return Err(SolverError::DegenerateLine);
    }
    let t = ((px - x1) * dx + (py - y1) * dy) / len_sq;
    Ok((x1 + t * dx, y1 + t * dy))
}

/// Run the solver appropriate to `id`'s `render_type`/`payload`, writing its
/// `result` and `solver_error` in place. Parents with their own
/// `solver_error` set are treated as invalid input rather than re-solved.
pub fn solve_node(graph: &mut Graph, id: NodeId) {
    let Some(node) = graph.get(id) else { return };
    if !node.active || node.status == NodeStatus::Cyclic {
        return;
    }
    if node.parents.iter().any(|&p| {
        graph
            .get(p)
            .map(|parent| parent.solver_error.is_some())
            .unwrap_or(true)
    }) {
        apply(graph, id, Err(SolverError::InvalidInput));
        return;
    }

    let node = graph.get(id).unwrap();
    let outcome: Result<NodeResult, SolverError> = match node.payload.clone() {
        Payload::Scalar(formula) => {
            eval_formula_scalar(graph, &formula).map(NodeResult::Scalar)
        }
        Payload::Point => match node.parents.as_slice() {
            [a, b]
                if matches!(
                    graph.get(*a).map(|n| n.render_type),
                    Some(geo_dag::RenderType::Point)
                ) =>
            {
                ratio_point(graph, *a, *b, 0.5).map(|(x, y)| NodeResult::Point { x, y })
            }
            [x_id, y_id] => {
                free_point(graph, *x_id, *y_id).map(|(x, y)| NodeResult::Point { x, y })
            }
            _ => Err(SolverError::InvalidInput),
        },
        Payload::Line { .. } => match node.parents.as_slice() {
            [p1, p2] => point_of(graph, *p1)
                .and_then(|_| point_of(graph, *p2))
                .map(|_| NodeResult::Unresolved),
            _ => Err(SolverError::InvalidInput),
        },
        Payload::Circle => match node.parents.as_slice() {
            [centre, radius] => {
                circle_centre_radius(graph, *centre, *radius).map(|(cx, cy, r)| NodeResult::Circle { cx, cy, r })
            }
            [a, b, c] => circle_three_points(graph, *a, *b, *c).map(|(cx, cy, r)| NodeResult::Circle { cx, cy, r }),
            _ => Err(SolverError::InvalidInput),
        },
        // `num_targets` curve parents carrying the two curves' bytecode,
        // followed by two scalar parents holding the stored (x, y) guess —
        // only the two-curve case has a Newton solve defined.
        Payload::IntersectionPoint { num_targets } => {
            if num_targets != 2 || node.parents.len() != num_targets + 2 {
                Err(SolverError::InvalidInput)
            } else {
                let curve1 = node.parents[0];
                let curve2 = node.parents[1];
                let guess_x = node.parents[2];
                let guess_y = node.parents[3];
                match (
                    graph.get(curve1).map(|n| n.payload.clone()),
                    graph.get(curve2).map(|n| n.payload.clone()),
                ) {
                    (Some(Payload::SingleRpn(f1)), Some(Payload::SingleRpn(f2))) => {
                        scalar_of(graph, guess_x).and_then(|gx| {
                            let gy = scalar_of(graph, guess_y)?;
                            graphical_intersection(graph, &f1, &f2, gx, gy)
                        }).map(|(x, y)| NodeResult::Point { x, y })
                    }
                    _ => Err(SolverError::InvalidInput),
                }
            }
        }
        Payload::AnalyticalIntersection { branch_sign } => match node.parents.as_slice() {
            [c1, c2] => circle_circle_intersection(graph, *c1, *c2, branch_sign)
                .map(|(x, y)| NodeResult::Point { x, y }),
            _ => Err(SolverError::InvalidInput),
        },
        // Curves carry their own bytecode for the plot kernels to sample
        // directly; there is no single scalar/point `result` to solve here,
        // only validity of their scalar-parent bindings.
        Payload::SingleRpn(formula) | Payload::DualRpn { x: formula, .. } => {
            eval_formula_scalar(graph, &formula).map(|_| NodeResult::Unresolved)
        }
        Payload::TextLabel => Ok(node.result),
    };

    apply(graph, id, outcome);
}

fn apply(graph: &mut Graph, id: NodeId, outcome: Result<NodeResult, SolverError>) {
    if let Some(node) = graph.get_mut(id) {
        match outcome {
            Ok(result) => {
                node.result = result;
                node.solver_error = None;
            }
            Err(e) => {
                node.solver_error = Some(e);
            }
        }
    }
    graph.clear_dirty(id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_compiler::compile;
    use geo_dag::RenderType;

    fn scalar_node(graph: &mut Graph, value: f64) -> NodeId {
        let formula = Formula {
            bytecode: vec![geo_compiler::RpnToken::constant(value)],
            bindings: Vec::new(),
        };
        let id = graph.allocate_node(RenderType::Scalar, Payload::Scalar(formula));
        graph.set_active(id, true);
        id
    }

    fn point_node(graph: &mut Graph, x: NodeId, y: NodeId) -> NodeId {
        let id = graph.allocate_node(RenderType::Point, Payload::Point);
        graph.add_dependency(id, x).unwrap();
        graph.add_dependency(id, y).unwrap();
        graph.set_active(id, true);
        id
    }

    fn solve_all(graph: &mut Graph) {
        for batch in graph.required_ranked_batches() {
            for id in batch {
                solve_node(graph, id);
            }
        }
    }

    #[test]
    fn free_point_reads_two_scalar_parents() {
        let mut g = Graph::new();
        let x = scalar_node(&mut g, 3.0);
        let y = scalar_node(&mut g, 4.0);
        let p = point_node(&mut g, x, y);
        solve_all(&mut g);
        assert_eq!(g.get(p).unwrap().result, NodeResult::Point { x: 3.0, y: 4.0 });
    }

    #[test]
    fn three_point_circle_matches_known_circumcircle() {
        let mut g = Graph::new();
        let ax = scalar_node(&mut g, 1.0);
        let ay = scalar_node(&mut g, 0.0);
        let bx = scalar_node(&mut g, -1.0);
        let by = scalar_node(&mut g, 0.0);
        let cx = scalar_node(&mut g, 0.0);
        let cy = scalar_node(&mut g, 1.0);
        let a = point_node(&mut g, ax, ay);
        let b = point_node(&mut g, bx, by);
        let c = point_node(&mut g, cx, cy);
        solve_all(&mut g);
        let circle = circle_three_points(&g, a, b, c).unwrap();
        assert!((circle.0).abs() < 1e-9);
        assert!((circle.1).abs() < 1e-9);
        assert!((circle.2 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn three_point_circle_rejects_collinear_points() {
        let mut g = Graph::new();
        let ax = scalar_node(&mut g, 0.0);
        let ay = scalar_node(&mut g, 0.0);
        let bx = scalar_node(&mut g, 1.0);
        let by = scalar_node(&mut g, 1.0);
        let cx = scalar_node(&mut g, 2.0);
        let cy = scalar_node(&mut g, 2.0);
        let a = point_node(&mut g, ax, ay);
        let b = point_node(&mut g, bx, by);
        let c = point_node(&mut g, cx, cy);
        solve_all(&mut g);
        assert_eq!(
            circle_three_points(&g, a, b, c),
            Err(SolverError::CollinearPoints)
        );
    }

    #[test]
    fn line_circle_intersection_picks_branch_by_sign() {
        let mut g = Graph::new();
        let cx = scalar_node(&mut g, 0.0);
        let cy = scalar_node(&mut g, 0.0);
        let r = scalar_node(&mut g, 1.0);
        let centre = point_node(&mut g, cx, cy);
        let circle = g.allocate_node(RenderType::Circle, Payload::Circle);
        g.add_dependency(circle, centre).unwrap();
        g.add_dependency(circle, r).unwrap();
        g.set_active(circle, true);

        let p1x = scalar_node(&mut g, -2.0);
        let p1y = scalar_node(&mut g, 0.0);
        let p2x = scalar_node(&mut g, 2.0);
        let p2y = scalar_node(&mut g, 0.0);
        let p1 = point_node(&mut g, p1x, p1y);
        let p2 = point_node(&mut g, p2x, p2y);
        solve_all(&mut g);

        let lo = line_circle_intersection(&g, p1, p2, circle, -1).unwrap();
        let hi = line_circle_intersection(&g, p1, p2, circle, 1).unwrap();
        assert!((lo.0 - (-1.0)).abs() < 1e-9);
        assert!((hi.0 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn graphical_intersection_of_two_lines_converges_to_closed_form() {
        let g = Graph::new();
        // f1: x - y = 0 ; f2: x + y - 2 = 0  -> intersect at (1, 1)
        let f1 = compile("x-y").unwrap();
        let f2 = compile("x+y-2").unwrap();
        let formula1 = Formula { bytecode: f1.bytecode, bindings: f1.bindings };
        let formula2 = Formula { bytecode: f2.bytecode, bindings: f2.bindings };
        let (x, y) = graphical_intersection(&g, &formula1, &formula2, 0.5, 0.5).unwrap();
        assert!((x - 1.0).abs() < 1e-6);
        assert!((y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn perpendicular_foot_projects_onto_line() {
        let mut g = Graph::new();
        let ox = scalar_node(&mut g, 0.0);
        let oy = scalar_node(&mut g, 0.0);
        let ex = scalar_node(&mut g, 10.0);
        let ey = scalar_node(&mut g, 0.0);
        let px = scalar_node(&mut g, 3.0);
        let py = scalar_node(&mut g, 4.0);
        let origin = point_node(&mut g, ox, oy);
        let end = point_node(&mut g, ex, ey);
        let point = point_node(&mut g, px, py);
        solve_all(&mut g);

        let foot = perpendicular_foot(&g, point, origin, end).unwrap();
        assert!((foot.0 - 3.0).abs() < 1e-9);
        assert!(foot.1.abs() < 1e-9);
    }

    #[test]
    fn invalid_parent_propagates_without_computing() {
        let mut g = Graph::new();
        let bad = g.allocate_node(RenderType::Scalar, Payload::Scalar(Formula::default()));
        g.set_active(bad, true);
        solve_node(&mut g, bad);
        assert!(g.get(bad).unwrap().solver_error.is_some());

        let y = scalar_node(&mut g, 1.0);
        let p = point_node(&mut g, bad, y);
        solve_all(&mut g);
        assert_eq!(g.get(p).unwrap().solver_error, Some(SolverError::InvalidInput));
    }
}
