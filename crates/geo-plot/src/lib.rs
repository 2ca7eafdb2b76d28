//! Plot kernels: turn a solved [`geo_dag::GeoNode`] into packed clip-space
//! vertices.
//!
//! Every kernel emits [`PointData`] — two `i16` clip-space coordinates plus a
//! tag distinguishing the start of a new subpath from a continuation — as one
//! batch per logical curve. [`plot_node`] is the single dispatch point:
//! it reads a node's `render_type`/`payload`, delegates to the matching
//! kernel in [`kernels`], and never panics — a node whose parents failed to
//! solve (`solver_error.is_some()`) or whose payload doesn't match its
//! `render_type` simply contributes no vertices.
//!
//! All kernels map world space to clip space exclusively through
//! [`geo_view::Viewport::world_to_clip`], so two kernels sampling the same
//! world point always land on the same pixel.

pub mod kernels;

use geo_compiler::{BindingKind, RpnToken};
use geo_dag::{Formula, Graph, NodeId, NodeResult, Payload, RenderType};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PlotError {
    #[error("node has no cached result to plot")]
    Unsolved,
    #[error("node's payload does not match its render type")]
    PayloadMismatch,
    #[error("a variable binding referenced an unknown or non-scalar node")]
    UnresolvedBinding,
}

/// Whether a vertex starts a new disconnected subpath or continues the
/// current one — lets a single curve batch represent several strokes (an
/// explicit curve broken by a NaN sample, a circle split by a viewport
/// crossing) without the collector needing to inspect coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointTag {
    MoveTo,
    LineTo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointData {
    pub x: i16,
    pub y: i16,
    pub tag: PointTag,
}

impl PointData {
    pub fn move_to(xy: (i16, i16)) -> Self {
        Self { x: xy.0, y: xy.1, tag: PointTag::MoveTo }
    }
    pub fn line_to(xy: (i16, i16)) -> Self {
        Self { x: xy.0, y: xy.1, tag: PointTag::LineTo }
    }
}

/// Where a node's vertices live in the shared [`VertexBuffer`] — mirrors
/// `GeoNode::{buffer_offset, current_point_count}`, which the command
/// manager copies back onto the node after a replot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Slice {
    pub offset: usize,
    pub count: usize,
}

/// Flat backing store for every active curve's vertices, indexed by the
/// `(offset, count)` slice the command manager records on each node after a
/// replot. An incremental replot only appends the slices of the nodes it
/// re-plotted; a global replot clears and rebuilds the whole buffer.
#[derive(Debug, Default)]
pub struct VertexBuffer {
    points: Vec<PointData>,
}

impl VertexBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Append `points` and return the slice they now occupy.
    pub fn append(&mut self, points: &[PointData]) -> Slice {
        let offset = self.points.len();
        self.points.extend_from_slice(points);
        Slice { offset, count: points.len() }
    }

    pub fn slice(&self, s: Slice) -> &[PointData] {
        &self.points[s.offset..s.offset + s.count]
    }

    pub fn all(&self) -> &[PointData] {
        &self.points
    }
}

/// Resolve every `Variable` binding in `formula` against `graph` by name,
/// rewriting the matching `PushConst` slot's operand in place, and return the
/// bound bytecode ready for repeated evaluation at varying `(x, y, t)`
/// frames. Mirrors `geo-solve`'s own binding pass; duplicated rather than
/// shared because the solver resolves once per node per frame while a plot
/// kernel resolves once and then samples the bound bytecode thousands of
/// times, which reads better as its own small helper than as a shared
/// generic over "how many times you call eval".
pub fn bind_formula(graph: &Graph, formula: &Formula) -> Result<Vec<RpnToken>, PlotError> {
    let mut bytecode = formula.bytecode.clone();
    for slot in &formula.bindings {
        match slot.kind {
            BindingKind::Variable => {
                let value = graph
                    .find_by_name(&slot.source_name)
                    .and_then(|id| graph.get(id))
                    .and_then(|node| match node.result {
                        NodeResult::Scalar(v) => Some(v),
                        _ => None,
                    })
                    .ok_or(PlotError::UnresolvedBinding)?;
                bytecode[slot.rpn_index].value = value;
            }
            BindingKind::Function => return Err(PlotError::UnresolvedBinding),
        }
    }
    Ok(bytecode)
}

/// Dispatch a solved node to its plot kernel. Returns an empty vertex list
/// (never an error) for anything that carries no visible geometry, so a
/// caller iterating every active node doesn't need to special-case scalars
/// and text labels.
pub fn plot_node(
    graph: &Graph,
    view: &geo_view::Viewport,
    id: NodeId,
) -> Result<Vec<PointData>, PlotError> {
    let Some(node) = graph.get(id) else {
        return Ok(Vec::new());
    };
    if !node.active || node.solver_error.is_some() {
        return Ok(Vec::new());
    }
    match node.render_type {
        RenderType::None | RenderType::Scalar | RenderType::Text => Ok(Vec::new()),
        RenderType::Point => match node.result {
            NodeResult::Point { x, y } => Ok(vec![PointData::move_to(view.world_to_clip(x, y))]),
            _ => Err(PlotError::Unsolved),
        },
        RenderType::Line => {
            let (p1, p2) = match node.parents.as_slice() {
                [p1, p2] => (*p1, *p2),
                _ => return Err(PlotError::PayloadMismatch),
            };
            let is_infinite = matches!(node.payload, Payload::Line { is_infinite } if is_infinite);
            kernels::linear::plot_line(graph, view, p1, p2, is_infinite)
        }
        RenderType::Circle => match node.result {
            NodeResult::Circle { cx, cy, r } => Ok(kernels::circular::plot_circle(view, cx, cy, r, None)),
            _ => Err(PlotError::Unsolved),
        },
        RenderType::Explicit => match &node.payload {
            Payload::SingleRpn(formula) => kernels::explicit::plot_explicit(graph, view, formula),
            _ => Err(PlotError::PayloadMismatch),
        },
        RenderType::Parametric => match &node.payload {
            Payload::DualRpn { x, y, t_min, t_max } => {
                kernels::parametric::plot_parametric(graph, view, x, y, *t_min, *t_max)
            }
            _ => Err(PlotError::PayloadMismatch),
        },
        RenderType::Implicit => match &node.payload {
            Payload::SingleRpn(formula) => kernels::implicit::plot_implicit(graph, view, formula),
            _ => Err(PlotError::PayloadMismatch),
        },
    }
}
