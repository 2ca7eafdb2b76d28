//! Parametric `(x(t), y(t))` curves: a fixed-density skeleton sample grid for
//! the interactive path, or a recursive bounding-box subdivision for
//! industrial-precision mode where dropped detail at screen resolution would
//! be unacceptable.

use crate::{PlotError, PointData, bind_formula};
use geo_dag::{Formula, Graph};
use geo_eval::{Frame, eval_scalar};
use geo_view::Viewport;

const MAX_TESSELLATION_POINTS: usize = 2048;
/// Skeleton points per unit of the parameter range.
const SKELETON_DENSITY: f64 = 20.0;
/// Recursive subdivision stops once a branch's screen-space width drops
/// below this many clip-pixels.
const SUBDIVISION_PIXEL_WIDTH: f64 = 0.5;
const MAX_SUBDIVISION_DEPTH: u32 = 24;

pub fn plot_parametric(
    graph: &Graph,
    view: &Viewport,
    x_formula: &Formula,
    y_formula: &Formula,
    t_min: f64,
    t_max: f64,
) -> Result<Vec<PointData>, PlotError> {
    if !(t_max > t_min) {
        return Ok(Vec::new());
    }
    let x_bytecode = bind_formula(graph, x_formula)?;
    let y_bytecode = bind_formula(graph, y_formula)?;
    let samples = (((t_max - t_min) * SKELETON_DENSITY).ceil() as usize).max(1);
    let step = (t_max - t_min) / samples as f64;
    let (screen_width, _) = view.screen_size();
    let pixel = 2.0 * geo_view::CLIP_EXTENT / screen_width.max(1.0);

    let mut clip_points: Vec<Option<(f64, f64)>> = Vec::with_capacity(samples + 1);
    for i in 0..=samples {
        let t = t_min + step * i as f64;
        let frame = Frame { x: 0.0, y: 0.0, t };
        match (eval_scalar(&x_bytecode, frame), eval_scalar(&y_bytecode, frame)) {
            (Ok(x), Ok(y)) if x.is_finite() && y.is_finite() => clip_points.push(Some((x, y))),
            _ => clip_points.push(None),
        }
    }

    let mut out = Vec::new();
    let mut chain_open = false;
    for pair in clip_points.windows(2) {
        let (Some(a), Some(b)) = (pair[0], pair[1]) else {
            chain_open = false;
            continue;
        };
        let ca = view.world_to_clip(a.0, a.1);
        let cb = view.world_to_clip(b.0, b.1);
        if !chain_open {
            out.push(PointData::move_to(ca));
            chain_open = true;
        }
        tessellate_segment(ca, cb, pixel, &mut out);
    }
    Ok(out)
}

/// Linearly subdivide `(a, b)` in clip space so consecutive vertices are at
/// most one screen pixel apart (`pixel` clip-units per pixel).
fn tessellate_segment(a: (i16, i16), b: (i16, i16), pixel: f64, out: &mut Vec<PointData>) {
    let dx = (b.0 as f64 - a.0 as f64).abs();
    let dy = (b.1 as f64 - a.1 as f64).abs();
    let len = dx.max(dy);
    let steps = (((len / pixel).ceil() as usize).max(1)).min(MAX_TESSELLATION_POINTS);
    for s in 1..=steps {
        let t = s as f64 / steps as f64;
        let x = a.0 as f64 + (b.0 as f64 - a.0 as f64) * t;
        let y = a.1 as f64 + (b.1 as f64 - a.1 as f64) * t;
        out.push(PointData::line_to((x.round() as i16, y.round() as i16)));
    }
}

/// A world-space axis-aligned box, used by [`subdivide`] to bound a t-range's
/// image before deciding whether it is safe to reject.
#[derive(Debug, Clone, Copy)]
struct BBox {
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
}

impl BBox {
    fn of(points: &[(f64, f64)]) -> Option<Self> {
        let mut it = points.iter();
        let first = *it.next()?;
        let mut b = BBox { x_min: first.0, x_max: first.0, y_min: first.1, y_max: first.1 };
        for &(x, y) in it {
            b.x_min = b.x_min.min(x);
            b.x_max = b.x_max.max(x);
            b.y_min = b.y_min.min(y);
            b.y_max = b.y_max.max(y);
        }
        Some(b)
    }

    fn outside(&self, viewport_world: &BBox) -> bool {
        self.x_max < viewport_world.x_min
            || self.x_min > viewport_world.x_max
            || self.y_max < viewport_world.y_min
            || self.y_min > viewport_world.y_max
    }

    fn pixel_width(&self, view: &Viewport) -> f64 {
        let (wppx, wppy) = view.world_per_pixel();
        ((self.x_max - self.x_min) / wppx.max(1e-300))
            .max((self.y_max - self.y_min) / wppy.max(1e-300))
    }
}

/// Industrial-precision mode: recursively bisect `[t_min, t_max]`, rejecting
/// branches whose bounding box falls entirely outside the viewport, and
/// emitting each surviving leaf's bounding-box outline once its pixel width
/// drops below [`SUBDIVISION_PIXEL_WIDTH`] rather than trusting a single
/// skeleton sample to represent it.
pub fn plot_parametric_precise(
    graph: &Graph,
    view: &Viewport,
    x_formula: &Formula,
    y_formula: &Formula,
    t_min: f64,
    t_max: f64,
) -> Result<Vec<PointData>, PlotError> {
    if !(t_max > t_min) {
        return Ok(Vec::new());
    }
    let x_bytecode = bind_formula(graph, x_formula)?;
    let y_bytecode = bind_formula(graph, y_formula)?;
    let (min_x, max_y) = view.clip_to_world(-geo_view::CLIP_EXTENT, -geo_view::CLIP_EXTENT);
    let (max_x, min_y) = view.clip_to_world(geo_view::CLIP_EXTENT, geo_view::CLIP_EXTENT);
    let viewport_world = BBox {
        x_min: min_x.min(max_x),
        x_max: min_x.max(max_x),
        y_min: min_y.min(max_y),
        y_max: min_y.max(max_y),
    };

    let mut out = Vec::new();
    subdivide(&x_bytecode, &y_bytecode, t_min, t_max, &viewport_world, view, 0, &mut out);
    Ok(out)
}

fn subdivide(
    x_bytecode: &[geo_compiler::RpnToken],
    y_bytecode: &[geo_compiler::RpnToken],
    t_min: f64,
    t_max: f64,
    viewport_world: &BBox,
    view: &Viewport,
    depth: u32,
    out: &mut Vec<PointData>,
) {
    let samples: Vec<(f64, f64)> = [t_min, (t_min + t_max) / 2.0, t_max]
        .into_iter()
        .filter_map(|t| {
            let frame = Frame { x: 0.0, y: 0.0, t };
            match (eval_scalar(x_bytecode, frame), eval_scalar(y_bytecode, frame)) {
                (Ok(x), Ok(y)) if x.is_finite() && y.is_finite() => Some((x, y)),
                _ => None,
            }
        })
        .collect();
    let Some(bbox) = BBox::of(&samples) else { return };
    if bbox.outside(viewport_world) {
        return;
    }
    if depth >= MAX_SUBDIVISION_DEPTH || bbox.pixel_width(view) < SUBDIVISION_PIXEL_WIDTH {
        let corners = [
            (bbox.x_min, bbox.y_min),
            (bbox.x_max, bbox.y_min),
            (bbox.x_max, bbox.y_max),
            (bbox.x_min, bbox.y_max),
            (bbox.x_min, bbox.y_min),
        ];
        out.push(PointData::move_to(view.world_to_clip(corners[0].0, corners[0].1)));
        for &(x, y) in &corners[1..] {
            out.push(PointData::line_to(view.world_to_clip(x, y)));
        }
        return;
    }
    let mid = (t_min + t_max) / 2.0;
    subdivide(x_bytecode, y_bytecode, t_min, mid, viewport_world, view, depth + 1, out);
    subdivide(x_bytecode, y_bytecode, mid, t_max, viewport_world, view, depth + 1, out);
}
