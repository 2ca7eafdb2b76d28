//! Explicit `y = f(x)` curves: one sample per horizontal pixel, clipped and
//! tessellated into a single polyline broken wherever a sample escapes the
//! function's domain.

use crate::{PlotError, PointData, bind_formula};
use crate::kernels::linear::liang_barsky;
use geo_dag::{Formula, Graph};
use geo_eval::{Frame, eval_scalar};
use geo_view::Viewport;

/// Segments whose clip-space length exceeds a pixel are tessellated, but
/// never into more than this many sub-points — a single near-vertical
/// branch (e.g. near an asymptote) would otherwise emit an unbounded run.
const MAX_TESSELLATION_POINTS: usize = 2048;

pub fn plot_explicit(
    graph: &Graph,
    view: &Viewport,
    formula: &Formula,
) -> Result<Vec<PointData>, PlotError> {
    let bytecode = bind_formula(graph, formula)?;
    let (screen_width, _) = view.screen_size();
    let samples = (screen_width.ceil() as usize).max(1);
    let pixel = 2.0 * geo_view::CLIP_EXTENT / screen_width.max(1.0);

    let (min_x, min_y) = view.clip_to_world(-geo_view::CLIP_EXTENT * 1.1, -geo_view::CLIP_EXTENT * 1.1);
    let (max_x, max_y) = view.clip_to_world(geo_view::CLIP_EXTENT * 1.1, geo_view::CLIP_EXTENT * 1.1);
    let (x_min, x_max) = if min_x <= max_x { (min_x, max_x) } else { (max_x, min_x) };
    let box_ = (x_min, min_y.min(max_y), x_max, min_y.max(max_y));
    if !(x_max > x_min) {
        return Ok(Vec::new());
    }
    let step = (x_max - x_min) / samples as f64;

    let mut clip_points: Vec<Option<(f64, f64)>> = Vec::with_capacity(samples + 1);
    for i in 0..=samples {
        let x = x_min + step * i as f64;
        match eval_scalar(&bytecode, Frame { x, y: 0.0, t: 0.0 }) {
            Ok(y) if y.is_finite() => clip_points.push(Some((x, y))),
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
        let Some((t_lo, t_hi)) = liang_barsky(a, b, box_, 0.0, 1.0) else {
            chain_open = false;
            continue;
        };
        let dx = b.0 - a.0;
        let dy = b.1 - a.1;
        let clipped_a = (a.0 + dx * t_lo, a.1 + dy * t_lo);
        let clipped_b = (a.0 + dx * t_hi, a.1 + dy * t_hi);
        let ca = view.world_to_clip(clipped_a.0, clipped_a.1);
        let cb = view.world_to_clip(clipped_b.0, clipped_b.1);
        if !chain_open {
            out.push(PointData::move_to(ca));
            chain_open = true;
        }
        tessellate_segment(ca, cb, pixel, &mut out);
    }
    Ok(out)
}

/// Linearly subdivide `(a, b)` in clip space so consecutive vertices are at
/// most one screen pixel apart (`pixel` clip-units per pixel), appending
/// `b`'s tessellated chain to `out`.
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

#[cfg(test)]
mod tests {
    use super::*;
    use geo_compiler::compile;
    use geo_dag::Graph;

    fn formula_of(src: &str) -> Formula {
        let c = compile(src).unwrap();
        Formula { bytecode: c.bytecode, bindings: c.bindings }
    }

    #[test]
    fn flat_line_produces_single_open_chain() {
        let graph = Graph::new();
        let view = Viewport::new(100.0, 100.0);
        let f = formula_of("0");
        let points = plot_explicit(&graph, &view, &f).unwrap();
        assert!(!points.is_empty());
        assert_eq!(points[0].tag, crate::PointTag::MoveTo);
        assert!(points.iter().skip(1).all(|p| p.tag == crate::PointTag::LineTo));
    }

    #[test]
    fn domain_break_splits_the_chain() {
        let graph = Graph::new();
        let view = Viewport::new(200.0, 200.0);
        // 1/x breaks at x == 0, which the sample grid straddles.
        let f = formula_of("1/x");
        let points = plot_explicit(&graph, &view, &f).unwrap();
        let move_to_count = points.iter().filter(|p| p.tag == crate::PointTag::MoveTo).count();
        assert!(move_to_count >= 1);
    }
}
