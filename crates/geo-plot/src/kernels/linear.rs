//! Lines, segments, and rays: world-space Liang–Barsky clipping against a
//! margin-extended viewport box, then fixed-point tessellation of the
//! clipped chord so no two consecutive vertices are more than half a
//! clip-pixel apart.

use crate::{PlotError, PointData};
use geo_dag::{Graph, NodeId, NodeResult};
use geo_view::Viewport;

const CLIP_MARGIN: f64 = 1.05;
const MAX_TESSELLATION_POINTS: usize = 16384;
/// 16.16 fixed-point scale used for the per-step tessellation walk.
const FIXED_SHIFT: i64 = 16;

fn point_of(graph: &Graph, id: NodeId) -> Result<(f64, f64), PlotError> {
    match graph.get(id).map(|n| n.result) {
        Some(NodeResult::Point { x, y }) => Ok((x, y)),
        _ => Err(PlotError::Unsolved),
    }
}

/// Clip `[p1, p1 + (p2-p1)*t]` for `t` in `[t_lo, t_hi]` against an
/// axis-aligned box via the standard four-plane Liang–Barsky reduction.
/// Returns the surviving `(t_lo, t_hi)` sub-range, or `None` if the chord
/// misses the box entirely.
pub(crate) fn liang_barsky(p1: (f64, f64), p2: (f64, f64), box_: (f64, f64, f64, f64), mut t_lo: f64, mut t_hi: f64) -> Option<(f64, f64)> {
    let (x_min, y_min, x_max, y_max) = box_;
    let dx = p2.0 - p1.0;
    let dy = p2.1 - p1.1;
    let checks = [
        (-dx, p1.0 - x_min),
        (dx, x_max - p1.0),
        (-dy, p1.1 - y_min),
        (dy, y_max - p1.1),
    ];
    for (p, q) in checks {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t_hi {
                return None;
            }
            if r > t_lo {
                t_lo = r;
            }
        } else {
            if r < t_lo {
                return None;
            }
            if r < t_hi {
                t_hi = r;
            }
        }
    }
    if t_lo > t_hi { None } else { Some((t_lo, t_hi)) }
}

pub fn plot_line(
    graph: &Graph,
    view: &Viewport,
    p1_id: NodeId,
    p2_id: NodeId,
    is_infinite: bool,
) -> Result<Vec<PointData>, PlotError> {
    let p1 = point_of(graph, p1_id)?;
    let p2 = point_of(graph, p2_id)?;
    let kind = if is_infinite { LineKind::Infinite } else { LineKind::Segment };
    plot_line_kind(view, p1, p2, kind)
}

pub enum LineKind {
    Segment,
    Ray,
    Infinite,
}

pub fn plot_line_kind(
    view: &Viewport,
    p1: (f64, f64),
    p2: (f64, f64),
    kind: LineKind,
) -> Result<Vec<PointData>, PlotError> {
    let (t_lo, t_hi) = match kind {
        LineKind::Segment => (0.0, 1.0),
        LineKind::Ray => (0.0, f64::INFINITY),
        LineKind::Infinite => (f64::NEG_INFINITY, f64::INFINITY),
    };
    let (min_x, max_y) = view.clip_to_world(-geo_view::CLIP_EXTENT * CLIP_MARGIN, -geo_view::CLIP_EXTENT * CLIP_MARGIN);
    let (max_x, min_y) = view.clip_to_world(geo_view::CLIP_EXTENT * CLIP_MARGIN, geo_view::CLIP_EXTENT * CLIP_MARGIN);
    let box_ = (min_x.min(max_x), min_y.min(max_y), min_x.max(max_x), min_y.max(max_y));

    let Some((clip_lo, clip_hi)) = liang_barsky(p1, p2, box_, t_lo, t_hi) else {
        return Ok(Vec::new());
    };
    let dx = p2.0 - p1.0;
    let dy = p2.1 - p1.1;
    let a = (p1.0 + dx * clip_lo, p1.1 + dy * clip_lo);
    let b = (p1.0 + dx * clip_hi, p1.1 + dy * clip_hi);

    let ca = view.world_to_clip(a.0, a.1);
    let cb = view.world_to_clip(b.0, b.1);
    Ok(tessellate(ca, cb))
}

/// Fixed-point (16.16) walk from `a` to `b` so consecutive vertices are at
/// most half a clip-pixel apart along the longer axis, capped at
/// [`MAX_TESSELLATION_POINTS`].
fn tessellate(a: (i16, i16), b: (i16, i16)) -> Vec<PointData> {
    let dx = (b.0 as i64 - a.0 as i64).abs();
    let dy = (b.1 as i64 - a.1 as i64).abs();
    let span = dx.max(dy);
    let steps = ((span * 2).max(1) as usize).min(MAX_TESSELLATION_POINTS);

    let ax = (a.0 as i64) << FIXED_SHIFT;
    let ay = (a.1 as i64) << FIXED_SHIFT;
    let step_x = ((b.0 as i64 - a.0 as i64) << FIXED_SHIFT) / steps as i64;
    let step_y = ((b.1 as i64 - a.1 as i64) << FIXED_SHIFT) / steps as i64;

    let mut out = Vec::with_capacity(steps + 1);
    out.push(PointData::move_to((a.0, a.1)));
    let mut x = ax;
    let mut y = ay;
    for _ in 0..steps {
        x += step_x;
        y += step_y;
        out.push(PointData::line_to(((x >> FIXED_SHIFT) as i16, (y >> FIXED_SHIFT) as i16)));
    }
    // Re-pin the final vertex from closed form to cancel accumulated
    // fixed-point drift over a long chord.
    if let Some(last) = out.last_mut() {
        last.x = b.0;
        last.y = b.1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_fully_inside_viewport_keeps_both_endpoints() {
        let view = Viewport::new(400.0, 400.0);
        let points = plot_line_kind(&view, (-1.0, 0.0), (1.0, 0.0), LineKind::Segment).unwrap();
        assert_eq!(points.first().unwrap().tag, crate::PointTag::MoveTo);
        let first = view.clip_to_world(points.first().unwrap().x as f64, points.first().unwrap().y as f64);
        let last = view.clip_to_world(points.last().unwrap().x as f64, points.last().unwrap().y as f64);
        assert!((first.0 - (-1.0)).abs() < 0.1);
        assert!((last.0 - 1.0).abs() < 0.1);
    }

    #[test]
    fn segment_entirely_outside_viewport_is_empty() {
        let view = Viewport::new(400.0, 400.0);
        let points = plot_line_kind(&view, (1000.0, 1000.0), (1001.0, 1001.0), LineKind::Segment).unwrap();
        assert!(points.is_empty());
    }

    #[test]
    fn infinite_line_clips_to_the_viewport_box() {
        let view = Viewport::new(400.0, 400.0);
        let points = plot_line_kind(&view, (0.0, 0.0), (1.0, 0.0), LineKind::Infinite).unwrap();
        assert!(!points.is_empty());
    }

    #[test]
    fn ray_only_extends_forward() {
        let view = Viewport::new(400.0, 400.0);
        let points = plot_line_kind(&view, (0.0, 0.0), (1.0, 0.0), LineKind::Ray).unwrap();
        let first = view.clip_to_world(points.first().unwrap().x as f64, points.first().unwrap().y as f64);
        assert!(first.0 >= -0.2, "ray should not extend behind its origin");
    }
}
