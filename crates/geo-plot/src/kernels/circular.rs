//! Circles and arcs: level-of-detail by on-screen pixel radius, then a
//! fixed-point rotation DDA walk around the surviving angular span(s).

use crate::{PointData, PointTag};
use geo_view::Viewport;

/// Below this pixel radius the circle is visually indistinguishable from a
/// point; the kernel contributes nothing rather than a degenerate blob.
const MIN_PIXEL_RADIUS: f64 = 0.5;
const FIXED_SHIFT: i64 = 16;

/// `None` means a full circle; `Some((start, end))` an arc spanning that
/// angular range (radians, CCW from the positive x-axis).
pub fn plot_circle(view: &Viewport, cx: f64, cy: f64, r: f64, arc: Option<(f64, f64)>) -> Vec<PointData> {
    if r <= 0.0 {
        return Vec::new();
    }
    let (wppx, wppy) = view.world_per_pixel();
    let r_pix = r / wppx.min(wppy).max(1e-300);
    if r_pix < MIN_PIXEL_RADIUS {
        return Vec::new();
    }

    let dt = r_pix.powf(-0.95);
    let mut cuts = vec![0.0, std::f64::consts::TAU];
    if let Some((a0, a1)) = arc {
        cuts.push(norm_angle(a0));
        cuts.push(norm_angle(a1));
    }
    for edge_angle in viewport_crossing_angles(view, cx, cy, r) {
        cuts.push(edge_angle);
    }
    cuts.sort_by(|a, b| a.partial_cmp(b).unwrap());
    cuts.dedup_by(|a, b| (*a - *b).abs() < 1e-12);

    let mut out = Vec::new();
    for pair in cuts.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        let mid = (start + end) / 2.0;
        if arc.is_some_and(|(a0, a1)| !angle_in_arc(mid, a0, a1)) {
            continue;
        }
        if !point_in_viewport(view, cx + r * mid.cos(), cy + r * mid.sin()) {
            continue;
        }
        emit_arc(view, cx, cy, r, start, end, dt, &mut out);
    }
    out
}

fn norm_angle(a: f64) -> f64 {
    use std::f64::consts::TAU;
    let mut a = a % TAU;
    if a < 0.0 {
        a += TAU;
    }
    a
}

fn angle_in_arc(a: f64, start: f64, end: f64) -> bool {
    let a = norm_angle(a);
    let start = norm_angle(start);
    let end = norm_angle(end);
    if start <= end { a >= start && a <= end } else { a >= start || a <= end }
}

fn point_in_viewport(view: &Viewport, x: f64, y: f64) -> bool {
    let (nx, ny) = view.world_to_clip(x, y);
    nx > i16::MIN && nx < i16::MAX && ny > i16::MIN && ny < i16::MAX
}

/// Angles at which the circle crosses the viewport's world-space edges,
/// found analytically (`acos((edge - c) / r)`) rather than by sampling.
fn viewport_crossing_angles(view: &Viewport, cx: f64, cy: f64, r: f64) -> Vec<f64> {
    let (min_x, max_y) = view.clip_to_world(-geo_view::CLIP_EXTENT, -geo_view::CLIP_EXTENT);
    let (max_x, min_y) = view.clip_to_world(geo_view::CLIP_EXTENT, geo_view::CLIP_EXTENT);
    let (x_min, x_max) = (min_x.min(max_x), min_x.max(max_x));
    let (y_min, y_max) = (min_y.min(max_y), min_y.max(max_y));

    let mut angles = Vec::new();
    for &xb in &[x_min, x_max] {
        let ratio = (xb - cx) / r;
        if (-1.0..=1.0).contains(&ratio) {
            let a = ratio.acos();
            angles.push(a);
            angles.push(-a);
        }
    }
    for &yb in &[y_min, y_max] {
        let ratio = (yb - cy) / r;
        if (-1.0..=1.0).contains(&ratio) {
            let a = ratio.asin();
            angles.push(a);
            angles.push(std::f64::consts::PI - a);
        }
    }
    angles.into_iter().map(norm_angle).collect()
}

/// Walk `[start, end]` via a per-step 16.16 fixed-point rotation matrix
/// applied to the initial radius vector, re-pinning the final point from
/// closed form so accumulated rotation drift never reaches the viewer.
fn emit_arc(view: &Viewport, cx: f64, cy: f64, r: f64, start: f64, end: f64, dt: f64, out: &mut Vec<PointData>) {
    let span = end - start;
    if span <= 0.0 {
        return;
    }
    let steps = ((span / dt).ceil() as usize).max(1);
    let step = span / steps as f64;
    let (sin_s, cos_s) = step.sin_cos();
    let fixed = |v: f64| (v * (1i64 << FIXED_SHIFT) as f64).round() as i64;
    let cos_fp = fixed(cos_s);
    let sin_fp = fixed(sin_s);

    let mut vx = fixed(r * start.cos());
    let mut vy = fixed(r * start.sin());
    out.push(PointData { tag: PointTag::MoveTo, ..clip_of(view, cx, cy, vx, vy) });
    for i in 1..=steps {
        let nvx = (vx * cos_fp - vy * sin_fp) >> FIXED_SHIFT;
        let nvy = (vx * sin_fp + vy * cos_fp) >> FIXED_SHIFT;
        vx = nvx;
        vy = nvy;
        if i == steps {
            let (x, y) = (cx + r * end.cos(), cy + r * end.sin());
            let (nx, ny) = view.world_to_clip(x, y);
            out.push(PointData { x: nx, y: ny, tag: PointTag::LineTo });
        } else {
            out.push(PointData { tag: PointTag::LineTo, ..clip_of(view, cx, cy, vx, vy) });
        }
    }
}

fn clip_of(view: &Viewport, cx: f64, cy: f64, fixed_x: i64, fixed_y: i64) -> PointData {
    let x = cx + (fixed_x as f64) / (1i64 << FIXED_SHIFT) as f64;
    let y = cy + (fixed_y as f64) / (1i64 << FIXED_SHIFT) as f64;
    let (nx, ny) = view.world_to_clip(x, y);
    PointData { x: nx, y: ny, tag: PointTag::MoveTo }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_circle_emits_points_at_the_radius() {
        let view = Viewport::new(400.0, 400.0);
        let points = plot_circle(&view, 0.0, 0.0, 1.0, None);
        assert!(!points.is_empty());
        for p in &points {
            let (wx, wy) = view.clip_to_world(p.x as f64, p.y as f64);
            let r = (wx * wx + wy * wy).sqrt();
            assert!((r - 1.0).abs() < 0.2, "point at radius {r}");
        }
    }

    #[test]
    fn tiny_pixel_radius_is_dropped() {
        let view = Viewport::new(400.0, 400.0);
        let points = plot_circle(&view, 0.0, 0.0, 1e-6, None);
        assert!(points.is_empty());
    }

    #[test]
    fn negative_radius_is_dropped() {
        let view = Viewport::new(400.0, 400.0);
        let points = plot_circle(&view, 0.0, 0.0, -1.0, None);
        assert!(points.is_empty());
    }

    #[test]
    fn arc_stays_within_its_angular_span() {
        let view = Viewport::new(400.0, 400.0);
        let points = plot_circle(&view, 0.0, 0.0, 1.0, Some((0.0, std::f64::consts::PI / 2.0)));
        assert!(!points.is_empty());
        for p in &points {
            let (wx, wy) = view.clip_to_world(p.x as f64, p.y as f64);
            assert!(wx >= -0.2 && wy >= -0.2, "point ({wx},{wy}) outside first-quadrant arc");
        }
    }
}
