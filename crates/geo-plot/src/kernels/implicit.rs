//! Implicit `f(x, y) = 0` curves — the hardest kernel.
//!
//! Two passes: a serial quadtree prune over the viewport using interval
//! arithmetic to discard boxes that provably can't contain a root, then a
//! parallel marching-squares rasterisation of the surviving leaves on a
//! `rayon` work-stealing pool. Each worker gets its own leaf and row caches,
//! so no leaf's rasterisation touches another's state.

use crate::{PlotError, PointData, bind_formula};
use geo_dag::{Formula, Graph};
use geo_eval::{Frame, eval_interval, eval_scalar};
use geo_interval::Interval;
use geo_view::Viewport;
use rayon::prelude::*;

/// Quadtree subdivision stops once a tile is within this many pixels on
/// either side, handed to the rasteriser as a leaf.
const MIN_LEAF_PIXELS: f64 = 10.0;
/// Depth backstop so a pathological viewport/zoom combination can't recurse
/// forever; reaching it emits the tile as a leaf early rather than looping.
const MAX_QUADTREE_DEPTH: u32 = 24;

#[derive(Debug, Clone, Copy)]
struct Tile {
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
}

pub fn plot_implicit(
    graph: &Graph,
    view: &Viewport,
    formula: &Formula,
) -> Result<Vec<PointData>, PlotError> {
    let bytecode = bind_formula(graph, formula)?;
    let (min_x, max_y) = view.clip_to_world(-geo_view::CLIP_EXTENT, -geo_view::CLIP_EXTENT);
    let (max_x, min_y) = view.clip_to_world(geo_view::CLIP_EXTENT, geo_view::CLIP_EXTENT);
    let root = Tile {
        x_min: min_x.min(max_x),
        x_max: min_x.max(max_x),
        y_min: min_y.min(max_y),
        y_max: min_y.max(max_y),
    };

    let mut leaves = Vec::new();
    quadtree(&bytecode, view, root, MAX_QUADTREE_DEPTH, &mut leaves);

    let points: Vec<PointData> = leaves
        .par_iter()
        .flat_map(|leaf| rasterize_leaf(&bytecode, view, *leaf))
        .collect();
    Ok(points)
}

fn quadtree(bytecode: &[geo_compiler::RpnToken], view: &Viewport, tile: Tile, depth: u32, leaves: &mut Vec<Tile>) {
    let (wppx, wppy) = view.world_per_pixel();
    let frame = Frame {
        x: Interval::new(tile.x_min, tile.x_max),
        y: Interval::new(tile.y_min, tile.y_max),
        t: Interval::point(0.0),
    };
    let keep = match eval_interval(bytecode, frame) {
        Ok(i) => i.contains_zero(),
        Err(_) => true,
    };
    if !keep {
        return;
    }
    let pixel_w = (tile.x_max - tile.x_min) / wppx.max(1e-300);
    let pixel_h = (tile.y_max - tile.y_min) / wppy.max(1e-300);
    if depth == 0 || pixel_w.max(pixel_h) <= MIN_LEAF_PIXELS {
        leaves.push(tile);
        return;
    }
    let mx = (tile.x_min + tile.x_max) / 2.0;
    let my = (tile.y_min + tile.y_max) / 2.0;
    let children = [
        Tile { x_min: tile.x_min, x_max: mx, y_min: tile.y_min, y_max: my },
        Tile { x_min: mx, x_max: tile.x_max, y_min: tile.y_min, y_max: my },
        Tile { x_min: tile.x_min, x_max: mx, y_min: my, y_max: tile.y_max },
        Tile { x_min: mx, x_max: tile.x_max, y_min: my, y_max: tile.y_max },
    ];
    for child in children {
        quadtree(bytecode, view, child, depth - 1, leaves);
    }
}

fn sample(bytecode: &[geo_compiler::RpnToken], x: f64, y: f64) -> f64 {
    eval_scalar(bytecode, Frame { x, y, t: 0.0 }).unwrap_or(f64::NAN)
}

fn crosses(a: f64, b: f64) -> bool {
    a.is_finite() && b.is_finite() && a.signum() != b.signum() && a != 0.0 && b != 0.0
}

/// Walk `leaf`'s enclosed pixels row by row, swapping two row caches (top,
/// bottom) between rows so `f` is never resampled for a shared row. Each
/// 2x2 subcell is checked via the top-left/top-right/bottom-left triangle
/// the source kernel uses: if all three signs agree the subcell is skipped,
/// otherwise each crossed edge of that triangle contributes one
/// linearly-interpolated zero-crossing point.
fn rasterize_leaf(bytecode: &[geo_compiler::RpnToken], view: &Viewport, leaf: Tile) -> Vec<PointData> {
    let (wppx, wppy) = view.world_per_pixel();
    let cols = (((leaf.x_max - leaf.x_min) / wppx).ceil() as usize).max(1);
    let rows = (((leaf.y_max - leaf.y_min) / wppy).ceil() as usize).max(1);

    let col_x = |c: usize| leaf.x_min + c as f64 * wppx;
    let mut top: Vec<f64> = (0..=cols).map(|c| sample(bytecode, col_x(c), leaf.y_max)).collect();

    let mut out = Vec::new();
    for r in 0..rows {
        let y_top = leaf.y_max - r as f64 * wppy;
        let y_bottom = leaf.y_max - (r + 1) as f64 * wppy;
        let bottom: Vec<f64> = (0..=cols).map(|c| sample(bytecode, col_x(c), y_bottom)).collect();

        for c in 0..cols {
            let tl = top[c];
            let tr = top[c + 1];
            let bl = bottom[c];
            if tl.is_finite() && tr.is_finite() && bl.is_finite() {
                let same_sign = tl.signum() == tr.signum() && tl.signum() == bl.signum();
                if same_sign {
                    continue;
                }
            }
            let x_l = col_x(c);
            let x_r = col_x(c + 1);
            if crosses(tl, tr) {
                let t = tl / (tl - tr);
                out.push(PointData::move_to(view.world_to_clip(x_l + (x_r - x_l) * t, y_top)));
            }
            if crosses(tl, bl) {
                let t = tl / (tl - bl);
                out.push(PointData::move_to(view.world_to_clip(x_l, y_top + (y_bottom - y_top) * t)));
            }
            if crosses(tr, bl) {
                let t = tr / (tr - bl);
                let x = x_r + (x_l - x_r) * t;
                let y = y_top + (y_bottom - y_top) * t;
                out.push(PointData::move_to(view.world_to_clip(x, y)));
            }
        }
        top = bottom;
    }
    out
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
    fn unit_circle_produces_points_near_radius_one() {
        let graph = Graph::new();
        let view = Viewport::new(200.0, 200.0);
        let f = formula_of("x^2+y^2-1");
        let points = plot_implicit(&graph, &view, &f).unwrap();
        assert!(!points.is_empty());
        for p in &points {
            let (wx, wy) = view.clip_to_world(p.x as f64, p.y as f64);
            let r = (wx * wx + wy * wy).sqrt();
            assert!((r - 1.0).abs() < 0.5, "point at radius {r}");
        }
    }

    #[test]
    fn curve_entirely_outside_viewport_yields_nothing() {
        let graph = Graph::new();
        let view = Viewport::new(200.0, 200.0);
        // circle of radius 1000, far outside the default small viewport.
        let f = formula_of("x^2+y^2-1000000");
        let points = plot_implicit(&graph, &view, &f).unwrap();
        assert!(points.is_empty());
    }
}
