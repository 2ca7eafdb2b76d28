//! The viewport: world-to-clip coordinate mapping, pan, and zoom.
//!
//! Every plot kernel in `geo-plot` rounds its samples to clip space through
//! [`Viewport::world_to_clip`] so a curve sampled by one kernel and a point
//! dropped by another always land on the same pixel grid. The mapping itself
//! is two multiply-subtracts (`nx = (wx - cx)*sx`, `ny = -(wy - cy)*sy`)
//! followed by a round to `i16`; everything else on this type exists to keep
//! `sx`/`sy`/`world_origin` current as the screen resizes or the user pans
//! and zooms.

use tracing::trace;

/// Half the `i16` range, the fixed-point clip bound every kernel samples
/// into (`[-CLIP_EXTENT, CLIP_EXTENT]`).
pub const CLIP_EXTENT: f64 = 32767.0;

/// World units visible per screen pixel at `zoom == 1.0`, chosen so `zoom`
/// stays a human-legible "100% = one world unit per logical pixel" knob.
const BASE_WORLD_PER_PIXEL: f64 = 1.0 / 40.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    screen_width: f64,
    screen_height: f64,
    /// Pan offset in world units, added to the screen-centre world point to
    /// get `world_origin`.
    offset_x: f64,
    offset_y: f64,
    zoom: f64,
    /// World coordinate currently at the centre of the screen.
    world_origin: (f64, f64),
    /// World units per pixel along each axis at the current zoom.
    wppx: f64,
    wppy: f64,
    /// Cached clip-space scale factors: `nx = (wx - cx) * sx`.
    sx: f64,
    sy: f64,
}

impl Viewport {
    pub fn new(screen_width: f64, screen_height: f64) -> Self {
        let mut v = Self {
            screen_width,
            screen_height,
            offset_x: 0.0,
            offset_y: 0.0,
            zoom: 1.0,
            world_origin: (0.0, 0.0),
            wppx: BASE_WORLD_PER_PIXEL,
            wppy: BASE_WORLD_PER_PIXEL,
            sx: 0.0,
            sy: 0.0,
        };
        v.recompute();
        v
    }

    pub fn screen_size(&self) -> (f64, f64) {
        (self.screen_width, self.screen_height)
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn world_origin(&self) -> (f64, f64) {
        self.world_origin
    }

    pub fn world_per_pixel(&self) -> (f64, f64) {
        (self.wppx, self.wppy)
    }

    /// Recompute `wppx`/`wppy`, `world_origin`, and the cached `sx`/`sy` scale
    /// factors from `zoom`/`offset_*`/screen dimensions. Called after every
    /// mutation so no derived field can go stale.
    fn recompute(&mut self) {
        self.wppx = BASE_WORLD_PER_PIXEL / self.zoom;
        self.wppy = BASE_WORLD_PER_PIXEL / self.zoom;
        self.world_origin = (self.offset_x, self.offset_y);
        let half_width_world = (self.screen_width / 2.0) * self.wppx;
        let half_height_world = (self.screen_height / 2.0) * self.wppy;
        self.sx = if half_width_world > 0.0 {
            CLIP_EXTENT / half_width_world
        } else {
            0.0
        };
        self.sy = if half_height_world > 0.0 {
            CLIP_EXTENT / half_height_world
        } else {
            0.0
        };
    }

    /// Set pan offset and zoom directly, as a single absolute assignment
    /// rather than a relative pan/zoom_about step — used when a caller
    /// already holds the intended view state (e.g. restoring a saved
    /// viewport) instead of an incremental gesture delta.
    pub fn set_view(&mut self, offset_x: f64, offset_y: f64, zoom: f64) {
        self.offset_x = offset_x;
        self.offset_y = offset_y;
        self.zoom = zoom.clamp(1e-6, 1e9);
        self.recompute();
        trace!(target: "view.viewport", offset_x, offset_y, zoom = self.zoom, "set_view");
    }

    pub fn resize(&mut self, screen_width: f64, screen_height: f64) {
        self.screen_width = screen_width;
        self.screen_height = screen_height;
        self.recompute();
        trace!(target: "view.viewport", screen_width, screen_height, "resize");
    }

    /// Pan by a world-space delta (e.g. a mouse drag already converted via
    /// [`Viewport::clip_to_world`]).
    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.offset_x += dx;
        self.offset_y += dy;
        self.recompute();
        trace!(target: "view.viewport", dx, dy, "pan");
    }

    /// Zoom by `factor` (>1 zooms in) about a fixed world-space anchor point,
    /// so the anchor stays under the cursor rather than the screen centre
    /// drifting.
    pub fn zoom_about(&mut self, factor: f64, anchor_x: f64, anchor_y: f64) {
        if factor <= 0.0 {
            return;
        }
        let new_zoom = (self.zoom * factor).clamp(1e-6, 1e9);
        let applied = new_zoom / self.zoom;
        self.offset_x = anchor_x + (self.offset_x - anchor_x) / applied;
        self.offset_y = anchor_y + (self.offset_y - anchor_y) / applied;
        self.zoom = new_zoom;
        self.recompute();
        trace!(target: "view.viewport", zoom = self.zoom, "zoom_about");
    }

    /// The sole place any kernel rounds to the `i16` clip-space grid, so two
    /// kernels sampling the same world point always land on the same pixel.
    pub fn world_to_clip(&self, wx: f64, wy: f64) -> (i16, i16) {
        let (cx, cy) = self.world_origin;
        let nx = (wx - cx) * self.sx;
        let ny = -(wy - cy) * self.sy;
        (clamp_to_i16(nx), clamp_to_i16(ny))
    }

    /// Inverse of [`Viewport::world_to_clip`], used to convert a pointer
    /// position (already in clip space) back to world space for hit-testing
    /// and pan/zoom anchors.
    pub fn clip_to_world(&self, nx: f64, ny: f64) -> (f64, f64) {
        let (cx, cy) = self.world_origin;
        let wx = if self.sx != 0.0 { nx / self.sx + cx } else { cx };
        let wy = if self.sy != 0.0 { -ny / self.sy + cy } else { cy };
        (wx, wy)
    }

    /// The extended clip-space box every plot kernel clips against before
    /// tessellating, per the margin each kernel specifies (1.1 for explicit
    /// curves, 1.05 for lines).
    pub fn clip_margin_box(&self, margin: f64) -> (f64, f64, f64, f64) {
        let extent = CLIP_EXTENT * margin;
        (-extent, -extent, extent, extent)
    }
}

fn clamp_to_i16(v: f64) -> i16 {
    if v.is_nan() {
        0
    } else {
        v.clamp(i16::MIN as f64, i16::MAX as f64) as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_origin_maps_to_clip_zero() {
        let v = Viewport::new(800.0, 600.0);
        assert_eq!(v.world_to_clip(0.0, 0.0), (0, 0));
    }

    #[test]
    fn y_axis_is_flipped() {
        let v = Viewport::new(800.0, 600.0);
        let (_, ny_up) = v.world_to_clip(0.0, 1.0);
        let (_, ny_down) = v.world_to_clip(0.0, -1.0);
        assert!(ny_up < 0);
        assert!(ny_down > 0);
    }

    #[test]
    fn pan_shifts_world_origin() {
        let mut v = Viewport::new(800.0, 600.0);
        v.pan(5.0, -3.0);
        assert_eq!(v.world_origin(), (5.0, -3.0));
    }

    #[test]
    fn zoom_in_shrinks_world_per_pixel() {
        let mut v = Viewport::new(800.0, 600.0);
        let (wppx0, _) = v.world_per_pixel();
        v.zoom_about(2.0, 0.0, 0.0);
        let (wppx1, _) = v.world_per_pixel();
        assert!(wppx1 < wppx0);
    }

    #[test]
    fn zoom_about_anchor_keeps_anchor_fixed_in_clip_space() {
        let mut v = Viewport::new(800.0, 600.0);
        let anchor = (3.0, 2.0);
        let before = v.world_to_clip(anchor.0, anchor.1);
        v.zoom_about(1.5, anchor.0, anchor.1);
        let after = v.world_to_clip(anchor.0, anchor.1);
        assert_eq!(before, after);
    }

    #[test]
    fn clip_to_world_is_inverse_of_world_to_clip() {
        let v = Viewport::new(800.0, 600.0);
        let (nx, ny) = v.world_to_clip(2.5, -1.25);
        let (wx, wy) = v.clip_to_world(nx as f64, ny as f64);
        assert!((wx - 2.5).abs() < 1e-2);
        assert!((wy - (-1.25)).abs() < 1e-2);
    }

    #[test]
    fn clip_coordinates_never_exceed_i16_range() {
        let v = Viewport::new(800.0, 600.0);
        let (nx, ny) = v.world_to_clip(1e12, 1e12);
        assert_eq!(nx, i16::MAX);
        assert_eq!(ny, i16::MIN);
    }

    #[test]
    fn set_view_assigns_absolute_offset_and_zoom() {
        let mut v = Viewport::new(800.0, 600.0);
        v.pan(10.0, 10.0);
        v.set_view(2.0, -1.0, 3.0);
        assert_eq!(v.world_origin(), (2.0, -1.0));
        assert_eq!(v.zoom(), 3.0);
    }

    #[test]
    fn resize_rescales_without_moving_world_origin() {
        let mut v = Viewport::new(800.0, 600.0);
        v.pan(1.0, 1.0);
        v.resize(1600.0, 1200.0);
        assert_eq!(v.world_origin(), (1.0, 1.0));
    }
}
