// SPDX-License-Identifier: CEPL-1.0

//! Where the window looks in the complex plane.

use mandel_render::{FractalRect, RenderSize};

/// Visible height shrinks by this factor per zoom step.
pub const ZOOM_FACTOR: f64 = 0.8;
/// Visible height at zoom level 0.
pub const BASE_HEIGHT: f64 = 4.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct View {
    pub center: (f64, f64),
    pub zoom: i32,
}

impl Default for View {
    fn default() -> Self {
        View {
            center: (-0.5, 0.0),
            zoom: 0,
        }
    }
}

/// Visible rectangle in double precision; converted to `f32` only at draw time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaneRect {
    pub top: f64,
    pub left: f64,
    pub right: f64,
    pub bottom: f64,
}

impl From<PlaneRect> for FractalRect {
    fn from(r: PlaneRect) -> Self {
        FractalRect {
            top: r.top as f32,
            left: r.left as f32,
            right: r.right as f32,
            bottom: r.bottom as f32,
        }
    }
}

fn dims(size: RenderSize) -> (f64, f64) {
    (size.width.max(1) as f64, size.height.max(1) as f64)
}

impl View {
    pub fn height(&self) -> f64 {
        BASE_HEIGHT * ZOOM_FACTOR.powi(self.zoom)
    }

    /// Width follows the surface aspect ratio; `top` is the larger imaginary part.
    pub fn rect(&self, size: RenderSize) -> PlaneRect {
        let (w, h) = dims(size);
        let height = self.height();
        let width = height * w / h;
        let (cx, cy) = self.center;
        PlaneRect {
            top: cy + height / 2.0,
            left: cx - width / 2.0,
            right: cx + width / 2.0,
            bottom: cy - height / 2.0,
        }
    }

    pub fn pixel_to_plane(&self, size: RenderSize, x: f64, y: f64) -> (f64, f64) {
        let (w, h) = dims(size);
        let r = self.rect(size);
        (
            r.left + (r.right - r.left) * x / w,
            r.top + (r.bottom - r.top) * y / h,
        )
    }

    /// Shifts the view so content follows a drag of `(dx, dy)` pixels.
    pub fn pan_pixels(&mut self, size: RenderSize, dx: f64, dy: f64) {
        let (w, h) = dims(size);
        let r = self.rect(size);
        self.center.0 -= dx * (r.right - r.left) / w;
        self.center.1 -= dy * (r.bottom - r.top) / h;
    }

    /// Zooms by `steps` (positive = in) keeping the point under `(x, y)` fixed.
    pub fn zoom_to_pixel(&mut self, size: RenderSize, x: f64, y: f64, steps: i32) {
        let (w, h) = dims(size);
        let target = self.pixel_to_plane(size, x, y);
        self.zoom = self.zoom.saturating_add(steps);
        self.center = target;
        self.pan_pixels(size, x - w / 2.0, y - h / 2.0);
    }
}
