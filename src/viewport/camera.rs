//! Pan/zoom transform between world and screen space.

use serde::{Deserialize, Serialize};

/// Smallest zoom factor `fit_bounds` will produce.
pub const MIN_ZOOM: f32 = 0.02;
/// Largest zoom factor `fit_bounds` will produce.
pub const MAX_ZOOM: f32 = 8.0;

/// Viewport size in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
        }
    }
}

/// d3-zoom style transform: `screen = world * k + (x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub x: f32,
    pub y: f32,
    pub k: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Camera {
    pub const IDENTITY: Camera = Camera { x: 0.0, y: 0.0, k: 1.0 };

    pub fn new(x: f32, y: f32, k: f32) -> Self {
        Self { x, y, k }
    }

    /// A camera with a usable zoom factor. Non-finite or non-positive values
    /// fall back to the identity.
    pub fn sanitized(self) -> Self {
        if self.x.is_finite() && self.y.is_finite() && self.k.is_finite() && self.k > 0.0 {
            self
        } else {
            Self::IDENTITY
        }
    }

    pub fn screen_to_world(&self, sx: f32, sy: f32) -> (f32, f32) {
        ((sx - self.x) / self.k, (sy - self.y) / self.k)
    }

    pub fn world_to_screen(&self, wx: f32, wy: f32) -> (f32, f32) {
        (wx * self.k + self.x, wy * self.k + self.y)
    }

    /// Length in world units of `screen_radius` pixels.
    pub fn world_radius(&self, screen_radius: f32) -> f32 {
        screen_radius / self.k
    }

    /// Camera that shows `bounds` (min_x, min_y, max_x, max_y) centered in
    /// the viewport with `padding` pixels on every side.
    pub fn fit_bounds(bounds: (f32, f32, f32, f32), viewport: Viewport, padding: f32) -> Self {
        let (min_x, min_y, max_x, max_y) = bounds;
        let width = (max_x - min_x).max(1.0);
        let height = (max_y - min_y).max(1.0);
        let avail_w = (viewport.width - 2.0 * padding).max(1.0);
        let avail_h = (viewport.height - 2.0 * padding).max(1.0);

        let k = (avail_w / width).min(avail_h / height).clamp(MIN_ZOOM, MAX_ZOOM);
        let cx = (min_x + max_x) * 0.5;
        let cy = (min_y + max_y) * 0.5;
        Self {
            x: viewport.width * 0.5 - cx * k,
            y: viewport.height * 0.5 - cy * k,
            k,
        }
    }
}
