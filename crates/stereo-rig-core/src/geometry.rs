use nalgebra::{Matrix3, Point2, Vector3};
use serde::{Deserialize, Serialize};

use crate::image::ImageSize;

/// Axis-aligned pixel rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Rect {
    pub const fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn full(size: ImageSize) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }

    /// Build from float corners `[x0, x1) × [y0, y1)` and clip to `size`.
    pub fn clipped(x0: f64, y0: f64, x1: f64, y1: f64, size: ImageSize) -> Self {
        let clamp_x = |v: f64| v.clamp(0.0, size.width as f64);
        let clamp_y = |v: f64| v.clamp(0.0, size.height as f64);
        let (x0, x1) = (clamp_x(x0), clamp_x(x1));
        let (y0, y1) = (clamp_y(y0), clamp_y(y1));
        if !(x1 > x0 && y1 > y0) {
            return Self::default();
        }
        Self::new(
            x0 as usize,
            y0 as usize,
            (x1 - x0) as usize,
            (y1 - y0) as usize,
        )
    }
}

/// Float rectangle used while searching inner/outer valid regions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RectF {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl RectF {
    pub fn from_bounds(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        }
    }
}

/// Cross-product matrix `[v]×`.
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Line `a x + b y + c = 0` scaled so that `a² + b² = 1`.
pub fn normalize_line(l: Vector3<f64>) -> Option<Vector3<f64>> {
    let n = l.x.hypot(l.y);
    (n > f64::EPSILON && n.is_finite()).then(|| l / n)
}

/// Unsigned distance of `p` to a normalized line.
#[inline]
pub fn point_line_distance(p: Point2<f64>, line: &Vector3<f64>) -> f64 {
    (line.x * p.x + line.y * p.y + line.z).abs()
}
