//! Pinhole camera with the 8-term rational distortion model.

use nalgebra::{Matrix3, Point2, Point3};
use serde::{Deserialize, Serialize};

use crate::image::ImageSize;
use crate::pose::Pose;

const UNDISTORT_ITERATIONS: usize = 20;

/// Focal lengths and principal point in pixels. Skew is always zero.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Intrinsics {
    pub const fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// `[[fx, 0, cx], [0, fy, cy], [0, 0, 1]]`.
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    /// Read back from a camera matrix; skew, if any, is ignored.
    pub fn from_matrix(k: &Matrix3<f64>) -> Self {
        Self::new(k[(0, 0)], k[(1, 1)], k[(0, 2)], k[(1, 2)])
    }

    #[inline]
    pub fn to_pixel(&self, n: Point2<f64>) -> Point2<f64> {
        Point2::new(self.fx * n.x + self.cx, self.fy * n.y + self.cy)
    }

    #[inline]
    pub fn to_normalized(&self, px: Point2<f64>) -> Point2<f64> {
        Point2::new((px.x - self.cx) / self.fx, (px.y - self.cy) / self.fy)
    }

    pub fn is_valid(&self) -> bool {
        [self.fx, self.fy, self.cx, self.cy]
            .iter()
            .all(|v| v.is_finite())
            && self.fx > 0.0
            && self.fy > 0.0
    }
}

/// Distortion coefficients `[k1, k2, p1, p2, k3, k4, k5, k6]`.
///
/// Radial terms form the rational factor
/// `(1 + k1 r² + k2 r⁴ + k3 r⁶) / (1 + k4 r² + k5 r⁴ + k6 r⁶)`, `p1`, `p2`
/// are tangential. The plain 5-term model is this vector with `k4..k6 = 0`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Distortion {
    pub coeffs: [f64; 8],
}

impl Distortion {
    pub const LEN: usize = 8;

    pub const fn new(coeffs: [f64; 8]) -> Self {
        Self { coeffs }
    }

    pub const fn none() -> Self {
        Self { coeffs: [0.0; 8] }
    }

    /// Build from a coefficient list of OpenCV length 4, 5 or 8; missing
    /// higher-order terms are zero.
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        if !matches!(values.len(), 4 | 5 | 8) {
            return None;
        }
        let mut coeffs = [0.0; 8];
        coeffs[..values.len()].copy_from_slice(values);
        Some(Self { coeffs })
    }

    #[inline]
    pub fn k1(&self) -> f64 {
        self.coeffs[0]
    }

    pub fn is_zero(&self) -> bool {
        self.coeffs.iter().all(|&c| c == 0.0)
    }

    #[inline]
    fn radial_terms(&self, r2: f64) -> (f64, f64) {
        let [k1, k2, _, _, k3, k4, k5, k6] = self.coeffs;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        (
            1.0 + k1 * r2 + k2 * r4 + k3 * r6,
            1.0 + k4 * r2 + k5 * r4 + k6 * r6,
        )
    }

    #[inline]
    fn tangential(&self, x: f64, y: f64, r2: f64) -> (f64, f64) {
        let (p1, p2) = (self.coeffs[2], self.coeffs[3]);
        (
            2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x),
            p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y,
        )
    }

    /// Apply the lens model to an ideal normalized point.
    #[inline]
    pub fn distort(&self, n: Point2<f64>) -> Point2<f64> {
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let (num, den) = self.radial_terms(r2);
        let radial = num / den;
        let (dx, dy) = self.tangential(x, y, r2);
        Point2::new(x * radial + dx, y * radial + dy)
    }

    /// Invert [`Distortion::distort`] by fixed-point iteration.
    pub fn undistort(&self, d: Point2<f64>) -> Point2<f64> {
        if self.is_zero() {
            return d;
        }
        let (x0, y0) = (d.x, d.y);
        let (mut x, mut y) = (x0, y0);
        for _ in 0..UNDISTORT_ITERATIONS {
            let r2 = x * x + y * y;
            let (num, den) = self.radial_terms(r2);
            let icdist = den / num;
            if !icdist.is_finite() || icdist <= 0.0 {
                return d;
            }
            let (dx, dy) = self.tangential(x, y, r2);
            let nx = (x0 - dx) * icdist;
            let ny = (y0 - dy) * icdist;
            let step = (nx - x).abs().max((ny - y).abs());
            x = nx;
            y = ny;
            if step < 1e-14 {
                break;
            }
        }
        Point2::new(x, y)
    }
}

/// A calibrated camera: intrinsics, lens distortion and the image size the
/// calibration was done at.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    pub intrinsics: Intrinsics,
    pub distortion: Distortion,
    pub image_size: ImageSize,
}

impl CameraModel {
    pub fn new(intrinsics: Intrinsics, distortion: Distortion, image_size: ImageSize) -> Self {
        Self {
            intrinsics,
            distortion,
            image_size,
        }
    }

    pub fn camera_matrix(&self) -> Matrix3<f64> {
        self.intrinsics.matrix()
    }

    /// Project a point given in camera coordinates.
    #[inline]
    pub fn project_camera_point(&self, p: &Point3<f64>) -> Point2<f64> {
        let n = Point2::new(p.x / p.z, p.y / p.z);
        self.intrinsics.to_pixel(self.distortion.distort(n))
    }

    /// Project a pattern-space point through `pose` into pixels.
    #[inline]
    pub fn project(&self, pose: &Pose, p: &Point3<f64>) -> Point2<f64> {
        self.project_camera_point(&pose.transform_point(p))
    }

    #[inline]
    pub fn distort_normalized(&self, n: Point2<f64>) -> Point2<f64> {
        self.distortion.distort(n)
    }

    /// Pixel to ideal (undistorted) normalized coordinates.
    #[inline]
    pub fn undistort_normalized(&self, px: Point2<f64>) -> Point2<f64> {
        self.distortion
            .undistort(self.intrinsics.to_normalized(px))
    }

    /// Remove lens distortion from a pixel, staying in this camera's pixel frame.
    #[inline]
    pub fn undistort_pixel(&self, px: Point2<f64>) -> Point2<f64> {
        self.intrinsics.to_pixel(self.undistort_normalized(px))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn camera(distortion: [f64; 8]) -> CameraModel {
        CameraModel::new(
            Intrinsics::new(800.0, 790.0, 320.0, 240.0),
            Distortion::new(distortion),
            ImageSize::new(640, 480),
        )
    }

    #[test]
    fn undistort_inverts_distort() {
        let d = Distortion::new([-0.28, 0.09, 0.001, -0.0015, -0.01, 0.02, 0.0, 0.003]);
        for &(x, y) in &[(0.0, 0.0), (0.3, -0.2), (-0.4, 0.25), (0.1, 0.35)] {
            let n = Point2::new(x, y);
            let back = d.undistort(d.distort(n));
            assert_relative_eq!(back.x, n.x, epsilon = 1e-9);
            assert_relative_eq!(back.y, n.y, epsilon = 1e-9);
        }
    }

    #[test]
    fn project_without_distortion_is_pinhole() {
        let cam = camera([0.0; 8]);
        let pose = Pose::new(
            nalgebra::Rotation3::identity(),
            Vector3::new(0.0, 0.0, 2.0),
        );
        let px = cam.project(&pose, &Point3::new(0.1, -0.05, 0.0));
        assert_relative_eq!(px.x, 320.0 + 800.0 * 0.05, epsilon = 1e-12);
        assert_relative_eq!(px.y, 240.0 - 790.0 * 0.025, epsilon = 1e-12);
    }

    #[test]
    fn undistort_pixel_recovers_ideal_projection() {
        let cam = camera([-0.2, 0.05, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let ideal = Point2::new(0.2, -0.1);
        let observed = cam.intrinsics.to_pixel(cam.distort_normalized(ideal));
        let undist = cam.undistort_pixel(observed);
        assert_relative_eq!(undist.x, cam.intrinsics.to_pixel(ideal).x, epsilon = 1e-7);
        assert_relative_eq!(undist.y, cam.intrinsics.to_pixel(ideal).y, epsilon = 1e-7);
    }

    #[test]
    fn distortion_from_slice_pads_higher_terms() {
        let d = Distortion::from_slice(&[0.1, 0.2, 0.0, 0.0, 0.3]).expect("5 terms");
        assert_eq!(d.coeffs, [0.1, 0.2, 0.0, 0.0, 0.3, 0.0, 0.0, 0.0]);
        assert!(Distortion::from_slice(&[0.1, 0.2]).is_none());
    }

    #[test]
    fn intrinsics_matrix_round_trip() {
        let k = Intrinsics::new(500.0, 510.0, 300.0, 200.0);
        assert_eq!(Intrinsics::from_matrix(&k.matrix()), k);
    }
}
