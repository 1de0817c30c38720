//! Two-view epipolar geometry of a calibrated rig.

use nalgebra::{Matrix3, Point2, Rotation3, Vector3};
use serde::{Deserialize, Serialize};
use stereo_rig_core::{normalize_line, point_line_distance, skew, CameraModel, Correspondence, Intrinsics};

/// Geometry of a two-camera rig. `rotation`/`translation` map left-camera
/// coordinates into the right camera: `x_r = R x_l + T`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StereoModel {
    pub left: CameraModel,
    pub right: CameraModel,
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
    pub essential: Matrix3<f64>,
    pub fundamental: Matrix3<f64>,
}

impl StereoModel {
    /// Derive `E` and `F` from the cameras and the relative pose.
    pub fn new(
        left: CameraModel,
        right: CameraModel,
        rotation: Rotation3<f64>,
        translation: Vector3<f64>,
    ) -> Self {
        let essential = essential_matrix(&rotation, &translation);
        let fundamental =
            fundamental_matrix(&left.intrinsics, &right.intrinsics, &essential);
        Self {
            left,
            right,
            rotation,
            translation,
            essential,
            fundamental,
        }
    }

    pub fn baseline(&self) -> f64 {
        self.translation.norm()
    }

    /// Epipolar line in the right image of a left pixel (undistorted).
    pub fn right_epiline(&self, left_px: Point2<f64>) -> Option<Vector3<f64>> {
        normalize_line(self.fundamental * Vector3::new(left_px.x, left_px.y, 1.0))
    }

    /// Epipolar line in the left image of a right pixel (undistorted).
    pub fn left_epiline(&self, right_px: Point2<f64>) -> Option<Vector3<f64>> {
        normalize_line(self.fundamental.transpose() * Vector3::new(right_px.x, right_px.y, 1.0))
    }
}

/// `E = [T]× R`.
pub fn essential_matrix(rotation: &Rotation3<f64>, translation: &Vector3<f64>) -> Matrix3<f64> {
    skew(translation) * rotation.matrix()
}

fn inverse_camera_matrix(k: &Intrinsics) -> Matrix3<f64> {
    Matrix3::new(
        1.0 / k.fx,
        0.0,
        -k.cx / k.fx,
        0.0,
        1.0 / k.fy,
        -k.cy / k.fy,
        0.0,
        0.0,
        1.0,
    )
}

/// `F = K_r⁻ᵀ E K_l⁻¹`.
pub fn fundamental_matrix(
    left: &Intrinsics,
    right: &Intrinsics,
    essential: &Matrix3<f64>,
) -> Matrix3<f64> {
    inverse_camera_matrix(right).transpose() * essential * inverse_camera_matrix(left)
}

/// Mean symmetric point-to-epipolar-line distance in pixels.
///
/// Every observed pair is undistorted with its own camera (staying in that
/// camera's pixel frame); the distance of the right point to the epiline of
/// the left point and vice versa are summed, and the total is divided by
/// the number of point pairs. Degenerate lines count as zero distance.
pub fn epipolar_error(
    model: &StereoModel,
    left: &[Correspondence],
    right: &[Correspondence],
) -> f64 {
    let mut total = 0.0;
    let mut pairs = 0usize;
    for (lv, rv) in left.iter().zip(right) {
        for (pl, pr) in lv.image_points().iter().zip(rv.image_points()) {
            let ul = model.left.undistort_pixel(*pl);
            let ur = model.right.undistort_pixel(*pr);
            if let Some(line) = model.right_epiline(ul) {
                total += point_line_distance(ur, &line);
            }
            if let Some(line) = model.left_epiline(ur) {
                total += point_line_distance(ul, &line);
            }
            pairs += 1;
        }
    }
    if pairs == 0 {
        0.0
    } else {
        total / pairs as f64
    }
}
