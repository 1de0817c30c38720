//! Bouguet rectification of a calibrated stereo rig.

use log::{debug, info};
use nalgebra::{Matrix3, Matrix3x4, Matrix4, Point2, Rotation3, Vector3};
use serde::{Deserialize, Serialize};
use stereo_rig_calib::StereoModel;
use stereo_rig_core::{CameraModel, ImageSize, Rect, RectF};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::points::{undistort_point, valid_rectangles};
use crate::{RectifyError, RectifyParams};

/// Baseline direction after rectification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaselineAxis {
    /// Epipolar lines are image rows.
    Horizontal,
    /// Epipolar lines are image columns.
    Vertical,
}

impl BaselineAxis {
    fn index(self) -> usize {
        match self {
            BaselineAxis::Horizontal => 0,
            BaselineAxis::Vertical => 1,
        }
    }
}

/// Rectifying rotations, rectified projections and the disparity-to-depth
/// matrix of a stereo rig.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RectificationTransform {
    pub r1: Matrix3<f64>,
    pub r2: Matrix3<f64>,
    pub p1: Matrix3x4<f64>,
    pub p2: Matrix3x4<f64>,
    /// Maps `(x, y, d, 1)` of the rectified left image to homogeneous 3D
    /// coordinates in the rectified left camera frame.
    pub q: Matrix4<f64>,
    /// Size of the rectified images.
    pub image_size: ImageSize,
    pub axis: BaselineAxis,
}

impl RectificationTransform {
    /// Shared focal length of both rectified cameras.
    pub fn focal_length(&self) -> f64 {
        self.p1[(0, 0)]
    }

    /// Signed baseline in the rectified frame (`P2[axis][3] / f`).
    pub fn baseline(&self) -> f64 {
        self.p2[(self.axis.index(), 3)] / self.focal_length()
    }

    /// Left 3×3 block of a rectified projection.
    pub fn new_camera_matrix(p: &Matrix3x4<f64>) -> Matrix3<f64> {
        p.fixed_view::<3, 3>(0, 0).into_owned()
    }
}

/// Output of [`stereo_rectify`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rectification {
    pub transform: RectificationTransform,
    /// Region of the rectified left image sourced only from real pixels.
    pub roi_left: Rect,
    pub roi_right: Rect,
}

fn projection(f: f64, c: Point2<f64>) -> Matrix3x4<f64> {
    Matrix3x4::new(f, 0.0, c.x, 0.0, 0.0, f, c.y, 0.0, 0.0, 0.0, 1.0, 0.0)
}

/// Focal length used by both rectified cameras: the smaller of the focal
/// lengths across the baseline, shrunk for barrel distortion so that the
/// image corners stay in view.
fn rectified_focal(cameras: [&CameraModel; 2], size: ImageSize, axis: BaselineAxis) -> f64 {
    let (nx, ny) = (size.width as f64, size.height as f64);
    cameras
        .iter()
        .map(|cam| {
            let k = &cam.intrinsics;
            let mut fc = match axis {
                BaselineAxis::Horizontal => k.fy,
                BaselineAxis::Vertical => k.fx,
            };
            let k1 = cam.distortion.k1();
            if k1 < 0.0 {
                fc *= 1.0 + k1 * (nx * nx + ny * ny) / (4.0 * fc * fc);
            }
            fc
        })
        .fold(f64::MAX, f64::min)
}

/// Principal point that centres the rectified image corners.
fn centred_principal_point(
    camera: &CameraModel,
    r: &Matrix3<f64>,
    fc: f64,
    size: ImageSize,
) -> Point2<f64> {
    let p = Matrix3::new(fc, 0.0, 0.0, 0.0, fc, 0.0, 0.0, 0.0, 1.0);
    let (w, h) = ((size.width - 1) as f64, (size.height - 1) as f64);
    let corners = [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)];
    let (sx, sy) = corners.iter().fold((0.0, 0.0), |(sx, sy), &(x, y)| {
        let q = undistort_point(camera, r, &p, Point2::new(x, y));
        (sx + q.x, sy + q.y)
    });
    Point2::new(w * 0.5 - sx / 4.0, h * 0.5 - sy / 4.0)
}

/// Scale factor that fits the inner (`alpha = 0`) or outer (`alpha = 1`)
/// rectangle into the new image, for one camera.
fn fit_scales(inner: &RectF, outer: &RectF, c0: Point2<f64>, c: Point2<f64>, size: ImageSize) -> (f64, f64) {
    let (w, h) = (size.width as f64 - 1.0, size.height as f64 - 1.0);
    let s0 = (c.x / (c0.x - inner.x))
        .max(c.y / (c0.y - inner.y))
        .max((w - c.x) / (inner.x + inner.width - c0.x))
        .max((h - c.y) / (inner.y + inner.height - c0.y));
    let s1 = (c.x / (c0.x - outer.x))
        .min(c.y / (c0.y - outer.y))
        .min((w - c.x) / (outer.x + outer.width - c0.x))
        .min((h - c.y) / (outer.y + outer.height - c0.y));
    (s0, s1)
}

fn scaled_roi(inner: &RectF, c0: Point2<f64>, c: Point2<f64>, s: f64, size: ImageSize) -> Rect {
    let x = ((inner.x - c0.x) * s + c.x).ceil();
    let y = ((inner.y - c0.y) * s + c.y).ceil();
    let w = (inner.width * s).floor();
    let h = (inner.height * s).floor();
    Rect::clipped(x, y, x + w, y + h, size)
}

/// Compute the rectifying transform of a calibrated rig.
///
/// Each camera is rotated half-way towards the other, then both are turned
/// so that the baseline lies along the image x axis (or y axis when the
/// rig is mostly vertical). The rectified cameras share one focal length;
/// principal points centre the undistorted image corners.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
pub fn stereo_rectify(
    model: &StereoModel,
    params: &RectifyParams,
) -> Result<Rectification, RectifyError> {
    params.validate()?;
    let size = model.left.image_size;
    if model.right.image_size != size {
        return Err(RectifyError::Configuration(format!(
            "camera image sizes differ: {}x{} vs {}x{}",
            size.width, size.height, model.right.image_size.width, model.right.image_size.height
        )));
    }
    if size.width < 2 || size.height < 2 {
        return Err(RectifyError::Configuration(format!(
            "image size {}x{} is too small",
            size.width, size.height
        )));
    }
    let new_size = params.new_image_size.unwrap_or(size);

    let baseline = model.translation.norm();
    if !(baseline.is_finite() && baseline > f64::EPSILON) {
        return Err(RectifyError::GeometryDegenerate(format!(
            "baseline length is {baseline}"
        )));
    }

    let r_half = Rotation3::new(model.rotation.scaled_axis() * -0.5);
    let t = r_half * model.translation;
    let axis = if t.x.abs() > t.y.abs() {
        BaselineAxis::Horizontal
    } else {
        BaselineAxis::Vertical
    };
    let idx = axis.index();

    let c = t[idx];
    let mut uu = Vector3::zeros();
    uu[idx] = if c > 0.0 { 1.0 } else { -1.0 };
    let mut ww = t.cross(&uu);
    let nw = ww.norm();
    if nw > 0.0 {
        ww *= (c.abs() / baseline).clamp(-1.0, 1.0).acos() / nw;
    }
    let w_r = Rotation3::new(ww);
    let r1 = (w_r * r_half.inverse()).into_inner();
    let r2 = (w_r * r_half).into_inner();
    let t_rect = r2 * model.translation;
    if t_rect[idx].abs() <= f64::EPSILON {
        return Err(RectifyError::GeometryDegenerate(
            "baseline vanishes after rectification".into(),
        ));
    }

    let fc0 = rectified_focal([&model.left, &model.right], size, axis);
    if !(fc0.is_finite() && fc0 > 0.0) {
        return Err(RectifyError::GeometryDegenerate(format!(
            "rectified focal length is {fc0}"
        )));
    }

    let mut cc = [
        centred_principal_point(&model.left, &r1, fc0, size),
        centred_principal_point(&model.right, &r2, fc0, size),
    ];
    if params.zero_disparity {
        let mid = Point2::new((cc[0].x + cc[1].x) * 0.5, (cc[0].y + cc[1].y) * 0.5);
        cc = [mid, mid];
    } else if axis == BaselineAxis::Horizontal {
        let y = (cc[0].y + cc[1].y) * 0.5;
        cc[0].y = y;
        cc[1].y = y;
    } else {
        let x = (cc[0].x + cc[1].x) * 0.5;
        cc[0].x = x;
        cc[1].x = x;
    }

    let p1_0 = projection(fc0, cc[0]);
    let p2_0 = projection(fc0, cc[1]);
    let (inner1, outer1) = valid_rectangles(
        &model.left,
        &r1,
        &RectificationTransform::new_camera_matrix(&p1_0),
        size,
    );
    let (inner2, outer2) = valid_rectangles(
        &model.right,
        &r2,
        &RectificationTransform::new_camera_matrix(&p2_0),
        size,
    );

    // principal points rescaled to the rectified image size
    let rescale = |p: Point2<f64>| {
        Point2::new(
            new_size.width as f64 * p.x / size.width as f64,
            new_size.height as f64 * p.y / size.height as f64,
        )
    };
    let c1 = rescale(cc[0]);
    let c2 = rescale(cc[1]);

    let s = match params.alpha {
        Some(alpha) => {
            let (a0, a1) = fit_scales(&inner1, &outer1, cc[0], c1, new_size);
            let (b0, b1) = fit_scales(&inner2, &outer2, cc[1], c2, new_size);
            let s0 = a0.max(b0);
            let s1 = a1.min(b1);
            s0 * (1.0 - alpha) + s1 * alpha
        }
        None => 1.0,
    };
    if !(s.is_finite() && s > 0.0) {
        return Err(RectifyError::GeometryDegenerate(format!(
            "rectified image scale is {s}; the valid region collapsed"
        )));
    }

    let fc = fc0 * s;
    let p1 = projection(fc, c1);
    let mut p2 = projection(fc, c2);
    p2[(idx, 3)] = t_rect[idx] * fc;

    let tx = t_rect[idx];
    let dc = match axis {
        BaselineAxis::Horizontal => c1.x - c2.x,
        BaselineAxis::Vertical => c1.y - c2.y,
    };
    let q = Matrix4::new(
        1.0, 0.0, 0.0, -c1.x, //
        0.0, 1.0, 0.0, -c1.y, //
        0.0, 0.0, 0.0, fc, //
        0.0, 0.0, -1.0 / tx, dc / tx,
    );

    let roi_left = scaled_roi(&inner1, cc[0], c1, s, new_size);
    let roi_right = scaled_roi(&inner2, cc[1], c2, s, new_size);

    debug!(
        "rectification: axis {axis:?}, f {fc:.3}, c1 ({:.2}, {:.2}), c2 ({:.2}, {:.2}), scale {s:.4}",
        c1.x, c1.y, c2.x, c2.y
    );
    info!(
        "rectified {}x{}: roi left {:?}, roi right {:?}",
        new_size.width, new_size.height, roi_left, roi_right
    );

    Ok(Rectification {
        transform: RectificationTransform {
            r1,
            r2,
            p1,
            p2,
            q,
            image_size: new_size,
            axis,
        },
        roi_left,
        roi_right,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use stereo_rig_core::{Distortion, Intrinsics};

    fn camera() -> CameraModel {
        CameraModel::new(
            Intrinsics::new(600.0, 600.0, 319.5, 239.5),
            Distortion::none(),
            ImageSize::new(640, 480),
        )
    }

    #[test]
    fn parallel_rig_needs_no_rotation() {
        let cam = camera();
        let model = StereoModel::new(cam, cam, Rotation3::identity(), Vector3::new(-0.1, 0.0, 0.0));
        let rect = stereo_rectify(&model, &RectifyParams::default()).expect("rectify");
        let t = &rect.transform;
        assert_relative_eq!(t.r1, Matrix3::identity(), epsilon = 1e-12);
        assert_relative_eq!(t.r2, Matrix3::identity(), epsilon = 1e-12);
        assert_relative_eq!(t.focal_length(), 600.0, epsilon = 1e-9);
        assert_relative_eq!(t.p1[(0, 2)], 319.5, epsilon = 1e-9);
        assert_relative_eq!(t.q[(3, 2)], 10.0, epsilon = 1e-9);
        assert_relative_eq!(t.baseline(), -0.1, epsilon = 1e-12);
        assert_eq!(t.axis, BaselineAxis::Horizontal);
        // rounding may shave one pixel off the border
        assert!(rect.roi_left.width >= 639 && rect.roi_left.height >= 479);
    }

    #[test]
    fn zero_baseline_is_degenerate() {
        let cam = camera();
        let model = StereoModel::new(cam, cam, Rotation3::identity(), Vector3::zeros());
        assert!(matches!(
            stereo_rectify(&model, &RectifyParams::default()),
            Err(RectifyError::GeometryDegenerate(_))
        ));
    }

    #[test]
    fn vertical_rig_aligns_columns() {
        let cam = camera();
        let model = StereoModel::new(
            cam,
            cam,
            Rotation3::from_euler_angles(0.01, 0.0, 0.0),
            Vector3::new(0.002, -0.1, 0.0),
        );
        let rect = stereo_rectify(&model, &RectifyParams::default()).expect("rectify");
        assert_eq!(rect.transform.axis, BaselineAxis::Vertical);
        assert_relative_eq!(rect.transform.p1[(0, 2)], rect.transform.p2[(0, 2)], epsilon = 1e-9);
    }

    #[test]
    fn mismatched_image_sizes_are_rejected() {
        let cam = camera();
        let mut other = cam;
        other.image_size = ImageSize::new(320, 240);
        let model = StereoModel::new(cam, other, Rotation3::identity(), Vector3::new(-0.1, 0.0, 0.0));
        assert!(matches!(
            stereo_rectify(&model, &RectifyParams::default()),
            Err(RectifyError::Configuration(_))
        ));
    }
}
