use log::debug;
use nalgebra::Matrix3;
use stereo_rig_core::{CameraModel, ImageSize, Rect, RectF};

use crate::points::valid_rectangles;
use crate::{RectifyError, RemapTable};

/// New camera matrix for undistorting a single camera.
///
/// `alpha = 0` crops to the region of valid pixels, `alpha = 1` keeps every
/// source pixel. Returns the matrix and the valid-pixel region in the new
/// image.
pub fn optimal_new_camera_matrix(
    model: &CameraModel,
    alpha: f64,
    new_size: Option<ImageSize>,
) -> Result<(Matrix3<f64>, Rect), RectifyError> {
    if !(0.0..=1.0).contains(&alpha) {
        return Err(RectifyError::Configuration(format!(
            "alpha must be within [0, 1], got {alpha}"
        )));
    }
    let size = model.image_size;
    let new_size = new_size.unwrap_or(size);
    if size.area() == 0 || new_size.area() == 0 {
        return Err(RectifyError::Configuration("image size must be non-empty".into()));
    }

    let id = Matrix3::identity();
    let (inner, outer) = valid_rectangles(model, &id, &id, size);
    if !(inner.width > 0.0 && inner.height > 0.0 && outer.width > 0.0 && outer.height > 0.0) {
        return Err(RectifyError::GeometryDegenerate(
            "undistorted image region is empty".into(),
        ));
    }

    let (w, h) = ((new_size.width - 1) as f64, (new_size.height - 1) as f64);
    let fit = |r: &RectF| {
        let fx = w / r.width;
        let fy = h / r.height;
        (fx, fy, -fx * r.x, -fy * r.y)
    };
    let (fx0, fy0, cx0, cy0) = fit(&inner);
    let (fx1, fy1, cx1, cy1) = fit(&outer);
    let lerp = |a: f64, b: f64| a * (1.0 - alpha) + b * alpha;
    let (fx, fy, cx, cy) = (lerp(fx0, fx1), lerp(fy0, fy1), lerp(cx0, cx1), lerp(cy0, cy1));
    let k = Matrix3::new(fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0);

    let (roi, _) = valid_rectangles(model, &id, &k, size);
    let roi = Rect::clipped(
        roi.x.round(),
        roi.y.round(),
        (roi.x + roi.width).round(),
        (roi.y + roi.height).round(),
        new_size,
    );
    debug!("optimal camera matrix f=({fx:.2}, {fy:.2}) c=({cx:.2}, {cy:.2}), roi {roi:?}");
    Ok((k, roi))
}

/// Remap table that removes lens distortion, re-projecting with `new_camera`.
pub fn undistort_map(
    model: &CameraModel,
    new_camera: &Matrix3<f64>,
    size: ImageSize,
) -> Result<RemapTable, RectifyError> {
    RemapTable::build(model, &Matrix3::identity(), new_camera, size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point2;
    use stereo_rig_core::{Distortion, Intrinsics};

    fn camera(k1: f64) -> CameraModel {
        CameraModel::new(
            Intrinsics::new(400.0, 400.0, 159.5, 119.5),
            Distortion::new([k1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
            ImageSize::new(320, 240),
        )
    }

    #[test]
    fn no_distortion_keeps_the_camera() {
        let cam = camera(0.0);
        for alpha in [0.0, 1.0] {
            let (k, roi) = optimal_new_camera_matrix(&cam, alpha, None).unwrap();
            // pixel grid spans [0, w] so the focal shrinks by (w-1)/w
            assert_relative_eq!(k[(0, 0)], 400.0 * 319.0 / 320.0, epsilon = 1e-6);
            assert!(roi.width >= 318 && roi.height >= 238);
        }
    }

    #[test]
    fn cropped_view_samples_only_real_pixels() {
        let cam = camera(-0.3);
        let (k, roi) = optimal_new_camera_matrix(&cam, 0.0, None).unwrap();
        let table = undistort_map(&cam, &k, cam.image_size).unwrap();
        for y in roi.y..roi.y + roi.height {
            for x in roi.x..roi.x + roi.width {
                let (sx, sy) = table.lookup(x, y);
                assert!(
                    sx > -1.0 && sx < 321.0 && sy > -1.0 && sy < 241.0,
                    "({x}, {y}) -> ({sx}, {sy})"
                );
            }
        }
    }

    #[test]
    fn full_view_keeps_the_corners() {
        let cam = camera(-0.3);
        let (k, _) = optimal_new_camera_matrix(&cam, 1.0, None).unwrap();
        let (k0, _) = optimal_new_camera_matrix(&cam, 0.0, None).unwrap();
        assert!(k[(0, 0)] < k0[(0, 0)]);
        // the source corner lands inside the new image
        let n = cam.undistort_normalized(Point2::new(0.0, 0.0));
        let u = k[(0, 0)] * n.x + k[(0, 2)];
        let v = k[(1, 1)] * n.y + k[(1, 2)];
        assert!(u > -1.0 && v > -1.0);
    }

    #[test]
    fn bad_alpha_is_rejected() {
        assert!(matches!(
            optimal_new_camera_matrix(&camera(0.0), -0.1, None),
            Err(RectifyError::Configuration(_))
        ));
    }
}
