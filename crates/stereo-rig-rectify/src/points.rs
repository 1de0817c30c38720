use nalgebra::{Matrix3, Point2, Vector3};
use stereo_rig_core::{CameraModel, ImageSize, RectF};

const GRID: usize = 9;

/// Undistort a pixel, rotate it by `r` and project it with `p`.
#[inline]
pub(crate) fn undistort_point(
    camera: &CameraModel,
    r: &Matrix3<f64>,
    p: &Matrix3<f64>,
    px: Point2<f64>,
) -> Point2<f64> {
    let n = camera.undistort_normalized(px);
    let v = p * (r * Vector3::new(n.x, n.y, 1.0));
    Point2::new(v.x / v.z, v.y / v.z)
}

/// Largest rectangle of valid pixels and bounding box of all pixels after
/// undistorting a `GRID × GRID` sampling of the source image.
///
/// Returns `(inner, outer)` in the coordinates defined by `p`.
pub(crate) fn valid_rectangles(
    camera: &CameraModel,
    r: &Matrix3<f64>,
    p: &Matrix3<f64>,
    size: ImageSize,
) -> (RectF, RectF) {
    let step_x = size.width as f64 / (GRID - 1) as f64;
    let step_y = size.height as f64 / (GRID - 1) as f64;

    let (mut ox0, mut oy0) = (f64::MAX, f64::MAX);
    let (mut ox1, mut oy1) = (f64::MIN, f64::MIN);
    let (mut ix0, mut iy0) = (f64::MIN, f64::MIN);
    let (mut ix1, mut iy1) = (f64::MAX, f64::MAX);

    for gy in 0..GRID {
        for gx in 0..GRID {
            let q = undistort_point(
                camera,
                r,
                p,
                Point2::new(gx as f64 * step_x, gy as f64 * step_y),
            );
            ox0 = ox0.min(q.x);
            oy0 = oy0.min(q.y);
            ox1 = ox1.max(q.x);
            oy1 = oy1.max(q.y);

            if gx == 0 {
                ix0 = ix0.max(q.x);
            }
            if gx == GRID - 1 {
                ix1 = ix1.min(q.x);
            }
            if gy == 0 {
                iy0 = iy0.max(q.y);
            }
            if gy == GRID - 1 {
                iy1 = iy1.min(q.y);
            }
        }
    }

    (
        RectF::from_bounds(ix0, iy0, ix1, iy1),
        RectF::from_bounds(ox0, oy0, ox1, oy1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use stereo_rig_core::{Distortion, Intrinsics};

    #[test]
    fn without_distortion_both_rectangles_cover_the_image() {
        let cam = CameraModel::new(
            Intrinsics::new(500.0, 500.0, 320.0, 240.0),
            Distortion::none(),
            ImageSize::new(640, 480),
        );
        let k = cam.camera_matrix();
        let (inner, outer) = valid_rectangles(&cam, &Matrix3::identity(), &k, cam.image_size);
        for r in [inner, outer] {
            assert!(r.x.abs() < 1e-9 && r.y.abs() < 1e-9);
            assert!((r.width - 640.0).abs() < 1e-9 && (r.height - 480.0).abs() < 1e-9);
        }
    }

    #[test]
    fn barrel_distortion_makes_inner_smaller_than_outer() {
        let cam = CameraModel::new(
            Intrinsics::new(500.0, 500.0, 320.0, 240.0),
            Distortion::new([-0.25, 0.05, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
            ImageSize::new(640, 480),
        );
        let k = cam.camera_matrix();
        let (inner, outer) = valid_rectangles(&cam, &Matrix3::identity(), &k, cam.image_size);
        assert!(inner.width < outer.width);
        assert!(inner.height < outer.height);
        assert!(inner.x > outer.x && inner.y > outer.y);
    }
}
