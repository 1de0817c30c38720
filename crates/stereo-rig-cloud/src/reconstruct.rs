use log::{debug, info};
use nalgebra::{Matrix4, Point3, Vector4};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use stereo_rig_core::ColorView;
use stereo_rig_rectify::RectificationTransform;
use stereo_rig_sgm::DisparityMap;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{ColoredPoint, PointCloud, ReconstructError};

/// Point filtering options for [`reconstruct`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructParams {
    /// Depths at or beyond this value are treated as "no match".
    pub max_depth: f32,
    /// Drop every point at the nearest depth found in the map. These are
    /// the matcher's background artefacts.
    pub drop_nearest_depth: bool,
}

impl Default for ReconstructParams {
    fn default() -> Self {
        Self {
            max_depth: 10_000.0,
            drop_nearest_depth: true,
        }
    }
}

impl ReconstructParams {
    pub fn validate(&self) -> Result<(), ReconstructError> {
        if !(self.max_depth.is_finite() && self.max_depth > 0.0) {
            return Err(ReconstructError::Configuration(format!(
                "max_depth must be positive and finite, got {}",
                self.max_depth
            )));
        }
        Ok(())
    }
}

/// Back-project every pixel through `q`; `None` where the disparity is
/// invalid or the homogeneous scale vanishes.
pub fn reproject_image_to_3d(disparity: &DisparityMap, q: &Matrix4<f64>) -> Vec<Option<Point3<f32>>> {
    let w = disparity.width();
    let mut out = vec![None; w * disparity.height()];
    if out.is_empty() {
        return out;
    }
    out.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        for (x, p) in row.iter_mut().enumerate() {
            *p = disparity.get(x, y).and_then(|d| {
                let h = q * Vector4::new(x as f64, y as f64, f64::from(d), 1.0);
                if h.w.abs() <= f64::EPSILON {
                    return None;
                }
                let v = h.xyz() / h.w;
                v.iter()
                    .all(|c| c.is_finite())
                    .then(|| Point3::new(v.x as f32, v.y as f32, v.z as f32))
            });
        }
    });
    out
}

/// Colored point cloud from a disparity map of the rectified left image.
///
/// Points are kept when their depth is finite, positive, below
/// `max_depth` and (with `drop_nearest_depth`) strictly greater than the
/// smallest such depth.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(w = disparity.width(), h = disparity.height()))
)]
pub fn reconstruct(
    disparity: &DisparityMap,
    transform: &RectificationTransform,
    color: ColorView<'_>,
    params: &ReconstructParams,
) -> Result<PointCloud, ReconstructError> {
    params.validate()?;
    if !color.is_well_formed() {
        return Err(ReconstructError::Configuration(
            "color buffer does not match its size".into(),
        ));
    }
    let size = disparity.size();
    let csize = color.size();
    if csize != size {
        return Err(ReconstructError::SizeMismatch {
            expected_width: size.width,
            expected_height: size.height,
            actual_width: csize.width,
            actual_height: csize.height,
        });
    }

    let positions = reproject_image_to_3d(disparity, &transform.q);
    let in_range = |p: &Point3<f32>| p.z > 0.0 && p.z < params.max_depth;

    let nearest = positions
        .iter()
        .flatten()
        .filter(|p| in_range(p))
        .map(|p| p.z)
        .fold(f32::INFINITY, f32::min);
    debug!("nearest reconstructed depth {nearest}");

    let w = size.width.max(1);
    let points: Vec<ColoredPoint> = positions
        .iter()
        .enumerate()
        .filter_map(|(i, p)| {
            let p = p.as_ref().filter(|p| in_range(p))?;
            if params.drop_nearest_depth && p.z <= nearest {
                return None;
            }
            Some(ColoredPoint {
                position: *p,
                color: color.rgb(i % w, i / w),
            })
        })
        .collect();

    info!(
        "reconstructed {} points from {} valid disparities",
        points.len(),
        disparity.valid_count()
    );
    Ok(PointCloud::new(points))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix3, Matrix3x4};
    use stereo_rig_core::{GrayImage, ImageSize, RgbImage, RgbImageView};
    use stereo_rig_rectify::BaselineAxis;

    /// Parallel rig: f = 100, c = (2, 1), baseline 0.5.
    fn transform() -> RectificationTransform {
        let (f, cx, cy, tx) = (100.0, 2.0, 1.0, -0.5);
        let p1 = Matrix3x4::new(f, 0.0, cx, 0.0, 0.0, f, cy, 0.0, 0.0, 0.0, 1.0, 0.0);
        let mut p2 = p1;
        p2[(0, 3)] = tx * f;
        RectificationTransform {
            r1: Matrix3::identity(),
            r2: Matrix3::identity(),
            p1,
            p2,
            q: Matrix4::new(
                1.0, 0.0, 0.0, -cx, //
                0.0, 1.0, 0.0, -cy, //
                0.0, 0.0, 0.0, f, //
                0.0, 0.0, -1.0 / tx, 0.0,
            ),
            image_size: ImageSize::new(4, 2),
            axis: BaselineAxis::Horizontal,
        }
    }

    fn map(values: [Option<f32>; 8]) -> DisparityMap {
        DisparityMap::from_values(4, 2, 0, 16, values).unwrap()
    }

    #[test]
    fn depth_follows_disparity() {
        let disp = map([Some(10.0), None, None, None, None, None, None, Some(25.0)]);
        let pts = reproject_image_to_3d(&disp, &transform().q);
        let p = pts[0].unwrap();
        // Z = f * B / d
        assert_relative_eq!(p.z, 5.0, epsilon = 1e-5);
        assert_relative_eq!(p.x, (0.0 - 2.0) * 5.0 / 100.0, epsilon = 1e-6);
        assert!(pts[1].is_none());
        assert_relative_eq!(pts[7].unwrap().z, 2.0, epsilon = 1e-5);
    }

    #[test]
    fn nearest_depth_and_invalid_pixels_are_dropped() {
        let disp = map([
            Some(10.0),
            Some(50.0),
            None,
            Some(25.0),
            Some(50.0),
            Some(0.0),
            Some(-5.0),
            Some(20.0),
        ]);
        let img = GrayImage::from_fn(4, 2, |x, y| (10 * (y * 4 + x)) as u8);
        let cloud = reconstruct(
            &disp,
            &transform(),
            ColorView::Gray(img.view()),
            &ReconstructParams::default(),
        )
        .unwrap();
        let depths: Vec<f32> = cloud.iter().map(|p| p.position.z).collect();
        // d = 50 gives the nearest depth 1.0 (twice); d = 0 and d < 0 are
        // at infinity or behind the camera
        assert_eq!(depths.len(), 3);
        assert!(depths.iter().all(|&z| z.is_finite() && z > 1.0));
        assert_eq!(cloud.points[0].color, [0, 0, 0]);
        assert_eq!(cloud.points[1].color, [30, 30, 30]);

        let keep_all = reconstruct(
            &disp,
            &transform(),
            ColorView::Gray(img.view()),
            &ReconstructParams {
                drop_nearest_depth: false,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(keep_all.len(), 5);
    }

    #[test]
    fn far_points_beyond_max_depth_are_dropped() {
        let disp = map([Some(0.001), Some(10.0), Some(20.0), None, None, None, None, None]);
        let img = GrayImage::new(4, 2);
        let cloud = reconstruct(
            &disp,
            &transform(),
            ColorView::Gray(img.view()),
            &ReconstructParams::default(),
        )
        .unwrap();
        // 0.001 px is 50 km away; 20 px is the nearest and dropped
        assert_eq!(cloud.len(), 1);
        assert_relative_eq!(cloud.points[0].position.z, 5.0, epsilon = 1e-5);
    }

    #[test]
    fn color_size_must_match() {
        let disp = map([None; 8]);
        let img = RgbImage::new(3, 2);
        assert!(matches!(
            reconstruct(
                &disp,
                &transform(),
                ColorView::Rgb(img.view()),
                &ReconstructParams::default()
            ),
            Err(ReconstructError::SizeMismatch { actual_width: 3, .. })
        ));
    }

    #[test]
    fn all_invalid_map_gives_an_empty_cloud() {
        let disp = map([None; 8]);
        let img = GrayImage::new(4, 2);
        let cloud = reconstruct(
            &disp,
            &transform(),
            ColorView::Gray(img.view()),
            &ReconstructParams {
                drop_nearest_depth: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(cloud.is_empty());
    }

    #[test]
    fn truncated_color_buffer_is_rejected() {
        let disp = map([Some(10.0); 8]);
        let bytes = [0u8; 4 * 2 * 3 - 1];
        let color = ColorView::Rgb(RgbImageView {
            width: 4,
            height: 2,
            data: &bytes,
        });
        assert!(matches!(
            reconstruct(&disp, &transform(), color, &ReconstructParams::default()),
            Err(ReconstructError::Configuration(_))
        ));
    }
}
