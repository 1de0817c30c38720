//! Per-pixel lookup tables from rectified to source coordinates.

use nalgebra::{Matrix3, Point2, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use stereo_rig_core::{
    sample_bilinear_rgb, sample_bilinear_u8, CameraModel, GrayImage, GrayImageView, ImageSize,
    RgbImage, RgbImageView,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{Rectification, RectificationTransform, RectifyError};

/// For every destination pixel, the source pixel it samples from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemapTable {
    pub width: usize,
    pub height: usize,
    /// Size of the images this table reads from.
    pub source_size: ImageSize,
    pub map_x: Vec<f32>,
    pub map_y: Vec<f32>,
}

impl RemapTable {
    /// Build the table for `camera`, rotated by `r` and re-projected with
    /// `new_camera`, producing images of `size`.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(w = size.width, h = size.height))
    )]
    pub fn build(
        camera: &CameraModel,
        r: &Matrix3<f64>,
        new_camera: &Matrix3<f64>,
        size: ImageSize,
    ) -> Result<Self, RectifyError> {
        let inv = (new_camera * r).try_inverse().ok_or_else(|| {
            RectifyError::GeometryDegenerate("new camera matrix times rotation is singular".into())
        })?;

        let n = size.area();
        let mut map_x = vec![0f32; n];
        let mut map_y = vec![0f32; n];
        if n > 0 {
            map_x
                .par_chunks_mut(size.width)
                .zip(map_y.par_chunks_mut(size.width))
                .enumerate()
                .for_each(|(v, (row_x, row_y))| {
                    for (u, (mx, my)) in row_x.iter_mut().zip(row_y.iter_mut()).enumerate() {
                        let ray = inv * Vector3::new(u as f64, v as f64, 1.0);
                        let (sx, sy) = if ray.z.abs() > f64::EPSILON {
                            let d = camera.distort_normalized(Point2::new(
                                ray.x / ray.z,
                                ray.y / ray.z,
                            ));
                            let px = camera.intrinsics.to_pixel(d);
                            (px.x, px.y)
                        } else {
                            (-1.0, -1.0)
                        };
                        *mx = sx as f32;
                        *my = sy as f32;
                    }
                });
        }

        Ok(Self {
            width: size.width,
            height: size.height,
            source_size: camera.image_size,
            map_x,
            map_y,
        })
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }

    /// Source coordinates sampled by destination pixel `(x, y)`.
    #[inline]
    pub fn lookup(&self, x: usize, y: usize) -> (f32, f32) {
        let i = y * self.width + x;
        (self.map_x[i], self.map_y[i])
    }

    fn check_source(&self, size: ImageSize, well_formed: bool) -> Result<(), RectifyError> {
        if !well_formed {
            return Err(RectifyError::Configuration(format!(
                "source buffer does not match its {}x{} size",
                size.width, size.height
            )));
        }
        if size != self.source_size {
            return Err(RectifyError::SizeMismatch {
                expected_width: self.source_size.width,
                expected_height: self.source_size.height,
                actual_width: size.width,
                actual_height: size.height,
            });
        }
        Ok(())
    }

    /// Resample a grayscale image; pixels mapping outside the source are 0.
    pub fn remap_gray(&self, src: &GrayImageView<'_>) -> Result<GrayImage, RectifyError> {
        self.check_source(src.size(), src.is_well_formed())?;
        let mut out = GrayImage::new(self.width, self.height);
        if self.width == 0 {
            return Ok(out);
        }
        out.data
            .par_chunks_mut(self.width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, px) in row.iter_mut().enumerate() {
                    let (sx, sy) = self.lookup(x, y);
                    *px = sample_bilinear_u8(src, sx, sy);
                }
            });
        Ok(out)
    }

    /// Resample an RGB image; pixels mapping outside the source are black.
    pub fn remap_rgb(&self, src: &RgbImageView<'_>) -> Result<RgbImage, RectifyError> {
        self.check_source(ImageSize::new(src.width, src.height), src.is_well_formed())?;
        let mut out = RgbImage::new(self.width, self.height);
        if self.width == 0 {
            return Ok(out);
        }
        out.data
            .par_chunks_mut(self.width * 3)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, px) in row.chunks_exact_mut(3).enumerate() {
                    let (sx, sy) = self.lookup(x, y);
                    px.copy_from_slice(&sample_bilinear_rgb(src, sx, sy));
                }
            });
        Ok(out)
    }
}

/// Remap tables for both cameras of a rectified rig.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RectifyMaps {
    pub left: RemapTable,
    pub right: RemapTable,
}

impl RectifyMaps {
    pub fn new(
        left: &CameraModel,
        right: &CameraModel,
        rectification: &Rectification,
    ) -> Result<Self, RectifyError> {
        let t = &rectification.transform;
        let p1 = RectificationTransform::new_camera_matrix(&t.p1);
        let p2 = RectificationTransform::new_camera_matrix(&t.p2);
        Ok(Self {
            left: RemapTable::build(left, &t.r1, &p1, t.image_size)?,
            right: RemapTable::build(right, &t.r2, &p2, t.image_size)?,
        })
    }

    /// Rectify a grayscale pair.
    pub fn rectify_pair(
        &self,
        left: &GrayImageView<'_>,
        right: &GrayImageView<'_>,
    ) -> Result<(GrayImage, GrayImage), RectifyError> {
        Ok((self.left.remap_gray(left)?, self.right.remap_gray(right)?))
    }

    /// Rectify a colour pair.
    pub fn rectify_pair_rgb(
        &self,
        left: &RgbImageView<'_>,
        right: &RgbImageView<'_>,
    ) -> Result<(RgbImage, RgbImage), RectifyError> {
        Ok((self.left.remap_rgb(left)?, self.right.remap_rgb(right)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stereo_rig_core::{Distortion, Intrinsics};

    fn pinhole(w: usize, h: usize) -> CameraModel {
        CameraModel::new(
            Intrinsics::new(100.0, 100.0, (w as f64 - 1.0) / 2.0, (h as f64 - 1.0) / 2.0),
            Distortion::none(),
            ImageSize::new(w, h),
        )
    }

    #[test]
    fn identity_table_leaves_image_unchanged() {
        let cam = pinhole(17, 11);
        let k = cam.camera_matrix();
        let table = RemapTable::build(&cam, &Matrix3::identity(), &k, cam.image_size).unwrap();
        let img = GrayImage::from_fn(17, 11, |x, y| (x * 13 + y * 7) as u8);
        let out = table.remap_gray(&img.view()).unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn shifted_principal_point_translates_content() {
        let cam = pinhole(20, 10);
        let mut k = cam.camera_matrix();
        k[(0, 2)] += 2.0;
        let table = RemapTable::build(&cam, &Matrix3::identity(), &k, cam.image_size).unwrap();
        let img = GrayImage::from_fn(20, 10, |x, _| (x * 10) as u8);
        let out = table.remap_gray(&img.view()).unwrap();
        assert_eq!(out.get(5, 4), img.get(3, 4));
        // left border samples outside the source
        assert_eq!(out.get(0, 4), 0);
    }

    #[test]
    fn wrong_source_size_is_rejected() {
        let cam = pinhole(16, 12);
        let k = cam.camera_matrix();
        let table = RemapTable::build(&cam, &Matrix3::identity(), &k, cam.image_size).unwrap();
        let img = GrayImage::new(8, 8);
        assert!(matches!(
            table.remap_gray(&img.view()),
            Err(RectifyError::SizeMismatch { actual_width: 8, .. })
        ));
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        let cam = pinhole(16, 12);
        let k = cam.camera_matrix();
        let table = RemapTable::build(&cam, &Matrix3::identity(), &k, cam.image_size).unwrap();
        let bytes = vec![0u8; 16 * 11];
        let gray = GrayImageView {
            width: 16,
            height: 12,
            data: &bytes,
        };
        assert!(matches!(
            table.remap_gray(&gray),
            Err(RectifyError::Configuration(_))
        ));
        let rgb = RgbImageView {
            width: 16,
            height: 12,
            data: &bytes,
        };
        assert!(matches!(
            table.remap_rgb(&rgb),
            Err(RectifyError::Configuration(_))
        ));
    }

    #[test]
    fn rgb_remap_keeps_channels() {
        let cam = pinhole(6, 5);
        let k = cam.camera_matrix();
        let table = RemapTable::build(&cam, &Matrix3::identity(), &k, cam.image_size).unwrap();
        let data: Vec<u8> = (0..6 * 5).flat_map(|i| [i as u8, 100, 200]).collect();
        let img = RgbImage::from_raw(6, 5, data).unwrap();
        let out = table.remap_rgb(&img.view()).unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn singular_camera_matrix_is_degenerate() {
        let cam = pinhole(8, 8);
        assert!(matches!(
            RemapTable::build(&cam, &Matrix3::identity(), &Matrix3::zeros(), cam.image_size),
            Err(RectifyError::GeometryDegenerate(_))
        ));
    }
}
