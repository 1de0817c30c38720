//! End-to-end helpers: detections to calibration report, image pair to
//! point cloud.

use std::borrow::Cow;

use log::{info, warn};
use stereo_rig_cloud::{reconstruct, PointCloud};
use stereo_rig_core::{ColorView, GrayImage, ImageSize, RgbImage};
use stereo_rig_rectify::{RectifyMaps, RemapTable};
use stereo_rig_sgm::{DisparityMap, SgmMatcher};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{CalibrationReport, CalibrationSession, PipelineError, StereoRigConfig, ViewSet};

/// Owned 8-bit image in either of the supported layouts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ColorImage {
    Gray(GrayImage),
    Rgb(RgbImage),
}

impl ColorImage {
    pub fn view(&self) -> ColorView<'_> {
        match self {
            ColorImage::Gray(img) => ColorView::Gray(img.view()),
            ColorImage::Rgb(img) => ColorView::Rgb(img.view()),
        }
    }

    pub fn size(&self) -> ImageSize {
        self.view().size()
    }

    /// Luma with the BT.601 weights; grayscale input is copied.
    pub fn to_gray(&self) -> GrayImage {
        match self {
            ColorImage::Gray(img) => img.clone(),
            ColorImage::Rgb(img) => {
                let view = img.view();
                GrayImage::from_fn(img.width, img.height, |x, y| {
                    let [r, g, b] = view.get(x, y);
                    let l = 299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b);
                    ((l + 500) / 1000) as u8
                })
            }
        }
    }

    fn remap(&self, table: &RemapTable) -> Result<Self, PipelineError> {
        Ok(match self {
            ColorImage::Gray(img) => ColorImage::Gray(table.remap_gray(&img.view())?),
            ColorImage::Rgb(img) => ColorImage::Rgb(table.remap_rgb(&img.view())?),
        })
    }
}

/// Output of [`reconstruct_pair`].
#[derive(Clone, Debug)]
pub struct Reconstruction {
    pub disparity: DisparityMap,
    pub cloud: PointCloud,
}

/// Calibrate both cameras and the rig from a set of detections, then
/// rectify.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(captures = views.views.len()))
)]
pub fn calibrate_rig(
    views: &ViewSet,
    config: &StereoRigConfig,
) -> Result<CalibrationReport, PipelineError> {
    let mut session = CalibrationSession::new(config.pattern, config.square_size)?;
    for pair in &views.views {
        session.add_detections(views.image_size, pair.left.clone(), pair.right.clone())?;
    }
    info!(
        "{} of {} captures usable",
        session.view_count(),
        views.views.len()
    );

    if session.calibrate_left(&config.intrinsic)?.is_degraded() {
        warn!("left camera calibration hit the iteration limit");
    }
    if session.calibrate_right(&config.intrinsic)?.is_degraded() {
        warn!("right camera calibration hit the iteration limit");
    }
    if session.calibrate_stereo(&config.stereo)?.is_degraded() {
        warn!("stereo calibration hit the iteration limit");
    }
    session.rectify(&config.rectify)?;
    session.into_report()
}

/// Match a stereo pair and back-project it into a colored point cloud.
///
/// With `rectified == false` the pair is first warped with the report's
/// rectification; otherwise it must already have the rectified size.
/// Colors come from the (rectified) left image.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(rectified = rectified))
)]
pub fn reconstruct_pair(
    report: &CalibrationReport,
    left: &ColorImage,
    right: &ColorImage,
    config: &StereoRigConfig,
    rectified: bool,
) -> Result<Reconstruction, PipelineError> {
    for (side, img) in [("left", left), ("right", right)] {
        if !img.view().is_well_formed() {
            return Err(PipelineError::Configuration(format!(
                "{side} image buffer does not match its size"
            )));
        }
    }
    let transform = &report.rectification.transform;
    let (left, right) = if rectified {
        (Cow::Borrowed(left), Cow::Borrowed(right))
    } else {
        let model = &report.stereo.model;
        let maps = RectifyMaps::new(&model.left, &model.right, &report.rectification)?;
        (
            Cow::Owned(left.remap(&maps.left)?),
            Cow::Owned(right.remap(&maps.right)?),
        )
    };
    for img in [&*left, &*right] {
        let size = img.size();
        if size != transform.image_size {
            return Err(PipelineError::Configuration(format!(
                "image is {}x{}, rectified size is {}x{}",
                size.width, size.height, transform.image_size.width, transform.image_size.height
            )));
        }
    }

    let matcher = SgmMatcher::new(config.sgm.clone())?;
    let disparity = matcher.compute(&left.to_gray().view(), &right.to_gray().view())?;
    let cloud = reconstruct(&disparity, transform, left.view(), &config.reconstruct)?;
    Ok(Reconstruction { disparity, cloud })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn luma_weights() {
        let mut rgb = RgbImage::new(2, 1);
        rgb.data.copy_from_slice(&[255, 0, 0, 10, 20, 30]);
        let gray = ColorImage::Rgb(rgb).to_gray();
        // 0.299 * 255 = 76.2; 2.99 + 11.74 + 3.42 = 18.15
        assert_eq!(gray.data, vec![76, 18]);
    }
}
