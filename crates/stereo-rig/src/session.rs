//! Incremental calibration of a stereo rig from detector output.

use log::{info, warn};
use nalgebra::Point2;
use stereo_rig_calib::{
    calibrate_intrinsics, calibrate_stereo, CalibrationError, IntrinsicCalibration,
    IntrinsicCalibrationParams, StereoCalibration, StereoCalibrationParams,
};
use stereo_rig_core::{Correspondence, GrayImageView, ImageSize, PatternSize};
use stereo_rig_rectify::{stereo_rectify, Rectification, RectifyParams};

use crate::{CalibrationReport, PipelineError};

/// Finds the inner corners of a planar pattern.
///
/// Implementations return the image points in the pattern's raster order
/// (x fastest), or `None` when the pattern is not visible.
pub trait PatternDetector {
    fn detect(&self, image: &GrayImageView<'_>, pattern: PatternSize) -> Option<Vec<Point2<f64>>>;
}

impl<F> PatternDetector for F
where
    F: Fn(&GrayImageView<'_>, PatternSize) -> Option<Vec<Point2<f64>>>,
{
    fn detect(&self, image: &GrayImageView<'_>, pattern: PatternSize) -> Option<Vec<Point2<f64>>> {
        self(image, pattern)
    }
}

/// Accumulates stereo views, then runs per-camera calibration, stereo
/// calibration and rectification in that order.
///
/// A capture is kept only when the pattern was found in both images; the
/// indices of dropped captures are available from [`Self::dropped_views`].
#[derive(Clone, Debug)]
pub struct CalibrationSession {
    pattern: PatternSize,
    square_size: f64,
    image_size: Option<ImageSize>,
    left_views: Vec<Correspondence>,
    right_views: Vec<Correspondence>,
    dropped: Vec<usize>,
    captures: usize,
    left: Option<IntrinsicCalibration>,
    right: Option<IntrinsicCalibration>,
    stereo: Option<StereoCalibration>,
    rectification: Option<Rectification>,
}

impl CalibrationSession {
    pub fn new(pattern: PatternSize, square_size: f64) -> Result<Self, CalibrationError> {
        if pattern.cols < 2 || pattern.rows < 2 {
            return Err(CalibrationError::Configuration(format!(
                "pattern must have at least 2x2 points, got {}x{}",
                pattern.cols, pattern.rows
            )));
        }
        if !(square_size.is_finite() && square_size > 0.0) {
            return Err(CalibrationError::Configuration(format!(
                "square size must be positive, got {square_size}"
            )));
        }
        Ok(Self {
            pattern,
            square_size,
            image_size: None,
            left_views: Vec::new(),
            right_views: Vec::new(),
            dropped: Vec::new(),
            captures: 0,
            left: None,
            right: None,
            stereo: None,
            rectification: None,
        })
    }

    pub fn pattern(&self) -> PatternSize {
        self.pattern
    }

    pub fn image_size(&self) -> Option<ImageSize> {
        self.image_size
    }

    /// Number of kept stereo views.
    pub fn view_count(&self) -> usize {
        self.left_views.len()
    }

    /// Capture indices where at least one camera missed the pattern.
    pub fn dropped_views(&self) -> &[usize] {
        &self.dropped
    }

    pub fn left_views(&self) -> &[Correspondence] {
        &self.left_views
    }

    pub fn right_views(&self) -> &[Correspondence] {
        &self.right_views
    }

    /// Run `detector` on a stereo capture and keep it if both sides see
    /// the pattern. Returns whether the capture was kept.
    pub fn add_pair<D: PatternDetector + ?Sized>(
        &mut self,
        detector: &D,
        left: &GrayImageView<'_>,
        right: &GrayImageView<'_>,
    ) -> Result<bool, CalibrationError> {
        if left.size() != right.size() {
            return Err(CalibrationError::Configuration(format!(
                "capture {}: left image is {}x{}, right image is {}x{}",
                self.captures, left.width, left.height, right.width, right.height
            )));
        }
        let l = detector.detect(left, self.pattern);
        let r = detector.detect(right, self.pattern);
        self.add_detections(left.size(), l, r)
    }

    /// Record one capture from precomputed detections.
    pub fn add_detections(
        &mut self,
        image_size: ImageSize,
        left: Option<Vec<Point2<f64>>>,
        right: Option<Vec<Point2<f64>>>,
    ) -> Result<bool, CalibrationError> {
        match self.image_size {
            None if image_size.area() == 0 => {
                return Err(CalibrationError::Configuration("image size is empty".into()));
            }
            None => self.image_size = Some(image_size),
            Some(size) if size != image_size => {
                return Err(CalibrationError::Configuration(format!(
                    "capture {} is {}x{}, earlier captures are {}x{}",
                    self.captures, image_size.width, image_size.height, size.width, size.height
                )));
            }
            Some(_) => {}
        }

        let view = self.captures;
        self.captures += 1;
        let (Some(left), Some(right)) = (left, right) else {
            warn!(
                "dropping capture: {}",
                CalibrationError::PatternNotFound { view }
            );
            self.dropped.push(view);
            return Ok(false);
        };
        let l = self.correspondence(view, left)?;
        let r = self.correspondence(view, right)?;
        self.left_views.push(l);
        self.right_views.push(r);
        Ok(true)
    }

    fn correspondence(
        &self,
        view: usize,
        points: Vec<Point2<f64>>,
    ) -> Result<Correspondence, CalibrationError> {
        Correspondence::new(self.pattern.object_points(self.square_size), points)
            .map_err(|source| CalibrationError::InvalidView { view, source })
    }

    fn calibrate_camera(
        &self,
        views: &[Correspondence],
        params: &IntrinsicCalibrationParams,
        side: &str,
    ) -> Result<IntrinsicCalibration, CalibrationError> {
        let size = self.image_size.ok_or_else(|| CalibrationError::CalibrationFailure {
            reason: "no views recorded".into(),
            views: 0,
        })?;
        let calib = calibrate_intrinsics(views, size, params)?;
        info!(
            "{side} camera: rms {:.4} px over {} views",
            calib.rms_error,
            views.len()
        );
        Ok(calib)
    }

    pub fn calibrate_left(
        &mut self,
        params: &IntrinsicCalibrationParams,
    ) -> Result<&IntrinsicCalibration, CalibrationError> {
        let calib = self.calibrate_camera(&self.left_views, params, "left")?;
        self.stereo = None;
        self.rectification = None;
        Ok(self.left.insert(calib))
    }

    pub fn calibrate_right(
        &mut self,
        params: &IntrinsicCalibrationParams,
    ) -> Result<&IntrinsicCalibration, CalibrationError> {
        let calib = self.calibrate_camera(&self.right_views, params, "right")?;
        self.stereo = None;
        self.rectification = None;
        Ok(self.right.insert(calib))
    }

    /// Needs both cameras calibrated first.
    pub fn calibrate_stereo(
        &mut self,
        params: &StereoCalibrationParams,
    ) -> Result<&StereoCalibration, CalibrationError> {
        let (Some(left), Some(right)) = (&self.left, &self.right) else {
            let missing = if self.left.is_none() { "left" } else { "right" };
            return Err(CalibrationError::StereoCalibrationFailure {
                reason: format!("{missing} camera is not calibrated"),
            });
        };
        let stereo = calibrate_stereo(
            &self.left_views,
            &self.right_views,
            &left.model,
            &right.model,
            params,
        )?;
        info!(
            "stereo: rms {:.4} px, epipolar error {:.4} px, baseline {:.4}",
            stereo.rms_error,
            stereo.epipolar_error,
            stereo.model.translation.norm()
        );
        self.rectification = None;
        Ok(self.stereo.insert(stereo))
    }

    pub fn rectify(&mut self, params: &RectifyParams) -> Result<&Rectification, PipelineError> {
        let stereo = self
            .stereo
            .as_ref()
            .ok_or_else(|| CalibrationError::StereoCalibrationFailure {
                reason: "rig is not calibrated".into(),
            })?;
        let rect = stereo_rectify(&stereo.model, params)?;
        Ok(self.rectification.insert(rect))
    }

    pub fn left_calibration(&self) -> Option<&IntrinsicCalibration> {
        self.left.as_ref()
    }

    pub fn right_calibration(&self) -> Option<&IntrinsicCalibration> {
        self.right.as_ref()
    }

    pub fn stereo_calibration(&self) -> Option<&StereoCalibration> {
        self.stereo.as_ref()
    }

    pub fn rectification(&self) -> Option<&Rectification> {
        self.rectification.as_ref()
    }

    /// Collect the results once every step has run.
    pub fn into_report(self) -> Result<CalibrationReport, PipelineError> {
        match (self.left, self.right, self.stereo, self.rectification) {
            (Some(left), Some(right), Some(stereo), Some(rectification)) => {
                Ok(CalibrationReport {
                    left,
                    right,
                    stereo,
                    rectification,
                })
            }
            _ => Err(PipelineError::Configuration(
                "calibration session is incomplete".into(),
            )),
        }
    }
}
