//! Single-camera calibration from planar pattern views.

use log::{debug, info, warn};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use stereo_rig_core::{
    estimate_homography, CameraModel, Convergence, Correspondence, Distortion, ImageSize,
    LeastSquaresProblem, LevenbergMarquardt, LmParams, Pose,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::init::{initial_intrinsics, pose_from_normalized_homography, view_homography};
use crate::layout::{pack_poses, unpack_poses, CameraLayout, FocalMode};
use crate::params::IntrinsicCalibrationParams;
use crate::problem::{PerViewProblem, ViewModel};
use crate::CalibrationError;

const PLANAR_TOLERANCE: f64 = 1e-9;

/// Result of [`calibrate_intrinsics`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntrinsicCalibration {
    pub model: CameraModel,
    /// One pose per input view, pattern to camera.
    pub poses: Vec<Pose>,
    /// RMS pixel distance between observed and re-projected points,
    /// recomputed from the final model.
    pub rms_error: f64,
    pub per_view_errors: Vec<f64>,
    /// Final solver cost `½‖r‖²`.
    pub optimizer_cost: f64,
    /// Residual evaluations spent by the solver.
    pub iterations: usize,
    pub convergence: Convergence,
}

impl IntrinsicCalibration {
    /// The solver stopped at its iteration cap.
    pub fn is_degraded(&self) -> bool {
        self.convergence != Convergence::Converged
    }
}

/// Append `projected - observed` for every point of `view`.
pub(crate) fn push_view_residuals(
    camera: &CameraModel,
    pose: &Pose,
    view: &Correspondence,
    out: &mut Vec<f64>,
) {
    for (obj, img) in view.iter() {
        let p = camera.project(pose, obj);
        out.push(p.x - img.x);
        out.push(p.y - img.y);
    }
}

struct IntrinsicViews<'a> {
    layout: &'a CameraLayout,
    views: &'a [Correspondence],
}

impl ViewModel for IntrinsicViews<'_> {
    type Globals = CameraModel;

    fn num_globals(&self) -> usize {
        self.layout.len()
    }

    fn num_views(&self) -> usize {
        self.views.len()
    }

    fn view_residual_count(&self, view: usize) -> usize {
        2 * self.views[view].len()
    }

    fn decode(&self, globals: &[f64]) -> CameraModel {
        self.layout.unpack(globals, None)
    }

    fn view_residuals(&self, camera: &CameraModel, view: usize, pose: &Pose, out: &mut Vec<f64>) {
        push_view_residuals(camera, pose, &self.views[view], out);
    }
}

struct PoseProblem<'a> {
    camera: &'a CameraModel,
    view: &'a Correspondence,
}

impl LeastSquaresProblem for PoseProblem<'_> {
    fn num_residuals(&self) -> usize {
        2 * self.view.len()
    }

    fn residuals(&self, params: &DVector<f64>) -> DVector<f64> {
        let pose = Pose::from_params(params.as_slice());
        let mut out = Vec::with_capacity(self.num_residuals());
        push_view_residuals(self.camera, &pose, self.view, &mut out);
        DVector::from_vec(out)
    }
}

pub(crate) fn check_view(view: &Correspondence, index: usize) -> Result<(), CalibrationError> {
    if view.len() < 4 {
        return Err(CalibrationError::failure(
            format!("view {index} has {} points, at least 4 are required", view.len()),
            index + 1,
        ));
    }
    if !view.is_planar(PLANAR_TOLERANCE) {
        return Err(CalibrationError::Configuration(format!(
            "view {index}: pattern points must lie on the z = 0 plane"
        )));
    }
    Ok(())
}

/// Pose of a planar pattern seen by a calibrated camera.
///
/// Linear estimate from the homography to undistorted normalized
/// coordinates, refined by minimising the reprojection error of this view.
pub fn solve_planar_pose(
    camera: &CameraModel,
    view: &Correspondence,
) -> Result<Pose, CalibrationError> {
    check_view(view, 0)?;
    let normalized: Vec<_> = view
        .image_points()
        .iter()
        .map(|p| camera.undistort_normalized(*p))
        .collect();
    let h = estimate_homography(&view.plane_points(), &normalized).ok_or_else(|| {
        CalibrationError::GeometryDegenerate("pattern points are collinear".into())
    })?;
    let initial = pose_from_normalized_homography(&h.h).ok_or_else(|| {
        CalibrationError::GeometryDegenerate("homography does not decompose into a pose".into())
    })?;

    let problem = PoseProblem { camera, view };
    let report = LevenbergMarquardt::new(LmParams::with_criteria(20, 1e-10))
        .minimize(&problem, DVector::from_row_slice(&initial.to_params()))?;
    Ok(Pose::from_params(report.params.as_slice()))
}

/// Per-view RMS reprojection error of `camera` with the given poses.
pub fn reprojection_errors(
    camera: &CameraModel,
    poses: &[Pose],
    views: &[Correspondence],
) -> Vec<f64> {
    views
        .iter()
        .zip(poses)
        .map(|(view, pose)| {
            let mut r = Vec::with_capacity(2 * view.len());
            push_view_residuals(camera, pose, view, &mut r);
            (r.iter().map(|v| v * v).sum::<f64>() / view.len() as f64).sqrt()
        })
        .collect()
}

/// Overall RMS from per-view RMS values weighted by point count.
pub(crate) fn combined_rms(per_view: &[f64], views: &[Correspondence]) -> f64 {
    let (sum, count) = per_view
        .iter()
        .zip(views)
        .fold((0.0, 0usize), |(s, c), (e, v)| {
            (s + e * e * v.len() as f64, c + v.len())
        });
    if count == 0 {
        0.0
    } else {
        (sum / count as f64).sqrt()
    }
}

/// Estimate intrinsics, distortion and one pose per view.
///
/// Views must be planar (z = 0) with at least four points each; fewer than
/// `params.min_views` views is a [`CalibrationError::CalibrationFailure`].
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(views = views.len()))
)]
pub fn calibrate_intrinsics(
    views: &[Correspondence],
    image_size: ImageSize,
    params: &IntrinsicCalibrationParams,
) -> Result<IntrinsicCalibration, CalibrationError> {
    params.validate()?;
    if image_size.area() == 0 {
        return Err(CalibrationError::Configuration(format!(
            "image size {}x{} is empty",
            image_size.width, image_size.height
        )));
    }
    if views.len() < params.min_views {
        return Err(CalibrationError::failure(
            format!("at least {} views are required", params.min_views),
            views.len(),
        ));
    }
    for (i, view) in views.iter().enumerate() {
        check_view(view, i)?;
    }

    let initial = match (&params.initial_guess, params.use_intrinsic_guess) {
        (Some(guess), true) => CameraModel::new(guess.intrinsics, guess.distortion, image_size),
        _ => {
            let homographies = views
                .iter()
                .enumerate()
                .map(|(i, v)| view_homography(v, i))
                .collect::<Result<Vec<_>, _>>()?;
            let aspect = params.fix_aspect_ratio.then_some(1.0);
            let mut k = initial_intrinsics(&homographies, image_size, aspect)?;
            if params.fix_principal_point {
                let (cx, cy) = image_size.center();
                k.cx = cx;
                k.cy = cy;
            }
            CameraModel::new(k, Distortion::none(), image_size)
        }
    };

    let focal = if params.fix_aspect_ratio {
        FocalMode::FixedAspect(initial.intrinsics.fx / initial.intrinsics.fy)
    } else {
        FocalMode::Free
    };
    let layout = CameraLayout::new(
        initial,
        focal,
        params.fix_principal_point,
        &params.distortion,
    );

    let poses = views
        .iter()
        .enumerate()
        .map(|(i, v)| {
            solve_planar_pose(layout.base(), v).map_err(|e| match e {
                CalibrationError::GeometryDegenerate(msg) => {
                    CalibrationError::GeometryDegenerate(format!("view {i}: {msg}"))
                }
                other => other,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut x0 = Vec::with_capacity(layout.len() + 6 * poses.len());
    layout.pack(&mut x0);
    pack_poses(&poses, &mut x0);
    debug!(
        "intrinsic calibration: {} views, {} parameters",
        views.len(),
        x0.len()
    );

    let model_views = IntrinsicViews {
        layout: &layout,
        views,
    };
    let problem = PerViewProblem::new(&model_views);
    let report = LevenbergMarquardt::new(params.lm_params())
        .minimize(&problem, DVector::from_vec(x0))
        .map_err(|e| CalibrationError::failure(e.to_string(), views.len()))?;

    let n_cam = layout.len();
    let model = layout.unpack(&report.params.as_slice()[..n_cam], None);
    if !model.intrinsics.is_valid() {
        return Err(CalibrationError::failure(
            format!("solver diverged to {:?}", model.intrinsics),
            views.len(),
        ));
    }
    let poses = unpack_poses(&report.params.as_slice()[n_cam..]);

    let per_view_errors = reprojection_errors(&model, &poses, views);
    let rms_error = combined_rms(&per_view_errors, views);

    if report.convergence != Convergence::Converged {
        warn!(
            "intrinsic calibration ran out of evaluations ({}); result is degraded, rms {:.4} px",
            report.iterations, rms_error
        );
    }
    info!(
        "intrinsic calibration: rms {:.4} px over {} views (fx={:.2}, fy={:.2}, cx={:.2}, cy={:.2})",
        rms_error,
        views.len(),
        model.intrinsics.fx,
        model.intrinsics.fy,
        model.intrinsics.cx,
        model.intrinsics.cy
    );

    Ok(IntrinsicCalibration {
        model,
        poses,
        rms_error,
        per_view_errors,
        optimizer_cost: report.cost,
        iterations: report.iterations,
        convergence: report.convergence,
    })
}
