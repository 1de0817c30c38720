//! Joint calibration of a two-camera rig.

use log::{debug, info, warn};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use stereo_rig_core::{CameraModel, Convergence, Correspondence, LevenbergMarquardt, Pose};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::epipolar::{epipolar_error, StereoModel};
use crate::intrinsic::{
    calibrate_intrinsics, check_view, combined_rms, push_view_residuals, reprojection_errors,
    solve_planar_pose,
};
use crate::layout::{pack_poses, unpack_poses, CameraLayout, FocalMode};
use crate::params::StereoCalibrationParams;
use crate::problem::{PerViewProblem, ViewModel, POSE_LEN};
use crate::CalibrationError;

const MIN_BASELINE: f64 = 1e-9;

/// Result of [`calibrate_stereo`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StereoCalibration {
    pub model: StereoModel,
    /// Pattern poses in the left camera, one per view pair.
    pub left_poses: Vec<Pose>,
    /// RMS reprojection error over both cameras.
    pub rms_error: f64,
    /// Mean symmetric point-to-epiline distance, see [`epipolar_error`].
    pub epipolar_error: f64,
    pub optimizer_cost: f64,
    /// Residual evaluations spent by the solver.
    pub iterations: usize,
    pub convergence: Convergence,
}

impl StereoCalibration {
    pub fn is_degraded(&self) -> bool {
        self.convergence != Convergence::Converged
    }
}

struct StereoViews<'a> {
    left_layout: &'a CameraLayout,
    right_layout: &'a CameraLayout,
    left: &'a [Correspondence],
    right: &'a [Correspondence],
}

struct StereoGlobals {
    left: CameraModel,
    right: CameraModel,
    right_from_left: Pose,
}

impl ViewModel for StereoViews<'_> {
    type Globals = StereoGlobals;

    fn num_globals(&self) -> usize {
        self.left_layout.len() + self.right_layout.len() + POSE_LEN
    }

    fn num_views(&self) -> usize {
        self.left.len()
    }

    fn view_residual_count(&self, view: usize) -> usize {
        2 * (self.left[view].len() + self.right[view].len())
    }

    fn decode(&self, g: &[f64]) -> StereoGlobals {
        let nl = self.left_layout.len();
        let nr = self.right_layout.len();
        let left = self.left_layout.unpack(&g[..nl], None);
        let shared = Some((left.intrinsics.fx, left.intrinsics.fy));
        let right = self.right_layout.unpack(&g[nl..nl + nr], shared);
        let right_from_left = Pose::from_params(&g[nl + nr..nl + nr + POSE_LEN]);
        StereoGlobals {
            left,
            right,
            right_from_left,
        }
    }

    fn view_residuals(&self, g: &StereoGlobals, view: usize, pose: &Pose, out: &mut Vec<f64>) {
        push_view_residuals(&g.left, pose, &self.left[view], out);
        let right_pose = g.right_from_left.compose(pose);
        push_view_residuals(&g.right, &right_pose, &self.right[view], out);
    }
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    }
}

/// Per-component median of the per-view relative poses.
fn initial_relative_pose(left: &[Pose], right: &[Pose]) -> Pose {
    let mut comps: [Vec<f64>; POSE_LEN] = Default::default();
    for (pl, pr) in left.iter().zip(right) {
        let params = relative_pose(pl, pr).to_params();
        for (c, v) in comps.iter_mut().zip(params) {
            c.push(v);
        }
    }
    let mut med = [0.0; POSE_LEN];
    for (m, c) in med.iter_mut().zip(comps.iter_mut()) {
        *m = median(c);
    }
    Pose::from_params(&med)
}

fn check_alignment(
    left: &[Correspondence],
    right: &[Correspondence],
) -> Result<(), CalibrationError> {
    if left.len() != right.len() {
        return Err(CalibrationError::Configuration(format!(
            "left has {} views but right has {}; views must be index-aligned",
            left.len(),
            right.len()
        )));
    }
    if left.is_empty() {
        return Err(CalibrationError::failure("no views", 0));
    }
    for (i, (l, r)) in left.iter().zip(right).enumerate() {
        if l.len() != r.len() {
            return Err(CalibrationError::Configuration(format!(
                "view {i}: left has {} points but right has {}",
                l.len(),
                r.len()
            )));
        }
        if l.object_points() != r.object_points() {
            return Err(CalibrationError::Configuration(format!(
                "view {i}: left and right pattern points differ"
            )));
        }
        check_view(l, i)?;
        check_view(r, i)?;
    }
    Ok(())
}

/// Estimate the rig geometry from index-aligned views of both cameras.
///
/// `left_model` and `right_model` are starting points (or fixed values with
/// `fix_intrinsics`); see [`StereoCalibrationParams`] for what is refined.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(views = left.len()))
)]
pub fn calibrate_stereo(
    left: &[Correspondence],
    right: &[Correspondence],
    left_model: &CameraModel,
    right_model: &CameraModel,
    params: &StereoCalibrationParams,
) -> Result<StereoCalibration, CalibrationError> {
    params.validate()?;
    check_alignment(left, right)?;
    for (name, m) in [("left", left_model), ("right", right_model)] {
        if !m.intrinsics.is_valid() || m.image_size.area() == 0 {
            return Err(CalibrationError::Configuration(format!(
                "{name} camera model is invalid: {:?}",
                m.intrinsics
            )));
        }
    }

    let (left_init, right_init) = if params.use_intrinsic_guess || params.fix_intrinsics {
        (*left_model, *right_model)
    } else {
        let p = params.intrinsic_params();
        (
            calibrate_intrinsics(left, left_model.image_size, &p)?.model,
            calibrate_intrinsics(right, right_model.image_size, &p)?.model,
        )
    };

    let (left_layout, right_layout) = if params.fix_intrinsics {
        (
            CameraLayout::fixed(left_init),
            CameraLayout::fixed(right_init),
        )
    } else {
        let focal_of = |m: &CameraModel| {
            if params.fix_aspect_ratio {
                FocalMode::FixedAspect(m.intrinsics.fx / m.intrinsics.fy)
            } else {
                FocalMode::Free
            }
        };
        let right_focal = if params.same_focal_length {
            FocalMode::Shared
        } else {
            focal_of(&right_init)
        };
        (
            CameraLayout::new(
                left_init,
                focal_of(&left_init),
                params.fix_principal_point,
                &params.distortion,
            ),
            CameraLayout::new(
                right_init,
                right_focal,
                params.fix_principal_point,
                &params.distortion,
            ),
        )
    };

    let left_poses = left
        .iter()
        .map(|v| solve_planar_pose(left_layout.base(), v))
        .collect::<Result<Vec<_>, _>>()?;
    let right_poses = right
        .iter()
        .map(|v| solve_planar_pose(right_layout.base(), v))
        .collect::<Result<Vec<_>, _>>()?;
    let rt0 = initial_relative_pose(&left_poses, &right_poses);
    if rt0.translation.norm() < MIN_BASELINE {
        return Err(CalibrationError::GeometryDegenerate(
            "initial baseline is zero; both cameras see the pattern from the same point".into(),
        ));
    }
    debug!(
        "initial relative pose: rvec {:?}, t {:?}",
        rt0.rodrigues().as_slice(),
        rt0.translation.as_slice()
    );

    let mut x0 = Vec::new();
    left_layout.pack(&mut x0);
    right_layout.pack(&mut x0);
    x0.extend(rt0.to_params());
    pack_poses(&left_poses, &mut x0);

    let views = StereoViews {
        left_layout: &left_layout,
        right_layout: &right_layout,
        left,
        right,
    };
    let problem = PerViewProblem::new(&views);
    let report = LevenbergMarquardt::new(params.lm_params())
        .minimize(&problem, DVector::from_vec(x0))
        .map_err(|e| CalibrationError::failure(e.to_string(), left.len()))?;

    let ng = views.num_globals();
    let g = views.decode(&report.params.as_slice()[..ng]);
    let left_poses = unpack_poses(&report.params.as_slice()[ng..]);

    if g.right_from_left.translation.norm() < MIN_BASELINE {
        return Err(CalibrationError::GeometryDegenerate(
            "estimated baseline is zero".into(),
        ));
    }
    for (name, m) in [("left", &g.left), ("right", &g.right)] {
        if !m.intrinsics.is_valid() {
            return Err(CalibrationError::failure(
                format!("{name} intrinsics diverged to {:?}", m.intrinsics),
                left.len(),
            ));
        }
    }

    let model = StereoModel::new(
        g.left,
        g.right,
        g.right_from_left.rotation,
        g.right_from_left.translation,
    );

    // metrics come from the final model, not from solver state
    let right_poses: Vec<Pose> = left_poses
        .iter()
        .map(|p| g.right_from_left.compose(p))
        .collect();
    let mut errors = reprojection_errors(&model.left, &left_poses, left);
    errors.extend(reprojection_errors(&model.right, &right_poses, right));
    let all_views: Vec<Correspondence> = left.iter().chain(right).cloned().collect();
    let rms_error = combined_rms(&errors, &all_views);
    let epipolar = epipolar_error(&model, left, right);

    if report.convergence != Convergence::Converged {
        warn!(
            "stereo calibration ran out of evaluations ({}); result is degraded, rms {:.4} px",
            report.iterations, rms_error
        );
    }
    info!(
        "stereo calibration: rms {:.4} px, epipolar error {:.4} px, baseline {:.4}",
        rms_error,
        epipolar,
        model.baseline()
    );

    Ok(StereoCalibration {
        model,
        left_poses,
        rms_error,
        epipolar_error: epipolar,
        optimizer_cost: report.cost,
        iterations: report.iterations,
        convergence: report.convergence,
    })
}

/// `right ∘ left⁻¹`: maps left-camera coordinates into the right camera
/// given the pattern pose seen by each.
pub fn relative_pose(left: &Pose, right: &Pose) -> Pose {
    right.compose(&left.inverse())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Rotation3, Vector3};
    use stereo_rig_core::synthetic::{orbit_poses, stereo_views};
    use stereo_rig_core::{Distortion, ImageSize, Intrinsics, PatternSize};

    #[test]
    fn median_of_even_and_odd() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn mismatched_view_counts_are_a_configuration_error() {
        let cam = CameraModel::new(
            Intrinsics::new(700.0, 700.0, 320.0, 240.0),
            Distortion::none(),
            ImageSize::new(640, 480),
        );
        let pattern = PatternSize::new(5, 4);
        let poses = orbit_poses(3, pattern, 0.03, 0.6, 20.0);
        let rt = Pose::new(Rotation3::identity(), Vector3::new(-0.1, 0.0, 0.0));
        let (l, r) = stereo_views(&cam, &cam, &rt, &poses, pattern, 0.03).expect("views");
        let err = calibrate_stereo(&l, &r[..2], &cam, &cam, &Default::default()).unwrap_err();
        assert!(matches!(err, CalibrationError::Configuration(_)));
    }

    #[test]
    fn zero_baseline_is_degenerate() {
        let cam = CameraModel::new(
            Intrinsics::new(700.0, 700.0, 320.0, 240.0),
            Distortion::none(),
            ImageSize::new(640, 480),
        );
        let pattern = PatternSize::new(5, 4);
        let poses = orbit_poses(3, pattern, 0.03, 0.6, 20.0);
        let (l, r) = stereo_views(&cam, &cam, &Pose::identity(), &poses, pattern, 0.03)
            .expect("views");
        let err = calibrate_stereo(&l, &r, &cam, &cam, &Default::default()).unwrap_err();
        assert!(matches!(err, CalibrationError::GeometryDegenerate(_)));
    }
}
