use serde::{Deserialize, Serialize};
use stereo_rig_core::{CameraModel, LmParams};

use crate::CalibrationError;

/// Which lens distortion terms are estimated.
///
/// Fixed terms keep the value of the initial guess (zero without one);
/// `zero_tangent_dist` and a disabled rational model force their terms to 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistortionParams {
    /// Estimate `k4..k6` (the rational denominator).
    pub rational_model: bool,
    pub zero_tangent_dist: bool,
    pub fix_k1: bool,
    pub fix_k2: bool,
    pub fix_k3: bool,
    pub fix_k4: bool,
    pub fix_k5: bool,
    pub fix_k6: bool,
}

impl Default for DistortionParams {
    fn default() -> Self {
        Self {
            rational_model: true,
            zero_tangent_dist: false,
            fix_k1: false,
            fix_k2: false,
            fix_k3: false,
            fix_k4: true,
            fix_k5: true,
            fix_k6: false,
        }
    }
}

impl DistortionParams {
    /// Pure pinhole: every distortion term fixed.
    pub fn none() -> Self {
        Self {
            rational_model: false,
            zero_tangent_dist: true,
            fix_k1: true,
            fix_k2: true,
            fix_k3: true,
            fix_k4: true,
            fix_k5: true,
            fix_k6: true,
        }
    }

    /// The 5-term Brown–Conrady model with `k3` fixed.
    pub fn radial_tangential() -> Self {
        Self {
            rational_model: false,
            fix_k3: true,
            ..Self::default()
        }
    }

    /// Free mask in `[k1, k2, p1, p2, k3, k4, k5, k6]` order.
    pub fn free_mask(&self) -> [bool; 8] {
        let tangential = !self.zero_tangent_dist;
        let r = self.rational_model;
        [
            !self.fix_k1,
            !self.fix_k2,
            tangential,
            tangential,
            !self.fix_k3,
            r && !self.fix_k4,
            r && !self.fix_k5,
            r && !self.fix_k6,
        ]
    }

    /// Terms that must be exactly zero regardless of the guess.
    pub(crate) fn forced_zero(&self) -> [bool; 8] {
        let t = self.zero_tangent_dist;
        let r = !self.rational_model;
        [false, false, t, t, false, r, r, r]
    }
}

/// Parameters of the single-camera calibrator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntrinsicCalibrationParams {
    pub max_iterations: usize,
    pub epsilon: f64,
    /// Fewer accepted views is a `CalibrationFailure`.
    pub min_views: usize,
    pub fix_principal_point: bool,
    /// Keep `fx / fy` at its initial value (1 without a guess).
    pub fix_aspect_ratio: bool,
    /// Start from `initial_guess` instead of the closed-form estimate.
    pub use_intrinsic_guess: bool,
    pub initial_guess: Option<CameraModel>,
    pub distortion: DistortionParams,
}

impl Default for IntrinsicCalibrationParams {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            epsilon: 1e-5,
            min_views: 3,
            fix_principal_point: false,
            fix_aspect_ratio: false,
            use_intrinsic_guess: false,
            initial_guess: None,
            distortion: DistortionParams::default(),
        }
    }
}

impl IntrinsicCalibrationParams {
    pub fn lm_params(&self) -> LmParams {
        LmParams::with_criteria(self.max_iterations, self.epsilon)
    }

    pub fn validate(&self) -> Result<(), CalibrationError> {
        self.lm_params()
            .validate()
            .map_err(|e| CalibrationError::Configuration(e.to_string()))?;
        if self.min_views == 0 {
            return Err(CalibrationError::Configuration(
                "min_views must be at least 1".into(),
            ));
        }
        if self.use_intrinsic_guess {
            match &self.initial_guess {
                None => {
                    return Err(CalibrationError::Configuration(
                        "use_intrinsic_guess requires an initial_guess".into(),
                    ))
                }
                Some(guess) if !guess.intrinsics.is_valid() => {
                    return Err(CalibrationError::Configuration(format!(
                        "initial guess has invalid intrinsics {:?}",
                        guess.intrinsics
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// Parameters of the stereo calibrator. Defaults follow the usual
/// "refine from single-camera results" recipe: intrinsic guess, fixed
/// aspect ratio, shared focal length, no tangential distortion and the
/// rational model with `k3..k5` fixed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StereoCalibrationParams {
    pub max_iterations: usize,
    pub epsilon: f64,
    /// Only optimise poses and the relative transform.
    pub fix_intrinsics: bool,
    /// Start from the provided camera models. Without it each camera is
    /// recalibrated on its own views first.
    pub use_intrinsic_guess: bool,
    pub fix_principal_point: bool,
    pub fix_aspect_ratio: bool,
    /// Right camera uses the left camera's focal lengths.
    pub same_focal_length: bool,
    pub distortion: DistortionParams,
}

impl Default for StereoCalibrationParams {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            epsilon: 1e-5,
            fix_intrinsics: false,
            use_intrinsic_guess: true,
            fix_principal_point: false,
            fix_aspect_ratio: true,
            same_focal_length: true,
            distortion: DistortionParams {
                rational_model: true,
                zero_tangent_dist: true,
                fix_k1: false,
                fix_k2: false,
                fix_k3: true,
                fix_k4: true,
                fix_k5: true,
                fix_k6: false,
            },
        }
    }
}

impl StereoCalibrationParams {
    pub fn lm_params(&self) -> LmParams {
        LmParams::with_criteria(self.max_iterations, self.epsilon)
    }

    pub fn validate(&self) -> Result<(), CalibrationError> {
        self.lm_params()
            .validate()
            .map_err(|e| CalibrationError::Configuration(e.to_string()))
    }

    /// Single-camera parameters used when `use_intrinsic_guess` is off.
    pub fn intrinsic_params(&self) -> IntrinsicCalibrationParams {
        IntrinsicCalibrationParams {
            max_iterations: self.max_iterations,
            epsilon: self.epsilon,
            min_views: 1,
            fix_principal_point: self.fix_principal_point,
            fix_aspect_ratio: self.fix_aspect_ratio,
            use_intrinsic_guess: false,
            initial_guess: None,
            distortion: self.distortion,
        }
    }
}
