//! Camera and stereo-rig calibration from planar pattern correspondences.
//!
//! Pipeline:
//! 1. per camera, [`calibrate_intrinsics`]: closed-form focal estimate from
//!    per-view homographies, homography pose decomposition, then a joint
//!    Levenberg–Marquardt refinement of intrinsics, distortion and poses;
//! 2. [`calibrate_stereo`]: median relative pose as a start, then joint
//!    refinement of left poses, the relative pose and (optionally) both
//!    cameras;
//! 3. quality metrics are recomputed from the final models: RMS
//!    reprojection error and the symmetric [`epipolar_error`].
//!
//! Pattern detection is not part of this crate; inputs are
//! [`stereo_rig_core::Correspondence`] lists, one per accepted view.

mod epipolar;
mod error;
mod init;
mod intrinsic;
mod layout;
mod params;
mod problem;
mod stereo;

pub use epipolar::{epipolar_error, essential_matrix, fundamental_matrix, StereoModel};
pub use error::CalibrationError;
pub use intrinsic::{calibrate_intrinsics, reprojection_errors, solve_planar_pose, IntrinsicCalibration};
pub use params::{DistortionParams, IntrinsicCalibrationParams, StereoCalibrationParams};
pub use stereo::{calibrate_stereo, relative_pose, StereoCalibration};
