use stereo_rig_calib::CalibrationError;
use stereo_rig_cloud::ReconstructError;
use stereo_rig_rectify::RectifyError;
use stereo_rig_sgm::MatchError;

use crate::io::IoError;

/// Errors produced by the end-to-end helpers in this crate.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error(transparent)]
    Rectify(#[from] RectifyError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    Reconstruct(#[from] ReconstructError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error("invalid input: {0}")]
    Configuration(String),
}
