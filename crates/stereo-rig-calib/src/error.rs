use stereo_rig_core::{CorrespondenceError, LmError};
use thiserror::Error;

/// Errors produced by the calibrators.
///
/// `PatternNotFound` is per view and recoverable (callers drop the view);
/// everything else aborts the enclosing calibration call.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("calibration pattern not found in view {view}")]
    PatternNotFound { view: usize },
    #[error("calibration failed ({views} views): {reason}")]
    CalibrationFailure { reason: String, views: usize },
    #[error("stereo calibration failed: {reason}")]
    StereoCalibrationFailure { reason: String },
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("view {view}: {source}")]
    InvalidView {
        view: usize,
        #[source]
        source: CorrespondenceError,
    },
    #[error("degenerate geometry: {0}")]
    GeometryDegenerate(String),
    #[error("solver error: {0}")]
    Solver(#[from] LmError),
}

impl CalibrationError {
    pub(crate) fn failure(reason: impl Into<String>, views: usize) -> Self {
        Self::CalibrationFailure {
            reason: reason.into(),
            views,
        }
    }
}
