//! JSON configuration, view sets and calibration reports.

use std::fs;
use std::path::{Path, PathBuf};

use nalgebra::Point2;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use stereo_rig_calib::{
    IntrinsicCalibration, IntrinsicCalibrationParams, StereoCalibration, StereoCalibrationParams,
};
use stereo_rig_cloud::ReconstructParams;
use stereo_rig_core::{ImageSize, PatternSize};
use stereo_rig_rectify::{Rectification, RectifyParams};
use stereo_rig_sgm::SgmParams;

#[derive(thiserror::Error, Debug)]
pub enum IoError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[cfg(feature = "image")]
    #[error("{path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

pub(crate) fn io_error(path: &Path, source: std::io::Error) -> IoError {
    IoError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Read and deserialize a JSON file.
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, IoError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    serde_json::from_str(&raw).map_err(|source| IoError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Serialize `value` as pretty-printed JSON.
pub fn write_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<(), IoError> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(value).map_err(|source| IoError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(|e| io_error(path, e))
}

/// Parameters of every pipeline stage. Missing sections fall back to the
/// defaults, so a config file only needs the values it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StereoRigConfig {
    pub pattern: PatternSize,
    /// Spacing of the pattern points; depth comes out in this unit.
    pub square_size: f64,
    pub intrinsic: IntrinsicCalibrationParams,
    pub stereo: StereoCalibrationParams,
    pub rectify: RectifyParams,
    pub sgm: SgmParams,
    pub reconstruct: ReconstructParams,
}

impl Default for StereoRigConfig {
    fn default() -> Self {
        Self {
            pattern: PatternSize::new(9, 6),
            square_size: 1.0,
            intrinsic: IntrinsicCalibrationParams::default(),
            stereo: StereoCalibrationParams::default(),
            rectify: RectifyParams::default(),
            sgm: SgmParams::default(),
            reconstruct: ReconstructParams::default(),
        }
    }
}

impl StereoRigConfig {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        load_json(path)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        write_json(path, self)
    }
}

/// Detected pattern points of one stereo capture; `None` where the
/// detector did not find the pattern.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewPair {
    pub left: Option<Vec<Point2<f64>>>,
    pub right: Option<Vec<Point2<f64>>>,
}

/// Detector output for a whole capture session, the input of
/// [`crate::calibrate_rig`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewSet {
    pub image_size: ImageSize,
    pub views: Vec<ViewPair>,
}

impl ViewSet {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        load_json(path)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        write_json(path, self)
    }
}

/// Everything the calibration step produces; the reconstruction step
/// reads it back.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub left: IntrinsicCalibration,
    pub right: IntrinsicCalibration,
    pub stereo: StereoCalibration,
    pub rectification: Rectification,
}

impl CalibrationReport {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        load_json(path)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        write_json(path, self)
    }
}
