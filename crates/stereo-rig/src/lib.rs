//! High-level facade crate for the `stereo-rig-*` workspace.
//!
//! This crate provides:
//! - re-exports of the stage crates under short names
//! - a [`CalibrationSession`] that collects detector output per capture,
//!   drops captures where a camera missed the pattern and runs the
//!   calibration steps in order
//! - JSON configuration and report files ([`StereoRigConfig`],
//!   [`CalibrationReport`])
//! - end-to-end helpers [`calibrate_rig`] and [`reconstruct_pair`]
//! - (feature `image`) adapters between `image` buffers and the core views
//! - (feature `cli`) the `stereo-rig` binary
//!
//! ## Quickstart
//!
//! ```no_run
//! use stereo_rig::{calibrate_rig, reconstruct_pair, StereoRigConfig, ViewSet};
//! use stereo_rig::cloud::PlyFormat;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StereoRigConfig::load_json("rig.json")?;
//! let views = ViewSet::load_json("views.json")?;
//! let report = calibrate_rig(&views, &config)?;
//! report.write_json("calibration.json")?;
//!
//! let left = stereo_rig::images::load_color("left.png")?;
//! let right = stereo_rig::images::load_color("right.png")?;
//! let out = reconstruct_pair(&report, &left, &right, &config, false)?;
//! out.cloud.write_ply("cloud.ply", PlyFormat::Ascii)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `stereo_rig::core`: images, camera model, poses, LM solver, synthetic data.
//! - `stereo_rig::calib`: intrinsic and stereo calibration, epipolar geometry.
//! - `stereo_rig::rectify`: rectifying transforms, remap tables, undistortion.
//! - `stereo_rig::sgm`: semi-global matching and disparity maps.
//! - `stereo_rig::cloud`: back-projection and PLY export.
//! - `stereo_rig::images` (feature `image`): `image` crate adapters.

pub use stereo_rig_calib as calib;
pub use stereo_rig_cloud as cloud;
pub use stereo_rig_core as core;
pub use stereo_rig_rectify as rectify;
pub use stereo_rig_sgm as sgm;

pub use stereo_rig_calib::{CalibrationError, IntrinsicCalibration, StereoCalibration, StereoModel};
pub use stereo_rig_cloud::{PointCloud, ReconstructParams};
pub use stereo_rig_core::{CameraModel, ColorView, GrayImageView, ImageSize, PatternSize};
pub use stereo_rig_rectify::{Rectification, RectifyParams};
pub use stereo_rig_sgm::{DisparityMap, SgmParams};

mod error;
pub mod io;
mod pipeline;
mod session;

pub use error::PipelineError;
pub use io::{CalibrationReport, IoError, StereoRigConfig, ViewPair, ViewSet};
pub use pipeline::{calibrate_rig, reconstruct_pair, ColorImage, Reconstruction};
pub use session::{CalibrationSession, PatternDetector};

#[cfg(feature = "image")]
pub mod images;
