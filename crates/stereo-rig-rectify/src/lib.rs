//! Stereo rectification and undistortion.
//!
//! [`stereo_rectify`] turns a calibrated [`stereo_rig_calib::StereoModel`]
//! into rectifying rotations, rectified projection matrices and the
//! disparity-to-depth matrix `Q`. [`RectifyMaps`] bakes those into per-pixel
//! [`RemapTable`]s that resample raw images with bilinear interpolation.
//!
//! For a single camera, [`optimal_new_camera_matrix`] and [`undistort_map`]
//! remove lens distortion without rectifying.

mod error;
mod params;
mod points;
mod rectify;
mod remap;
mod undistort;

pub use error::RectifyError;
pub use params::RectifyParams;
pub use rectify::{stereo_rectify, BaselineAxis, Rectification, RectificationTransform};
pub use remap::{RectifyMaps, RemapTable};
pub use undistort::{optimal_new_camera_matrix, undistort_map};
