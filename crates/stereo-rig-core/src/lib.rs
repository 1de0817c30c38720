//! Core types and numerics shared by the stereo-rig crates.
//!
//! This crate is purely geometric: image buffers and bilinear sampling, the
//! pinhole camera with rational distortion, rigid poses, pattern
//! correspondences, homography estimation and a generic
//! Levenberg–Marquardt solver. It knows nothing about pattern detection or
//! image decoding.

mod camera;
mod correspondence;
mod geometry;
mod homography;
mod image;
mod lm;
mod logger;
mod pose;
pub mod synthetic;

pub use camera::{CameraModel, Distortion, Intrinsics};
pub use correspondence::{Correspondence, CorrespondenceError, PatternSize};
pub use geometry::{normalize_line, point_line_distance, skew, Rect, RectF};
pub use homography::{estimate_homography, Homography};
pub use image::{
    sample_bilinear, sample_bilinear_rgb, sample_bilinear_u8, ColorView, GrayImage,
    GrayImageView, ImageSize, RgbImage, RgbImageView,
};
pub use lm::{
    Convergence, LeastSquaresProblem, LevenbergMarquardt, LmError, LmParams, LmReport,
};
pub use pose::{rotation_angle_deg, Pose};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
