//! Dense reconstruction from a disparity map.
//!
//! [`reconstruct`] back-projects valid disparities through the rectified
//! rig's `Q` matrix, filters degenerate depths and pairs every point with
//! its color. [`PointCloud`] writes ASCII or binary PLY files.

mod cloud;
mod error;
mod reconstruct;

pub use cloud::{write_ply_ascii, write_ply_binary, ColoredPoint, PlyFormat, PointCloud};
pub use error::ReconstructError;
pub use reconstruct::{reconstruct, reproject_image_to_3d, ReconstructParams};
