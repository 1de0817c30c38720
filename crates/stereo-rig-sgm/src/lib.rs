//! Semi-global matching on rectified stereo pairs.
//!
//! [`SgmMatcher::compute`] runs the usual stages: block SAD costs for every
//! candidate disparity, path-wise aggregation with `P1`/`P2` smoothness
//! penalties, winner-take-all with a uniqueness test and parabolic
//! sub-pixel refinement, a left-right consistency check and a speckle
//! filter. The result is a [`DisparityMap`] whose invalid pixels are
//! reported as `None`.
//!
//! Costs are integers and every selection is a full scan per pixel, so the
//! output does not depend on the rayon thread count.

mod aggregate;
mod cost;
mod disparity;
mod error;
mod matcher;
mod params;
mod select;
mod speckle;

pub use disparity::DisparityMap;
pub use error::MatchError;
pub use matcher::SgmMatcher;
pub use params::{Directions, SgmParams};
