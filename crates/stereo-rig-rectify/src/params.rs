use serde::{Deserialize, Serialize};
use stereo_rig_core::ImageSize;

use crate::RectifyError;

/// Options for [`crate::stereo_rectify`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RectifyParams {
    /// Free scaling: `0` keeps only valid pixels, `1` keeps every source
    /// pixel, values in between interpolate. `None` leaves the focal length
    /// at the conservative rectified estimate.
    pub alpha: Option<f64>,
    /// Give both rectified cameras the same principal point, so that points
    /// at infinity have zero disparity.
    pub zero_disparity: bool,
    /// Size of the rectified images; defaults to the source size.
    pub new_image_size: Option<ImageSize>,
}

impl RectifyParams {
    pub fn validate(&self) -> Result<(), RectifyError> {
        if let Some(alpha) = self.alpha {
            if !(0.0..=1.0).contains(&alpha) {
                return Err(RectifyError::Configuration(format!(
                    "alpha must be within [0, 1], got {alpha}"
                )));
            }
        }
        if let Some(size) = self.new_image_size {
            if size.area() == 0 {
                return Err(RectifyError::Configuration(
                    "new_image_size must be non-empty".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_out_of_range_is_rejected() {
        let params = RectifyParams {
            alpha: Some(1.5),
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(RectifyError::Configuration(_))
        ));
        assert!(RectifyParams::default().validate().is_ok());
        assert!(RectifyParams {
            alpha: Some(1.0),
            ..Default::default()
        }
        .validate()
        .is_ok());
    }
}
