use log::{debug, info};
use stereo_rig_core::GrayImageView;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::aggregate::aggregate;
use crate::cost::sad_costs;
use crate::select::{select, Selection};
use crate::speckle::filter_speckles;
use crate::{DisparityMap, MatchError, SgmParams};

/// Semi-global block matcher for rectified grayscale pairs.
#[derive(Clone, Debug)]
pub struct SgmMatcher {
    params: SgmParams,
}

impl SgmMatcher {
    pub fn new(params: SgmParams) -> Result<Self, MatchError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &SgmParams {
        &self.params
    }

    /// Disparity of every left pixel with respect to the right image.
    ///
    /// A left pixel `(x, y)` with disparity `d` matches right pixel
    /// `(x - d, y)`.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(w = left.width, h = left.height))
    )]
    pub fn compute(
        &self,
        left: &GrayImageView<'_>,
        right: &GrayImageView<'_>,
    ) -> Result<DisparityMap, MatchError> {
        for (side, view) in [("left", left), ("right", right)] {
            if !view.is_well_formed() {
                return Err(MatchError::Configuration(format!(
                    "{side} buffer holds {} bytes for a {}x{} image",
                    view.data.len(),
                    view.width,
                    view.height
                )));
            }
        }
        if left.width != right.width || left.height != right.height {
            return Err(MatchError::SizeMismatch {
                left_width: left.width,
                left_height: left.height,
                right_width: right.width,
                right_height: right.height,
            });
        }
        let p = &self.params;
        let (w, h) = (left.width, left.height);

        let costs = sad_costs(left, right, p.min_disparity, p.num_disparities, p.block_size);
        let aggregated = aggregate(&costs, p.p1, p.p2, p.directions);
        drop(costs);

        let selection = Selection {
            min_disparity: p.min_disparity,
            uniqueness_ratio: p.uniqueness_ratio,
            max_lr_diff: (p.max_lr_diff >= 0).then_some(p.max_lr_diff),
        };
        let mut disp = select(&aggregated, &selection);
        let removed = filter_speckles(
            &mut disp,
            w,
            h,
            p.speckle_window_size,
            p.speckle_range as f32,
        );
        debug!("speckle filter removed {removed} pixels");

        let map = DisparityMap::from_raw(w, h, p.min_disparity, p.num_disparities, disp);
        info!(
            "sgm {}x{}: {} of {} pixels valid (d in [{}, {}])",
            w,
            h,
            map.valid_count(),
            w * h,
            p.min_disparity,
            p.max_disparity()
        );
        Ok(map)
    }
}
