use serde::{Deserialize, Serialize};

use crate::MatchError;

/// Set of 1D paths the matching costs are aggregated along.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Directions {
    /// Left, right and the three paths coming from the row above.
    #[default]
    Five,
    /// All horizontal, vertical and diagonal paths.
    Eight,
}

impl Directions {
    /// Path steps `(dx, dy)`: the cost at `p` depends on the path cost at
    /// `p - (dx, dy)`.
    pub fn steps(self) -> &'static [(i32, i32)] {
        match self {
            Directions::Five => &[(1, 0), (-1, 0), (-1, 1), (0, 1), (1, 1)],
            Directions::Eight => &[
                (1, 0),
                (-1, 0),
                (-1, 1),
                (0, 1),
                (1, 1),
                (-1, -1),
                (0, -1),
                (1, -1),
            ],
        }
    }
}

/// Semi-global matching parameters.
///
/// Defaults: disparities 16..112, 3×3 SAD blocks, `P1 = 216`, `P2 = 864`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SgmParams {
    /// Smallest disparity searched; may be negative.
    pub min_disparity: i32,
    /// Width of the search range; a positive multiple of 16.
    pub num_disparities: usize,
    /// SAD window side; odd.
    pub block_size: usize,
    /// Margin in percent by which the best cost must beat every
    /// non-adjacent candidate.
    pub uniqueness_ratio: u32,
    /// Connected regions with fewer pixels are removed; `0` disables.
    pub speckle_window_size: usize,
    /// Maximum disparity step between neighbours of one speckle region.
    pub speckle_range: u32,
    /// Penalty for a disparity change of one along a path.
    pub p1: u32,
    /// Penalty for larger disparity changes along a path.
    pub p2: u32,
    /// Maximum left/right disparity disagreement; negative disables the check.
    pub max_lr_diff: i32,
    pub directions: Directions,
}

impl Default for SgmParams {
    fn default() -> Self {
        Self {
            min_disparity: 16,
            num_disparities: 96,
            block_size: 3,
            uniqueness_ratio: 10,
            speckle_window_size: 100,
            speckle_range: 2,
            p1: 216,
            p2: 864,
            max_lr_diff: 1,
            directions: Directions::Five,
        }
    }
}

impl SgmParams {
    pub fn validate(&self) -> Result<(), MatchError> {
        let fail = |msg: String| Err(MatchError::Configuration(msg));
        if self.num_disparities == 0 || self.num_disparities % 16 != 0 {
            return fail(format!(
                "num_disparities must be a positive multiple of 16, got {}",
                self.num_disparities
            ));
        }
        if self.block_size == 0 || self.block_size % 2 == 0 {
            return fail(format!("block_size must be odd, got {}", self.block_size));
        }
        if self.p2 < self.p1 {
            return fail(format!("p2 ({}) must be >= p1 ({})", self.p2, self.p1));
        }
        if self.uniqueness_ratio >= 100 {
            return fail(format!(
                "uniqueness_ratio is a percentage below 100, got {}",
                self.uniqueness_ratio
            ));
        }
        if i64::from(self.min_disparity) + self.num_disparities as i64 > i64::from(i32::MAX) {
            return fail("disparity range overflows".into());
        }
        Ok(())
    }

    /// Largest disparity searched (inclusive).
    pub fn max_disparity(&self) -> i32 {
        self.min_disparity + self.num_disparities as i32 - 1
    }
}
