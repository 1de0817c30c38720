use rayon::prelude::*;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::cost::CostVolume;

pub(crate) struct Selection {
    pub min_disparity: i32,
    pub uniqueness_ratio: u32,
    /// `None` disables the left-right check.
    pub max_lr_diff: Option<i32>,
}

/// Winner index and refined sub-index for one pixel's aggregated costs.
///
/// Returns `None` when the winner lies on the range boundary or fails the
/// uniqueness test.
fn winner(costs: &[u32], uniqueness_ratio: u32) -> Option<(usize, f32)> {
    let n = costs.len();
    let (best_k, best) = costs
        .iter()
        .copied()
        .enumerate()
        .min_by_key(|&(k, c)| (c, k))?;
    if best_k == 0 || best_k + 1 == n {
        return None;
    }
    let threshold = u64::from(best) * u64::from(100 + uniqueness_ratio);
    let ambiguous = costs
        .iter()
        .enumerate()
        .any(|(k, &c)| k.abs_diff(best_k) > 1 && u64::from(c) * 100 < threshold);
    if ambiguous {
        return None;
    }

    let c0 = f64::from(costs[best_k - 1]);
    let c1 = f64::from(best);
    let c2 = f64::from(costs[best_k + 1]);
    let denom = c0 - 2.0 * c1 + c2;
    let offset = if denom > 0.0 {
        (c0 - c2) / (2.0 * denom)
    } else {
        0.0
    };
    Some((best_k, best_k as f32 + offset as f32))
}

/// Right-image winners for one row: for each right column `x_r`, the
/// winner of `d -> S(x_r + d, d)` under the same boundary and uniqueness
/// rules as the left image.
fn right_winners(aggregated: &CostVolume, y: usize, sel: &Selection) -> Vec<Option<i32>> {
    let (w, nd) = (aggregated.width, aggregated.disparities);
    let mut curves = vec![u32::MAX; w * nd];
    for x in 0..w {
        for (k, &c) in aggregated.pixel(x, y).iter().enumerate() {
            let xr = x as i64 - (sel.min_disparity as i64 + k as i64);
            if xr >= 0 && xr < w as i64 {
                curves[xr as usize * nd + k] = c;
            }
        }
    }
    curves
        .chunks(nd)
        .map(|curve| {
            winner(curve, sel.uniqueness_ratio).map(|(k, _)| sel.min_disparity + k as i32)
        })
        .collect()
}

/// Winner-take-all with uniqueness, sub-pixel refinement and the
/// left-right consistency check. Output is row-major, NaN for invalid.
///
/// A left match is kept only if the right pixel it lands on has a valid
/// winner of its own that agrees within `max_lr_diff`. A right pixel whose
/// best candidate sits on the range boundary has no winner.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
pub(crate) fn select(aggregated: &CostVolume, sel: &Selection) -> Vec<f32> {
    let (w, h) = (aggregated.width, aggregated.height);
    let mut out = vec![f32::NAN; w * h];
    if out.is_empty() {
        return out;
    }

    out.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let mut matched = vec![false; w];
        for x in 0..w {
            let Some((k, sub)) = winner(aggregated.pixel(x, y), sel.uniqueness_ratio) else {
                continue;
            };
            // the winning match must lie inside the right image
            let xr = x as i64 - (sel.min_disparity as i64 + k as i64);
            if xr < 0 || xr >= w as i64 {
                continue;
            }
            matched[x] = true;
            row[x] = sel.min_disparity as f32 + sub;
        }

        let Some(max_diff) = sel.max_lr_diff else {
            return;
        };
        let right_disp = right_winners(aggregated, y, sel);
        for x in 0..w {
            if !matched[x] {
                continue;
            }
            let d = row[x];
            let disagrees = |di: i64| {
                let xr = x as i64 - di;
                if xr < 0 || xr >= w as i64 {
                    return true;
                }
                match right_disp[xr as usize] {
                    Some(dr) => (i64::from(dr) - di).abs() > i64::from(max_diff),
                    None => true,
                }
            };
            if disagrees(d.floor() as i64) && disagrees(d.ceil() as i64) {
                row[x] = f32::NAN;
            }
        }
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symmetric_neighbours_give_integer_disparity() {
        let (k, sub) = winner(&[50, 40, 10, 40, 50], 10).unwrap();
        assert_eq!(k, 2);
        assert!((sub - 2.0).abs() < 1e-6);
    }

    #[test]
    fn parabola_moves_towards_cheaper_neighbour() {
        let (_, sub) = winner(&[90, 30, 10, 20, 90], 10).unwrap();
        assert!(sub > 2.0 && sub < 2.5, "{sub}");
    }

    #[test]
    fn boundary_winner_is_rejected() {
        assert!(winner(&[5, 40, 50, 60], 10).is_none());
        assert!(winner(&[60, 40, 50, 5], 10).is_none());
    }

    #[test]
    fn ambiguous_winner_is_rejected() {
        // the far candidate is within 10 % of the best
        assert!(winner(&[90, 100, 50, 100, 54, 90], 10).is_none());
        // an adjacent candidate never counts as a rival
        assert!(winner(&[90, 100, 50, 51, 90, 90], 10).is_some());
    }

    #[test]
    fn rival_exactly_at_the_margin_is_accepted() {
        // 55 is exactly 10 % above 50: only strictly closer rivals reject
        assert_eq!(winner(&[90, 100, 50, 100, 55, 90], 10).map(|w| w.0), Some(2));
        assert!(winner(&[90, 100, 50, 100, 54, 90], 10).is_none());
    }

    fn volume(width: usize, disparities: usize, data: Vec<u32>) -> CostVolume {
        CostVolume {
            width,
            height: 1,
            disparities,
            data,
        }
    }

    #[test]
    fn right_pixel_with_boundary_winner_has_no_match() {
        // every left pixel prefers k = 3; a right column sees candidate k
        // only if x_r + k is inside the image
        let nd = 5;
        let mut data = Vec::new();
        for _ in 0..8 {
            data.extend_from_slice(&[90, 80, 70, 10, 60]);
        }
        let sel = Selection {
            min_disparity: 0,
            uniqueness_ratio: 10,
            max_lr_diff: Some(1),
        };
        let right = right_winners(&volume(8, nd, data), 0, &sel);
        assert_eq!(right[4], Some(3));
        // x_r = 7: only k = 0 lies inside the left image
        assert_eq!(right[7], None);
    }

    #[test]
    fn lr_check_drops_matches_onto_unmatched_right_pixels() {
        // pixel 6 prefers k = 3 (x_r = 3), but right column 3 is dominated by
        // the last candidate of pixel 7
        let nd = 5;
        let mut data = vec![200u32; 8 * nd];
        data[6 * nd..7 * nd].copy_from_slice(&[90, 80, 70, 10, 60]);
        data[7 * nd..8 * nd].copy_from_slice(&[90, 80, 70, 60, 1]);
        let agg = volume(8, nd, data);
        let with_check = select(
            &agg,
            &Selection {
                min_disparity: 0,
                uniqueness_ratio: 10,
                max_lr_diff: Some(1),
            },
        );
        assert!(with_check[6].is_nan());
        let without = select(
            &agg,
            &Selection {
                min_disparity: 0,
                uniqueness_ratio: 10,
                max_lr_diff: None,
            },
        );
        assert!(!without[6].is_nan());
    }
}
