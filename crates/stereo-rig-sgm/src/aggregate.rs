//! Path-wise cost aggregation.
//!
//! For a path step `r`, `L_r(p, d) = C(p, d) + min(L_r(p-r, d),
//! L_r(p-r, d±1) + P1, min_k L_r(p-r, k) + P2) - min_k L_r(p-r, k)`.
//! The sum over all paths is the aggregated cost. Path costs stay bounded
//! by `C + P2`, so everything fits in `u32`.

use rayon::prelude::*;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::cost::CostVolume;
use crate::Directions;

/// One step of the path recurrence for a single pixel.
#[inline]
fn step(cost: &[u32], prev: &[u32], p1: u32, p2: u32, out: &mut [u32]) {
    let prev_min = prev.iter().copied().min().unwrap_or(0);
    let jump = prev_min.saturating_add(p2);
    let n = cost.len();
    for d in 0..n {
        let mut best = prev[d].min(jump);
        if d > 0 {
            best = best.min(prev[d - 1].saturating_add(p1));
        }
        if d + 1 < n {
            best = best.min(prev[d + 1].saturating_add(p1));
        }
        out[d] = cost[d].saturating_add(best - prev_min);
    }
}

#[inline]
fn accumulate(dst: &mut [u32], src: &[u32]) {
    for (a, b) in dst.iter_mut().zip(src) {
        *a = a.saturating_add(*b);
    }
}

/// Left-to-right and right-to-left paths, each row independently.
fn horizontal(costs: &CostVolume, p1: u32, p2: u32, out: &mut CostVolume) {
    let (w, nd) = (costs.width, costs.disparities);
    let row_len = costs.row_len();
    out.data
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, acc)| {
            let c = costs.row(y);
            let mut prev = vec![0u32; nd];
            let mut cur = vec![0u32; nd];
            for forward in [true, false] {
                for i in 0..w {
                    let x = if forward { i } else { w - 1 - i };
                    let cx = &c[x * nd..(x + 1) * nd];
                    if i == 0 {
                        cur.copy_from_slice(cx);
                    } else {
                        step(cx, &prev, p1, p2, &mut cur);
                    }
                    accumulate(&mut acc[x * nd..(x + 1) * nd], &cur);
                    std::mem::swap(&mut prev, &mut cur);
                }
            }
        });
}

/// Paths entering each row from the previous one in sweep order.
///
/// `down` sweeps top to bottom; `dxs` lists the horizontal offsets of the
/// steps. Rows are processed in order; pixels of a row in parallel.
fn vertical_sweep(
    costs: &CostVolume,
    dxs: &[i32],
    down: bool,
    p1: u32,
    p2: u32,
    out: &mut CostVolume,
) {
    let (w, h, nd) = (costs.width, costs.height, costs.disparities);
    let row_len = costs.row_len();
    let mut prev: Vec<Vec<u32>> = dxs.iter().map(|_| vec![0u32; row_len]).collect();
    let mut cur: Vec<Vec<u32>> = dxs.iter().map(|_| vec![0u32; row_len]).collect();

    for i in 0..h {
        let y = if down { i } else { h - 1 - i };
        let c = costs.row(y);
        for ((&dx, prev), cur) in dxs.iter().zip(&prev).zip(cur.iter_mut()) {
            cur.par_chunks_mut(nd).enumerate().for_each(|(x, l)| {
                let cx = &c[x * nd..(x + 1) * nd];
                let px = x as i64 - dx as i64;
                if i == 0 || px < 0 || px >= w as i64 {
                    l.copy_from_slice(cx);
                } else {
                    let px = px as usize;
                    step(cx, &prev[px * nd..(px + 1) * nd], p1, p2, l);
                }
            });
        }
        let acc = out.row_mut(y);
        acc.par_chunks_mut(nd).enumerate().for_each(|(x, a)| {
            for path in &cur {
                accumulate(a, &path[x * nd..(x + 1) * nd]);
            }
        });
        std::mem::swap(&mut prev, &mut cur);
    }
}

/// Sum of path costs over the requested directions.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(directions = ?directions))
)]
pub(crate) fn aggregate(
    costs: &CostVolume,
    p1: u32,
    p2: u32,
    directions: Directions,
) -> CostVolume {
    let mut out = CostVolume::zeros(costs.width, costs.height, costs.disparities);
    if out.data.is_empty() {
        return out;
    }
    let steps = directions.steps();
    if steps.iter().any(|&(_, dy)| dy == 0) {
        horizontal(costs, p1, p2, &mut out);
    }
    let down: Vec<i32> = steps.iter().filter(|s| s.1 > 0).map(|s| s.0).collect();
    let up: Vec<i32> = steps.iter().filter(|s| s.1 < 0).map(|s| s.0).collect();
    if !down.is_empty() {
        vertical_sweep(costs, &down, true, p1, p2, &mut out);
    }
    if !up.is_empty() {
        vertical_sweep(costs, &up, false, p1, p2, &mut out);
    }
    out
}
