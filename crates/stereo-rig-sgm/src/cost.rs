use rayon::prelude::*;
use stereo_rig_core::GrayImageView;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Flat `height × width × disparities` arena of integer costs.
#[derive(Clone, Debug)]
pub(crate) struct CostVolume {
    pub width: usize,
    pub height: usize,
    pub disparities: usize,
    pub data: Vec<u32>,
}

impl CostVolume {
    pub fn zeros(width: usize, height: usize, disparities: usize) -> Self {
        Self {
            width,
            height,
            disparities,
            data: vec![0; width * height * disparities],
        }
    }

    #[inline]
    pub fn row_len(&self) -> usize {
        self.width * self.disparities
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> &[u32] {
        let i = (y * self.width + x) * self.disparities;
        &self.data[i..i + self.disparities]
    }

    #[inline]
    pub fn row(&self, y: usize) -> &[u32] {
        let n = self.row_len();
        &self.data[y * n..(y + 1) * n]
    }

    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [u32] {
        let n = self.row_len();
        &mut self.data[y * n..(y + 1) * n]
    }
}

/// Cost assigned to candidates whose match falls outside the right image.
pub(crate) fn max_block_cost(block_size: usize) -> u32 {
    (block_size * block_size * 255) as u32
}

/// Sum of absolute differences over a `block_size` window for every pixel
/// and candidate disparity `min_disparity + k`. Windows are clamped at the
/// image border.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(w = left.width, h = left.height, d = disparities))
)]
pub(crate) fn sad_costs(
    left: &GrayImageView<'_>,
    right: &GrayImageView<'_>,
    min_disparity: i32,
    disparities: usize,
    block_size: usize,
) -> CostVolume {
    let (w, h) = (left.width, left.height);
    let mut volume = CostVolume::zeros(w, h, disparities);
    if volume.data.is_empty() {
        return volume;
    }
    let half = (block_size / 2) as isize;
    let outside = max_block_cost(block_size);
    let clamp_x = |x: isize| x.clamp(0, w as isize - 1) as usize;
    let clamp_y = |y: isize| y.clamp(0, h as isize - 1) as usize;
    let row_len = volume.row_len();

    volume
        .data
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            let rows: Vec<usize> = (-half..=half).map(|dy| clamp_y(y as isize + dy)).collect();
            for x in 0..w {
                let costs = &mut row[x * disparities..(x + 1) * disparities];
                for (k, c) in costs.iter_mut().enumerate() {
                    let xr = x as isize - (min_disparity as isize + k as isize);
                    if xr < 0 || xr >= w as isize {
                        *c = outside;
                        continue;
                    }
                    let mut sad = 0u32;
                    for &ry in &rows {
                        let lrow = &left.data[ry * w..(ry + 1) * w];
                        let rrow = &right.data[ry * w..(ry + 1) * w];
                        for dx in -half..=half {
                            let a = lrow[clamp_x(x as isize + dx)];
                            let b = rrow[clamp_x(xr + dx)];
                            sad += a.abs_diff(b) as u32;
                        }
                    }
                    *c = sad;
                }
            }
        });
    volume
}
