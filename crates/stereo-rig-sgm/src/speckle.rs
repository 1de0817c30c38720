#[cfg(feature = "tracing")]
use tracing::instrument;

/// Invalidate 4-connected regions of fewer than `window` pixels.
///
/// Neighbours belong to one region when both are valid and their
/// disparities differ by at most `range`. Returns the number of pixels
/// removed.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
pub(crate) fn filter_speckles(
    disp: &mut [f32],
    width: usize,
    height: usize,
    window: usize,
    range: f32,
) -> usize {
    if window == 0 || disp.is_empty() {
        return 0;
    }
    let mut visited = vec![false; width * height];
    let mut stack = Vec::new();
    let mut region = Vec::new();
    let mut removed = 0;

    for start in 0..disp.len() {
        if visited[start] || disp[start].is_nan() {
            continue;
        }
        visited[start] = true;
        stack.push(start);
        region.clear();
        while let Some(i) = stack.pop() {
            region.push(i);
            let (x, y) = (i % width, i / width);
            let d = disp[i];
            let mut visit = |j: usize| {
                if !visited[j] && !disp[j].is_nan() && (disp[j] - d).abs() <= range {
                    visited[j] = true;
                    stack.push(j);
                }
            };
            if x > 0 {
                visit(i - 1);
            }
            if x + 1 < width {
                visit(i + 1);
            }
            if y > 0 {
                visit(i - width);
            }
            if y + 1 < height {
                visit(i + width);
            }
        }
        if region.len() < window {
            for &i in &region {
                disp[i] = f32::NAN;
            }
            removed += region.len();
        }
    }
    removed
}
