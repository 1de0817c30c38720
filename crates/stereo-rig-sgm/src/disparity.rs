use serde::{Deserialize, Serialize};
use stereo_rig_core::{GrayImage, ImageSize, RgbImage};

/// Dense disparity field over the rectified left image.
///
/// Invalid pixels hold a NaN sentinel internally; every accessor exposes
/// them as `None`, so no invalid pixel can pass for disparity zero. The
/// serialized form lists values as `null` for invalid pixels and is
/// checked against the size on load.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DisparityMapRepr", into = "DisparityMapRepr")]
pub struct DisparityMap {
    width: usize,
    height: usize,
    min_disparity: i32,
    num_disparities: usize,
    data: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct DisparityMapRepr {
    width: usize,
    height: usize,
    min_disparity: i32,
    num_disparities: usize,
    values: Vec<Option<f32>>,
}

impl From<DisparityMap> for DisparityMapRepr {
    fn from(map: DisparityMap) -> Self {
        Self {
            width: map.width,
            height: map.height,
            min_disparity: map.min_disparity,
            num_disparities: map.num_disparities,
            values: map.data.iter().map(|d| (!d.is_nan()).then_some(*d)).collect(),
        }
    }
}

impl TryFrom<DisparityMapRepr> for DisparityMap {
    type Error = String;

    fn try_from(repr: DisparityMapRepr) -> Result<Self, Self::Error> {
        let count = repr.values.len();
        DisparityMap::from_values(
            repr.width,
            repr.height,
            repr.min_disparity,
            repr.num_disparities,
            repr.values,
        )
        .ok_or_else(|| {
            format!(
                "{count} disparity values for a {}x{} map",
                repr.width, repr.height
            )
        })
    }
}

/// OpenCV-style JET ramp: dark blue through cyan, yellow and dark red.
fn jet(v: u8) -> [u8; 3] {
    let t = f32::from(v) / 255.0;
    let channel = |centre: f32| {
        ((1.5 - (4.0 * t - centre).abs()).clamp(0.0, 1.0) * 255.0).round() as u8
    };
    [channel(3.0), channel(2.0), channel(1.0)]
}

impl DisparityMap {
    pub(crate) fn from_raw(
        width: usize,
        height: usize,
        min_disparity: i32,
        num_disparities: usize,
        data: Vec<f32>,
    ) -> Self {
        debug_assert_eq!(data.len(), width * height);
        Self {
            width,
            height,
            min_disparity,
            num_disparities,
            data,
        }
    }

    /// Build a map from explicit values, one per pixel in row-major order.
    ///
    /// Returns `None` when the value count does not match the size.
    pub fn from_values(
        width: usize,
        height: usize,
        min_disparity: i32,
        num_disparities: usize,
        values: impl IntoIterator<Item = Option<f32>>,
    ) -> Option<Self> {
        let data: Vec<f32> = values
            .into_iter()
            .map(|v| v.filter(|d| d.is_finite()).unwrap_or(f32::NAN))
            .collect();
        (data.len() == width.checked_mul(height)?).then(|| {
            Self::from_raw(width, height, min_disparity, num_disparities, data)
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }

    pub fn min_disparity(&self) -> i32 {
        self.min_disparity
    }

    pub fn num_disparities(&self) -> usize {
        self.num_disparities
    }

    /// Disparity at `(x, y)`, `None` if invalid or out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let d = self.data[y * self.width + x];
        (!d.is_nan()).then_some(d)
    }

    pub fn is_valid(&self, x: usize, y: usize) -> bool {
        self.get(x, y).is_some()
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|d| !d.is_nan()).count()
    }

    /// Valid pixels as `(x, y, disparity)` in row-major order.
    pub fn iter_valid(&self) -> impl Iterator<Item = (usize, usize, f32)> + '_ {
        let w = self.width.max(1);
        self.data
            .iter()
            .enumerate()
            .filter(|(_, d)| !d.is_nan())
            .map(move |(i, &d)| (i % w, i / w, d))
    }

    /// Smallest and largest valid disparity.
    pub fn range(&self) -> Option<(f32, f32)> {
        self.iter_valid().fold(None, |acc, (_, _, d)| match acc {
            None => Some((d, d)),
            Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
        })
    }

    /// 8-bit visualisation stretching the valid range to `0..=255`.
    ///
    /// Invalid pixels are 0; a constant map renders valid pixels as 255.
    pub fn to_gray_normalized(&self) -> GrayImage {
        let Some((lo, hi)) = self.range() else {
            return GrayImage::new(self.width, self.height);
        };
        let span = hi - lo;
        let data = self
            .data
            .iter()
            .map(|&d| {
                if d.is_nan() {
                    0
                } else if span <= 0.0 {
                    255
                } else {
                    ((d - lo) / span * 255.0).round().clamp(0.0, 255.0) as u8
                }
            })
            .collect();
        GrayImage {
            width: self.width,
            height: self.height,
            data,
        }
    }

    /// JET-colored preview of [`to_gray_normalized`](Self::to_gray_normalized):
    /// near disparities blue, far ones red. Invalid pixels stay black.
    pub fn to_rgb_jet(&self) -> RgbImage {
        let gray = self.to_gray_normalized();
        let data = gray
            .data
            .iter()
            .zip(&self.data)
            .flat_map(|(&v, d)| if d.is_nan() { [0; 3] } else { jet(v) })
            .collect();
        RgbImage {
            width: self.width,
            height: self.height,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_pixels_are_none() {
        let map = DisparityMap::from_values(3, 1, 0, 16, [Some(2.5), None, Some(f32::INFINITY)])
            .expect("map");
        assert_eq!(map.get(0, 0), Some(2.5));
        assert_eq!(map.get(1, 0), None);
        assert_eq!(map.get(2, 0), None);
        assert_eq!(map.get(5, 0), None);
        assert_eq!(map.valid_count(), 1);
    }

    #[test]
    fn zero_is_a_valid_disparity() {
        let map = DisparityMap::from_values(1, 1, -8, 16, [Some(0.0)]).unwrap();
        assert_eq!(map.get(0, 0), Some(0.0));
    }

    #[test]
    fn wrong_value_count_is_rejected() {
        assert!(DisparityMap::from_values(2, 2, 0, 16, [Some(1.0)]).is_none());
    }

    #[test]
    fn normalization_stretches_valid_range() {
        let map =
            DisparityMap::from_values(4, 1, 0, 16, [Some(10.0), Some(20.0), None, Some(15.0)])
                .unwrap();
        let img = map.to_gray_normalized();
        assert_eq!(img.data, vec![0, 255, 0, 128]);
    }

    #[test]
    fn jet_preview_spans_blue_to_red() {
        let map = DisparityMap::from_values(3, 1, 0, 16, [Some(4.0), None, Some(12.0)]).unwrap();
        let img = map.to_rgb_jet();
        assert_eq!(img.data.len(), 9);
        assert_eq!(&img.data[0..3], &[0, 0, 128]);
        assert_eq!(&img.data[3..6], &[0, 0, 0]);
        assert_eq!(&img.data[6..9], &[128, 0, 0]);
        assert_eq!(jet(128)[1], 255);
    }

    #[test]
    fn json_keeps_invalid_pixels_invalid() {
        let map = DisparityMap::from_values(2, 2, -4, 16, [Some(1.5), None, Some(0.0), None])
            .unwrap();
        let json = serde_json::to_string(&map).unwrap();
        assert!(json.contains("null"), "{json}");
        let back: DisparityMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(0, 0), Some(1.5));
        assert_eq!(back.get(1, 0), None);
        assert_eq!(back.get(0, 1), Some(0.0));
        assert_eq!(back.valid_count(), 2);
        assert_eq!(back.min_disparity(), -4);
    }

    #[test]
    fn json_with_wrong_value_count_is_rejected() {
        let json = r#"{"width":2,"height":2,"min_disparity":0,"num_disparities":16,"values":[1.0,null,2.0]}"#;
        let err = serde_json::from_str::<DisparityMap>(json).unwrap_err();
        assert!(err.to_string().contains("3 disparity values"), "{err}");
    }
}
