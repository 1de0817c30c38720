//! Conversions between `image` crate buffers and the core view types.

use std::path::Path;

use image::{ColorType, DynamicImage};
use stereo_rig_core::{GrayImage, GrayImageView, RgbImage, RgbImageView};

use crate::io::IoError;
use crate::ColorImage;

/// Borrow an `image::GrayImage` as a core view.
pub fn gray_view(img: &::image::GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Borrow an `image::RgbImage` as a core view.
pub fn rgb_view(img: &::image::RgbImage) -> RgbImageView<'_> {
    RgbImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Copy a core image into an `image::GrayImage` for encoding.
pub fn to_image_gray(img: &GrayImage) -> Option<::image::GrayImage> {
    ::image::GrayImage::from_raw(
        u32::try_from(img.width).ok()?,
        u32::try_from(img.height).ok()?,
        img.data.clone(),
    )
}

/// Copy a core RGB image into an `image::RgbImage` for encoding.
pub fn to_image_rgb(img: &RgbImage) -> Option<::image::RgbImage> {
    ::image::RgbImage::from_raw(
        u32::try_from(img.width).ok()?,
        u32::try_from(img.height).ok()?,
        img.data.clone(),
    )
}

fn dimension_error() -> ::image::ImageError {
    ::image::ImageError::Limits(::image::error::LimitError::from_kind(
        ::image::error::LimitErrorKind::DimensionError,
    ))
}

fn from_dynamic(img: DynamicImage) -> Option<ColorImage> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    match img.color() {
        ColorType::L8 | ColorType::L16 | ColorType::La8 | ColorType::La16 => {
            GrayImage::from_raw(w, h, img.into_luma8().into_raw()).map(ColorImage::Gray)
        }
        _ => RgbImage::from_raw(w, h, img.into_rgb8().into_raw()).map(ColorImage::Rgb),
    }
}

/// Decode an image file; grayscale files stay grayscale, everything else
/// becomes 8-bit RGB.
pub fn load_color(path: impl AsRef<Path>) -> Result<ColorImage, IoError> {
    let path = path.as_ref();
    let image_error = |source| IoError::Image {
        path: path.to_path_buf(),
        source,
    };
    let img = ::image::open(path).map_err(image_error)?;
    from_dynamic(img).ok_or_else(|| image_error(dimension_error()))
}

/// Encode a grayscale image; the format follows the file extension.
pub fn save_gray(path: impl AsRef<Path>, img: &GrayImage) -> Result<(), IoError> {
    let path = path.as_ref();
    let image_error = |source| IoError::Image {
        path: path.to_path_buf(),
        source,
    };
    let buf = to_image_gray(img).ok_or_else(|| image_error(dimension_error()))?;
    buf.save(path).map_err(image_error)
}

/// Encode an RGB image, e.g. a colormapped disparity preview.
pub fn save_rgb(path: impl AsRef<Path>, img: &RgbImage) -> Result<(), IoError> {
    let path = path.as_ref();
    let image_error = |source| IoError::Image {
        path: path.to_path_buf(),
        source,
    };
    let buf = to_image_rgb(img).ok_or_else(|| image_error(dimension_error()))?;
    buf.save(path).map_err(image_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn views_share_the_buffer() {
        let img = ::image::GrayImage::from_fn(3, 2, |x, y| ::image::Luma([(x + 10 * y) as u8]));
        let v = gray_view(&img);
        assert_eq!((v.width, v.height), (3, 2));
        assert_eq!(v.get(2, 1), 12);

        let rgb = ::image::RgbImage::from_pixel(2, 2, ::image::Rgb([1, 2, 3]));
        assert_eq!(rgb_view(&rgb).get(1, 1), [1, 2, 3]);
    }

    #[test]
    fn png_round_trip_keeps_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gray.png");
        let gray = GrayImage::from_fn(5, 4, |x, y| (x * 40 + y) as u8);
        save_gray(&path, &gray).unwrap();
        assert_eq!(load_color(&path).unwrap(), ColorImage::Gray(gray));

        let path = dir.path().join("rgb.png");
        ::image::RgbImage::from_pixel(2, 3, ::image::Rgb([9, 8, 7]))
            .save(&path)
            .unwrap();
        let ColorImage::Rgb(rgb) = load_color(&path).unwrap() else {
            panic!("expected an rgb image");
        };
        assert_eq!(rgb.view().get(1, 2), [9, 8, 7]);
    }

    #[test]
    fn jet_preview_is_saved_as_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disparity.png");
        let map = crate::DisparityMap::from_values(2, 1, 0, 16, [Some(3.0), Some(9.0)]).unwrap();
        save_rgb(&path, &map.to_rgb_jet()).unwrap();
        let ColorImage::Rgb(rgb) = load_color(&path).unwrap() else {
            panic!("expected an rgb image");
        };
        assert_eq!(rgb.view().get(0, 0), [0, 0, 128]);
        assert_eq!(rgb.view().get(1, 0), [128, 0, 0]);
    }

    #[test]
    fn missing_file_is_an_image_error() {
        assert!(matches!(
            load_color("/nonexistent/left.png"),
            Err(IoError::Image { .. })
        ));
    }
}
