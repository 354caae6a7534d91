//! Geometric transforms over encoded images.
//!
//! Both operations take encoded bytes in any decodable format and always
//! return PNG bytes, so every derived asset shares one lossless format.
//!
//! # Crop rounding
//!
//! The center crop is computed in floating point and then rounded to the
//! nearest whole pixel, never below 1×1. The rounded rectangle is copied
//! at native resolution; nothing is scaled during the crop.

use crate::error::{AppError, Result};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use log::debug;
use std::io::Cursor;

/// Ratios closer than this are treated as equal and skip the crop.
const RATIO_TOLERANCE: f64 = 1e-6;

/// A pixel rectangle inside the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Computes the centered crop that brings a `source_width × source_height`
/// image to `width_ratio : height_ratio`.
///
/// Returns `None` when the source already has the target ratio.
///
/// # Examples
///
/// ```
/// # use pixel_spark_core::image_processing::{crop_rect, CropRect};
/// // Landscape to square keeps the full height
/// assert_eq!(
///     crop_rect(1000, 500, 1.0, 1.0),
///     Some(CropRect { x: 250, y: 0, width: 500, height: 500 })
/// );
/// assert_eq!(crop_rect(1600, 900, 16.0, 9.0), None);
/// ```
pub fn crop_rect(
    source_width: u32,
    source_height: u32,
    width_ratio: f64,
    height_ratio: f64,
) -> Option<CropRect> {
    let (sw, sh) = (source_width as f64, source_height as f64);
    let source_ratio = sw / sh;
    let target_ratio = width_ratio / height_ratio;

    if (source_ratio - target_ratio).abs() < RATIO_TOLERANCE {
        return None;
    }

    let (cw, ch) = if source_ratio > target_ratio {
        // Source is wider: keep the height, trim the sides
        (sh * target_ratio, sh)
    } else {
        // Source is taller: keep the width, trim top and bottom
        (sw, sw / target_ratio)
    };

    let width = (cw.round() as u32).clamp(1, source_width.max(1));
    let height = (ch.round() as u32).clamp(1, source_height.max(1));

    Some(CropRect {
        x: (source_width - width) / 2,
        y: (source_height - height) / 2,
        width,
        height,
    })
}

/// Stateless image transforms used by the processing pipeline.
pub struct ImageProcessor;

impl ImageProcessor {
    /// Center-crops an encoded image to `width_ratio : height_ratio`.
    ///
    /// When the source already has the requested ratio the image is only
    /// re-encoded, so the output is pixel-identical to the input.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Decode`] if `source` is not a decodable image.
    /// Returns [`AppError::Encode`] if PNG encoding fails.
    pub fn crop(source: &[u8], width_ratio: f64, height_ratio: f64) -> Result<Vec<u8>> {
        let image = Self::decode(source)?;

        match crop_rect(image.width(), image.height(), width_ratio, height_ratio) {
            Some(rect) => {
                debug!(
                    "cropping {}x{} to {}x{} at ({}, {})",
                    image.width(),
                    image.height(),
                    rect.width,
                    rect.height,
                    rect.x,
                    rect.y
                );
                let cropped = image.crop_imm(rect.x, rect.y, rect.width, rect.height);
                Self::encode_png(&cropped)
            }
            None => Self::encode_png(&image),
        }
    }

    /// Stretches an encoded image to exactly `width × height`.
    ///
    /// The source aspect ratio is ignored; run [`ImageProcessor::crop`]
    /// first to avoid distortion.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidDimensions`] if either target dimension is zero.
    /// Returns [`AppError::Decode`] if `source` is not a decodable image.
    pub fn resize(source: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
        if width == 0 || height == 0 {
            return Err(AppError::InvalidDimensions { width, height });
        }

        let image = Self::decode(source)?;
        debug!(
            "resizing {}x{} to {}x{}",
            image.width(),
            image.height(),
            width,
            height
        );
        let resized = image.resize_exact(width, height, FilterType::Lanczos3);
        Self::encode_png(&resized)
    }

    fn decode(source: &[u8]) -> Result<DynamicImage> {
        image::load_from_memory(source).map_err(|e| AppError::decode(e.to_string()))
    }

    /// Encodes a DynamicImage as PNG.
    pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
        let mut buffer: Vec<u8> = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(|e| AppError::encode(e.to_string()))?;
        Ok(buffer)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::probe::probe;
    use image::{Rgba, RgbaImage};

    /// Encodes a solid test image of the given size.
    pub(crate) fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
        });
        ImageProcessor::encode_png(&DynamicImage::ImageRgba8(img)).unwrap()
    }

    #[test]
    fn crop_rect_height_bound() {
        let rect = crop_rect(1000, 500, 1.0, 1.0).unwrap();
        assert_eq!((rect.width, rect.height), (500, 500));
        assert_eq!((rect.x, rect.y), (250, 0));
    }

    #[test]
    fn crop_rect_width_bound_rounds_to_nearest() {
        // 500 / (16/9) = 281.25
        let rect = crop_rect(500, 1000, 16.0, 9.0).unwrap();
        assert_eq!((rect.width, rect.height), (500, 281));
        assert_eq!((rect.x, rect.y), (0, 359));
    }

    #[test]
    fn crop_rect_never_degenerate() {
        let rect = crop_rect(1, 1000, 1.0, 1.0).unwrap();
        assert_eq!((rect.width, rect.height), (1, 1));

        let rect = crop_rect(1000, 1, 1.0, 100_000.0).unwrap();
        assert_eq!((rect.width, rect.height), (1, 1));
    }

    #[test]
    fn crop_rect_equal_ratio_is_noop() {
        assert_eq!(crop_rect(800, 1000, 4.0, 5.0), None);
        assert_eq!(crop_rect(64, 64, 1.0, 1.0), None);
    }

    #[test]
    fn crop_equal_ratio_passes_pixels_through() {
        let source = png(40, 30);
        let out = ImageProcessor::crop(&source, 4.0, 3.0).unwrap();

        let before = image::load_from_memory(&source).unwrap().to_rgba8();
        let after = image::load_from_memory(&out).unwrap().to_rgba8();
        assert_eq!(before.dimensions(), after.dimensions());
        assert_eq!(before.as_raw(), after.as_raw());
    }

    #[test]
    fn crop_produces_target_ratio() {
        let out = ImageProcessor::crop(&png(1000, 500), 1.0, 1.0).unwrap();
        let dims = probe(&out).unwrap();
        assert_eq!((dims.width, dims.height), (500, 500));

        let out = ImageProcessor::crop(&png(500, 1000), 16.0, 9.0).unwrap();
        let dims = probe(&out).unwrap();
        assert_eq!((dims.width, dims.height), (500, 281));
    }

    #[test]
    fn crop_keeps_center_pixels() {
        let out = ImageProcessor::crop(&png(300, 100), 1.0, 1.0).unwrap();
        let cropped = image::load_from_memory(&out).unwrap().to_rgba8();
        // Left edge of the crop is column 100 of the source
        assert_eq!(cropped.get_pixel(0, 0)[0], 100);
    }

    #[test]
    fn crop_rejects_garbage() {
        let err = ImageProcessor::crop(b"not an image", 16.0, 9.0).unwrap_err();
        assert!(matches!(err, AppError::Decode(_)));
    }

    #[test]
    fn resize_is_exact_regardless_of_ratio() {
        for (w, h) in [(1000, 500), (37, 911), (128, 128), (3, 3)] {
            let out = ImageProcessor::resize(&png(w, h), 128, 128).unwrap();
            let dims = probe(&out).unwrap();
            assert_eq!((dims.width, dims.height), (128, 128));
        }
    }

    #[test]
    fn resize_output_is_png() {
        let jpeg = {
            let img = DynamicImage::ImageRgb8(image::RgbImage::new(20, 10));
            let mut buf = Vec::new();
            img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
                .unwrap();
            buf
        };
        let out = ImageProcessor::resize(&jpeg, 8, 8).unwrap();
        assert_eq!(image::guess_format(&out).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn resize_rejects_zero_dimensions() {
        let err = ImageProcessor::resize(&png(10, 10), 0, 16).unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidDimensions { width: 0, height: 16 }
        ));
    }

    #[test]
    fn resize_rejects_garbage() {
        let err = ImageProcessor::resize(&[0u8; 16], 16, 16).unwrap_err();
        assert!(matches!(err, AppError::Decode(_)));
    }
}
