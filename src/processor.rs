//! This module provides tools for preprocessing images before they are fed into a model.
//!
//! It defines the `ImageProcessor` trait for generic image processing operations
//! and provides a concrete implementation, `ImagePreprocessor`, which handles
//! the oversize guard, aspect-preserving resize, white square padding and
//! BGR channel ordering expected by WD14-style taggers.

use crate::error::{Result, TaggerError};
use image::{imageops::FilterType, DynamicImage, GenericImageView, Rgb, RgbImage};
use ndarray::{Array, Ix4};

/// Longest side accepted before the image is scaled down.
pub const MAX_IMAGE_SIDE: u32 = 2048;

/// A trait for processing images into tensors suitable for model input.
pub trait ImageProcessor {
    /// Processes a single image into a 4D tensor.
    fn process(&self, image: &DynamicImage) -> Result<Array<f32, Ix4>>;
}

/// A preprocessor that produces `[1, size, size, 3]` BGR tensors of raw
/// 0-255 pixel values.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    pub size: u32,
    pub max_side: u32,
}

impl ImagePreprocessor {
    /// Creates a new `ImagePreprocessor` for a square model input.
    pub fn new(size: u32) -> Self {
        Self {
            size,
            max_side: MAX_IMAGE_SIDE,
        }
    }

    pub fn with_max_side(mut self, max_side: u32) -> Self {
        self.max_side = max_side;
        self
    }

    /// Scales `image` down proportionally if its longest side exceeds `max_side`.
    pub fn limit_size(&self, image: DynamicImage) -> DynamicImage {
        let (width, height) = image.dimensions();
        let longest = width.max(height);
        if longest <= self.max_side {
            return image;
        }
        let (w, h) = scale_dimensions(width, height, self.max_side);
        tracing::debug!(width, height, w, h, "downscaling oversized image");
        image.resize_exact(w, h, FilterType::Lanczos3)
    }

    /// Resizes to fit `size` and pastes the result centered on a white square.
    pub fn pad_to_square(&self, image: &DynamicImage) -> RgbImage {
        let (width, height) = image.dimensions();
        let (w, h) = scale_dimensions(width, height, self.size);
        let resized = flatten_on_white(&image.resize_exact(w, h, FilterType::Lanczos3));

        let mut square = RgbImage::from_pixel(self.size, self.size, Rgb([255, 255, 255]));
        let pad_left = (self.size - w) / 2;
        let pad_top = (self.size - h) / 2;
        image::imageops::replace(&mut square, &resized, pad_left as i64, pad_top as i64);
        square
    }

    /// Converts a square RGB image into an NHWC tensor in BGR order.
    fn to_tensor(&self, image: &RgbImage) -> Array<f32, Ix4> {
        let size = self.size as usize;
        let mut tensor = Array::zeros((1, size, size, 3));
        for (x, y, pixel) in image.enumerate_pixels() {
            let [r, g, b] = pixel.0;
            tensor[[0, y as usize, x as usize, 0]] = b as f32;
            tensor[[0, y as usize, x as usize, 1]] = g as f32;
            tensor[[0, y as usize, x as usize, 2]] = r as f32;
        }
        tensor
    }
}

impl ImageProcessor for ImagePreprocessor {
    fn process(&self, image: &DynamicImage) -> Result<Array<f32, Ix4>> {
        if self.size == 0 {
            return Err(TaggerError::Configuration(
                "model input size must be positive".to_string(),
            ));
        }
        if self.max_side == 0 {
            return Err(TaggerError::Configuration(
                "maximum image side must be positive".to_string(),
            ));
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(TaggerError::Image(image::ImageError::Parameter(
                image::error::ParameterError::from_kind(
                    image::error::ParameterErrorKind::DimensionMismatch,
                ),
            )));
        }
        let limited = self.limit_size(image.clone());
        let square = self.pad_to_square(&limited);
        Ok(self.to_tensor(&square))
    }
}

/// Scales `(width, height)` so the longest side equals `target`, truncating
/// each dimension and keeping it at least one pixel. A zero `target` is
/// treated as one.
pub fn scale_dimensions(width: u32, height: u32, target: u32) -> (u32, u32) {
    let target = target.max(1);
    let longest = width.max(height).max(1) as u64;
    let scale = |side: u32| ((side as u64 * target as u64 / longest) as u32).clamp(1, target);
    if width >= height {
        (target, scale(height))
    } else {
        (scale(width), target)
    }
}

/// Drops the alpha channel by compositing over white.
fn flatten_on_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as f32 / 255.0;
        let blend = |c: u8| (c as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_scale_dimensions_truncates() {
        assert_eq!(scale_dimensions(800, 200, 448), (448, 112));
        assert_eq!(scale_dimensions(300, 700, 448), (192, 448));
        assert_eq!(scale_dimensions(5000, 3, 448), (448, 1));
    }

    #[test]
    fn test_scale_dimensions_zero_target() {
        assert_eq!(scale_dimensions(800, 200, 0), (1, 1));
        assert_eq!(scale_dimensions(0, 0, 0), (1, 1));
    }

    #[test]
    fn test_zero_max_side_rejected() {
        let processor = ImagePreprocessor::new(448).with_max_side(0);
        let image = DynamicImage::ImageRgb8(RgbImage::new(640, 480));
        assert!(matches!(
            processor.process(&image),
            Err(TaggerError::Configuration(_))
        ));
    }

    #[test]
    fn test_limit_size_keeps_small_images() {
        let processor = ImagePreprocessor::new(448);
        let image = DynamicImage::ImageRgb8(RgbImage::new(640, 480));
        assert_eq!(processor.limit_size(image).dimensions(), (640, 480));
    }

    #[test]
    fn test_limit_size_caps_longest_side() {
        let processor = ImagePreprocessor::new(448).with_max_side(100);
        let image = DynamicImage::ImageRgb8(RgbImage::new(400, 300));
        assert_eq!(processor.limit_size(image).dimensions(), (100, 75));
    }

    #[test]
    fn test_transparent_pixels_become_white() {
        let processor = ImagePreprocessor::new(8);
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 0])));
        let square = processor.pad_to_square(&image);
        assert!(square.pixels().all(|p| p.0 == [255, 255, 255]));
    }
}
