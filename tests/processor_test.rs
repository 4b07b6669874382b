use aitag::processor::{scale_dimensions, ImagePreprocessor, ImageProcessor};
use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use ndarray::s;

mod common;
use common::{setup, TEST_IMAGE};

fn pixel(tensor: &ndarray::Array4<f32>, x: usize, y: usize) -> [f32; 3] {
    let p = tensor.slice(s![0, y, x, ..]);
    [p[0usize], p[1usize], p[2usize]]
}

#[test]
fn test_process_image() {
    setup();
    let image = image::open(TEST_IMAGE).unwrap();
    let processor = ImagePreprocessor::new(448);
    let tensor = processor.process(&image).unwrap();

    assert_eq!(tensor.shape(), &[1, 448, 448, 3]);

    // 800x200 becomes 448x112, centered vertically at rows 168..280.
    const RED_BGR: [f32; 3] = [0.0, 0.0, 255.0];
    const WHITE: [f32; 3] = [255.0, 255.0, 255.0];
    assert_eq!(pixel(&tensor, 224, 224), RED_BGR);
    assert_eq!(pixel(&tensor, 224, 0), WHITE);
    assert_eq!(pixel(&tensor, 224, 447), WHITE);
    assert_eq!(pixel(&tensor, 224, 167), WHITE);
    assert_eq!(pixel(&tensor, 224, 280), WHITE);
    assert_eq!(pixel(&tensor, 0, 200), RED_BGR);
}

#[test]
fn test_values_are_raw_pixel_range() {
    let image = DynamicImage::ImageRgb8(RgbImage::from_fn(64, 64, |x, y| {
        Rgb([(x * 4) as u8, (y * 4) as u8, 128])
    }));
    let tensor = ImagePreprocessor::new(32).process(&image).unwrap();
    assert!(tensor.iter().all(|&v| (0.0..=255.0).contains(&v)));
    assert!(tensor.iter().any(|&v| v > 1.0));
}

#[test]
fn test_tall_image_padded_horizontally() {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 100, Rgb([0, 255, 0])));
    let tensor = ImagePreprocessor::new(100).process(&image).unwrap();

    assert_eq!(pixel(&tensor, 50, 50), [0.0, 255.0, 0.0]);
    assert_eq!(pixel(&tensor, 10, 50), [255.0, 255.0, 255.0]);
    assert_eq!(pixel(&tensor, 90, 50), [255.0, 255.0, 255.0]);
}

#[test]
fn test_transparency_becomes_white() {
    let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(16, 16, Rgba([0, 0, 0, 0])));
    let tensor = ImagePreprocessor::new(16).process(&image).unwrap();
    assert!(tensor.iter().all(|&v| v == 255.0));
}

#[test]
fn test_oversized_image_capped() {
    let processor = ImagePreprocessor::new(448).with_max_side(1024);
    let image = DynamicImage::ImageRgb8(RgbImage::new(4096, 1024));
    let limited = processor.limit_size(image);
    assert_eq!((limited.width(), limited.height()), (1024, 256));

    let small = DynamicImage::ImageRgb8(RgbImage::new(300, 200));
    let untouched = processor.limit_size(small);
    assert_eq!((untouched.width(), untouched.height()), (300, 200));
}

#[test]
fn test_scale_dimensions_keeps_longest_side() {
    for (w, h) in [(800, 200), (200, 800), (1, 1), (448, 448), (3000, 2999)] {
        let (sw, sh) = scale_dimensions(w, h, 448);
        assert_eq!(sw.max(sh), 448);
        assert!(sw >= 1 && sh >= 1);
    }
}
