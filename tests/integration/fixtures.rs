//! Image fixtures shared by the integration tests.

use image::{ImageFormat, Rgb, RgbImage};
use std::path::Path;

/// A small PNG whose bytes differ for every `seed`.
pub fn write_png(path: &Path, seed: u32) {
    let [a, b, c, _] = seed.to_le_bytes();
    RgbImage::from_fn(6, 6, |x, y| Rgb([a, b, c.wrapping_add((x * 6 + y) as u8)]))
        .save_with_format(path, ImageFormat::Png)
        .unwrap();
}

/// A noisy PNG of roughly `side * side * 3` bytes; noise defeats compression.
pub fn write_noise_png(path: &Path, side: u32, seed: u64) {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    let img = RgbImage::from_fn(side, side, |_, _| {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let [r, g, b, ..] = (state >> 24).to_le_bytes();
        Rgb([r, g, b])
    });
    img.save_with_format(path, ImageFormat::Png).unwrap();
}

/// An uncompressed BMP; every call with the same dimensions yields the same size.
pub fn write_bmp(path: &Path, width: u32, height: u32, shade: u8) {
    RgbImage::from_pixel(width, height, Rgb([shade, shade / 2, 255 - shade]))
        .save_with_format(path, ImageFormat::Bmp)
        .unwrap();
}
