//! Shared fixtures for integration tests

#![allow(dead_code)]

use image::{ImageFormat, Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};

/// Write a small gradient image at `dir/name`, creating `dir` if needed
pub fn write_image(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let mut image = RgbImage::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let intensity = ((x + y) % 100) as u8;
        *pixel = Rgb([intensity, 128, 255 - intensity]);
    }

    let path = dir.join(name);
    let format = ImageFormat::from_path(&path).unwrap_or(ImageFormat::Png);
    image.save_with_format(&path, format).unwrap();
    path
}

/// Write arbitrary bytes at `dir/name`
pub fn write_bytes(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}

/// Populate `root/class` with `count` placeholder files
pub fn populate_class(root: &Path, class: &str, count: usize) {
    for i in 0..count {
        write_bytes(&root.join(class), &format!("{class}_{i:03}.jpg"), class.as_bytes());
    }
}
