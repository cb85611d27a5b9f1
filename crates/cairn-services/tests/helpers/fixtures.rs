use bytes::Bytes;
use cairn_core::models::UploadMetadata;
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

/// A real PNG of the given size.
pub fn create_test_png(width: u32, height: u32) -> Bytes {
    let img = RgbaImage::from_pixel(width, height, Rgba([20, 120, 220, 255]));
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Png)
        .expect("PNG encoding should succeed");
    Bytes::from(buffer.into_inner())
}

/// Text content that differs per `seed`, so each call hashes differently.
pub fn text_content(seed: usize, len: usize) -> Bytes {
    let line = format!("cairn test document {}\n", seed);
    let mut data = line.repeat(len / line.len() + 1).into_bytes();
    data.truncate(len);
    Bytes::from(data)
}

pub fn text_meta(name: &str) -> UploadMetadata {
    UploadMetadata::new(name, "text/plain")
}
