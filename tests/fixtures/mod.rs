//! Media fixtures for client tests

use std::io::Cursor;

use image::{ImageFormat, Rgb, RgbImage};

/// Encoded test image, a horizontal gradient
pub fn png_image(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let r = (x * 255 / width.max(1)) as u8;
        let g = (y * 255 / height.max(1)) as u8;
        Rgb([r, g, 128])
    });

    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .expect("encode PNG fixture");
    out.into_inner()
}

/// Grayscale source photo as the client would upload it
pub fn jpeg_photo() -> Vec<u8> {
    let img = RgbImage::from_fn(320, 240, |x, y| {
        let v = ((x + y) % 256) as u8;
        Rgb([v, v, v])
    });

    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Jpeg)
        .expect("encode JPEG fixture");
    out.into_inner()
}

/// Bytes shaped like the start of an MP4 file. The client never decodes video.
pub fn mp4_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![
        0x00, 0x00, 0x00, 0x18, b'f', b't', b'y', b'p', b'i', b's', b'o', b'm', 0x00, 0x00, 0x02,
        0x00, b'i', b's', b'o', b'm', b'm', b'p', b'4', b'1',
    ];
    bytes.extend((0..len.saturating_sub(bytes.len())).map(|i| (i % 251) as u8));
    bytes
}
