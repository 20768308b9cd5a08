use image::codecs::jpeg::JpegEncoder;

use crate::error::ErrorKind;

/// Thumbnails fit inside a square of this many pixels.
pub const THUMBNAIL_MAX_DIM: u32 = 300;

/// JPEG quality used for stored thumbnails.
pub const THUMBNAIL_JPEG_QUALITY: u8 = 70;

/// Downsample an encoded image to fit the thumbnail box and re-encode it as JPEG.
///
/// Images already inside the box keep their size.
pub fn make_thumbnail(encoded: &[u8]) -> Result<Vec<u8>, ThumbnailError> {
    let img = image::load_from_memory(encoded)?;

    let img = if img.width() > THUMBNAIL_MAX_DIM || img.height() > THUMBNAIL_MAX_DIM {
        img.thumbnail(THUMBNAIL_MAX_DIM, THUMBNAIL_MAX_DIM)
    } else {
        img
    };

    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, THUMBNAIL_JPEG_QUALITY).encode_image(&rgb)?;
    Ok(out)
}

#[derive(Debug, thiserror::Error)]
pub enum ThumbnailError {
    #[error("Failed to decode or encode thumbnail: {0}")]
    Image(#[from] image::ImageError),
}

impl ThumbnailError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::MalformedResponse
    }
}
