//! Image encoding: `DynamicImage` → PNG bytes, optionally base64-wrapped.
//!
//! PNG keeps the alpha channel and is lossless, so thin lines in geometry
//! diagrams survive. Upload endpoints for question images accept either raw
//! bytes or a `data:image/png;base64,…` URI; both are produced here.

use crate::error::PipelineError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// MIME type of everything this module produces.
pub const PNG_MIME: &str = "image/png";

/// Encode an image as PNG.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, PipelineError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| PipelineError::EncodeFailed(e.to_string()))?;
    debug!(
        "Encoded {}x{} image → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}

/// Wrap PNG bytes as a `data:` URI.
pub fn to_data_uri(png: &[u8]) -> String {
    format!("data:{};base64,{}", PNG_MIME, STANDARD.encode(png))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 128])));
        let png = encode_png(&img).expect("encode should succeed");
        assert!(png.starts_with(b"\x89PNG"));

        let decoded = image::load_from_memory(&png).expect("valid png");
        assert!(decoded.color().has_alpha());
        assert_eq!(decoded.width(), 10);
    }

    #[test]
    fn data_uri_prefix() {
        let uri = to_data_uri(b"\x89PNG");
        assert!(uri.starts_with("data:image/png;base64,"));
        let payload = uri.trim_start_matches("data:image/png;base64,");
        assert_eq!(STANDARD.decode(payload).unwrap(), b"\x89PNG");
    }
}
