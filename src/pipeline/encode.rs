//! Image encoding: raw page render → reduced JPEG on disk → base64 `ImageData`.
//!
//! Renders at 200 DPI are large (an A4 page is ~1650 × 2340 px, several MB as
//! PNG). Each page is shrunk so its longest edge fits `max_dimension` and
//! re-encoded as JPEG before anything else sees it. `detail: "high"` is kept
//! on the request so the vision model still tiles the full page.

use crate::error::ExternalError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// MIME type of every page image handed to the extractor.
pub const PAGE_MIME: &str = "image/jpeg";

/// Shrink `img` so neither edge exceeds `max_dimension`. Smaller images are
/// returned unchanged.
pub fn fit_within(img: DynamicImage, max_dimension: u32) -> DynamicImage {
    if max_dimension == 0 || (img.width() <= max_dimension && img.height() <= max_dimension) {
        return img;
    }
    img.resize(max_dimension, max_dimension, FilterType::Lanczos3)
}

/// Read the raw render at `raw`, reduce it and write a JPEG to `dest`.
///
/// Returns the dimensions of the written image.
pub fn compress_page(
    raw: &Path,
    dest: &Path,
    max_dimension: u32,
    quality: u8,
) -> Result<(u32, u32), ExternalError> {
    let img = fit_within(image::open(raw)?, max_dimension);
    let (w, h) = (img.width(), img.height());

    let mut out = BufWriter::new(File::create(dest)?);
    let encoder = JpegEncoder::new_with_quality(&mut out, quality);
    // JPEG has no alpha channel.
    DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)?;
    out.flush()?;

    debug!("Compressed {} → {} ({}x{})", raw.display(), dest.display(), w, h);
    Ok((w, h))
}

/// Wrap encoded image bytes for a vision request.
pub fn encode_page(bytes: &[u8], mime_type: &str) -> ImageData {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded image → {} bytes base64", b64.len());
    ImageData::new(b64, mime_type).with_detail("high")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn solid(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([200, 30, 30, 255])))
    }

    #[test]
    fn small_images_untouched() {
        let img = fit_within(solid(40, 30), 100);
        assert_eq!((img.width(), img.height()), (40, 30));
    }

    #[test]
    fn longest_edge_capped_and_aspect_kept() {
        let img = fit_within(solid(400, 200), 100);
        assert_eq!((img.width(), img.height()), (100, 50));
    }

    #[test]
    fn compress_writes_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw.png");
        let dest = dir.path().join("page.jpg");
        solid(300, 150).save(&raw).unwrap();

        let dims = compress_page(&raw, &dest, 120, 80).unwrap();

        assert_eq!(dims, (120, 60));
        let bytes = std::fs::read(&dest).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn compress_missing_input_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = compress_page(&dir.path().join("nope.png"), &dir.path().join("x.jpg"), 100, 80);
        assert!(err.is_err());
    }

    #[test]
    fn encode_small_image() {
        let data = encode_page(b"\xFF\xD8jpegdata", PAGE_MIME);
        assert_eq!(data.mime_type, "image/jpeg");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(decoded, b"\xFF\xD8jpegdata");
    }
}
