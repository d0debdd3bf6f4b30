//! Rendered OCR pages → `ImageData` for the vision model.
//!
//! Pages go out as 8-bit grayscale PNG with `detail: "high"`.

use crate::error::ExtractionError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use tracing::debug;

/// Encode the 1-based page `page` for transcription.
pub fn encode_page(page: usize, img: &DynamicImage) -> Result<ImageData, ExtractionError> {
    let gray = DynamicImage::ImageLuma8(img.to_luma8());
    let mut png = Vec::new();
    gray.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| ExtractionError::MethodFailed {
            method: "ocr".into(),
            detail: format!("page {page}: encode failed: {e}"),
        })?;

    debug!(
        "Page {} ({}x{}) encoded, {} PNG bytes",
        page,
        gray.width(),
        gray.height(),
        png.len()
    );
    Ok(ImageData::new(STANDARD.encode(&png), "image/png").with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ColorType, Rgba, RgbaImage};

    #[test]
    fn rendered_page_becomes_grayscale_png() {
        let page = RgbaImage::from_fn(40, 20, |x, _| {
            if x < 20 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 120, 255])
            }
        });
        let data = encode_page(1, &DynamicImage::ImageRgba8(page)).unwrap();
        assert_eq!(data.mime_type, "image/png");

        let png = STANDARD.decode(&data.data).unwrap();
        let back = image::load_from_memory_with_format(&png, ImageFormat::Png).unwrap();
        assert_eq!((back.width(), back.height()), (40, 20));
        assert_eq!(back.color(), ColorType::L8);
        let luma = back.to_luma8();
        assert_eq!(luma.get_pixel(0, 0).0, [255]);
        assert!(luma.get_pixel(39, 0).0[0] < 50);
    }
}
