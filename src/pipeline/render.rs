//! PDF rasterisation for the OCR fallback.
//!
//! `max_rendered_pixels` caps the longest edge regardless of physical page
//! size, so an oversized page never exhausts memory.

use crate::error::ExtractionError;
use crate::pipeline::layout::bind_pdfium;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Rasterise the first `max_pages` pages.
///
/// # Returns
/// `(page_index_0based, image)` pairs in page order.
pub async fn render_leading_pages(
    pdf_path: &Path,
    password: Option<&str>,
    max_pages: usize,
    max_pixels: u32,
) -> Result<Vec<(usize, DynamicImage)>, ExtractionError> {
    let path = pdf_path.to_path_buf();
    let password = password.map(str::to_string);

    tokio::task::spawn_blocking(move || {
        render_pages_blocking(&path, password.as_deref(), max_pages, max_pixels)
    })
    .await
    .map_err(|e| ExtractionError::Task(format!("render task panicked: {e}")))?
}

fn render_pages_blocking(
    pdf_path: &Path,
    password: Option<&str>,
    max_pages: usize,
    max_pixels: u32,
) -> Result<Vec<(usize, DynamicImage)>, ExtractionError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| ExtractionError::PdfLoad(format!("{e:?}")))?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    let count = total_pages.min(max_pages);
    info!("Rendering {} of {} pages for OCR", count, total_pages);

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut results = Vec::with_capacity(count);
    for idx in 0..count {
        let page = pages
            .get(idx as u16)
            .map_err(|e| ExtractionError::MethodFailed {
                method: "render".into(),
                detail: format!("page {}: {e:?}", idx + 1),
            })?;

        let bitmap =
            page.render_with_config(&render_config)
                .map_err(|e| ExtractionError::MethodFailed {
                    method: "render".into(),
                    detail: format!("page {}: {e:?}", idx + 1),
                })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        results.push((idx, image));
    }

    Ok(results)
}
