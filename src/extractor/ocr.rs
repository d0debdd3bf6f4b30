//! Image-based fallback for scanned documents.
//!
//! Renders the first few pages and asks a vision model to transcribe each.
//! The page cap bounds model cost on long scans.

use super::{join_pages, AttemptOptions, Backend, Extracted, Extractor, Outcome};
use crate::error::ExtractionError;
use crate::model::TextModel;
use crate::pipeline::input::Document;
use crate::pipeline::{encode, render};
use crate::prompts::OCR_PROMPT;
use async_trait::async_trait;
use image::DynamicImage;
use std::sync::Arc;
use tracing::{info, warn};

pub struct OcrExtractor {
    model: Arc<dyn TextModel>,
    max_pages: usize,
    max_pixels: u32,
    password: Option<String>,
}

impl OcrExtractor {
    pub fn new(model: Arc<dyn TextModel>, max_pages: usize, max_pixels: u32) -> Self {
        Self {
            model,
            max_pages: max_pages.max(1),
            max_pixels,
            password: None,
        }
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    /// Transcribe already-rendered pages. Pages whose call fails are skipped.
    pub async fn transcribe(
        &self,
        pages: &[(usize, DynamicImage)],
    ) -> Result<String, ExtractionError> {
        let mut sections: Vec<(usize, String)> = Vec::with_capacity(pages.len());
        let mut last_err = None;

        for (idx, img) in pages.iter().take(self.max_pages) {
            let image = encode::encode_page(idx + 1, img)?;
            match self.model.generate(OCR_PROMPT, Some(image)).await {
                Ok(text) => sections.push((idx + 1, text)),
                Err(e) => {
                    warn!("OCR of page {} failed: {}", idx + 1, e);
                    last_err = Some(format!("page {}: {e}", idx + 1));
                }
            }
        }

        if sections.is_empty() {
            return Err(ExtractionError::MethodFailed {
                method: "ocr".into(),
                detail: last_err.unwrap_or_else(|| "document has no pages".into()),
            });
        }
        Ok(join_pages(sections.iter().map(|(n, t)| (*n, t.as_str()))))
    }
}

#[async_trait]
impl Extractor for OcrExtractor {
    fn backend(&self) -> Backend {
        Backend::ImageOcr
    }

    async fn attempt(&self, document: &Document, _options: &AttemptOptions) -> Outcome {
        info!("OCR fallback on the first {} pages", self.max_pages);
        let pages = match render::render_leading_pages(
            document.path(),
            self.password.as_deref(),
            self.max_pages,
            self.max_pixels,
        )
        .await
        {
            Ok(p) => p,
            Err(e) => return Outcome::failed(e),
        };
        let count = pages.len();
        self.transcribe(&pages)
            .await
            .map(|md| Extracted::new(md, "ocr").with_page_count(count))
            .into()
    }
}
