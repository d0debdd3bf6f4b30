//! Pure-Rust text access through lopdf.
//!
//! Used for the plain-text method and for page counting (remote chunking),
//! so neither depends on a pdfium shared library being present.

use crate::error::ExtractionError;
use lopdf::Document as LopdfDocument;
use std::path::Path;
use tracing::debug;

fn load(path: &Path, password: Option<&str>) -> Result<LopdfDocument, ExtractionError> {
    let mut document =
        LopdfDocument::load(path).map_err(|e| ExtractionError::PdfLoad(e.to_string()))?;

    if document.is_encrypted() && document.decrypt(password.unwrap_or("")).is_err() {
        return Err(ExtractionError::PdfLoad(
            "cannot decrypt password-protected PDF".into(),
        ));
    }

    document.decompress();
    Ok(document)
}

fn page_count_blocking(path: &Path) -> Result<usize, ExtractionError> {
    let document = LopdfDocument::load(path).map_err(|e| ExtractionError::PdfLoad(e.to_string()))?;
    Ok(document.get_pages().len())
}

fn page_texts_blocking(
    path: &Path,
    password: Option<&str>,
) -> Result<Vec<String>, ExtractionError> {
    let document = load(path, password)?;

    let mut page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
    page_numbers.sort_unstable();

    let mut texts = Vec::with_capacity(page_numbers.len());
    for n in page_numbers {
        let text = document
            .extract_text(&[n])
            .map_err(|e| ExtractionError::MethodFailed {
                method: "plain-text".into(),
                detail: format!("page {n}: {e}"),
            })?;
        texts.push(text);
    }
    debug!("lopdf extracted {} pages from {}", texts.len(), path.display());
    Ok(texts)
}

/// Number of pages in the document.
pub async fn page_count(path: &Path) -> Result<usize, ExtractionError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || page_count_blocking(&path))
        .await
        .map_err(|e| ExtractionError::Task(e.to_string()))?
}

/// Raw text of every page, in page order.
pub async fn page_texts(
    path: &Path,
    password: Option<&str>,
) -> Result<Vec<String>, ExtractionError> {
    let path = path.to_path_buf();
    let password = password.map(str::to_string);
    tokio::task::spawn_blocking(move || page_texts_blocking(&path, password.as_deref()))
        .await
        .map_err(|e| ExtractionError::Task(e.to_string()))?
}

#[cfg(test)]
#[path = "../../tests/common/mod.rs"]
mod fixtures;
