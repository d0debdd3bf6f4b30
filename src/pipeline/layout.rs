//! Layout-aware page reading through pdfium: page text, embedded image
//! counts, and a column heuristic for spotting tables in that text.
//!
//! All pdfium work runs in `spawn_blocking`; the library keeps
//! thread-local state and is CPU-bound.

use crate::error::ExtractionError;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming a directory that holds the pdfium library.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Bind to pdfium: `PDFIUM_LIB_PATH`, then the working directory, then the
/// system library search path.
pub fn bind_pdfium() -> Result<Pdfium, ExtractionError> {
    let candidates: Vec<PathBuf> = std::env::var_os(PDFIUM_LIB_PATH_ENV)
        .map(PathBuf::from)
        .into_iter()
        .chain(std::iter::once(PathBuf::from("./")))
        .collect();

    let mut last_err = String::new();
    for dir in &candidates {
        match Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)) {
            Ok(bindings) => {
                debug!("Bound pdfium from {}", dir.display());
                return Ok(Pdfium::new(bindings));
            }
            Err(e) => last_err = format!("{e:?}"),
        }
    }

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| ExtractionError::PdfiumUnavailable(format!("{e:?} (after: {last_err})")))
}

/// What pdfium sees on one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    pub text: String,
    pub image_count: usize,
}

fn read_layout_blocking(
    path: &Path,
    password: Option<&str>,
) -> Result<Vec<PageLayout>, ExtractionError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(path, password)
        .map_err(|e| ExtractionError::PdfLoad(format!("{e:?}")))?;

    let pages = document.pages();
    let mut out = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let text = page
            .text()
            .map_err(|e| ExtractionError::MethodFailed {
                method: "pdfium".into(),
                detail: format!("page {}: {e:?}", idx + 1),
            })?
            .all();
        let image_count = page
            .objects()
            .iter()
            .filter(|o| o.object_type() == PdfPageObjectType::Image)
            .count();
        out.push(PageLayout { text, image_count });
    }
    debug!("pdfium read {} pages from {}", out.len(), path.display());
    Ok(out)
}

/// Read text and image counts for every page.
pub async fn read_layout(
    path: &Path,
    password: Option<&str>,
) -> Result<Vec<PageLayout>, ExtractionError> {
    let path = path.to_path_buf();
    let password = password.map(str::to_string);
    tokio::task::spawn_blocking(move || read_layout_blocking(&path, password.as_deref()))
        .await
        .map_err(|e| ExtractionError::Task(e.to_string()))?
}

// ── Table heuristic ──────────────────────────────────────────────────────

static RE_CELL_GAP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\t+|\s{2,}").unwrap());

/// A table as rows of cells. The first row is the header.
pub type TableRows = Vec<Vec<String>>;

fn split_cells(line: &str) -> Vec<String> {
    RE_CELL_GAP
        .split(line.trim())
        .map(|c| c.trim().to_string())
        .collect()
}

/// Find runs of at least two consecutive lines that split into the same
/// number (≥ 2) of cells on tab or multi-space gaps.
pub fn detect_tables(text: &str) -> Vec<TableRows> {
    let mut tables = Vec::new();
    let mut run: TableRows = Vec::new();

    let mut flush = |run: &mut TableRows| {
        if run.len() >= 2 {
            tables.push(std::mem::take(run));
        } else {
            run.clear();
        }
    };

    for line in text.lines() {
        let cells = if line.trim().is_empty() {
            Vec::new()
        } else {
            split_cells(line)
        };
        if cells.len() < 2 {
            flush(&mut run);
            continue;
        }
        if run.first().is_some_and(|r| r.len() != cells.len()) {
            flush(&mut run);
        }
        run.push(cells);
    }
    flush(&mut run);
    tables
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_aligned_columns() {
        let text = "Results\n\
                    Group    Mean    SD\n\
                    A        4.2     1.1\n\
                    B        3.9     0.8\n\
                    Discussion follows.";
        let tables = detect_tables(text);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].len(), 3);
        assert_eq!(tables[0][0], vec!["Group", "Mean", "SD"]);
        assert_eq!(tables[0][2], vec!["B", "3.9", "0.8"]);
    }

    #[test]
    fn prose_has_no_tables() {
        let text = "This is a sentence with single spaces.\nAnother line of prose.";
        assert!(detect_tables(text).is_empty());
    }

    #[test]
    fn single_row_is_not_a_table() {
        assert!(detect_tables("Name    Value\nplain prose").is_empty());
    }

    #[test]
    fn column_count_change_splits_runs() {
        let text = "a  b\nc  d\ne  f  g\nh  i  j";
        let tables = detect_tables(text);
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[1][0].len(), 3);
    }

    #[test]
    fn tabs_separate_cells() {
        let tables = detect_tables("x\ty\n1\t2");
        assert_eq!(tables, vec![vec![vec!["x", "y"], vec!["1", "2"]]]);
    }
}
