//! Top-level conversion entry points.
//!
//! Each call resolves the input, runs the fallback [`Orchestrator`] once,
//! and turns its terminal result into either a [`ParseOutput`] or a
//! [`Pdf2MdError::ExtractionFailed`] carrying the classified error kind.

use crate::config::ParseConfig;
use crate::error::Pdf2MdError;
use crate::history::{HistoryRecord, ParseHistory};
use crate::orchestrator::Orchestrator;
use crate::output::{ExtractionResult, MetadataHeader, ParseOutput, ParseReport, ParseStats};
use crate::pipeline::input::{self, Document};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Convert a PDF file or URL to Markdown.
///
/// # Errors
/// * input errors (missing file, not a PDF, download failure)
/// * [`Pdf2MdError::ExtractionFailed`] when the cascade ends in failure
pub async fn convert(
    input_str: impl AsRef<str>,
    config: &ParseConfig,
) -> Result<ParseOutput, Pdf2MdError> {
    let input_str = input_str.as_ref();
    info!("Starting conversion: {}", input_str);
    let document = input::resolve_input(input_str, config.download_timeout_secs).await?;
    convert_document(&document, config).await
}

/// Convert PDF bytes held in memory.
///
/// The bytes are staged in a private temporary directory under
/// `filename`, which is removed when the call returns.
///
/// ```rust,no_run
/// use pdf2md_cascade::{convert_from_bytes, ParseConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("article.pdf")?;
/// let output = convert_from_bytes(&bytes, "article.pdf", &ParseConfig::default()).await?;
/// println!("{}", output.markdown);
/// # Ok(())
/// # }
/// ```
pub async fn convert_from_bytes(
    bytes: &[u8],
    filename: &str,
    config: &ParseConfig,
) -> Result<ParseOutput, Pdf2MdError> {
    let document = Document::from_bytes(bytes, filename)?;
    convert_document(&document, config).await
}

/// Convert and write the Markdown to `output_path`.
///
/// The file is written to a sibling temp file first and renamed into
/// place, so a failed run never leaves a partial file behind.
pub async fn convert_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ParseConfig,
) -> Result<ParseOutput, Pdf2MdError> {
    let output = convert(input_str, config).await?;
    write_atomic(output_path.as_ref(), &output.markdown).await?;
    Ok(output)
}

/// Synchronous wrapper around [`convert`]. Creates a runtime internally.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    config: &ParseConfig,
) -> Result<ParseOutput, Pdf2MdError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2MdError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input_str, config))
}

/// [`convert`], recording the outcome in `history` whether or not it
/// succeeded.
pub async fn convert_with_history(
    input_str: impl AsRef<str>,
    config: &ParseConfig,
    history: &mut ParseHistory,
) -> Result<ParseOutput, Pdf2MdError> {
    let input_str = input_str.as_ref();
    let started = Instant::now();
    let result = convert(input_str, config).await;

    let filename = input::filename_from_input(input_str);
    let record = match &result {
        Ok(output) => HistoryRecord {
            filename,
            method: output.method().to_string(),
            success: true,
            elapsed_secs: started.elapsed().as_secs_f64(),
        },
        Err(e) => HistoryRecord {
            filename,
            method: match e {
                Pdf2MdError::ExtractionFailed { kind, .. } => kind.to_string(),
                _ => "none".to_string(),
            },
            success: false,
            elapsed_secs: started.elapsed().as_secs_f64(),
        },
    };
    history.push(record);
    result
}

/// Run the cascade on an already resolved document.
pub async fn convert_document(
    document: &Document,
    config: &ParseConfig,
) -> Result<ParseOutput, Pdf2MdError> {
    let started = Instant::now();
    let orchestrator = Orchestrator::from_config(config);
    let report = orchestrator.run(document).await;
    finish(document, config, report, started)
}

fn finish(
    document: &Document,
    config: &ParseConfig,
    report: ParseReport,
    started: Instant,
) -> Result<ParseOutput, Pdf2MdError> {
    let ParseReport {
        result,
        attempts,
        title,
        ..
    } = report;

    let (content, method, page_count) = match &result {
        ExtractionResult::Success {
            content,
            method,
            page_count,
        } => (content, method, *page_count),
        ExtractionResult::Failure {
            error_kind,
            message,
        } => {
            return Err(Pdf2MdError::ExtractionFailed {
                kind: *error_kind,
                message: message.clone(),
            })
        }
    };

    let elapsed = started.elapsed();
    let stats = ParseStats::from_markdown(content, page_count, elapsed.as_millis() as u64);
    debug!(
        "{} chars, {} words, {} paragraphs",
        stats.char_count, stats.word_count, stats.paragraph_count
    );

    let markdown = if config.include_metadata {
        let header = MetadataHeader {
            title: config
                .title
                .clone()
                .or(title)
                .unwrap_or_else(|| document.stem().to_string()),
            parsed_by: method.clone(),
            model: method
                .starts_with("remote:")
                .then(|| config.model_id.clone()),
            date: chrono::Local::now(),
            elapsed_secs: elapsed.as_secs_f64(),
        };
        format!("{}{}", header.render(), content)
    } else {
        content.clone()
    };

    Ok(ParseOutput {
        markdown,
        result,
        attempts,
        stats,
    })
}

/// Write `contents` to `path` through a sibling `.md.tmp` file and a
/// rename, creating parent directories as needed.
pub async fn write_atomic(path: &Path, contents: &str) -> Result<(), Pdf2MdError> {
    let io_err = |source| Pdf2MdError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, contents).await.map_err(io_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(io_err)?;
    Ok(())
}
