//! Error types for the pdf2md-cascade library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`Pdf2MdError`]: **Fatal**: the request cannot produce a document at
//!   all (bad input file, invalid configuration, every backend failed).
//!   Returned as `Err(Pdf2MdError)` from the top-level `convert*` functions.
//!
//! * [`ExtractionError`]: **Non-fatal**: one backend or one local method
//!   failed. The orchestrator turns it into a failed attempt, classifies it
//!   and moves on to the next step of the cascade.
//!
//! * [`ModelError`]: a generative-model call failed. Enhancement and OCR
//!   degrade gracefully on it; it never aborts a request.

use crate::output::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf2md-cascade library.
#[derive(Debug, Error)]
pub enum Pdf2MdError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The cascade reached a terminal failure.
    #[error("Extraction failed ({kind}): {message}\nSuggestion: {}", .kind.remediation())]
    ExtractionFailed { kind: ErrorKind, message: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed or an option value was not recognised.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal failure of one backend or one local extraction method.
///
/// Its `Display` text is what the failure classifier sees, so remote
/// variants keep the upstream message verbatim.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// lopdf or pdfium could not open the document.
    #[error("failed to load PDF: {0}")]
    PdfLoad(String),

    /// No pdfium shared library could be bound.
    #[error("pdfium library unavailable: {0}\nSet PDFIUM_LIB_PATH to a directory containing libpdfium.")]
    PdfiumUnavailable(String),

    /// A local method ran but failed part-way.
    #[error("{method} extraction failed: {detail}")]
    MethodFailed { method: String, detail: String },

    /// External converter program is not installed.
    #[error("external tool not found: {0}")]
    ToolNotFound(String),

    /// External converter exited with an error.
    #[error("converter failed: {0}")]
    ConverterFailed(String),

    /// Transport-level or non-success HTTP failure from the remote service.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The remote parse job itself reported a failure.
    #[error("remote job failed: {0}")]
    RemoteJob(String),

    /// A blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ExtractionError {
    fn from(e: reqwest::Error) -> Self {
        ExtractionError::Http {
            status: e.status().map(|s| s.as_u16()).unwrap_or(0),
            body: e.to_string(),
        }
    }
}

/// A generative-model call failed.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// No provider could be resolved from config or environment.
    #[error("model provider '{provider}' is not configured: {hint}")]
    NotConfigured { provider: String, hint: String },

    /// The provider returned an error.
    #[error("model call failed: {0}")]
    Call(String),

    /// The provider answered with no text.
    #[error("model returned an empty response")]
    EmptyResponse,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::FailureKind;

    #[test]
    fn extraction_failed_display_carries_remediation() {
        let e = Pdf2MdError::ExtractionFailed {
            kind: ErrorKind::Remote(FailureKind::QuotaExhausted),
            message: "HTTP 402: credits exhausted".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("credits exhausted"), "got: {msg}");
        assert!(msg.contains("local"), "got: {msg}");
    }

    #[test]
    fn http_error_display_keeps_body_for_classifier() {
        let e = ExtractionError::Http {
            status: 429,
            body: "quota exceeded for project".into(),
        };
        assert_eq!(e.to_string(), "HTTP 429: quota exceeded for project");
    }

    #[test]
    fn method_failed_display() {
        let e = ExtractionError::MethodFailed {
            method: "text+tables".into(),
            detail: "page 2 unreadable".into(),
        };
        assert!(e.to_string().starts_with("text+tables extraction failed"));
    }

    #[test]
    fn model_not_configured_display() {
        let e = ModelError::NotConfigured {
            provider: "gemini".into(),
            hint: "set GEMINI_API_KEY".into(),
        };
        assert!(e.to_string().contains("gemini"));
        assert!(e.to_string().contains("GEMINI_API_KEY"));
    }
}
