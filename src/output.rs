//! Result and diagnostic types produced by a parse request.

use crate::classify::FailureKind;
use crate::extractor::Backend;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal error category surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    /// The remote backend failed and no fallback was allowed.
    Remote(FailureKind),
    /// Every local extractor (and OCR, when enabled) failed.
    LocalExtractionFailure,
}

impl ErrorKind {
    /// Short, user-facing suggestion for what to try next.
    pub fn remediation(&self) -> &'static str {
        match self {
            ErrorKind::Remote(FailureKind::ContentPolicyRejection) => {
                "the model refused to reproduce the text; switch to another model or use local mode (--policy local-only)"
            }
            ErrorKind::Remote(FailureKind::QuotaExhausted) => {
                "remote credits are exhausted; wait for the quota to reset or use local mode (--policy local-only)"
            }
            ErrorKind::Remote(FailureKind::PartialMultimodalFailure) => {
                "some pages failed remotely; split the file into smaller parts (--chunking) or use local mode"
            }
            ErrorKind::Remote(FailureKind::Unknown) => {
                "retry later, switch to another model, or use local mode (--policy local-only)"
            }
            ErrorKind::LocalExtractionFailure => {
                "the PDF may be scanned or damaged; enable the OCR fallback, provide a remote API key, or split the file"
            }
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Remote(kind) => write!(f, "remote: {kind}"),
            ErrorKind::LocalExtractionFailure => f.write_str("local_extraction_failure"),
        }
    }
}

/// How a single attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    /// `kind` is set only for remote failures, which are classified.
    Failure {
        kind: Option<FailureKind>,
        message: String,
    },
}

/// One backend invocation. Appended to the attempt log, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionAttempt {
    pub backend: Backend,
    /// 1-based attempt number for this backend.
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    /// Characters of content produced (0 on failure).
    pub content_len: usize,
    pub duration_ms: u64,
    /// Pages named in a partial multimodal failure, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_pages: Vec<usize>,
}

impl ExtractionAttempt {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Success)
    }
}

/// Terminal outcome of a parse request. Exactly one per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ExtractionResult {
    Success {
        content: String,
        /// Backend or method identifier, e.g. `remote:gemini-2.0-flash`
        /// or `local:text+tables`.
        method: String,
        page_count: Option<usize>,
    },
    Failure {
        error_kind: ErrorKind,
        message: String,
    },
}

impl ExtractionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionResult::Success { .. })
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            ExtractionResult::Success { method, .. } => Some(method),
            ExtractionResult::Failure { .. } => None,
        }
    }
}

/// What the orchestrator returns: the result plus the attempt log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseReport {
    pub result: ExtractionResult,
    pub attempts: Vec<ExtractionAttempt>,
    /// Retry counter at the end of the remote stage. Only retryable
    /// failures increment it.
    pub remote_retries: u32,
    /// Title reported by the winning backend (converter headings).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl ParseReport {
    pub fn attempts_for(&self, backend: Backend) -> usize {
        self.attempts.iter().filter(|a| a.backend == backend).count()
    }
}

/// Document statistics shown to the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseStats {
    pub elapsed_ms: u64,
    pub page_count: Option<usize>,
    pub char_count: usize,
    pub word_count: usize,
    pub line_count: usize,
    pub paragraph_count: usize,
}

impl ParseStats {
    pub fn from_markdown(markdown: &str, page_count: Option<usize>, elapsed_ms: u64) -> Self {
        Self {
            elapsed_ms,
            page_count,
            char_count: markdown.chars().count(),
            word_count: markdown.split_whitespace().count(),
            line_count: markdown.lines().count(),
            paragraph_count: markdown
                .split("\n\n")
                .filter(|p| !p.trim().is_empty())
                .count(),
        }
    }
}

/// Final output of a successful request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseOutput {
    /// Markdown, including the metadata header when requested.
    pub markdown: String,
    pub result: ExtractionResult,
    pub attempts: Vec<ExtractionAttempt>,
    pub stats: ParseStats,
}

impl ParseOutput {
    pub fn method(&self) -> &str {
        self.result.method().unwrap_or("none")
    }
}

/// Metadata block prepended to the Markdown as YAML front matter.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataHeader {
    pub title: String,
    pub parsed_by: String,
    /// `None` when the content did not come from the remote model.
    pub model: Option<String>,
    pub date: chrono::DateTime<chrono::Local>,
    pub elapsed_secs: f64,
}

impl MetadataHeader {
    pub fn render(&self) -> String {
        format!(
            "---\ntitle: {}\nparsed_by: {}\nmodel: {}\ndate: {}\ntime_taken: {:.2} seconds\n---\n\n",
            yaml_scalar(&self.title),
            yaml_scalar(&self.parsed_by),
            yaml_scalar(self.model.as_deref().unwrap_or("N/A")),
            self.date.format("%Y-%m-%d %H:%M:%S"),
            self.elapsed_secs
        )
    }
}

fn yaml_scalar(s: &str) -> String {
    let needs_quotes = s.is_empty()
        || s.contains(':')
        || s.contains('#')
        || s.starts_with(|c: char| "'\"[]{}&*!|>%@`-".contains(c));
    if needs_quotes {
        format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        s.to_string()
    }
}
