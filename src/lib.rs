//! # pdf2md-cascade
//!
//! Convert PDF articles to Markdown through a cascade of extraction
//! backends with classified, policy-driven fallback.
//!
//! ## Why a cascade?
//!
//! A remote multimodal parse service gives the best Markdown for most
//! documents, but it can refuse content (recitation filters), run out of
//! credits, or fail on individual pages. Local extraction always works on
//! a text layer but loses structure. This crate tries the remote service
//! first, classifies every failure, retries only what is worth retrying,
//! and falls back to local text, table and image heuristics, an external
//! converter, and finally vision-model OCR for scanned pages.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / URL / bytes
//!  │
//!  ├─ 1. Input     resolve to a local file (per-request temp dir)
//!  ├─ 2. Remote    upload → poll → JSON pages   (classified, retried)
//!  ├─ 3. Local     plain text │ text+tables │ text+images   (best wins)
//!  ├─ 4. Converter external tool, Markdown on stdout
//!  ├─ 5. OCR       render leading pages → vision model
//!  ├─ 6. Enhance   optional model rewrite (format / summarize / medical)
//!  └─ 7. Clean     deterministic Markdown cleanup + optional front matter
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2md_cascade::{convert, ParseConfig, ParsePolicy};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ParseConfig::builder()
//!         .policy(ParsePolicy::Adaptive)
//!         .remote_api_key(std::env::var("LLAMA_CLOUD_API_KEY").unwrap_or_default())
//!         .build()?;
//!     let output = convert("article.pdf", &config).await?;
//!     println!("{}", output.markdown);
//!     eprintln!("parsed by {}", output.method());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf2md-cascade = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod classify;
pub mod config;
pub mod convert;
pub mod enhance;
pub mod error;
pub mod extractor;
pub mod history;
pub mod model;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use classify::{failed_pages, ClassificationRule, Classifier, FailureKind, PatternClassifier};
pub use config::{
    Credentials, EnhanceTask, GuidanceVariant, LocalMethod, ParseConfig, ParseConfigBuilder,
    ParsePolicy,
};
pub use convert::{
    convert, convert_document, convert_from_bytes, convert_sync, convert_to_file,
    convert_with_history,
};
pub use error::{ExtractionError, ModelError, Pdf2MdError};
pub use extractor::{AttemptOptions, Backend, Extracted, Extractor, Outcome};
pub use history::{HistoryRecord, ParseHistory};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use output::{
    AttemptOutcome, ErrorKind, ExtractionAttempt, ExtractionResult, MetadataHeader, ParseOutput,
    ParseReport, ParseStats,
};
pub use pipeline::input::Document;
pub use progress::{NoopProgressCallback, ParseProgressCallback, ProgressCallback};
