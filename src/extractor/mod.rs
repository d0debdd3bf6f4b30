//! Extraction backends behind one polymorphic seam.
//!
//! Every backend implements [`Extractor`]: it reads a [`Document`] and
//! returns an [`Outcome`]. Backends never retry and never decide what
//! happens next; that belongs to [`crate::orchestrator`].
//!
//! | Backend | Module | Network |
//! |---------|--------|---------|
//! | [`Backend::Remote`] | [`remote`] | yes |
//! | [`Backend::LocalMultiMethod`] | [`local`] | no |
//! | [`Backend::LocalConverter`] | [`converter`] | no |
//! | [`Backend::ImageOcr`] | [`ocr`] | model only |

pub mod converter;
pub mod local;
pub mod ocr;
pub mod remote;

use crate::config::GuidanceVariant;
use crate::pipeline::input::Document;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use converter::ConverterExtractor;
pub use local::{LocalMultiExtractor, MethodRunner, PdfMethodRunner};
pub use ocr::OcrExtractor;
pub use remote::RemoteExtractor;

/// Identifies a backend in attempt logs and progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Remote,
    LocalMultiMethod,
    LocalConverter,
    ImageOcr,
}

impl Backend {
    /// Stable identifier used in logs and progress events.
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Remote => "remote",
            Backend::LocalMultiMethod => "local-multi-method",
            Backend::LocalConverter => "local-converter",
            Backend::ImageOcr => "image-ocr",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request options handed to every attempt.
#[derive(Debug, Clone)]
pub struct AttemptOptions {
    pub model_id: String,
    pub guidance: GuidanceVariant,
}

/// Content produced by a successful attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub content: String,
    /// Method identifier, e.g. `remote:gemini-2.0-flash`, `local:text+tables`.
    pub method: String,
    pub page_count: Option<usize>,
    pub title: Option<String>,
}

impl Extracted {
    pub fn new(content: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            method: method.into(),
            page_count: None,
            title: None,
        }
    }

    pub fn with_page_count(mut self, n: usize) -> Self {
        self.page_count = Some(n);
        self
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }
}

/// How one attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Extracted(Extracted),
    /// Raw failure text; remote messages are classified from it.
    Failed(String),
}

impl Outcome {
    pub fn failed(err: impl fmt::Display) -> Self {
        Outcome::Failed(err.to_string())
    }
}

impl<E: fmt::Display> From<Result<Extracted, E>> for Outcome {
    fn from(r: Result<Extracted, E>) -> Self {
        match r {
            Ok(e) => Outcome::Extracted(e),
            Err(e) => Outcome::failed(e),
        }
    }
}

/// A swappable extraction backend.
#[async_trait]
pub trait Extractor: Send + Sync {
    fn backend(&self) -> Backend;

    async fn attempt(&self, document: &Document, options: &AttemptOptions) -> Outcome;
}

/// `## Page N` sections joined by a blank line.
pub(crate) fn join_pages<'a>(pages: impl IntoIterator<Item = (usize, &'a str)>) -> String {
    pages
        .into_iter()
        .map(|(n, body)| format!("## Page {n}\n\n{}\n", body.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}
