//! External document-to-Markdown converter (default: `markitdown`).
//!
//! The document bytes are piped to the program's stdin and Markdown is read
//! from stdout. No network access is involved.

use super::{AttemptOptions, Backend, Extracted, Extractor, Outcome};
use crate::error::ExtractionError;
use crate::pipeline::input::Document;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

pub struct ConverterExtractor {
    program: String,
    args: Vec<String>,
}

impl ConverterExtractor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Convert the document, returning `(markdown, title)`.
    pub async fn convert(
        &self,
        document: &Document,
    ) -> Result<(String, Option<String>), ExtractionError> {
        let bytes = tokio::fs::read(document.path()).await?;

        let spawned = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let mut child = match spawned {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ExtractionError::ToolNotFound(self.program.clone()));
            }
            Err(e) => return Err(ExtractionError::Io(e)),
        };

        // Feed stdin concurrently so a chatty child cannot fill its stdout
        // pipe while we are still writing.
        let writer = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                let res = stdin.write_all(&bytes).await;
                drop(stdin);
                res
            })
        });

        let output = child.wait_with_output().await?;
        if let Some(writer) = writer {
            match writer.await {
                Ok(Err(e)) if e.kind() != std::io::ErrorKind::BrokenPipe => {
                    return Err(ExtractionError::Io(e));
                }
                Err(e) => return Err(ExtractionError::Task(e.to_string())),
                _ => {}
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::ConverterFailed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let markdown = String::from_utf8_lossy(&output.stdout).to_string();
        if markdown.trim().is_empty() {
            return Err(ExtractionError::ConverterFailed(format!(
                "{} produced no output",
                self.program
            )));
        }

        debug!("{} produced {} bytes", self.program, markdown.len());
        let title = first_heading(&markdown);
        Ok((markdown, title))
    }
}

/// Text of the first level-1 heading, if any.
pub fn first_heading(markdown: &str) -> Option<String> {
    markdown
        .lines()
        .find_map(|l| l.trim_start().strip_prefix("# "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl Extractor for ConverterExtractor {
    fn backend(&self) -> Backend {
        Backend::LocalConverter
    }

    async fn attempt(&self, document: &Document, _options: &AttemptOptions) -> Outcome {
        info!("Running converter {} on {}", self.program, document.name());
        self.convert(document)
            .await
            .map(|(markdown, title)| {
                Extracted::new(markdown, format!("converter:{}", self.program)).with_title(title)
            })
            .into()
    }
}
