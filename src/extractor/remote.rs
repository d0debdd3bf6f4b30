//! Remote multimodal parse service (LlamaParse-compatible REST API).
//!
//! One attempt = upload, poll the job, fetch the JSON result. Any failure is
//! returned as raw text for the classifier; this module never retries.
//!
//! ```text
//! POST {base}/api/parsing/upload            → { "id": "…" }
//! GET  {base}/api/parsing/job/{id}          → { "status": "PENDING" | "SUCCESS" | "ERROR" | "CANCELED" }
//! GET  {base}/api/parsing/job/{id}/result/json → { "pages": [{ "page": 1, "md": "…" }] }
//! ```

use super::{AttemptOptions, Backend, Extracted, Extractor, Outcome};
use crate::config::ParseConfig;
use crate::error::ExtractionError;
use crate::pipeline::input::Document;
use crate::pipeline::text;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::ops::Range;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct JobStatus {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JobResult {
    #[serde(default)]
    pages: Vec<ResultPage>,
}

#[derive(Debug, Deserialize)]
struct ResultPage {
    #[serde(default)]
    page: Option<usize>,
    #[serde(default)]
    md: String,
}

pub struct RemoteExtractor {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    poll_interval: Duration,
    job_timeout: Duration,
    /// Pages per submission; `None` submits the whole document at once.
    pages_per_chunk: Option<usize>,
}

impl RemoteExtractor {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            poll_interval: Duration::from_millis(1000),
            job_timeout: Duration::from_secs(600),
            pages_per_chunk: None,
        }
    }

    /// Build from config; `None` when no remote key is configured.
    pub fn from_config(config: &ParseConfig) -> Option<Self> {
        let key = config.credentials.remote_api_key.as_ref()?;
        let mut ex = Self::new(&config.remote_base_url, key)
            .with_polling(
                Duration::from_millis(config.remote_poll_interval_ms),
                Duration::from_secs(config.remote_timeout_secs),
            );
        if config.chunking {
            ex = ex.with_chunking(config.pages_per_chunk);
        }
        Some(ex)
    }

    pub fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.job_timeout = timeout;
        self
    }

    pub fn with_chunking(mut self, pages_per_chunk: usize) -> Self {
        self.pages_per_chunk = Some(pages_per_chunk.max(1));
        self
    }

    /// Parse the whole document, chunked when configured.
    pub async fn extract_remote(
        &self,
        document: &Document,
        model_id: &str,
        guidance: &str,
    ) -> Result<Extracted, ExtractionError> {
        let bytes = tokio::fs::read(document.path()).await?;

        let pages = match self.pages_per_chunk {
            None => self.parse_job(&bytes, document.name(), model_id, guidance, None).await?,
            Some(per) => {
                let total = text::page_count(document.path()).await?;
                let mut all = Vec::with_capacity(total);
                for range in chunk_ranges(total, per) {
                    info!(
                        "Remote chunk: pages {}-{} of {}",
                        range.start + 1,
                        range.end,
                        total
                    );
                    let start = range.start;
                    let chunk = self
                        .parse_job(&bytes, document.name(), model_id, guidance, Some(range))
                        .await?;
                    // Renumber within the chunk; the service may report
                    // positions relative to the submitted range.
                    all.extend(
                        chunk
                            .into_iter()
                            .enumerate()
                            .map(|(i, (_, md))| (start + i + 1, md)),
                    );
                }
                all
            }
        };

        if pages.is_empty() {
            return Err(ExtractionError::RemoteJob("job returned no pages".into()));
        }
        let count = pages.len();
        Ok(
            Extracted::new(join_remote_pages(&pages), format!("remote:{model_id}"))
                .with_page_count(count),
        )
    }

    async fn parse_job(
        &self,
        bytes: &[u8],
        filename: &str,
        model_id: &str,
        guidance: &str,
        target: Option<Range<usize>>,
    ) -> Result<Vec<(usize, String)>, ExtractionError> {
        let job_id = self.upload(bytes, filename, model_id, guidance, target).await?;
        debug!("Remote job {} submitted", job_id);
        self.wait_for_job(&job_id).await?;
        let result: JobResult = self
            .get_json(&format!("{}/api/parsing/job/{}/result/json", self.base_url, job_id))
            .await?;
        Ok(result_pages(result))
    }

    async fn upload(
        &self,
        bytes: &[u8],
        filename: &str,
        model_id: &str,
        guidance: &str,
        target: Option<Range<usize>>,
    ) -> Result<String, ExtractionError> {
        let file = Part::bytes(bytes.to_vec())
            .file_name(filename.to_string())
            .mime_str("application/pdf")?;
        let mut form = Form::new()
            .part("file", file)
            .text("use_vendor_multimodal_model", "true")
            .text("vendor_multimodal_model_name", model_id.to_string())
            .text("system_prompt", guidance.to_string())
            .text("invalidate_cache", "true");
        if let Some(range) = target {
            form = form.text("target_pages", target_pages(range));
        }

        let response = self
            .client
            .post(format!("{}/api/parsing/upload", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        let upload: UploadResponse = read_json(response).await?;
        Ok(upload.id)
    }

    async fn wait_for_job(&self, job_id: &str) -> Result<(), ExtractionError> {
        let started = Instant::now();
        let url = format!("{}/api/parsing/job/{}", self.base_url, job_id);
        loop {
            let status: JobStatus = self.get_json(&url).await?;
            match status.status.to_ascii_uppercase().as_str() {
                "SUCCESS" => return Ok(()),
                "ERROR" | "CANCELED" | "CANCELLED" => {
                    let code = status.error_code.unwrap_or_else(|| status.status.clone());
                    let message = status.error_message.unwrap_or_default();
                    return Err(ExtractionError::RemoteJob(format!("{code}: {message}")));
                }
                _ => {}
            }
            if started.elapsed() >= self.job_timeout {
                return Err(ExtractionError::RemoteJob(format!(
                    "job {job_id} timed out after {}s",
                    self.job_timeout.as_secs()
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, ExtractionError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        read_json(response).await
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ExtractionError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ExtractionError::Http {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json().await?)
}

/// Consecutive page ranges of at most `per` pages covering `0..total`.
pub fn chunk_ranges(total: usize, per: usize) -> Vec<Range<usize>> {
    let per = per.max(1);
    (0..total)
        .step_by(per)
        .map(|start| start..(start + per).min(total))
        .collect()
}

/// `target_pages` form value: comma-separated 0-based indices.
pub fn target_pages(range: Range<usize>) -> String {
    range.map(|p| p.to_string()).collect::<Vec<_>>().join(",")
}

fn result_pages(result: JobResult) -> Vec<(usize, String)> {
    result
        .pages
        .into_iter()
        .enumerate()
        .map(|(i, p)| (p.page.unwrap_or(i + 1), p.md))
        .collect()
}

/// `## Page N` blocks separated by a blank line.
pub fn join_remote_pages(pages: &[(usize, String)]) -> String {
    pages
        .iter()
        .map(|(n, md)| format!("## Page {n}\n\n{}", md.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl Extractor for RemoteExtractor {
    fn backend(&self) -> Backend {
        Backend::Remote
    }

    async fn attempt(&self, document: &Document, options: &AttemptOptions) -> Outcome {
        info!(
            "Remote parse of {} with model {}",
            document.name(),
            options.model_id
        );
        self.extract_remote(document, &options.model_id, options.guidance.text())
            .await
            .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_ranges_cover_document() {
        assert_eq!(chunk_ranges(25, 10), vec![0..10, 10..20, 20..25]);
        assert_eq!(chunk_ranges(3, 10), vec![0..3]);
        assert!(chunk_ranges(0, 10).is_empty());
    }

    #[test]
    fn target_pages_are_zero_based() {
        assert_eq!(target_pages(10..13), "10,11,12");
    }

    #[test]
    fn result_json_is_joined_by_page() {
        let json = r##"{"pages":[{"page":1,"md":"# Title\n"},{"page":2,"md":"Body"}]}"##;
        let result: JobResult = serde_json::from_str(json).unwrap();
        let pages = result_pages(result);
        assert_eq!(
            join_remote_pages(&pages),
            "## Page 1\n\n# Title\n\n## Page 2\n\nBody"
        );
    }

    #[test]
    fn missing_page_numbers_fall_back_to_position() {
        let json = r#"{"pages":[{"md":"a"},{"md":"b"}]}"#;
        let result: JobResult = serde_json::from_str(json).unwrap();
        let pages = result_pages(result);
        assert_eq!(pages[1].0, 2);
    }

    #[test]
    fn from_config_needs_key() {
        assert!(RemoteExtractor::from_config(&ParseConfig::default()).is_none());
        let c = ParseConfig::builder().remote_api_key("llx-1").build().unwrap();
        assert!(RemoteExtractor::from_config(&c).is_some());
    }

    #[tokio::test]
    async fn unreachable_service_fails_without_retry() {
        let doc = Document::from_bytes(b"%PDF-1.4\n", "a.pdf").unwrap();
        let ex = RemoteExtractor::new("http://127.0.0.1:9", "key");
        let options = AttemptOptions {
            model_id: "gemini-2.0-flash".into(),
            guidance: Default::default(),
        };
        assert!(matches!(ex.attempt(&doc, &options).await, Outcome::Failed(_)));
    }
}
