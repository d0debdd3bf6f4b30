//! Configuration types for a parse request.
//!
//! Everything that steers the cascade lives in [`ParseConfig`], built via
//! [`ParseConfigBuilder`]. Callers set only what they care about and rely on
//! the documented defaults for the rest.

use crate::error::Pdf2MdError;
use crate::progress::ProgressCallback;
use crate::prompts;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Configuration for one parse request.
///
/// # Example
/// ```rust
/// use pdf2md_cascade::{ParseConfig, ParsePolicy};
///
/// let config = ParseConfig::builder()
///     .policy(ParsePolicy::Adaptive)
///     .max_retries(3)
///     .remote_api_key("llx-...")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ParseConfig {
    /// Which backends may run. Default: [`ParsePolicy::Adaptive`].
    pub policy: ParsePolicy,

    /// Model variant requested from the remote parser and used for
    /// enhancement/OCR when no other model is named. Default: `gemini-2.0-flash`.
    pub model_id: String,

    /// Extra remote attempts after a retryable failure. Default: 2.
    ///
    /// Policy rejections and quota exhaustion never consume this budget.
    pub max_retries: u32,

    /// Fixed delay between remote attempts in milliseconds. Default: 2000.
    pub retry_backoff_ms: u64,

    /// Submit the document to the remote parser in page ranges. Default: false.
    pub chunking: bool,

    /// Pages per remote submission when `chunking` is on. Default: 10.
    pub pages_per_chunk: usize,

    /// Guidance text forwarded to the remote model.
    pub guidance: GuidanceVariant,

    /// Local methods to run, in tie-break order.
    /// Default: text+tables, text+images, plain-text.
    pub local_methods: Vec<LocalMethod>,

    /// Try the external converter after the multi-method extractor. Default: true.
    pub use_converter: bool,

    /// Converter executable. Default: `markitdown`.
    pub converter_program: String,

    /// Optional generative clean-up of local output. Default: None.
    pub enhance: Option<EnhanceTask>,

    /// Characters of local text sent to the enhancer. Default: 10 000.
    ///
    /// Only the head of a long document is enhanced; the rest is dropped.
    pub enhance_max_chars: usize,

    /// Local output shorter than this is treated as a scanned document
    /// and triggers the OCR fallback. Default: 1000.
    pub min_plausible_chars: usize,

    /// Enable the image-based OCR fallback. Default: true.
    pub ocr_fallback: bool,

    /// Pages rasterised by the OCR fallback. Default: 3.
    pub ocr_max_pages: usize,

    /// Maximum rendered image dimension for OCR in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// LLM provider name for enhancement/OCR (e.g. "gemini", "openai").
    /// If None along with `provider`, the environment decides.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for enhancement/OCR. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens generated per model call. Default: 8192.
    pub max_tokens: usize,

    /// Remote parse service base URL.
    pub remote_base_url: String,

    /// Job status poll interval in milliseconds. Default: 1000.
    pub remote_poll_interval_ms: u64,

    /// Give up on a remote job after this many seconds. Default: 600.
    pub remote_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Prefix the Markdown with a YAML metadata block. Default: false.
    pub include_metadata: bool,

    /// Title for the metadata block. Default: the file stem.
    pub title: Option<String>,

    /// Report total local failure as a degraded success carrying the
    /// sentinel text instead of a `Failure`. Default: false.
    pub mask_local_failure: bool,

    pub credentials: Credentials,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            policy: ParsePolicy::default(),
            model_id: "gemini-2.0-flash".to_string(),
            max_retries: 2,
            retry_backoff_ms: 2000,
            chunking: false,
            pages_per_chunk: 10,
            guidance: GuidanceVariant::default(),
            local_methods: LocalMethod::default_order(),
            use_converter: true,
            converter_program: "markitdown".to_string(),
            enhance: None,
            enhance_max_chars: 10_000,
            min_plausible_chars: 1000,
            ocr_fallback: true,
            ocr_max_pages: 3,
            max_rendered_pixels: 2000,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 8192,
            remote_base_url: "https://api.cloud.llamaindex.ai".to_string(),
            remote_poll_interval_ms: 1000,
            remote_timeout_secs: 600,
            download_timeout_secs: 120,
            password: None,
            include_metadata: false,
            title: None,
            mask_local_failure: false,
            credentials: Credentials::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ParseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseConfig")
            .field("policy", &self.policy)
            .field("model_id", &self.model_id)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("chunking", &self.chunking)
            .field("pages_per_chunk", &self.pages_per_chunk)
            .field("guidance", &self.guidance.label())
            .field("local_methods", &self.local_methods)
            .field("use_converter", &self.use_converter)
            .field("enhance", &self.enhance)
            .field("ocr_fallback", &self.ocr_fallback)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("remote_base_url", &self.remote_base_url)
            .field("mask_local_failure", &self.mask_local_failure)
            .field("credentials", &self.credentials)
            .finish()
    }
}

impl ParseConfig {
    /// Create a new builder for `ParseConfig`.
    pub fn builder() -> ParseConfigBuilder {
        ParseConfigBuilder {
            config: Self::default(),
        }
    }

    /// True when the remote backend can be attempted at all.
    pub fn remote_enabled(&self) -> bool {
        self.policy != ParsePolicy::LocalOnly && self.credentials.remote_api_key.is_some()
    }

    /// True when any step needs a generative model.
    pub fn needs_model(&self) -> bool {
        self.policy != ParsePolicy::RemoteOnly && (self.enhance.is_some() || self.ocr_fallback)
    }
}

/// Builder for [`ParseConfig`].
#[derive(Debug)]
pub struct ParseConfigBuilder {
    config: ParseConfig,
}

impl ParseConfigBuilder {
    pub fn policy(mut self, policy: ParsePolicy) -> Self {
        self.config.policy = policy;
        self
    }

    pub fn model_id(mut self, model: impl Into<String>) -> Self {
        self.config.model_id = model.into();
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(10);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn chunking(mut self, v: bool) -> Self {
        self.config.chunking = v;
        self
    }

    pub fn pages_per_chunk(mut self, n: usize) -> Self {
        self.config.pages_per_chunk = n.max(1);
        self
    }

    pub fn guidance(mut self, g: GuidanceVariant) -> Self {
        self.config.guidance = g;
        self
    }

    pub fn local_methods(mut self, methods: Vec<LocalMethod>) -> Self {
        self.config.local_methods = methods;
        self
    }

    pub fn use_converter(mut self, v: bool) -> Self {
        self.config.use_converter = v;
        self
    }

    pub fn converter_program(mut self, program: impl Into<String>) -> Self {
        self.config.converter_program = program.into();
        self
    }

    pub fn enhance(mut self, task: Option<EnhanceTask>) -> Self {
        self.config.enhance = task;
        self
    }

    pub fn enhance_max_chars(mut self, n: usize) -> Self {
        self.config.enhance_max_chars = n.max(1);
        self
    }

    pub fn min_plausible_chars(mut self, n: usize) -> Self {
        self.config.min_plausible_chars = n;
        self
    }

    pub fn ocr_fallback(mut self, v: bool) -> Self {
        self.config.ocr_fallback = v;
        self
    }

    pub fn ocr_max_pages(mut self, n: usize) -> Self {
        self.config.ocr_max_pages = n.max(1);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn remote_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn remote_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.remote_poll_interval_ms = ms;
        self
    }

    pub fn remote_timeout_secs(mut self, secs: u64) -> Self {
        self.config.remote_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn include_metadata(mut self, v: bool) -> Self {
        self.config.include_metadata = v;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = Some(title.into());
        self
    }

    pub fn mask_local_failure(mut self, v: bool) -> Self {
        self.config.mask_local_failure = v;
        self
    }

    /// Set the remote parse service key. Empty strings count as absent.
    pub fn remote_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.config.credentials.remote_api_key = (!key.trim().is_empty()).then_some(key);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ParseConfig, Pdf2MdError> {
        let c = &self.config;
        if c.model_id.trim().is_empty() {
            return Err(Pdf2MdError::InvalidConfig("model_id must not be empty".into()));
        }
        if c.policy != ParsePolicy::RemoteOnly && c.local_methods.is_empty() && !c.use_converter {
            return Err(Pdf2MdError::InvalidConfig(
                "no local backend enabled: give at least one local method or enable the converter"
                    .into(),
            ));
        }
        if c.policy == ParsePolicy::RemoteOnly && c.credentials.remote_api_key.is_none() {
            return Err(Pdf2MdError::InvalidConfig(
                "policy remote-only needs a remote API key (LLAMA_CLOUD_API_KEY)".into(),
            ));
        }
        if !c.remote_base_url.starts_with("http://") && !c.remote_base_url.starts_with("https://") {
            return Err(Pdf2MdError::InvalidConfig(format!(
                "remote_base_url must be an HTTP(S) URL, got '{}'",
                c.remote_base_url
            )));
        }
        Ok(self.config)
    }
}

/// Secrets supplied by the caller. `Debug` never prints them.
#[derive(Clone, Default)]
pub struct Credentials {
    /// Key for the remote parse service. Absent means local-only.
    pub remote_api_key: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field(
                "remote_api_key",
                &self.remote_api_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which backends a request may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParsePolicy {
    /// Remote parser only; failures are terminal.
    RemoteOnly,
    /// Local extractors only; the remote service is never contacted.
    LocalOnly,
    /// Try remote first, fall back to local on failure. (default)
    #[default]
    Adaptive,
}

impl FromStr for ParsePolicy {
    type Err = Pdf2MdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "remote-only" | "remote" => Ok(ParsePolicy::RemoteOnly),
            "local-only" | "local" => Ok(ParsePolicy::LocalOnly),
            "adaptive" => Ok(ParsePolicy::Adaptive),
            other => Err(Pdf2MdError::InvalidConfig(format!(
                "unknown policy '{other}' (expected remote-only, local-only or adaptive)"
            ))),
        }
    }
}

/// One local extraction method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocalMethod {
    #[serde(rename = "plain-text")]
    PlainText,
    #[serde(rename = "text+tables")]
    TextTables,
    #[serde(rename = "text+images")]
    TextImages,
}

impl LocalMethod {
    pub fn default_order() -> Vec<LocalMethod> {
        vec![
            LocalMethod::TextTables,
            LocalMethod::TextImages,
            LocalMethod::PlainText,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LocalMethod::PlainText => "plain-text",
            LocalMethod::TextTables => "text+tables",
            LocalMethod::TextImages => "text+images",
        }
    }
}

impl fmt::Display for LocalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LocalMethod {
    type Err = Pdf2MdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain-text" | "plain" | "text" => Ok(LocalMethod::PlainText),
            "text+tables" | "tables" => Ok(LocalMethod::TextTables),
            "text+images" | "images" => Ok(LocalMethod::TextImages),
            other => Err(Pdf2MdError::InvalidConfig(format!(
                "unknown local method '{other}' (expected plain-text, text+tables or text+images)"
            ))),
        }
    }
}

/// What the enhancer asks the generative model to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnhanceTask {
    Format,
    Summarize,
    MedicalStructure,
}

impl FromStr for EnhanceTask {
    type Err = Pdf2MdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "format" => Ok(EnhanceTask::Format),
            "summarize" | "summarise" => Ok(EnhanceTask::Summarize),
            "medical" | "medical-structure" => Ok(EnhanceTask::MedicalStructure),
            other => Err(Pdf2MdError::InvalidConfig(format!(
                "unknown enhance task '{other}' (expected format, summarize or medical)"
            ))),
        }
    }
}

/// Guidance text variant sent to the remote model.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GuidanceVariant {
    /// Summarise and paraphrase rather than quote. (default)
    #[default]
    Paraphrase,
    /// Faithful structural parse of a medical article.
    Faithful,
    Custom(String),
}

impl GuidanceVariant {
    pub fn text(&self) -> &str {
        match self {
            GuidanceVariant::Paraphrase => prompts::PARAPHRASE_GUIDANCE,
            GuidanceVariant::Faithful => prompts::FAITHFUL_GUIDANCE,
            GuidanceVariant::Custom(s) => s,
        }
    }

    fn label(&self) -> &str {
        match self {
            GuidanceVariant::Paraphrase => "paraphrase",
            GuidanceVariant::Faithful => "faithful",
            GuidanceVariant::Custom(_) => "custom",
        }
    }
}

impl FromStr for GuidanceVariant {
    type Err = Pdf2MdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paraphrase" => Ok(GuidanceVariant::Paraphrase),
            "faithful" => Ok(GuidanceVariant::Faithful),
            other => Err(Pdf2MdError::InvalidConfig(format!(
                "unknown guidance '{other}' (expected paraphrase or faithful)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ParseConfig::default();
        assert_eq!(c.policy, ParsePolicy::Adaptive);
        assert_eq!(c.max_retries, 2);
        assert_eq!(c.min_plausible_chars, 1000);
        assert_eq!(c.local_methods[0], LocalMethod::TextTables);
        assert!(!c.remote_enabled());
    }

    #[test]
    fn remote_only_without_key_is_rejected() {
        let err = ParseConfig::builder()
            .policy(ParsePolicy::RemoteOnly)
            .build()
            .unwrap_err();
        assert!(matches!(err, Pdf2MdError::InvalidConfig(_)));
    }

    #[test]
    fn blank_key_counts_as_absent() {
        let c = ParseConfig::builder().remote_api_key("  ").build().unwrap();
        assert!(c.credentials.remote_api_key.is_none());
        assert!(!c.remote_enabled());
    }

    #[test]
    fn local_only_never_enables_remote() {
        let c = ParseConfig::builder()
            .policy(ParsePolicy::LocalOnly)
            .remote_api_key("llx-key")
            .build()
            .unwrap();
        assert!(!c.remote_enabled());
    }

    #[test]
    fn debug_redacts_key() {
        let c = ParseConfig::builder()
            .remote_api_key("llx-secret-123")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("llx-secret-123"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn no_local_backend_is_rejected() {
        let err = ParseConfig::builder()
            .local_methods(vec![])
            .use_converter(false)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("no local backend"));
    }

    #[test]
    fn enum_parsing() {
        assert_eq!("local-only".parse::<ParsePolicy>().unwrap(), ParsePolicy::LocalOnly);
        assert_eq!("REMOTE_ONLY".parse::<ParsePolicy>().unwrap(), ParsePolicy::RemoteOnly);
        assert_eq!("text+tables".parse::<LocalMethod>().unwrap(), LocalMethod::TextTables);
        assert_eq!("medical".parse::<EnhanceTask>().unwrap(), EnhanceTask::MedicalStructure);
        assert!("sideways".parse::<ParsePolicy>().is_err());
        assert!("ocr".parse::<LocalMethod>().is_err());
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let c = ParseConfig::builder()
            .remote_base_url("http://localhost:8080/")
            .build()
            .unwrap();
        assert_eq!(c.remote_base_url, "http://localhost:8080");
    }
}
