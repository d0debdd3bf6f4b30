//! The fallback state machine.
//!
//! ```text
//! NotStarted ──▶ TryingRemote ──▶ Success
//!     │              │  ▲
//!     │              │  └── RetryingRemote (retryable kind, counter < max_retries)
//!     │              ▼
//!     └────────▶ TryingLocal ──▶ Success | Failure
//! ```
//!
//! * `LocalOnly`, or no remote extractor: straight to `TryingLocal`.
//! * Remote failures are classified. `ContentPolicyRejection` and
//!   `QuotaExhausted` leave the remote stage at once without touching the
//!   retry counter. `PartialMultimodalFailure` and `Unknown` increment it
//!   and retry after a fixed delay while `counter < max_retries`.
//! * Leaving the remote stage goes to `TryingLocal` under `Adaptive` and to
//!   a terminal `Failure` under `RemoteOnly`.
//! * `TryingLocal` runs the local extractors in order until one succeeds,
//!   adds the OCR fallback when the text is implausibly short, optionally
//!   enhances, and cleans the result.
//!
//! Attempts are strictly sequential and every run ends in exactly one
//! [`ExtractionResult`].

use crate::classify::{failed_pages, Classifier, FailureKind, PatternClassifier};
use crate::config::{EnhanceTask, ParseConfig, ParsePolicy};
use crate::enhance::Enhancer;
use crate::extractor::local::LOCAL_FAILURE_SENTINEL;
use crate::extractor::{
    AttemptOptions, Backend, ConverterExtractor, Extracted, Extractor, LocalMultiExtractor,
    OcrExtractor, Outcome, PdfMethodRunner, RemoteExtractor,
};
use crate::model::{LlmTextModel, TextModel};
use crate::output::{AttemptOutcome, ErrorKind, ExtractionAttempt, ExtractionResult, ParseReport};
use crate::pipeline::input::Document;
use crate::pipeline::postprocess;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Runs one document through the backend cascade.
///
/// Build one with [`Orchestrator::builder`] for custom backends, or
/// [`Orchestrator::from_config`] for the real ones.
pub struct Orchestrator {
    policy: ParsePolicy,
    max_retries: u32,
    retry_backoff: Duration,
    remote: Option<Arc<dyn Extractor>>,
    local: Vec<Arc<dyn Extractor>>,
    ocr: Option<Arc<dyn Extractor>>,
    min_plausible_chars: usize,
    enhancer: Option<(Enhancer, EnhanceTask)>,
    classifier: Arc<dyn Classifier>,
    options: AttemptOptions,
    mask_local_failure: bool,
    progress: ProgressCallback,
}

/// A failed attempt as seen by the state machine.
struct AttemptFailure {
    message: String,
    kind: Option<FailureKind>,
}

/// Why the remote stage ended without content.
struct RemoteFailure {
    kind: FailureKind,
    message: String,
}

impl Orchestrator {
    /// Start from the [`ParseConfig`] defaults with no backends.
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// Assemble the real backends described by `config`.
    ///
    /// The generative model is resolved only when enhancement or OCR is
    /// enabled; if it cannot be resolved both steps are disabled.
    pub fn from_config(config: &ParseConfig) -> Self {
        let mut b = Self::builder()
            .policy(config.policy)
            .max_retries(config.max_retries)
            .retry_backoff(Duration::from_millis(config.retry_backoff_ms))
            .min_plausible_chars(config.min_plausible_chars)
            .mask_local_failure(config.mask_local_failure)
            .attempt_options(AttemptOptions {
                model_id: config.model_id.clone(),
                guidance: config.guidance.clone(),
            });

        if let Some(cb) = &config.progress_callback {
            b = b.progress(Arc::clone(cb));
        }

        if config.policy != ParsePolicy::LocalOnly {
            if let Some(remote) = RemoteExtractor::from_config(config) {
                b = b.remote(Arc::new(remote));
            }
        }

        if config.policy != ParsePolicy::RemoteOnly {
            if !config.local_methods.is_empty() {
                let runner = Arc::new(PdfMethodRunner::new(config.password.clone()));
                b = b.local(Arc::new(LocalMultiExtractor::new(
                    runner,
                    config.local_methods.clone(),
                )));
            }
            if config.use_converter {
                b = b.local(Arc::new(ConverterExtractor::new(&config.converter_program)));
            }

            if config.needs_model() {
                match LlmTextModel::from_config(config) {
                    Ok(model) => {
                        let model: Arc<dyn TextModel> = Arc::new(model);
                        if config.ocr_fallback {
                            b = b.ocr(Arc::new(
                                OcrExtractor::new(
                                    Arc::clone(&model),
                                    config.ocr_max_pages,
                                    config.max_rendered_pixels,
                                )
                                .with_password(config.password.clone()),
                            ));
                        }
                        if let Some(task) = config.enhance {
                            b = b.enhancer(Enhancer::new(model, config.enhance_max_chars), task);
                        }
                    }
                    Err(e) => warn!("Generative model unavailable, OCR and enhancement disabled: {}", e),
                }
            }
        }

        b.build()
    }

    pub fn policy(&self) -> ParsePolicy {
        self.policy
    }

    /// Parse one document. Always returns exactly one terminal result.
    pub async fn run(&self, document: &Document) -> ParseReport {
        let started = Instant::now();
        info!("Parsing {} (policy {:?})", document.name(), self.policy);
        self.progress.on_parse_start(document.name());

        let mut attempts = Vec::new();
        let mut remote_retries = 0u32;

        let use_remote = self.policy != ParsePolicy::LocalOnly && self.remote.is_some();
        let (result, title) = match (&self.remote, use_remote) {
            (Some(remote), true) => {
                match self
                    .run_remote(remote.as_ref(), document, &mut attempts, &mut remote_retries)
                    .await
                {
                    Ok(extracted) => success(extracted),
                    Err(failure) if self.policy == ParsePolicy::RemoteOnly => (
                        ExtractionResult::Failure {
                            error_kind: ErrorKind::Remote(failure.kind),
                            message: failure.message,
                        },
                        None,
                    ),
                    Err(failure) => {
                        let next = self
                            .local
                            .first()
                            .map(|e| e.backend())
                            .unwrap_or(Backend::LocalMultiMethod);
                        info!("Falling back to local extraction after {}", failure.kind);
                        self.progress
                            .on_fallback(Backend::Remote, next, failure.kind.as_str());
                        self.run_local(document, &mut attempts).await
                    }
                }
            }
            _ => {
                debug!("Remote stage skipped");
                self.run_local(document, &mut attempts).await
            }
        };

        match &result {
            ExtractionResult::Success { method, .. } => {
                info!(
                    "Parsed {} with {} in {:.2}s",
                    document.name(),
                    method,
                    started.elapsed().as_secs_f64()
                );
                self.progress.on_parse_complete(true, method);
            }
            ExtractionResult::Failure { error_kind, message } => {
                warn!("Parsing {} failed ({}): {}", document.name(), error_kind, message);
                self.progress.on_parse_complete(false, &error_kind.to_string());
            }
        }

        ParseReport {
            result,
            attempts,
            remote_retries,
            title,
        }
    }

    async fn run_remote(
        &self,
        remote: &dyn Extractor,
        document: &Document,
        attempts: &mut Vec<ExtractionAttempt>,
        retries: &mut u32,
    ) -> Result<Extracted, RemoteFailure> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let failed = match self
                .attempt(remote, attempt, Some(self.classifier.as_ref()), document, attempts)
                .await
            {
                Ok(extracted) => return Ok(extracted),
                Err(failed) => failed,
            };
            let message = failed.message;
            let kind = failed.kind.unwrap_or(FailureKind::Unknown);

            if !kind.is_retryable() {
                warn!("Remote attempt {} failed ({}), not retrying", attempt, kind);
                return Err(RemoteFailure { kind, message });
            }

            *retries += 1;
            if *retries >= self.max_retries {
                warn!(
                    "Remote attempt {} failed ({}), retry budget of {} exhausted",
                    attempt, kind, self.max_retries
                );
                return Err(RemoteFailure { kind, message });
            }

            warn!(
                "Remote attempt {} failed ({}), retrying in {}ms",
                attempt,
                kind,
                self.retry_backoff.as_millis()
            );
            if !self.retry_backoff.is_zero() {
                tokio::time::sleep(self.retry_backoff).await;
            }
        }
    }

    async fn run_local(
        &self,
        document: &Document,
        attempts: &mut Vec<ExtractionAttempt>,
    ) -> (ExtractionResult, Option<String>) {
        let mut best: Option<Extracted> = None;
        let mut last_error: Option<String> = None;

        for (i, extractor) in self.local.iter().enumerate() {
            match self.attempt(extractor.as_ref(), 1, None, document, attempts).await {
                Ok(extracted) => {
                    best = Some(extracted);
                    break;
                }
                Err(failed) => {
                    if let Some(next) = self.local.get(i + 1) {
                        self.progress
                            .on_fallback(extractor.backend(), next.backend(), &failed.message);
                    }
                    last_error = Some(failed.message);
                }
            }
        }

        let best_len = best.as_ref().map_or(0, Extracted::char_count);
        if best.is_none() || best_len < self.min_plausible_chars {
            if let Some(ocr) = &self.ocr {
                info!(
                    "Local text is {} chars (minimum {}), trying OCR",
                    best_len, self.min_plausible_chars
                );
                match self.attempt(ocr.as_ref(), 1, None, document, attempts).await {
                    Ok(ocr_out) if best.is_none() || ocr_out.char_count() > best_len => {
                        best = Some(ocr_out)
                    }
                    Ok(_) => debug!("OCR output not longer than local text, keeping local"),
                    Err(failed) => last_error = Some(failed.message),
                }
            }
        }

        let Some(mut extracted) = best else {
            if self.mask_local_failure {
                warn!("All local methods failed; returning degraded content");
                return (
                    ExtractionResult::Success {
                        content: postprocess::clean_markdown(LOCAL_FAILURE_SENTINEL),
                        method: "none".to_string(),
                        page_count: None,
                    },
                    None,
                );
            }
            return (
                ExtractionResult::Failure {
                    error_kind: ErrorKind::LocalExtractionFailure,
                    message: last_error.unwrap_or_else(|| LOCAL_FAILURE_SENTINEL.to_string()),
                },
                None,
            );
        };

        if let Some((enhancer, task)) = &self.enhancer {
            let enhanced = enhancer.enhance(&extracted.content, *task).await;
            if enhanced.applied {
                debug!("Enhanced local output ({:?})", task);
            }
            extracted.content = enhanced.text;
        }

        success(extracted)
    }

    /// Run one extractor, append its attempt record, and report progress.
    ///
    /// With a classifier the failure kind and failed pages are attached to
    /// the record before it is appended.
    async fn attempt(
        &self,
        extractor: &dyn Extractor,
        attempt: u32,
        classifier: Option<&dyn Classifier>,
        document: &Document,
        attempts: &mut Vec<ExtractionAttempt>,
    ) -> Result<Extracted, AttemptFailure> {
        let backend = extractor.backend();
        debug!("Attempt {} on {}", attempt, backend);
        self.progress.on_attempt_start(backend, attempt);

        let started = Instant::now();
        let outcome = extractor.attempt(document, &self.options).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Outcome::Extracted(extracted) => {
                let content_len = extracted.char_count();
                attempts.push(ExtractionAttempt {
                    backend,
                    attempt,
                    outcome: AttemptOutcome::Success,
                    content_len,
                    duration_ms,
                    failed_pages: Vec::new(),
                });
                self.progress.on_attempt_success(backend, attempt, content_len);
                Ok(extracted)
            }
            Outcome::Failed(message) => {
                warn!("{} attempt {} failed: {}", backend, attempt, message);
                let kind = classifier.map(|c| c.classify(&message));
                let pages = if kind.is_some() {
                    failed_pages(&message)
                } else {
                    Vec::new()
                };
                if !pages.is_empty() {
                    warn!("{} pages failed: {:?}", backend, pages);
                }
                attempts.push(ExtractionAttempt {
                    backend,
                    attempt,
                    outcome: AttemptOutcome::Failure {
                        kind,
                        message: message.clone(),
                    },
                    content_len: 0,
                    duration_ms,
                    failed_pages: pages,
                });
                self.progress.on_attempt_failure(backend, attempt, &message);
                Err(AttemptFailure { message, kind })
            }
        }
    }
}

fn success(extracted: Extracted) -> (ExtractionResult, Option<String>) {
    (
        ExtractionResult::Success {
            content: postprocess::clean_markdown(&extracted.content),
            method: extracted.method,
            page_count: extracted.page_count,
        },
        extracted.title,
    )
}

/// Assembles an [`Orchestrator`] from parts.
pub struct OrchestratorBuilder {
    policy: ParsePolicy,
    max_retries: u32,
    retry_backoff: Duration,
    remote: Option<Arc<dyn Extractor>>,
    local: Vec<Arc<dyn Extractor>>,
    ocr: Option<Arc<dyn Extractor>>,
    min_plausible_chars: usize,
    enhancer: Option<(Enhancer, EnhanceTask)>,
    classifier: Arc<dyn Classifier>,
    options: AttemptOptions,
    mask_local_failure: bool,
    progress: ProgressCallback,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        let defaults = ParseConfig::default();
        Self {
            policy: defaults.policy,
            max_retries: defaults.max_retries,
            retry_backoff: Duration::from_millis(defaults.retry_backoff_ms),
            remote: None,
            local: Vec::new(),
            ocr: None,
            min_plausible_chars: defaults.min_plausible_chars,
            enhancer: None,
            classifier: Arc::new(PatternClassifier::default()),
            options: AttemptOptions {
                model_id: defaults.model_id,
                guidance: defaults.guidance,
            },
            mask_local_failure: defaults.mask_local_failure,
            progress: Arc::new(NoopProgressCallback),
        }
    }
}

impl OrchestratorBuilder {
    pub fn policy(mut self, policy: ParsePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn retry_backoff(mut self, d: Duration) -> Self {
        self.retry_backoff = d;
        self
    }

    pub fn remote(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.remote = Some(extractor);
        self
    }

    /// Append a local extractor; they run in insertion order.
    pub fn local(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.local.push(extractor);
        self
    }

    pub fn ocr(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.ocr = Some(extractor);
        self
    }

    pub fn min_plausible_chars(mut self, n: usize) -> Self {
        self.min_plausible_chars = n;
        self
    }

    pub fn enhancer(mut self, enhancer: Enhancer, task: EnhanceTask) -> Self {
        self.enhancer = Some((enhancer, task));
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn attempt_options(mut self, options: AttemptOptions) -> Self {
        self.options = options;
        self
    }

    pub fn mask_local_failure(mut self, v: bool) -> Self {
        self.mask_local_failure = v;
        self
    }

    pub fn progress(mut self, cb: ProgressCallback) -> Self {
        self.progress = cb;
        self
    }

    pub fn build(self) -> Orchestrator {
        Orchestrator {
            policy: self.policy,
            max_retries: self.max_retries,
            retry_backoff: self.retry_backoff,
            remote: self.remote,
            local: self.local,
            ocr: self.ocr,
            min_plausible_chars: self.min_plausible_chars,
            enhancer: self.enhancer,
            classifier: self.classifier,
            options: self.options,
            mask_local_failure: self.mask_local_failure,
            progress: self.progress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use crate::model::testing::ScriptedModel;
    use crate::progress::ParseProgressCallback;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays scripted outcomes; repeats the last one when exhausted.
    struct Scripted {
        backend: Backend,
        outcomes: Mutex<VecDeque<Outcome>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(backend: Backend, outcomes: Vec<Outcome>) -> Arc<Self> {
            Arc::new(Self {
                backend,
                outcomes: Mutex::new(outcomes.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Extractor for Scripted {
        fn backend(&self) -> Backend {
            self.backend
        }

        async fn attempt(&self, _document: &Document, _options: &AttemptOptions) -> Outcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut q = self.outcomes.lock().unwrap();
            if q.len() > 1 {
                q.pop_front().unwrap()
            } else {
                q.front().cloned().unwrap_or(Outcome::Failed("unscripted".into()))
            }
        }
    }

    fn ok(content: &str, method: &str) -> Outcome {
        Outcome::Extracted(Extracted::new(content, method))
    }

    fn fail(msg: &str) -> Outcome {
        Outcome::Failed(msg.into())
    }

    fn doc() -> Document {
        Document::from_path("/unused/paper.pdf")
    }

    fn base(policy: ParsePolicy, max_retries: u32) -> OrchestratorBuilder {
        Orchestrator::builder()
            .policy(policy)
            .max_retries(max_retries)
            .retry_backoff(Duration::ZERO)
            .min_plausible_chars(0)
    }

    fn long_text() -> String {
        "Clinical findings. ".repeat(100)
    }

    #[tokio::test]
    async fn recitation_goes_straight_to_local_without_retry() {
        let remote = Scripted::new(
            Backend::Remote,
            vec![fail("Error: recitation detected on Page 4")],
        );
        let local = Scripted::new(
            Backend::LocalMultiMethod,
            vec![ok("local text", "local:text+tables")],
        );
        let orch = base(ParsePolicy::Adaptive, 2)
            .remote(remote.clone())
            .local(local.clone())
            .build();

        let report = orch.run(&doc()).await;

        assert_eq!(remote.calls(), 1);
        assert_eq!(local.calls(), 1);
        assert_eq!(report.attempts.len(), 2);
        assert_eq!(report.remote_retries, 0);
        match &report.attempts[0].outcome {
            AttemptOutcome::Failure { kind, .. } => {
                assert_eq!(*kind, Some(FailureKind::ContentPolicyRejection))
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(report.attempts[0].failed_pages, Vec::<usize>::new());
        assert_eq!(report.result.method(), Some("local:text+tables"));
    }

    #[tokio::test]
    async fn quota_does_not_consume_retry_budget() {
        let remote = Scripted::new(Backend::Remote, vec![fail("HTTP 402: out of credits")]);
        let local = Scripted::new(Backend::LocalMultiMethod, vec![ok("x", "local:plain-text")]);
        let orch = base(ParsePolicy::Adaptive, 3)
            .remote(remote.clone())
            .local(local.clone())
            .build();

        let report = orch.run(&doc()).await;

        assert_eq!(remote.calls(), 1);
        assert_eq!(report.remote_retries, 0);
        assert!(report.result.is_success());
    }

    #[tokio::test]
    async fn unknown_failures_retry_until_budget_then_fall_back() {
        let remote = Scripted::new(Backend::Remote, vec![fail("connection reset")]);
        let local = Scripted::new(Backend::LocalMultiMethod, vec![ok("x", "local:plain-text")]);
        let orch = base(ParsePolicy::Adaptive, 2)
            .remote(remote.clone())
            .local(local.clone())
            .build();

        let report = orch.run(&doc()).await;

        assert_eq!(remote.calls(), 2);
        assert_eq!(report.remote_retries, 2);
        assert_eq!(report.attempts_for(Backend::Remote), 2);
        assert_eq!(report.attempts[1].attempt, 2);
        assert_eq!(local.calls(), 1);
    }

    #[tokio::test]
    async fn partial_failure_then_success_stays_remote() {
        let remote = Scripted::new(
            Backend::Remote,
            vec![
                fail("MULTIMODAL_ERROR Page errors: Page 3: timeout"),
                ok("## Page 1\n\nremote", "remote:gemini-2.0-flash"),
            ],
        );
        let local = Scripted::new(Backend::LocalMultiMethod, vec![ok("x", "local:plain-text")]);
        let orch = base(ParsePolicy::Adaptive, 3)
            .remote(remote.clone())
            .local(local.clone())
            .build();

        let report = orch.run(&doc()).await;

        assert_eq!(remote.calls(), 2);
        assert_eq!(local.calls(), 0);
        assert_eq!(report.attempts[0].failed_pages, vec![3]);
        assert_eq!(report.result.method(), Some("remote:gemini-2.0-flash"));
    }

    #[tokio::test]
    async fn zero_retry_budget_still_makes_one_remote_attempt() {
        let remote = Scripted::new(Backend::Remote, vec![fail("timeout")]);
        let local = Scripted::new(Backend::LocalMultiMethod, vec![ok("x", "local:plain-text")]);
        let orch = base(ParsePolicy::Adaptive, 0)
            .remote(remote.clone())
            .local(local)
            .build();

        orch.run(&doc()).await;
        assert_eq!(remote.calls(), 1);
    }

    #[tokio::test]
    async fn remote_only_policy_rejection_is_terminal() {
        let remote = Scripted::new(Backend::Remote, vec![fail("RECITATION")]);
        let local = Scripted::new(Backend::LocalMultiMethod, vec![ok("x", "local:plain-text")]);
        let orch = base(ParsePolicy::RemoteOnly, 2)
            .remote(remote.clone())
            .local(local.clone())
            .build();

        let report = orch.run(&doc()).await;

        assert_eq!(local.calls(), 0);
        assert_eq!(
            report.result,
            ExtractionResult::Failure {
                error_kind: ErrorKind::Remote(FailureKind::ContentPolicyRejection),
                message: "RECITATION".into(),
            }
        );
    }

    #[tokio::test]
    async fn remote_only_exhausted_retries_is_terminal() {
        let remote = Scripted::new(Backend::Remote, vec![fail("multimodal model overloaded")]);
        let orch = base(ParsePolicy::RemoteOnly, 2).remote(remote.clone()).build();

        let report = orch.run(&doc()).await;

        assert_eq!(remote.calls(), 2);
        assert!(matches!(
            report.result,
            ExtractionResult::Failure {
                error_kind: ErrorKind::Remote(FailureKind::PartialMultimodalFailure),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn local_only_never_touches_remote() {
        let remote = Scripted::new(Backend::Remote, vec![ok("remote", "remote:m")]);
        let local = Scripted::new(Backend::LocalMultiMethod, vec![ok("local", "local:plain-text")]);
        let orch = base(ParsePolicy::LocalOnly, 2)
            .remote(remote.clone())
            .local(local)
            .build();

        let report = orch.run(&doc()).await;
        assert_eq!(remote.calls(), 0);
        assert_eq!(report.attempts_for(Backend::Remote), 0);
        assert_eq!(report.result.method(), Some("local:plain-text"));
    }

    #[tokio::test]
    async fn missing_remote_goes_local_even_when_adaptive() {
        let local = Scripted::new(Backend::LocalMultiMethod, vec![ok("local", "local:plain-text")]);
        let orch = base(ParsePolicy::Adaptive, 2).local(local.clone()).build();

        let report = orch.run(&doc()).await;
        assert_eq!(local.calls(), 1);
        assert!(report.result.is_success());
    }

    #[tokio::test]
    async fn converter_runs_when_multi_method_fails() {
        let multi = Scripted::new(Backend::LocalMultiMethod, vec![fail("all methods failed")]);
        let conv = Scripted::new(
            Backend::LocalConverter,
            vec![Outcome::Extracted(
                Extracted::new("# Title\n\nbody", "converter:markitdown")
                    .with_title(Some("Title".into())),
            )],
        );
        let orch = base(ParsePolicy::LocalOnly, 2)
            .local(multi.clone())
            .local(conv.clone())
            .build();

        let report = orch.run(&doc()).await;
        assert_eq!(report.result.method(), Some("converter:markitdown"));
        assert_eq!(report.title.as_deref(), Some("Title"));
        assert_eq!(report.attempts.len(), 2);
    }

    #[tokio::test]
    async fn short_local_text_triggers_ocr_and_longer_ocr_wins() {
        let local = Scripted::new(Backend::LocalMultiMethod, vec![ok("tiny", "local:plain-text")]);
        let ocr = Scripted::new(Backend::ImageOcr, vec![ok(&long_text(), "ocr")]);
        let orch = base(ParsePolicy::LocalOnly, 2)
            .min_plausible_chars(1000)
            .local(local)
            .ocr(ocr.clone())
            .build();

        let report = orch.run(&doc()).await;
        assert_eq!(ocr.calls(), 1);
        assert_eq!(report.result.method(), Some("ocr"));
    }

    #[tokio::test]
    async fn shorter_ocr_output_is_discarded() {
        let local = Scripted::new(Backend::LocalMultiMethod, vec![ok("some words", "local:plain-text")]);
        let ocr = Scripted::new(Backend::ImageOcr, vec![ok("few", "ocr")]);
        let orch = base(ParsePolicy::LocalOnly, 2)
            .min_plausible_chars(1000)
            .local(local)
            .ocr(ocr.clone())
            .build();

        let report = orch.run(&doc()).await;
        assert_eq!(ocr.calls(), 1);
        assert_eq!(report.result.method(), Some("local:plain-text"));
    }

    #[tokio::test]
    async fn plausible_local_text_skips_ocr() {
        let local = Scripted::new(Backend::LocalMultiMethod, vec![ok(&long_text(), "local:plain-text")]);
        let ocr = Scripted::new(Backend::ImageOcr, vec![ok("never", "ocr")]);
        let orch = base(ParsePolicy::LocalOnly, 2)
            .min_plausible_chars(1000)
            .local(local)
            .ocr(ocr.clone())
            .build();

        orch.run(&doc()).await;
        assert_eq!(ocr.calls(), 0);
    }

    #[tokio::test]
    async fn failed_local_stage_reaches_ocr_with_zero_threshold() {
        let local = Scripted::new(Backend::LocalMultiMethod, vec![fail("no text")]);
        let ocr = Scripted::new(Backend::ImageOcr, vec![ok("scanned words", "ocr")]);
        let orch = base(ParsePolicy::LocalOnly, 2)
            .local(local)
            .ocr(ocr.clone())
            .build();

        let report = orch.run(&doc()).await;
        assert_eq!(ocr.calls(), 1);
        assert_eq!(report.attempts_for(Backend::ImageOcr), 1);
        assert_eq!(report.result.method(), Some("ocr"));
    }

    #[tokio::test]
    async fn local_failure_records_are_unclassified() {
        let local = Scripted::new(
            Backend::LocalMultiMethod,
            vec![fail("Page errors: Page 2: quota exceeded")],
        );
        let conv = Scripted::new(Backend::LocalConverter, vec![ok("body", "converter:markitdown")]);
        let orch = base(ParsePolicy::LocalOnly, 2).local(local).local(conv).build();

        let report = orch.run(&doc()).await;
        assert_eq!(
            report.attempts[0].outcome,
            AttemptOutcome::Failure {
                kind: None,
                message: "Page errors: Page 2: quota exceeded".into(),
            }
        );
        assert!(report.attempts[0].failed_pages.is_empty());
    }

    #[tokio::test]
    async fn total_local_failure_is_reported() {
        let local = Scripted::new(Backend::LocalMultiMethod, vec![fail("no text layer")]);
        let orch = base(ParsePolicy::LocalOnly, 2).local(local).build();

        let report = orch.run(&doc()).await;
        assert_eq!(
            report.result,
            ExtractionResult::Failure {
                error_kind: ErrorKind::LocalExtractionFailure,
                message: "no text layer".into(),
            }
        );
    }

    #[tokio::test]
    async fn masked_local_failure_is_degraded_success() {
        let local = Scripted::new(Backend::LocalMultiMethod, vec![fail("no text layer")]);
        let orch = base(ParsePolicy::LocalOnly, 2)
            .local(local)
            .mask_local_failure(true)
            .build();

        let report = orch.run(&doc()).await;
        match report.result {
            ExtractionResult::Success { content, method, .. } => {
                assert_eq!(content.trim_end(), LOCAL_FAILURE_SENTINEL);
                assert_eq!(method, "none");
            }
            other => panic!("expected degraded success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn enhancer_rewrites_local_content() {
        let local = Scripted::new(Backend::LocalMultiMethod, vec![ok("raw", "local:plain-text")]);
        let model = Arc::new(ScriptedModel::new(vec![Ok("## Enhanced".into())]));
        let orch = base(ParsePolicy::LocalOnly, 2)
            .local(local)
            .enhancer(Enhancer::new(model, 100), EnhanceTask::Format)
            .build();

        let report = orch.run(&doc()).await;
        match report.result {
            ExtractionResult::Success { content, .. } => assert_eq!(content, "## Enhanced\n"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn enhancer_failure_keeps_raw_text() {
        let local = Scripted::new(Backend::LocalMultiMethod, vec![ok("raw body", "local:plain-text")]);
        let model = Arc::new(ScriptedModel::new(vec![Err(ModelError::EmptyResponse)]));
        let orch = base(ParsePolicy::LocalOnly, 2)
            .local(local)
            .enhancer(Enhancer::new(model, 100), EnhanceTask::MedicalStructure)
            .build();

        let report = orch.run(&doc()).await;
        match report.result {
            ExtractionResult::Success { content, .. } => {
                assert!(content.starts_with("Enhancement failed"));
                assert!(content.contains("raw body"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn progress_sees_fallback() {
        #[derive(Default)]
        struct Events(Mutex<Vec<String>>);
        impl ParseProgressCallback for Events {
            fn on_fallback(&self, from: Backend, to: Backend, reason: &str) {
                self.0.lock().unwrap().push(format!("{from}->{to}:{reason}"));
            }
            fn on_parse_complete(&self, success: bool, method: &str) {
                self.0.lock().unwrap().push(format!("done:{success}:{method}"));
            }
        }

        let events = Arc::new(Events::default());
        let remote = Scripted::new(Backend::Remote, vec![fail("quota exceeded")]);
        let local = Scripted::new(Backend::LocalMultiMethod, vec![ok("x", "local:plain-text")]);
        let orch = base(ParsePolicy::Adaptive, 2)
            .remote(remote)
            .local(local)
            .progress(events.clone())
            .build();

        orch.run(&doc()).await;
        assert_eq!(
            *events.0.lock().unwrap(),
            vec![
                "remote->local-multi-method:quota_exhausted".to_string(),
                "done:true:local:plain-text".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn success_content_is_cleaned() {
        let local = Scripted::new(
            Backend::LocalMultiMethod,
            vec![ok("## Page 1\r\n\r\n\r\n\r\ntext  ", "local:plain-text")],
        );
        let orch = base(ParsePolicy::LocalOnly, 2).local(local).build();
        let report = orch.run(&doc()).await;
        match report.result {
            ExtractionResult::Success { content, .. } => {
                assert_eq!(content, "## Page 1\n\ntext\n")
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
