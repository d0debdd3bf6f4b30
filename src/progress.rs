//! Progress-callback trait for cascade events.
//!
//! Inject an [`Arc<dyn ParseProgressCallback>`] via
//! [`crate::config::ParseConfigBuilder::progress_callback`] to be told which
//! backend is running, how it ended, and when the orchestrator falls back.
//!
//! # Example
//!
//! ```rust
//! use pdf2md_cascade::{Backend, ParseConfig, ParseProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     failures: AtomicUsize,
//! }
//!
//! impl ParseProgressCallback for CountingCallback {
//!     fn on_attempt_failure(&self, backend: Backend, attempt: u32, error: &str) {
//!         self.failures.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{backend} attempt {attempt} failed: {error}");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { failures: AtomicUsize::new(0) });
//!
//! let config = ParseConfig::builder()
//!     .progress_callback(counter as Arc<dyn ParseProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::extractor::Backend;
use std::sync::Arc;

/// Called by the orchestrator as a request moves through the cascade.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Attempts are sequential, so events never overlap
/// within one request; a callback shared across concurrent requests still
/// has to synchronise its own state.
pub trait ParseProgressCallback: Send + Sync {
    /// Called once before the first backend runs.
    ///
    /// # Arguments
    /// * `document`: display name of the document
    fn on_parse_start(&self, document: &str) {
        let _ = document;
    }

    /// Called before each backend invocation.
    ///
    /// # Arguments
    /// * `backend`: backend about to run
    /// * `attempt`: 1-indexed attempt number for that backend
    fn on_attempt_start(&self, backend: Backend, attempt: u32) {
        let _ = (backend, attempt);
    }

    /// Called when a backend produced content.
    ///
    /// # Arguments
    /// * `content_len`: characters produced
    fn on_attempt_success(&self, backend: Backend, attempt: u32, content_len: usize) {
        let _ = (backend, attempt, content_len);
    }

    /// Called when a backend failed.
    fn on_attempt_failure(&self, backend: Backend, attempt: u32, error: &str) {
        let _ = (backend, attempt, error);
    }

    /// Called when the orchestrator leaves one backend for the next.
    ///
    /// # Arguments
    /// * `reason`: short description, e.g. the failure kind
    fn on_fallback(&self, from: Backend, to: Backend, reason: &str) {
        let _ = (from, to, reason);
    }

    /// Called once with the terminal outcome.
    ///
    /// # Arguments
    /// * `success`: whether the request produced a `Success`
    /// * `method`: method identifier of the result, or the error kind
    fn on_parse_complete(&self, success: bool, method: &str) {
        let _ = (success, method);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ParseProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ParseConfig`].
pub type ProgressCallback = Arc<dyn ParseProgressCallback>;
