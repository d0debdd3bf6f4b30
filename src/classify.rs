//! Failure classification for the remote parse service.
//!
//! The remote service reports failures as free text. The orchestrator needs
//! a closed set of kinds to decide between retrying, falling back, and
//! stopping, so every message is mapped to exactly one [`FailureKind`] by a
//! case-insensitive substring match against an ordered rule table.
//!
//! The table is plain data behind the [`Classifier`] trait: when the
//! upstream wording changes, swap or extend the table without touching
//! the orchestrator. Classification is best-effort; anything unmatched is
//! [`FailureKind::Unknown`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a remote extraction attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The model refused to reproduce the source text (recitation).
    ContentPolicyRejection,
    /// Credits or quota for the remote service are used up.
    QuotaExhausted,
    /// Some pages failed inside the multimodal pipeline.
    PartialMultimodalFailure,
    /// Nothing in the message matched a known marker.
    Unknown,
}

impl FailureKind {
    /// Whether the same backend is worth trying again.
    ///
    /// Policy rejections and quota exhaustion repeat deterministically, so
    /// only partial multimodal failures and unknown errors are retried.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            FailureKind::PartialMultimodalFailure | FailureKind::Unknown
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::ContentPolicyRejection => "content_policy_rejection",
            FailureKind::QuotaExhausted => "quota_exhausted",
            FailureKind::PartialMultimodalFailure => "partial_multimodal_failure",
            FailureKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a raw remote error message to a [`FailureKind`].
pub trait Classifier: Send + Sync {
    fn classify(&self, message: &str) -> FailureKind;
}

/// One row of the rule table: any marker matching selects `kind`.
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pub markers: Vec<String>,
    pub kind: FailureKind,
}

impl ClassificationRule {
    pub fn new(kind: FailureKind, markers: &[&str]) -> Self {
        Self {
            markers: markers.iter().map(|m| m.to_lowercase()).collect(),
            kind,
        }
    }

    fn matches(&self, lowered: &str) -> bool {
        self.markers.iter().any(|m| lowered.contains(m.as_str()))
    }
}

/// Ordered substring classifier. The first matching rule wins.
#[derive(Debug, Clone)]
pub struct PatternClassifier {
    rules: Vec<ClassificationRule>,
}

impl PatternClassifier {
    pub fn new(rules: Vec<ClassificationRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }
}

impl Default for PatternClassifier {
    fn default() -> Self {
        Self::new(vec![
            ClassificationRule::new(FailureKind::ContentPolicyRejection, &["recitation"]),
            ClassificationRule::new(FailureKind::QuotaExhausted, &["credits", "quota"]),
            ClassificationRule::new(
                FailureKind::PartialMultimodalFailure,
                &["multimodal_error", "multimodal"],
            ),
        ])
    }
}

impl Classifier for PatternClassifier {
    fn classify(&self, message: &str) -> FailureKind {
        let lowered = message.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&lowered))
            .map(|rule| rule.kind)
            .unwrap_or(FailureKind::Unknown)
    }
}

static RE_FAILED_PAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Page (\d+):").unwrap());

/// Page numbers named in a partial-failure message (`"Page 4: …"`),
/// sorted and deduplicated.
pub fn failed_pages(message: &str) -> Vec<usize> {
    let mut pages: Vec<usize> = RE_FAILED_PAGE
        .captures_iter(message)
        .filter_map(|c| c[1].parse().ok())
        .collect();
    pages.sort_unstable();
    pages.dedup();
    pages
}
