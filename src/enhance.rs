//! Optional generative clean-up of locally extracted text.
//!
//! Only the head of the text (`enhance_max_chars` characters) is sent, so
//! enhancement of a long document is lossy. A failed call never fails the
//! parse: the raw text comes back behind a visible notice.

use crate::config::EnhanceTask;
use crate::model::TextModel;
use crate::prompts;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of one enhancement call.
#[derive(Debug, Clone, PartialEq)]
pub struct Enhancement {
    pub text: String,
    /// False when the model call failed and `text` carries the raw input.
    pub applied: bool,
}

/// Rewrites extracted text with a generative model.
///
/// Only the first `max_chars` characters are sent. A failed call never
/// fails the parse: the raw text comes back with a notice in front.
pub struct Enhancer {
    model: Arc<dyn TextModel>,
    max_chars: usize,
}

impl Enhancer {
    pub fn new(model: Arc<dyn TextModel>, max_chars: usize) -> Self {
        Self {
            model,
            max_chars: max_chars.max(1),
        }
    }

    /// Run `task` over the head of `raw`.
    pub async fn enhance(&self, raw: &str, task: EnhanceTask) -> Enhancement {
        let head = truncate_chars(raw, self.max_chars);
        if head.len() < raw.len() {
            debug!(
                "Enhancer: sending first {} of {} characters",
                self.max_chars,
                raw.chars().count()
            );
        }

        match self.model.generate(&prompts::enhance_prompt(task, head), None).await {
            Ok(text) => Enhancement {
                text,
                applied: true,
            },
            Err(e) => {
                warn!("Enhancement failed, keeping raw text: {}", e);
                Enhancement {
                    text: format!("Enhancement failed: {e}\n\nOriginal text:\n{raw}"),
                    applied: false,
                }
            }
        }
    }
}

/// Longest prefix of `s` with at most `max` characters.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
