//! Generative text/vision model access.
//!
//! The enhancer and the OCR fallback talk to a [`TextModel`], not to a
//! provider SDK, so tests can script answers and callers can plug in any
//! backend. [`LlmTextModel`] is the real implementation on top of
//! `edgequake-llm`.

use crate::config::ParseConfig;
use crate::error::ModelError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::debug;

/// A prompt-in, text-out model, optionally with one image attached.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn generate(&self, prompt: &str, image: Option<ImageData>) -> Result<String, ModelError>;
}

/// [`TextModel`] backed by an `edgequake-llm` provider.
pub struct LlmTextModel {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmTextModel {
    pub fn new(provider: Arc<dyn LLMProvider>, temperature: f32, max_tokens: usize) -> Self {
        Self {
            provider,
            options: CompletionOptions {
                temperature: Some(temperature),
                max_tokens: Some(max_tokens),
                ..Default::default()
            },
        }
    }

    /// Resolve a provider from `config` and wrap it.
    pub fn from_config(config: &ParseConfig) -> Result<Self, ModelError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config.temperature, config.max_tokens))
    }
}

#[async_trait]
impl TextModel for LlmTextModel {
    async fn generate(&self, prompt: &str, image: Option<ImageData>) -> Result<String, ModelError> {
        let message = match image {
            Some(img) => ChatMessage::user_with_images(prompt, vec![img]),
            None => ChatMessage::user(prompt),
        };

        let response = self
            .provider
            .chat(&[message], Some(&self.options))
            .await
            .map_err(|e| ModelError::Call(e.to_string()))?;

        debug!(
            "Model call: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );

        if response.content.trim().is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        Ok(response.content)
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ModelError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ModelError::NotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. **Pre-built provider** (`config.provider`).
/// 2. **Named provider** (`config.provider_name`) with `config.model_id`.
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
/// 4. **Gemini key**: `GEMINI_API_KEY` selects the `gemini` provider with
///    `config.model_id`.
/// 5. **Full auto-detection** via `ProviderFactory::from_env`.
pub fn resolve_provider(config: &ParseConfig) -> Result<Arc<dyn LLMProvider>, ModelError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_provider(name, &config.model_id);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if std::env::var("GEMINI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_provider("gemini", &config.model_id);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ModelError::NotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "no generative model could be auto-detected from the environment; \
                 set GEMINI_API_KEY or another provider key ({e})"
            ),
        })?;

    Ok(llm_provider)
}
