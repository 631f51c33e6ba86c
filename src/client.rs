//! The remote OCR client seam.
//!
//! [`OcrClient`] is the only thing the extraction stages know about the
//! remote service: one prompt plus one page image in, text or a classified
//! [`RemoteError`] out. [`LlmOcrClient`] implements it on top of any
//! `edgequake_llm` vision provider; tests substitute their own.
//!
//! Clients are built through a [`ClientFactory`] so that construction happens
//! after rasterization and a construction failure surfaces as
//! [`ScribeError::ClientInitFailed`] before any page is dispatched.

use crate::config::ConversionConfig;
use crate::error::{RemoteError, ScribeError};
use crate::pipeline::encode::{to_image_data, PageImage};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::{debug, info};

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// A stateless handle to the remote OCR/generation API.
///
/// Shared read-only across all page futures of one conversion.
#[async_trait]
pub trait OcrClient: Send + Sync {
    /// Send `prompt` and `image`, returning the model's raw text reply.
    async fn generate(&self, prompt: &str, image: &PageImage) -> Result<String, RemoteError>;
}

/// Builds the client for one conversion.
pub trait ClientFactory: Send + Sync {
    fn create(&self, config: &ConversionConfig) -> Result<Arc<dyn OcrClient>, ScribeError>;
}

/// [`OcrClient`] backed by an `edgequake_llm` provider.
pub struct LlmOcrClient {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
}

impl LlmOcrClient {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ConversionConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl OcrClient for LlmOcrClient {
    /// The request carries the instructions as a system message and the page
    /// as an image attachment on an otherwise empty user turn.
    async fn generate(&self, prompt: &str, image: &PageImage) -> Result<String, RemoteError> {
        let messages = vec![
            ChatMessage::system(prompt),
            ChatMessage::user_with_images("", vec![to_image_data(image)]),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(|e| RemoteError::classify(e.to_string()))?;

        debug!(
            "OCR call: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

/// Resolves an `edgequake_llm` provider from the config and environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProviderClientFactory;

impl ClientFactory for ProviderClientFactory {
    fn create(&self, config: &ConversionConfig) -> Result<Arc<dyn OcrClient>, ScribeError> {
        let provider = resolve_provider(config)?;
        info!(
            "OCR client ready (provider: {}, model: {})",
            config.provider_name.as_deref().unwrap_or("auto"),
            config.model.as_deref().unwrap_or("default")
        );
        Ok(Arc::new(LlmOcrClient::new(provider, config)))
    }
}

/// Default model for a named provider.
pub fn default_model_for(provider: &str) -> &'static str {
    match provider {
        "openai" | "azure" => "gpt-4.1-nano",
        "anthropic" => "claude-sonnet-4-20250514",
        "ollama" | "lmstudio" => "llava",
        "mistral" => "pixtral-12b-2409",
        _ => DEFAULT_MODEL,
    }
}

fn create_vision_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ScribeError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| ScribeError::ClientInitFailed {
        provider: provider_name.to_string(),
        hint: format!("{e}"),
    })
}

/// Resolve the provider, from most-specific to least-specific:
///
/// 1. a pre-built provider on the config;
/// 2. a named provider (+ model, else that provider's default);
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, both set;
/// 4. Gemini when `GEMINI_API_KEY` is present;
/// 5. whatever `ProviderFactory::from_env` detects.
fn resolve_provider(config: &ConversionConfig) -> Result<Arc<dyn LLMProvider>, ScribeError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or_else(|| default_model_for(name));
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if std::env::var("GEMINI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider("gemini", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ScribeError::ClientInitFailed {
            provider: "auto".to_string(),
            hint: format!(
                "No OCR provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY (or OPENAI_API_KEY, ANTHROPIC_API_KEY) or pass --provider.\n\
                Error: {e}"
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_models() {
        assert_eq!(default_model_for("gemini"), "gemini-2.0-flash");
        assert_eq!(default_model_for("openai"), "gpt-4.1-nano");
        assert_eq!(default_model_for("ollama"), "llava");
        assert_eq!(default_model_for("something-new"), DEFAULT_MODEL);
    }
}
