//! Vision model capability: submit one page image plus instructions, get text back.
//!
//! [`VisionModel`] is the only seam between the pipeline and the network.
//! The default implementation, [`LlmVisionModel`], drives any
//! `edgequake-llm` provider; tests inject scripted models through
//! [`crate::config::ExtractionConfig::vision_model`].
//!
//! Implementations make exactly one request per `submit` call. Retries,
//! timeouts and backoff belong to [`crate::pipeline::page`].

use crate::config::ExtractionConfig;
use crate::document::PageImage;
use crate::error::{ExtractError, ModelError};
use crate::pipeline::encode;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info};

/// Raw answer for one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    /// Response text; `None` when the provider returned nothing.
    pub content: Option<String>,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl ModelReply {
    /// Reply with text and no token accounting.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }
}

/// A vision-capable model.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Send one page image with a system message and a page instruction.
    async fn submit(
        &self,
        image: &PageImage,
        system_prompt: &str,
        instruction: &str,
    ) -> Result<ModelReply, ModelError>;

    /// Short label for logs.
    fn label(&self) -> &str {
        "vision-model"
    }
}

/// [`VisionModel`] over an `edgequake-llm` chat provider.
pub struct LlmVisionModel {
    provider: Arc<dyn LLMProvider>,
    label: String,
    temperature: f32,
    max_tokens: usize,
}

impl LlmVisionModel {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            label: label.into(),
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
impl VisionModel for LlmVisionModel {
    async fn submit(
        &self,
        image: &PageImage,
        system_prompt: &str,
        instruction: &str,
    ) -> Result<ModelReply, ModelError> {
        let messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user_with_images(instruction, vec![encode::to_image_data(image)]),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(|e| classify_error(&e.to_string()))?;

        debug!(
            "Page {}: {} input tokens, {} output tokens",
            image.page_num, response.prompt_tokens, response.completion_tokens
        );

        let content = if response.content.trim().is_empty() {
            None
        } else {
            Some(response.content)
        };
        Ok(ModelReply {
            content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }

    fn label(&self) -> &str {
        &self.label
    }
}

static RETRY_AFTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:retry[- ]after|try again in)\D{0,5}(\d+)").unwrap());

static RATE_LIMITED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b429\b|rate[ _-]?limit|too many requests|quota").unwrap()
});

/// Map a provider error message onto rate-limit vs transport.
///
/// Providers disagree on error types but all mention a 429 status, "rate
/// limit" or quota in the message. `429` must stand alone: byte counts and
/// request ids contain those digits too.
pub fn classify_error(message: &str) -> ModelError {
    if RATE_LIMITED.is_match(message) {
        let retry_after_secs = RETRY_AFTER
            .captures(message)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok());
        ModelError::RateLimited {
            detail: message.to_string(),
            retry_after_secs,
        }
    } else {
        ModelError::Transport(message.to_string())
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ExtractError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the vision model, from most to least specific:
///
/// 1. an injected [`VisionModel`]
/// 2. a pre-built provider
/// 3. `provider_name` + model
/// 4. `KYC_LLM_PROVIDER` + `KYC_MODEL`
/// 5. OpenAI when `OPENAI_API_KEY` is set
/// 6. `ProviderFactory::from_env`
pub fn resolve_vision_model(config: &ExtractionConfig) -> Result<Arc<dyn VisionModel>, ExtractError> {
    if let Some(ref model) = config.vision_model {
        return Ok(Arc::clone(model));
    }

    let model = config.model_id();
    let (provider, label) = if let Some(ref provider) = config.provider {
        (Arc::clone(provider), model.to_string())
    } else if let Some(ref name) = config.provider_name {
        (create_provider(name, model)?, format!("{name}/{model}"))
    } else if let (Ok(prov), Ok(env_model)) =
        (std::env::var("KYC_LLM_PROVIDER"), std::env::var("KYC_MODEL"))
    {
        if prov.is_empty() || env_model.is_empty() {
            from_env_or_openai(model)?
        } else {
            (create_provider(&prov, &env_model)?, format!("{prov}/{env_model}"))
        }
    } else {
        from_env_or_openai(model)?
    };

    info!("Using vision model {}", label);
    Ok(Arc::new(LlmVisionModel::new(provider, label, config)))
}

fn from_env_or_openai(model: &str) -> Result<(Arc<dyn LLMProvider>, String), ExtractError> {
    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        if !key.is_empty() {
            return Ok((create_provider("openai", model)?, format!("openai/{model}")));
        }
    }

    let (provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ExtractError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, or KYC_LLM_PROVIDER and KYC_MODEL.\n\
                Error: {e}"
            ),
        })?;
    Ok((provider, "auto".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rate_limits() {
        let e = classify_error("HTTP 429 Too Many Requests: please retry after 12 seconds");
        match e {
            ModelError::RateLimited {
                retry_after_secs, ..
            } => assert_eq!(retry_after_secs, Some(12)),
            other => panic!("expected rate limit, got {other:?}"),
        }

        assert!(matches!(
            classify_error("You exceeded your current quota"),
            ModelError::RateLimited {
                retry_after_secs: None,
                ..
            }
        ));
    }

    #[test]
    fn other_errors_are_transport() {
        assert!(matches!(
            classify_error("connection reset by peer"),
            ModelError::Transport(_)
        ));
        for msg in [
            "read 14293 bytes then connection closed",
            "error sending request to http://10.0.0.7:4290/v1/chat",
            "request req_4291abc failed: 502 Bad Gateway",
        ] {
            assert!(
                matches!(classify_error(msg), ModelError::Transport(_)),
                "misclassified: {msg}"
            );
        }
        assert!(matches!(
            classify_error("status: 429"),
            ModelError::RateLimited { .. }
        ));
    }

    #[test]
    fn injected_model_wins() {
        struct Fixed;

        #[async_trait]
        impl VisionModel for Fixed {
            async fn submit(&self, _: &PageImage, _: &str, _: &str) -> Result<ModelReply, ModelError> {
                Ok(ModelReply::text("{}"))
            }

            fn label(&self) -> &str {
                "fixed"
            }
        }

        let config = ExtractionConfig::builder()
            .vision_model(Arc::new(Fixed))
            .build()
            .unwrap();
        let model = resolve_vision_model(&config).unwrap();
        assert_eq!(model.label(), "fixed");
    }
}
