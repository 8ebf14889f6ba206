//! Configuration types for document extraction.
//!
//! All pipeline behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. One struct holds every knob so a
//! config can be shared across the concurrent page tasks and logged as a unit.

use crate::error::ExtractError;
use crate::pipeline::llm::VisionModel;
use crate::pipeline::render::Rasterizer;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default vision model when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Configuration for one extraction request.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use kyc_ocr_extract::{ExtractionConfig, NamePolicy};
///
/// let config = ExtractionConfig::builder()
///     .concurrency(4)
///     .model("gpt-4o")
///     .name_policy(NamePolicy::KeepFirst)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Rendering DPI used when rasterising each PDF page. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Maximum page image dimension (width or height) in pixels. Default: 2000.
    ///
    /// Applies to rendered PDF pages and to uploaded images alike; larger
    /// images are scaled down before upload.
    pub max_rendered_pixels: u32,

    /// Number of pages sent to the model at the same time. Default: 10.
    pub concurrency: usize,

    /// LLM model identifier. If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "gemini").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed vision backend. Takes precedence over every provider
    /// setting; used for tests and for non-edgequake backends.
    pub vision_model: Option<Arc<dyn VisionModel>>,

    /// PDF rasteriser. If None, uses [`crate::pipeline::render::PdfiumRasterizer`].
    pub rasterizer: Option<Arc<dyn Rasterizer>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 2048.
    pub max_tokens: usize,

    /// Retries when no answer came back (transport error, rate limit). Default: 2.
    ///
    /// An answer that arrived but could not be used is never re-requested.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-model-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Timeout for the whole document. Default: none.
    pub document_timeout_secs: Option<u64>,

    /// Fail the whole request when a page is still rate-limited after its
    /// retries, instead of dropping that page. Default: false.
    pub abort_on_rate_limit: bool,

    /// How partner names are reconciled across pages. Default: [`NamePolicy::PreferLonger`].
    pub name_policy: NamePolicy,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Custom system prompt. If None, uses the built-in one.
    pub system_prompt: Option<String>,

    /// Attempts made to delete the scratch directory. Default: 3.
    pub cleanup_attempts: u32,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            max_rendered_pixels: 2000,
            concurrency: 10,
            model: None,
            provider_name: None,
            provider: None,
            vision_model: None,
            rasterizer: None,
            temperature: 0.1,
            max_tokens: 2048,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            document_timeout_secs: None,
            abort_on_rate_limit: false,
            name_policy: NamePolicy::default(),
            password: None,
            system_prompt: None,
            cleanup_attempts: 3,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("vision_model", &self.vision_model.as_ref().map(|_| "<dyn VisionModel>"))
            .field("rasterizer", &self.rasterizer.as_ref().map(|_| "<dyn Rasterizer>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("document_timeout_secs", &self.document_timeout_secs)
            .field("abort_on_rate_limit", &self.abort_on_rate_limit)
            .field("name_policy", &self.name_policy)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Model id to request from the provider.
    pub fn model_id(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`ExtractionConfig`].
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl fmt::Debug for ExtractionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ExtractionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
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

    pub fn vision_model(mut self, model: Arc<dyn VisionModel>) -> Self {
        self.config.vision_model = Some(model);
        self
    }

    pub fn rasterizer(mut self, rasterizer: Arc<dyn Rasterizer>) -> Self {
        self.config.rasterizer = Some(rasterizer);
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

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn document_timeout_secs(mut self, secs: u64) -> Self {
        self.config.document_timeout_secs = Some(secs);
        self
    }

    pub fn abort_on_rate_limit(mut self, v: bool) -> Self {
        self.config.abort_on_rate_limit = v;
        self
    }

    pub fn name_policy(mut self, policy: NamePolicy) -> Self {
        self.config.name_policy = policy;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn cleanup_attempts(mut self, n: u32) -> Self {
        self.config.cleanup_attempts = n;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(ExtractError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(ExtractError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(ExtractError::InvalidConfig(
                "API timeout must be at least 1 second".into(),
            ));
        }
        if c.document_timeout_secs == Some(0) {
            return Err(ExtractError::InvalidConfig(
                "Document timeout must be at least 1 second".into(),
            ));
        }
        if c.cleanup_attempts == 0 {
            return Err(ExtractError::InvalidConfig(
                "Cleanup needs at least one attempt".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How a partner's stored name is updated when a later page spells it
/// differently but the partner was matched on some other key.
///
/// Longer names usually carry middle names or second surnames the first page
/// abbreviated, but an OCR artefact can also be long. `KeepFirst` trusts page
/// order instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamePolicy {
    /// Replace the stored name when the incoming one is strictly longer. (default)
    #[default]
    PreferLonger,
    /// Keep the first name seen; later pages only fill a missing name.
    KeepFirst,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ExtractionConfig::default();
        assert_eq!(c.model_id(), DEFAULT_MODEL);
        assert_eq!(c.max_tokens, 2048);
        assert_eq!(c.name_policy, NamePolicy::PreferLonger);
        assert!(!c.abort_on_rate_limit);
    }

    #[test]
    fn builder_clamps_and_validates() {
        let c = ExtractionConfig::builder()
            .dpi(1000)
            .concurrency(0)
            .build()
            .unwrap();
        assert_eq!(c.dpi, 400);
        assert_eq!(c.concurrency, 1);

        let err = ExtractionConfig::builder()
            .api_timeout_secs(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, ExtractError::InvalidConfig(_)));

        let err = ExtractionConfig::builder()
            .cleanup_attempts(0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Cleanup"));
    }

    #[test]
    fn debug_hides_provider_objects() {
        let c = ExtractionConfig::default();
        let s = format!("{:?}", c);
        assert!(s.contains("ExtractionConfig"));
        assert!(s.contains("provider: None"));
    }
}
