//! Text extraction: page image in, raw page text out.
//!
//! The extractor itself is a trait so the pipeline can run against any
//! service (or a stub in tests). [`VisionExtractor`] is the production
//! implementation backed by an `edgequake-llm` vision provider.
//!
//! [`extract_pages`] fans the pages out over the bounded pool. There are no
//! retries and no partial results: the first failed page fails the batch.

use crate::error::{Doc2TextError, ExternalError};
use crate::pipeline::encode::encode_page;
use crate::pipeline::render::PageImage;
use crate::pool;
use crate::progress::PipelineProgress;
use crate::prompts::DEFAULT_SYSTEM_PROMPT;
use async_trait::async_trait;
use futures::stream::{Stream, TryStreamExt};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Text extracted from one page, before sanitisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub page_num: usize,
    pub text: String,
}

/// Extracts the text shown on a page image.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, page: &PageImage) -> Result<String, ExternalError>;
}

/// Settings for [`VisionExtractor`].
#[derive(Clone)]
pub struct VisionConfig {
    /// Model identifier, e.g. "gpt-4.1-nano". Provider default when `None`.
    pub model: Option<String>,
    /// Provider name ("openai", "anthropic", "ollama", …).
    pub provider_name: Option<String>,
    /// Pre-built provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,
    pub temperature: f32,
    pub max_tokens: usize,
    /// Replaces [`DEFAULT_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,
    /// Per-page request timeout.
    pub api_timeout_secs: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            system_prompt: None,
            api_timeout_secs: 60,
        }
    }
}

impl std::fmt::Debug for VisionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("system_prompt", &self.system_prompt.as_ref().map(|s| s.len()))
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

/// Extracts page text with a vision-capable LLM.
pub struct VisionExtractor {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    options: CompletionOptions,
    timeout: Duration,
}

impl VisionExtractor {
    /// Resolve a provider from `config` and the environment.
    pub fn from_config(config: VisionConfig) -> Result<Self, Doc2TextError> {
        let provider = resolve_provider(&config)?;
        info!(
            "Vision provider ready (provider={:?}, model={:?})",
            config.provider_name, config.model
        );
        Ok(Self::new(provider, &config))
    }

    /// Use an already-built provider.
    pub fn new(provider: Arc<dyn LLMProvider>, config: &VisionConfig) -> Self {
        Self {
            provider,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            options: build_options(config),
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }
}

#[async_trait]
impl TextExtractor for VisionExtractor {
    async fn extract_text(&self, page: &PageImage) -> Result<String, ExternalError> {
        let start = Instant::now();
        let bytes = page.read().await?;

        // The image carries all the content; the user text stays empty.
        let messages = vec![
            ChatMessage::system(&self.system_prompt),
            ChatMessage::user_with_images("", vec![encode_page(&bytes, page.mime_type)]),
        ];

        let response = tokio::time::timeout(
            self.timeout,
            self.provider.chat(&messages, Some(&self.options)),
        )
        .await
        .map_err(|_| ExternalError::new(format!("timed out after {}s", self.timeout.as_secs())))?
        .map_err(|e| ExternalError::new(e.to_string()))?;

        debug!(
            "Page {}: {} input tokens, {} output tokens, {:?}",
            page.page_num,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(response.content)
    }
}

fn build_options(config: &VisionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn create_vision_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, Doc2TextError> {
    ProviderFactory::create_llm_provider(name, model)
        .map_err(|e| Doc2TextError::InvalidConfig(format!("provider '{name}': {e}")))
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. a pre-built `config.provider`;
/// 2. `config.provider_name` with `config.model` (default `gpt-4.1-nano`);
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set;
/// 4. OpenAI when `OPENAI_API_KEY` is set;
/// 5. whatever `ProviderFactory::from_env` detects.
fn resolve_provider(config: &VisionConfig) -> Result<Arc<dyn LLMProvider>, Doc2TextError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
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

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
        return create_vision_provider("openai", model);
    }

    let (llm_provider, _embedding) = ProviderFactory::from_env().map_err(|e| {
        Doc2TextError::InvalidConfig(format!(
            "no LLM provider could be auto-detected from environment \
             (set OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass a provider): {e}"
        ))
    })?;
    Ok(llm_provider)
}

/// Extract every page with at most `concurrency` calls in flight.
///
/// `pages` is pulled only when a slot is free, so a lazy page source (the
/// rasteriser) stays at most `concurrency` pages ahead. Results are in page
/// order. Any failure, from the source or from an extraction, fails the whole
/// batch.
pub async fn extract_pages<S>(
    extractor: &dyn TextExtractor,
    pages: S,
    concurrency: usize,
    progress: &dyn PipelineProgress,
) -> Result<Vec<PageText>, Doc2TextError>
where
    S: Stream<Item = Result<PageImage, Doc2TextError>>,
{
    progress.on_extraction_start(concurrency);
    let work = pages.map_ok(|page| {
        progress.on_page_rendered(page.page_num);
        (page.page_num, page)
    });
    pool::map_ordered(work, concurrency, move |_, page| async move {
        let text = extractor
            .extract_text(&page)
            .await
            .map_err(|e| Doc2TextError::ExtractionFailed {
                page: page.page_num,
                detail: e.to_string(),
            })?;
        debug!("Page {} extracted ({} bytes)", page.page_num, text.len());
        progress.on_page_extracted(page.page_num, text.len());
        Ok(PageText {
            page_num: page.page_num,
            text,
        })
    })
    .await
}
