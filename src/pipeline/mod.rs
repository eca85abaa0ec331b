//! Model Dispatcher: classify, maybe fetch context, build the provider
//! request and stream the answer back through one callback.

pub mod cache;
pub mod classifier;
pub mod prompts;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{AppConfig, ChatConfig, ContextPolicy, PipelineConfig};
use crate::llm::{
    models::{ChatRequest, Message},
    streaming::{simulate_playback, until_cancelled},
    LlmError, OnChunk, ProviderKind, ProviderRegistry,
};
use crate::store::models::{Product, UploadedFile};
use crate::tools::{search::ExaSearch, ContextFetcher};
use cache::{CacheRules, ContextCache};

/// Inputs for one assistant turn.
#[derive(Debug, Clone, Copy)]
pub struct SendRequest<'a> {
    pub message: &'a str,
    pub provider: ProviderKind,
    /// Turns before `message`; empty on the first turn.
    pub history: &'a [Message],
    pub files: &'a [UploadedFile],
}

/// Built once at startup and shared by reference.
pub struct ChatService {
    providers: ProviderRegistry,
    fetcher: Arc<dyn ContextFetcher>,
    cache: ContextCache,
    product: Product,
    pipeline: PipelineConfig,
    max_file_sample_rows: usize,
}

fn ensure_active(cancel: &CancellationToken) -> Result<(), LlmError> {
    if cancel.is_cancelled() {
        Err(LlmError::Aborted)
    } else {
        Ok(())
    }
}

impl ChatService {
    pub fn new(
        providers: ProviderRegistry,
        fetcher: Arc<dyn ContextFetcher>,
        chat: &ChatConfig,
        pipeline: PipelineConfig,
    ) -> Self {
        Self {
            providers,
            fetcher,
            cache: ContextCache::new(CacheRules::from(&pipeline)),
            product: chat.product,
            pipeline,
            max_file_sample_rows: chat.max_file_sample_rows,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            ProviderRegistry::from_config(config),
            Arc::new(ExaSearch::from_config(&config.search)),
            &config.chat,
            config.pipeline.clone(),
        )
    }

    pub fn product(&self) -> Product {
        self.product
    }

    pub fn cache(&self) -> &ContextCache {
        &self.cache
    }

    /// Produces the assistant's reply to `request.message`.
    ///
    /// `on_chunk` sees the reply grow and is never called after `cancel`
    /// fires; a cancelled turn resolves to [`LlmError::Aborted`].
    pub async fn send_message(
        &self,
        request: SendRequest<'_>,
        on_chunk: &mut OnChunk<'_>,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        ensure_active(cancel)?;
        let provider = self.providers.get(request.provider)?;

        let needs_classification =
            request.history.is_empty() && !prompts::is_file_analysis_request(request.message);
        if needs_classification {
            let in_domain = classifier::classify(
                provider.as_ref(),
                self.product,
                request.message,
                self.pipeline.classifier_policy,
                cancel,
            )
            .await;
            ensure_active(cancel)?;

            if !in_domain {
                info!("Message classified as out of domain, sending rejection");
                return simulate_playback(
                    prompts::rejection_message(self.product),
                    self.word_delay(),
                    on_chunk,
                    cancel,
                )
                .await;
            }
        }

        let context = self.resolve_context(request.message, cancel).await?;
        ensure_active(cancel)?;

        let chat_request = ChatRequest {
            system_prompt: Some(prompts::system_prompt(self.product).to_string()),
            history: request.history.to_vec(),
            prompt: prompts::render_user_turn(
                request.message,
                request.files,
                self.max_file_sample_rows,
                context.as_deref(),
            ),
        };

        info!(
            "Dispatching to {} ({} prior turns, {} files, context: {})",
            request.provider,
            request.history.len(),
            request.files.len(),
            context.is_some()
        );
        provider
            .stream(&chat_request, on_chunk, cancel)
            .await
            .inspect_err(|e| {
                if !e.is_aborted() {
                    error!("{} request failed: {}", request.provider, e);
                }
            })
    }

    /// Search context for `message`, reusing the cached slot when it is
    /// still relevant. Failures follow the configured context policy.
    async fn resolve_context(
        &self,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, LlmError> {
        if !self.fetcher.should_search(message) {
            return Ok(None);
        }

        if let Some(context) = self.cache.get(message) {
            info!("Reusing cached search context");
            return Ok(Some(context));
        }

        match until_cancelled(cancel, self.fetcher.search(message)).await? {
            Ok(context) if !context.trim().is_empty() => {
                self.cache.update(message, &context);
                Ok(Some(context))
            }
            Ok(_) => Ok(None),
            Err(e) => match self.pipeline.context_policy {
                ContextPolicy::FailSoft => {
                    warn!("Search failed, continuing without context: {}", e);
                    Ok(None)
                }
                ContextPolicy::FailHard => Err(LlmError::ContextUnavailable(e.to_string())),
            },
        }
    }

    fn word_delay(&self) -> Duration {
        Duration::from_millis(self.pipeline.simulated_word_delay_ms)
    }
}
