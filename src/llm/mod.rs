pub mod gemini;
pub mod models;
pub mod openai;
pub mod streaming;

use gemini::GeminiProvider;
use openai::OpenAiCompatProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use models::ChatRequest;

/// Message carried by the cancellation sentinel.
pub const ABORTED_MESSAGE: &str = "Request aborted";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("{}", ABORTED_MESSAGE)]
    Aborted,
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Invalid API key")]
    InvalidApiKey,
    #[error("Access forbidden")]
    Forbidden,
    #[error("Rate limited")]
    RateLimited,
    #[error("Service unavailable (status {0})")]
    Unavailable(u16),
    #[error("API Error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Response blocked by content safety filter: {0}")]
    ContentBlocked(String),
    #[error("Provider returned an empty response")]
    EmptyResponse,
    #[error("Missing API key for {0}")]
    MissingApiKey(&'static str),
    #[error("Provider {0} is not configured")]
    NotConfigured(ProviderKind),
    #[error("External context unavailable: {0}")]
    ContextUnavailable(String),
    #[error("Network Error: {0}")]
    Network(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Maps a non-2xx provider status to the error taxonomy.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            400 => LlmError::InvalidRequest(body),
            401 => LlmError::InvalidApiKey,
            403 => LlmError::Forbidden,
            429 => LlmError::RateLimited,
            s if s >= 500 => LlmError::Unavailable(s),
            s => LlmError::Api {
                status: s,
                message: body,
            },
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, LlmError::Aborted)
    }

    /// Short text suitable for showing to the person chatting.
    pub fn user_message(&self) -> String {
        match self {
            LlmError::Aborted => ABORTED_MESSAGE.to_string(),
            LlmError::InvalidRequest(_) => {
                "The request was rejected as invalid. Please rephrase and try again.".to_string()
            }
            LlmError::InvalidApiKey | LlmError::MissingApiKey(_) => {
                "The AI provider API key is missing or invalid.".to_string()
            }
            LlmError::Forbidden => "Access to the AI provider was denied.".to_string(),
            LlmError::RateLimited => {
                "Too many requests. Please wait a moment and try again.".to_string()
            }
            LlmError::Unavailable(_) => {
                "The AI service is temporarily unavailable. Please try again later.".to_string()
            }
            LlmError::ContentBlocked(_) => {
                "The response was blocked by the provider's safety filters.".to_string()
            }
            LlmError::EmptyResponse => "The AI returned an empty response.".to_string(),
            LlmError::NotConfigured(kind) => format!("{} is not configured.", kind),
            LlmError::ContextUnavailable(_) => {
                "Up-to-date information could not be retrieved. Please try again.".to_string()
            }
            LlmError::Api { .. } | LlmError::Network(_) | LlmError::InvalidResponse(_) => {
                "Something went wrong while contacting the AI service.".to_string()
            }
        }
    }
}

/// Receives the full text produced so far, never just the delta.
pub type OnChunk<'a> = dyn FnMut(&str) + Send + 'a;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    Claude,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Gemini => f.write_str("gemini"),
            ProviderKind::Claude => f.write_str("claude"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(ProviderKind::Gemini),
            "claude" => Ok(ProviderKind::Claude),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// One complete answer, no chunk callbacks.
    async fn complete(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError>;

    /// Answer delivered through `on_chunk` as a progressively growing string.
    async fn stream(
        &self,
        request: &ChatRequest,
        on_chunk: &mut OnChunk<'_>,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError>;
}

/// Providers available to the dispatcher, keyed by user-selectable kind.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn LlmProvider>>,
}

impl ProviderRegistry {
    pub fn from_config(config: &AppConfig) -> Self {
        let mut registry = Self::default();
        let word_delay = Duration::from_millis(config.pipeline.simulated_word_delay_ms);

        if let Some(cfg) = config.llm.gemini.as_ref() {
            registry = registry.with_provider(Arc::new(GeminiProvider::new(
                cfg.api_key.clone(),
                cfg.api_base.clone(),
                cfg.model.clone(),
                word_delay,
                config.pipeline.empty_response_retries,
            )));
        }
        if let Some(cfg) = config.llm.openai_compat.as_ref() {
            registry = registry.with_provider(Arc::new(OpenAiCompatProvider::new(
                cfg.api_key.clone(),
                cfg.api_base.clone(),
                cfg.model.clone(),
            )));
        }
        registry
    }

    pub fn with_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn LlmProvider>, LlmError> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or(LlmError::NotConfigured(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_taxonomy() {
        assert!(matches!(LlmError::from_status(400, "bad".into()), LlmError::InvalidRequest(_)));
        assert!(matches!(LlmError::from_status(401, String::new()), LlmError::InvalidApiKey));
        assert!(matches!(LlmError::from_status(403, String::new()), LlmError::Forbidden));
        assert!(matches!(LlmError::from_status(429, String::new()), LlmError::RateLimited));
        assert!(matches!(LlmError::from_status(503, String::new()), LlmError::Unavailable(503)));
        assert!(matches!(
            LlmError::from_status(404, "nope".into()),
            LlmError::Api { status: 404, .. }
        ));
    }

    #[test]
    fn aborted_is_recognisable() {
        assert!(LlmError::Aborted.is_aborted());
        assert_eq!(LlmError::Aborted.to_string(), ABORTED_MESSAGE);
        assert!(!LlmError::RateLimited.is_aborted());
    }

    #[test]
    fn provider_kind_parses_case_insensitively() {
        assert_eq!("Claude".parse::<ProviderKind>().unwrap(), ProviderKind::Claude);
        assert_eq!(" gemini ".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert!("gpt".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn registry_reports_missing_provider() {
        let registry = ProviderRegistry::default();
        assert!(matches!(
            registry.get(ProviderKind::Claude),
            Err(LlmError::NotConfigured(ProviderKind::Claude))
        ));
    }
}
