#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use stratify::app::AppState;
use stratify::config::AppConfig;
use stratify::db::get_connection;
use stratify::llm::models::ChatRequest;
use stratify::llm::streaming::simulate_playback;
use stratify::llm::{LlmError, LlmProvider, OnChunk, ProviderKind, ProviderRegistry};
use stratify::pipeline::ChatService;
use stratify::tools::{ContextFetcher, SearchError};
use tokio_util::sync::CancellationToken;

/// Defaults with in-memory storage and instant playback.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::load("does-not-exist").unwrap();
    config.storage.path = ":memory:".to_string();
    config.pipeline.simulated_word_delay_ms = 0;
    config
}

pub enum Reply {
    Text(String),
    Fail(fn() -> LlmError),
    /// Emits one chunk, then waits for cancellation.
    HangAfter(String),
}

pub struct FakeProvider {
    kind: ProviderKind,
    /// `None` makes the classifier call fail.
    verdict: Option<String>,
    reply: Reply,
    pub complete_calls: AtomicUsize,
    pub stream_calls: AtomicUsize,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl FakeProvider {
    pub fn new(verdict: Option<&str>, reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            kind: ProviderKind::Gemini,
            verdict: verdict.map(str::to_string),
            reply,
            complete_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn answering(text: &str) -> Arc<Self> {
        Self::new(Some("yes"), Reply::Text(text.to_string()))
    }

    pub fn classifier_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    pub fn model_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> ChatRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl LlmProvider for FakeProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn complete(
        &self,
        _request: &ChatRequest,
        _cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        self.verdict.clone().ok_or(LlmError::Unavailable(503))
    }

    async fn stream(
        &self,
        request: &ChatRequest,
        on_chunk: &mut OnChunk<'_>,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        match &self.reply {
            Reply::Text(text) => simulate_playback(text, Duration::ZERO, on_chunk, cancel).await,
            Reply::Fail(make) => Err(make()),
            Reply::HangAfter(first) => {
                on_chunk(first);
                cancel.cancelled().await;
                Err(LlmError::Aborted)
            }
        }
    }
}

pub struct FakeFetcher {
    gate: bool,
    result: Result<String, String>,
    pub calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn returning(context: &str) -> Arc<Self> {
        Arc::new(Self {
            gate: true,
            result: Ok(context.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            gate: true,
            result: Err("upstream down".to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn never() -> Arc<Self> {
        Arc::new(Self {
            gate: false,
            result: Ok(String::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn search_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContextFetcher for FakeFetcher {
    fn should_search(&self, _message: &str) -> bool {
        self.gate
    }

    async fn search(&self, _message: &str) -> Result<String, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone().map_err(SearchError::Network)
    }
}

pub fn service(
    config: &AppConfig,
    provider: Arc<FakeProvider>,
    fetcher: Arc<FakeFetcher>,
) -> ChatService {
    let registry = ProviderRegistry::default().with_provider(provider);
    ChatService::new(registry, fetcher, &config.chat, config.pipeline.clone())
}

pub fn app_state(
    config: AppConfig,
    provider: Arc<FakeProvider>,
    fetcher: Arc<FakeFetcher>,
) -> AppState {
    let chat = service(&config, provider, fetcher);
    let pool = get_connection(&config.storage).unwrap();
    AppState::new(config, chat, pool).unwrap()
}
