use serde::Deserialize;
use tracing::error;

use crate::llm::ProviderKind;
use crate::store::persistence::StorageLayout;
use crate::store::Product;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins that receive CORS headers on `/api` routes.
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub path: String,
    /// Overrides the layout implied by the product.
    pub layout: Option<StorageLayout>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeminiConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
}

/// Any provider speaking the OpenAI chat-completions dialect (OpenRouter, DeepInfra).
#[derive(Debug, Deserialize, Clone)]
pub struct OpenAiCompatConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub default_provider: ProviderKind,
    pub gemini: Option<GeminiConfig>,
    pub openai_compat: Option<OpenAiCompatConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// Where the client posts search requests, normally our own `/api/exa/search` proxy.
    pub endpoint: String,
    /// Upstream search API the proxy forwards to.
    pub upstream_url: String,
    /// Server-held key, only ever sent by the proxy.
    pub api_key: String,
    pub num_results: u32,
    pub max_characters: u32,
}

impl SearchConfig {
    pub fn targets_upstream(&self) -> bool {
        self.endpoint == self.upstream_url
    }

    /// Points the client straight at the upstream API. Used by the REPL,
    /// which owns the storage file and so never runs beside `serve`.
    pub fn bypass_proxy(&mut self) {
        self.endpoint = self.upstream_url.clone();
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    pub product: Product,
    pub max_file_sample_rows: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            product: Product::StratifyPm,
            max_file_sample_rows: 50,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ClassifierPolicy {
    /// Classifier failures treat the message as in-domain.
    FailOpen,
    /// Classifier failures reject the message.
    FailClosed,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ContextPolicy {
    /// Search failures continue without augmentation.
    FailSoft,
    /// Search failures abort the request.
    FailHard,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    pub classifier_policy: ClassifierPolicy,
    pub context_policy: ContextPolicy,
    pub cache_ttl_secs: u64,
    pub cache_min_shared_keywords: usize,
    pub cache_keyword_ratio: f64,
    pub cache_min_word_len: usize,
    pub simulated_word_delay_ms: u64,
    pub empty_response_retries: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            classifier_policy: ClassifierPolicy::FailOpen,
            context_policy: ContextPolicy::FailSoft,
            cache_ttl_secs: 600,
            cache_min_shared_keywords: 2,
            cache_keyword_ratio: 0.3,
            cache_min_word_len: 3,
            simulated_word_delay_ms: 30,
            empty_response_retries: 1,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub chat: ChatConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    pub fn load(path: &str) -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();

        let settings = config::Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8787)?
            .set_default(
                "server.allowed_origins",
                vec!["http://localhost:5173", "http://localhost:8787"],
            )?
            .set_default("storage.path", "stratify.duckdb")?
            .set_default("llm.default_provider", "gemini")?
            .set_default(
                "llm.gemini.api_base",
                "https://generativelanguage.googleapis.com/v1beta",
            )?
            .set_default("llm.gemini.api_key", "${GEMINI_API_KEY}")?
            .set_default("llm.gemini.model", "gemini-1.5-flash")?
            .set_default("llm.openai_compat.api_base", "https://openrouter.ai/api/v1")?
            .set_default("llm.openai_compat.api_key", "${OPENROUTER_API_KEY}")?
            .set_default("llm.openai_compat.model", "anthropic/claude-3.5-sonnet")?
            .set_default("search.endpoint", "http://127.0.0.1:8787/api/exa/search")?
            .set_default("search.upstream_url", "https://api.exa.ai/search")?
            .set_default("search.api_key", "${EXA_API_KEY}")?
            .set_default("search.num_results", 5)?
            .set_default("search.max_characters", 1000)?
            .set_default("chat.product", "stratify-pm")?
            .set_default("chat.max_file_sample_rows", 50)?
            .set_default("pipeline.classifier_policy", "fail-open")?
            .set_default("pipeline.context_policy", "fail-soft")?
            .set_default("pipeline.cache_ttl_secs", 600)?
            .set_default("pipeline.cache_min_shared_keywords", 2)?
            .set_default("pipeline.cache_keyword_ratio", 0.3)?
            .set_default("pipeline.cache_min_word_len", 3)?
            .set_default("pipeline.simulated_word_delay_ms", 30)?
            .set_default("pipeline.empty_response_retries", 1)?
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("STRATIFY").separator("__"))
            .build()?;

        let mut app_config: AppConfig = settings.try_deserialize()?;

        // Expand environment variables if present like ${GEMINI_API_KEY}
        app_config.server.host = expand_env(&app_config.server.host);
        app_config.storage.path = expand_env(&app_config.storage.path);
        app_config.search.api_key = expand_env(&app_config.search.api_key);

        if let Some(ref mut gemini) = app_config.llm.gemini {
            gemini.api_key = expand_env(&gemini.api_key);
            if gemini.api_key.is_empty() {
                error!("Gemini API key is not configured; Gemini requests will fail");
            }
        }
        if let Some(ref mut compat) = app_config.llm.openai_compat {
            compat.api_key = expand_env(&compat.api_key);
            if compat.api_key.is_empty() {
                error!("OpenAI-compatible API key is not configured; Claude requests will fail");
            }
        }
        if app_config.search.api_key.is_empty() {
            error!("Search API key is not configured; the search proxy will reject requests");
        }

        Ok(app_config)
    }

    /// Storage layout in effect: the explicit override, else the product default.
    pub fn storage_layout(&self) -> StorageLayout {
        self.storage
            .layout
            .unwrap_or_else(|| StorageLayout::for_product(self.chat.product))
    }
}

fn expand_env(val: &str) -> String {
    if val.starts_with("${") && val.ends_with('}') {
        let var_name = &val[2..val.len() - 1];
        std::env::var(var_name).unwrap_or_else(|_| "".to_string())
    } else {
        val.to_string()
    }
}
