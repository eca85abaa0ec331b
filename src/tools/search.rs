use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::config::SearchConfig;
use crate::tools::{ContextFetcher, SearchError};

/// Words and phrases signalling that an answer depends on current events.
const CURRENT_INFO_MARKERS: [&str; 18] = [
    "current",
    "latest",
    "recent",
    "recently",
    "today",
    "this week",
    "this month",
    "this year",
    "right now",
    "news",
    "trend",
    "trending",
    "up-to-date",
    "2024",
    "2025",
    "market size",
    "competitor",
    "industry report",
];

/// True when `message` mentions time-sensitive topics.
pub fn needs_current_info(message: &str) -> bool {
    let lower = message.to_lowercase();
    CURRENT_INFO_MARKERS.iter().any(|marker| {
        lower
            .match_indices(marker)
            .any(|(pos, _)| is_word_boundary(&lower, pos, marker.len()))
    })
}

fn is_word_boundary(text: &str, start: usize, len: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[start + len..].chars().next();
    let is_word = |c: Option<char>| c.map(|c| c.is_alphanumeric()).unwrap_or(false);
    // "trend" should still match "trends"
    !is_word(before) && (!is_word(after) || after == Some('s'))
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResult {
    title: Option<String>,
    url: Option<String>,
    published_date: Option<String>,
    text: Option<String>,
}

/// Client for the hosted search API, normally reached through our own
/// `/api/exa/search` proxy so the key stays server-side.
pub struct ExaSearch {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    num_results: u32,
    max_characters: u32,
}

impl ExaSearch {
    pub fn new(endpoint: String, num_results: u32, max_characters: u32) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            api_key: None,
            num_results,
            max_characters,
        }
    }

    /// The server-held key is only attached when the endpoint is the
    /// upstream API itself; the proxy adds its own.
    pub fn from_config(config: &SearchConfig) -> Self {
        let search = Self::new(
            config.endpoint.clone(),
            config.num_results,
            config.max_characters,
        );
        if config.targets_upstream() && !config.api_key.is_empty() {
            search.with_api_key(config.api_key.clone())
        } else {
            search
        }
    }

    /// Sends the key directly, for talking to the upstream API without the proxy.
    pub fn with_api_key(mut self, api_key: String) -> Self {
        self.api_key = Some(api_key);
        self
    }

    fn format_results(results: Vec<SearchResult>) -> String {
        let mut combined_content = String::new();
        for result in results {
            let Some(text) = result.text.filter(|t| !t.trim().is_empty()) else {
                continue;
            };
            if let Some(title) = result.title {
                combined_content.push_str(&format!("Title: {}\n", title));
            }
            if let Some(url) = result.url {
                combined_content.push_str(&format!("Source: {}\n", url));
            }
            if let Some(date) = result.published_date {
                combined_content.push_str(&format!("Published: {}\n", date));
            }
            combined_content.push_str(&format!("Content:\n{}", text.trim()));
            combined_content.push_str("\n\n---\n\n");
        }
        combined_content
    }
}

#[async_trait]
impl ContextFetcher for ExaSearch {
    fn should_search(&self, message: &str) -> bool {
        needs_current_info(message)
    }

    async fn search(&self, message: &str) -> Result<String, SearchError> {
        info!("Performing context search for: {}", message);

        let body = json!({
            "query": message,
            "numResults": self.num_results,
            "type": "auto",
            "contents": {
                "text": { "maxCharacters": self.max_characters }
            }
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await.map_err(|e| {
            error!("Failed to reach search endpoint: {}", e);
            SearchError::Network(e.to_string())
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(SearchError::Api { status, message });
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(e.to_string()))?;

        Ok(Self::format_results(parsed.results))
    }
}
