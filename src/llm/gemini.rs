use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::llm::{
    models::{ChatRequest, Role},
    streaming::{simulate_playback, until_cancelled},
    LlmError, LlmProvider, OnChunk, ProviderKind,
};

/// Model reply injected after the system prompt on the first exchange.
const SYSTEM_ACK: &str = "Understood. I will follow these instructions.";

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Gemini `generateContent`. The API answers in one piece, so streaming is
/// cosmetic playback of the finished text.
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    word_delay: Duration,
    empty_retries: u32,
}

impl GeminiProvider {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        word_delay: Duration,
        empty_retries: u32,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
            model,
            word_delay,
            empty_retries,
        }
    }

    /// `contents` alternates `user`/`model` turns. The system prompt, when
    /// present and history is empty, becomes the opening exchange.
    pub fn build_body(request: &ChatRequest) -> Value {
        let mut contents = Vec::new();

        if request.history.is_empty() {
            if let Some(system) = &request.system_prompt {
                contents.push(json!({"role": "user", "parts": [{"text": system}]}));
                contents.push(json!({"role": "model", "parts": [{"text": SYSTEM_ACK}]}));
            }
        }

        for message in &request.history {
            let role = match message.role {
                Role::User => "user",
                Role::Assistant => "model",
            };
            contents.push(json!({"role": role, "parts": [{"text": message.content}]}));
        }
        contents.push(json!({"role": "user", "parts": [{"text": request.prompt}]}));

        let safety_settings: Vec<Value> = SAFETY_CATEGORIES
            .iter()
            .map(|category| json!({"category": category, "threshold": "BLOCK_MEDIUM_AND_ABOVE"}))
            .collect();

        json!({
            "contents": contents,
            "generationConfig": {
                "temperature": 0.7,
                "topK": 40,
                "topP": 0.95,
                "maxOutputTokens": 8192,
            },
            "safetySettings": safety_settings,
        })
    }

    /// Extracts the answer text, surfacing safety blocks as errors.
    pub fn parse_response(json: &Value) -> Result<String, LlmError> {
        if let Some(reason) = json["promptFeedback"]["blockReason"].as_str() {
            return Err(LlmError::ContentBlocked(reason.to_string()));
        }

        let candidate = &json["candidates"][0];
        if let Some(reason) = candidate["finishReason"].as_str() {
            if matches!(reason, "SAFETY" | "BLOCKLIST" | "PROHIBITED_CONTENT") {
                return Err(LlmError::ContentBlocked(reason.to_string()));
            }
        }

        let text: String = candidate["content"]["parts"]
            .as_array()
            .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
            .unwrap_or_default();
        Ok(text)
    }

    async fn request_once(
        &self,
        body: &Value,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );

        let send = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .header("Content-Type", "application/json")
            .json(body)
            .send();
        let response = until_cancelled(cancel, send)
            .await?
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            warn!("Gemini returned status {}", status);
            return Err(LlmError::from_status(status, text));
        }

        let json: Value = until_cancelled(cancel, response.json())
            .await?
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        Self::parse_response(&json)
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn complete(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::MissingApiKey("gemini"));
        }
        let body = Self::build_body(request);

        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(LlmError::Aborted);
            }
            let text = self.request_once(&body, cancel).await?;
            if !text.trim().is_empty() {
                return Ok(text);
            }
            if attempt >= self.empty_retries {
                return Err(LlmError::EmptyResponse);
            }
            attempt += 1;
            debug!("Gemini returned an empty response, retrying ({})", attempt);
        }
    }

    async fn stream(
        &self,
        request: &ChatRequest,
        on_chunk: &mut OnChunk<'_>,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        let text = self.complete(request, cancel).await?;
        simulate_playback(&text, self.word_delay, on_chunk, cancel).await
    }
}
