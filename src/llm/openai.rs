use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::llm::{
    models::ChatRequest,
    streaming::{until_cancelled, SseDecoder, SseEvent},
    LlmError, LlmProvider, OnChunk, ProviderKind,
};

/// OpenAI chat-completions dialect, used for Claude through OpenRouter or
/// DeepInfra. Streams for real over SSE.
pub struct OpenAiCompatProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiCompatProvider {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
            model,
        }
    }

    pub fn build_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let mut messages = Vec::with_capacity(request.history.len() + 2);
        if let Some(system) = &request.system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        for message in &request.history {
            messages.push(json!({"role": message.role.as_str(), "content": message.content}));
        }
        messages.push(json!({"role": "user", "content": request.prompt}));

        json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
            "temperature": 0.7,
            "max_tokens": 4096,
        })
    }

    async fn send(
        &self,
        body: &Value,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::MissingApiKey("openai-compatible provider"));
        }

        let send = self
            .client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send();
        let response = until_cancelled(cancel, send)
            .await?
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            warn!("OpenAI-compatible provider returned status {}", status);
            return Err(LlmError::from_status(status, text));
        }
        Ok(response)
    }
}

/// Pulls `choices[0].delta.content` out of one SSE frame. Frames that are not
/// valid JSON yield `None` and are skipped by the caller.
pub fn delta_content(data: &str) -> Option<String> {
    let json: Value = serde_json::from_str(data).ok()?;
    json["choices"][0]["delta"]["content"]
        .as_str()
        .map(|s| s.to_string())
}

fn content_filtered(data: &str) -> bool {
    serde_json::from_str::<Value>(data)
        .map(|json| json["choices"][0]["finish_reason"].as_str() == Some("content_filter"))
        .unwrap_or(false)
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Claude
    }

    async fn complete(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        let body = self.build_body(request, false);
        let response = self.send(&body, cancel).await?;

        let json: Value = until_cancelled(cancel, response.json())
            .await?
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let choice = &json["choices"][0];
        if choice["finish_reason"].as_str() == Some("content_filter") {
            return Err(LlmError::ContentBlocked("content_filter".to_string()));
        }
        choice["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| LlmError::InvalidResponse("missing message content".to_string()))
    }

    async fn stream(
        &self,
        request: &ChatRequest,
        on_chunk: &mut OnChunk<'_>,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        let body = self.build_body(request, true);
        let response = self.send(&body, cancel).await?;

        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut full_content = String::new();

        loop {
            if cancel.is_cancelled() {
                return Err(LlmError::Aborted);
            }
            let (events, finished) = match until_cancelled(cancel, stream.next()).await? {
                Some(chunk) => {
                    let bytes = chunk.map_err(|e| LlmError::Network(e.to_string()))?;
                    (decoder.push(&bytes), false)
                }
                None => (decoder.finish().into_iter().collect(), true),
            };

            for event in events {
                let data = match event {
                    SseEvent::Done => return Ok(full_content),
                    SseEvent::Data(data) => data,
                };
                if content_filtered(&data) {
                    return Err(LlmError::ContentBlocked("content_filter".to_string()));
                }
                let Some(piece) = delta_content(&data) else {
                    debug!("Skipping stream frame without delta content");
                    continue;
                };
                if piece.is_empty() {
                    continue;
                }
                if cancel.is_cancelled() {
                    return Err(LlmError::Aborted);
                }
                full_content.push_str(&piece);
                on_chunk(&full_content);
            }

            if finished {
                return Ok(full_content);
            }
        }
    }
}
