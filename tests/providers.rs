#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use stratify::llm::gemini::GeminiProvider;
    use stratify::llm::models::{ChatRequest, Message};
    use stratify::llm::openai::OpenAiCompatProvider;
    use stratify::llm::{LlmError, LlmProvider, ProviderKind};
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GEMINI_PATH: &str = "/models/gemini-test:generateContent";

    fn gemini(server: &MockServer) -> GeminiProvider {
        GeminiProvider::new(
            "gem-key".to_string(),
            server.uri(),
            "gemini-test".to_string(),
            Duration::ZERO,
            1,
        )
    }

    fn claude(server: &MockServer) -> OpenAiCompatProvider {
        OpenAiCompatProvider::new(
            "or-key".to_string(),
            server.uri(),
            "anthropic/claude-test".to_string(),
        )
    }

    fn request(prompt: &str) -> ChatRequest {
        ChatRequest {
            system_prompt: Some("You are a PM assistant.".to_string()),
            history: vec![Message::user("hi"), Message::assistant("hello")],
            prompt: prompt.to_string(),
        }
    }

    fn gemini_reply(text: &str) -> serde_json::Value {
        json!({
            "candidates": [{
                "finishReason": "STOP",
                "content": { "role": "model", "parts": [{ "text": text }] }
            }]
        })
    }

    fn sse_body(pieces: &[&str]) -> String {
        let mut body = String::new();
        for piece in pieces {
            let frame = json!({ "choices": [{ "index": 0, "delta": { "content": piece } }] });
            body.push_str(&format!("data: {}\n\n", frame));
        }
        body.push_str(": keep-alive\n\n");
        body.push_str("data: [DONE]\n\n");
        body
    }

    // --- Gemini ---

    #[tokio::test]
    async fn test_gemini_streams_word_by_word() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GEMINI_PATH))
            .and(query_param("key", "gem-key"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(gemini_reply("Ship the MVP first")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut chunks = Vec::new();
        let mut on_chunk = |text: &str| chunks.push(text.to_string());
        let text = gemini(&server)
            .stream(&request("What next?"), &mut on_chunk, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(text, "Ship the MVP first");
        assert_eq!(
            chunks,
            vec!["Ship", "Ship the", "Ship the MVP", "Ship the MVP first"]
        );
    }

    #[tokio::test]
    async fn test_gemini_retries_empty_response_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GEMINI_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(gemini_reply("  ")))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(GEMINI_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(gemini_reply("Second try")))
            .expect(1)
            .mount(&server)
            .await;

        let text = gemini(&server)
            .complete(&request("retry?"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(text, "Second try");
    }

    #[tokio::test]
    async fn test_gemini_gives_up_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GEMINI_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .expect(2)
            .mount(&server)
            .await;

        let err = gemini(&server)
            .complete(&request("anything"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_gemini_blocked_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GEMINI_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "promptFeedback": { "blockReason": "SAFETY" }
            })))
            .mount(&server)
            .await;

        let err = gemini(&server)
            .complete(&request("anything"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::ContentBlocked(_)));
    }

    #[tokio::test]
    async fn test_gemini_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GEMINI_PATH))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = gemini(&server)
            .complete(&request("anything"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::RateLimited));
    }

    #[tokio::test]
    async fn test_gemini_missing_key_never_calls_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(gemini_reply("x")))
            .expect(0)
            .mount(&server)
            .await;

        let provider = GeminiProvider::new(
            String::new(),
            server.uri(),
            "gemini-test".to_string(),
            Duration::ZERO,
            1,
        );
        let err = provider
            .complete(&request("anything"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKey(_)));
    }

    #[tokio::test]
    async fn test_gemini_abort_stops_playback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GEMINI_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(gemini_reply("one two three four")),
            )
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let mut chunks = Vec::new();
        let mut on_chunk = |text: &str| {
            chunks.push(text.to_string());
            if chunks.len() == 2 {
                token.cancel();
            }
        };

        let err = gemini(&server)
            .stream(&request("count"), &mut on_chunk, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_aborted());
        assert_eq!(chunks, vec!["one", "one two"]);
    }

    // --- OpenAI-compatible (Claude) ---

    #[tokio::test]
    async fn test_claude_streams_growing_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer or-key"))
            .and(body_partial_json(json!({
                "model": "anthropic/claude-test",
                "stream": true,
                "messages": [
                    { "role": "system", "content": "You are a PM assistant." },
                    { "role": "user", "content": "hi" },
                    { "role": "assistant", "content": "hello" },
                    { "role": "user", "content": "Plan Q3" }
                ]
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_body(&["Focus ", "on ", "retention."])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut chunks = Vec::new();
        let mut on_chunk = |text: &str| chunks.push(text.to_string());
        let provider = claude(&server);
        assert_eq!(provider.kind(), ProviderKind::Claude);

        let text = provider
            .stream(&request("Plan Q3"), &mut on_chunk, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(text, "Focus on retention.");
        assert_eq!(chunks, vec!["Focus ", "Focus on ", "Focus on retention."]);
    }

    #[tokio::test]
    async fn test_claude_skips_malformed_frames() {
        let server = MockServer::start().await;
        let body = format!(
            "data: {{not json}}\n\ndata: {}\n\ndata: [DONE]\n\n",
            json!({ "choices": [{ "delta": { "content": "ok" } }] })
        );
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let mut on_chunk = |_: &str| {};
        let text = claude(&server)
            .stream(&request("x"), &mut on_chunk, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn test_claude_content_filter() {
        let server = MockServer::start().await;
        let body = format!(
            "data: {}\n\ndata: [DONE]\n\n",
            json!({ "choices": [{ "delta": {}, "finish_reason": "content_filter" }] })
        );
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let mut on_chunk = |_: &str| {};
        let err = claude(&server)
            .stream(&request("x"), &mut on_chunk, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::ContentBlocked(_)));
    }

    #[tokio::test]
    async fn test_claude_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let mut on_chunk = |_: &str| {};
        let err = claude(&server)
            .stream(&request("x"), &mut on_chunk, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::InvalidApiKey));
    }

    #[tokio::test]
    async fn test_claude_complete_for_classification() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({ "stream": false })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "YES" }, "finish_reason": "stop" }]
            })))
            .mount(&server)
            .await;

        let text = claude(&server)
            .complete(&ChatRequest::one_shot("Is this about PM?"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(text, "YES");
    }

    #[tokio::test]
    async fn test_cancelled_before_send() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse_body(&["late"])))
            .expect(0)
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut on_chunk = |_: &str| {
            panic!("no chunk after abort");
        };
        let err = claude(&server)
            .stream(&request("x"), &mut on_chunk, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_aborted());
    }
}
