mod common;

#[cfg(test)]
mod tests {
    use super::common::{service, test_config, FakeFetcher, FakeProvider, Reply};
    use stratify::config::{ClassifierPolicy, ContextPolicy};
    use stratify::llm::models::Message;
    use stratify::llm::{LlmError, ProviderKind};
    use stratify::pipeline::{prompts, SendRequest};
    use stratify::store::{Product, UploadedFile};
    use tokio_util::sync::CancellationToken;

    fn first_turn(message: &str) -> SendRequest<'_> {
        SendRequest {
            message,
            provider: ProviderKind::Gemini,
            history: &[],
            files: &[],
        }
    }

    #[tokio::test]
    async fn test_in_domain_first_turn_reaches_model() {
        let config = test_config();
        let provider = FakeProvider::answering("Use RICE scoring.");
        let chat = service(&config, provider.clone(), FakeFetcher::never());

        let mut chunks = Vec::new();
        let mut on_chunk = |text: &str| chunks.push(text.to_string());
        let reply = chat
            .send_message(
                first_turn("How do I prioritize my backlog?"),
                &mut on_chunk,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(reply, "Use RICE scoring.");
        assert_eq!(chunks.last().map(String::as_str), Some("Use RICE scoring."));
        assert_eq!(provider.classifier_calls(), 1);
        assert_eq!(provider.model_calls(), 1);

        let request = provider.last_request();
        assert_eq!(
            request.system_prompt.as_deref(),
            Some(prompts::system_prompt(Product::StratifyPm))
        );
        assert_eq!(request.prompt, "How do I prioritize my backlog?");
    }

    #[tokio::test]
    async fn test_out_of_domain_gets_rejection_without_model_call() {
        let config = test_config();
        let provider = FakeProvider::new(Some("no"), Reply::Text("unused".into()));
        let chat = service(&config, provider.clone(), FakeFetcher::never());

        let mut chunks = Vec::new();
        let mut on_chunk = |text: &str| chunks.push(text.to_string());
        let reply = chat
            .send_message(
                first_turn("What's a good lasagna recipe?"),
                &mut on_chunk,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(reply, prompts::rejection_message(Product::StratifyPm));
        assert!(chunks.len() > 1, "rejection is played back word by word");
        assert_eq!(provider.model_calls(), 0);
    }

    #[tokio::test]
    async fn test_follow_up_turns_skip_classification() {
        let config = test_config();
        let provider = FakeProvider::new(Some("no"), Reply::Text("Sure.".into()));
        let chat = service(&config, provider.clone(), FakeFetcher::never());

        let history = vec![Message::user("Plan Q3"), Message::assistant("Here is a plan.")];
        let request = SendRequest {
            message: "And what about lasagna?",
            provider: ProviderKind::Gemini,
            history: &history,
            files: &[],
        };
        let mut on_chunk = |_: &str| {};
        let reply = chat
            .send_message(request, &mut on_chunk, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reply, "Sure.");
        assert_eq!(provider.classifier_calls(), 0);
        assert_eq!(provider.last_request().history, history);
    }

    #[tokio::test]
    async fn test_file_analysis_bypasses_classifier_and_embeds_sample() {
        let config = test_config();
        let provider = FakeProvider::new(Some("no"), Reply::Text("Usage is up.".into()));
        let chat = service(&config, provider.clone(), FakeFetcher::never());

        let files = vec![UploadedFile {
            name: "usage.csv".into(),
            size: 42,
            file_type: "text/csv".into(),
            content: vec![serde_json::json!("week,active"), serde_json::json!("1,120")],
            processed: true,
            insights: None,
        }];
        let request = SendRequest {
            message: "Please analyze the uploaded files.",
            provider: ProviderKind::Gemini,
            history: &[],
            files: &files,
        };
        let mut on_chunk = |_: &str| {};
        chat.send_message(request, &mut on_chunk, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(provider.classifier_calls(), 0);
        let prompt = provider.last_request().prompt;
        assert!(prompt.contains("File: usage.csv (text/csv, 2 rows)"));
        assert!(prompt.contains("1,120"));
    }

    #[tokio::test]
    async fn test_classifier_failure_follows_policy() {
        let config = test_config();
        let provider = FakeProvider::new(None, Reply::Text("Answer.".into()));
        let chat = service(&config, provider.clone(), FakeFetcher::never());
        let mut on_chunk = |_: &str| {};
        let reply = chat
            .send_message(first_turn("Draft a PRD"), &mut on_chunk, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply, "Answer.");

        let mut config = test_config();
        config.pipeline.classifier_policy = ClassifierPolicy::FailClosed;
        let provider = FakeProvider::new(None, Reply::Text("Answer.".into()));
        let chat = service(&config, provider.clone(), FakeFetcher::never());
        let reply = chat
            .send_message(first_turn("Draft a PRD"), &mut on_chunk, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply, prompts::rejection_message(Product::StratifyPm));
        assert_eq!(provider.model_calls(), 0);
    }

    #[tokio::test]
    async fn test_context_is_fetched_once_and_cached() {
        let config = test_config();
        let provider = FakeProvider::answering("Trends summary.");
        let fetcher = FakeFetcher::returning("Title: PM trends\nContent:\nAI copilots everywhere");
        let chat = service(&config, provider.clone(), fetcher.clone());
        let mut on_chunk = |_: &str| {};

        chat.send_message(
            first_turn("latest product management trends"),
            &mut on_chunk,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(provider
            .last_request()
            .prompt
            .contains("Current information from web search:\nTitle: PM trends"));

        chat.send_message(
            first_turn("which product management trends matter most"),
            &mut on_chunk,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(fetcher.search_calls(), 1);
        assert!(provider.last_request().prompt.contains("AI copilots everywhere"));

        chat.cache().clear();
        chat.send_message(
            first_turn("latest product management trends"),
            &mut on_chunk,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(fetcher.search_calls(), 2);
    }

    #[tokio::test]
    async fn test_search_failure_follows_policy() {
        let config = test_config();
        let provider = FakeProvider::answering("Best effort.");
        let chat = service(&config, provider.clone(), FakeFetcher::failing());
        let mut on_chunk = |_: &str| {};
        let reply = chat
            .send_message(
                first_turn("latest roadmap tools"),
                &mut on_chunk,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(reply, "Best effort.");
        assert_eq!(provider.last_request().prompt, "latest roadmap tools");
        assert!(chat.cache().entry().is_none());

        let mut config = test_config();
        config.pipeline.context_policy = ContextPolicy::FailHard;
        let provider = FakeProvider::answering("unused");
        let chat = service(&config, provider.clone(), FakeFetcher::failing());
        let err = chat
            .send_message(
                first_turn("latest roadmap tools"),
                &mut on_chunk,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::ContextUnavailable(_)));
        assert_eq!(provider.model_calls(), 0);
    }

    #[tokio::test]
    async fn test_provider_errors_propagate() {
        let config = test_config();
        let provider = FakeProvider::new(Some("yes"), Reply::Fail(|| LlmError::RateLimited));
        let chat = service(&config, provider, FakeFetcher::never());
        let mut on_chunk = |_: &str| {};
        let err = chat
            .send_message(
                first_turn("Write user stories"),
                &mut on_chunk,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::RateLimited));
    }

    #[tokio::test]
    async fn test_unconfigured_provider() {
        let config = test_config();
        let chat = service(&config, FakeProvider::answering("x"), FakeFetcher::never());
        let request = SendRequest {
            provider: ProviderKind::Claude,
            ..first_turn("Write user stories")
        };
        let mut on_chunk = |_: &str| {};
        let err = chat
            .send_message(request, &mut on_chunk, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::NotConfigured(ProviderKind::Claude)));
    }

    #[tokio::test]
    async fn test_cancelled_turn_never_calls_back() {
        let config = test_config();
        let provider = FakeProvider::answering("Never shown.");
        let chat = service(&config, provider.clone(), FakeFetcher::never());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut on_chunk = |_: &str| {
            panic!("chunk after abort");
        };
        let err = chat
            .send_message(first_turn("Plan Q3"), &mut on_chunk, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_aborted());
        assert_eq!(provider.classifier_calls(), 0);
    }
}
