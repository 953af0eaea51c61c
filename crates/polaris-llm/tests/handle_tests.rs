#[cfg(test)]
mod tests {
    use polaris_core::{Message, PolarisError};
    use polaris_llm::mock::{MockProvider, MockResponse};
    use polaris_llm::retry::{MAX_DELAY, backoff_delay, is_retryable};
    use polaris_llm::{Credentials, ModelHandle, select_provider};
    use std::sync::Arc;
    use std::time::Duration;

    fn handle(mock: MockProvider) -> (ModelHandle, Arc<MockProvider>) {
        let mock = Arc::new(mock);
        let handle = ModelHandle::new(mock.clone(), "test-model")
            .with_base_delay(Duration::from_millis(1));
        (handle, mock)
    }

    // ── Request building ───────────────────────────────────────

    #[tokio::test]
    async fn test_request_uses_handle_model() {
        let (handle, mock) = handle(MockProvider::new("mock").with_response("hi"));
        let req = handle.request(vec![Message::user("Hello")], 128, 0.3);
        let resp = handle.generate(&req).await.unwrap();
        assert_eq!(resp.message.text_content(), "hi");

        let recorded = mock.recorded_requests();
        let recorded = recorded.lock();
        assert_eq!(recorded[0].model, "test-model");
        assert_eq!(recorded[0].max_tokens, 128);
        assert!(recorded[0].tools.is_empty());
    }

    // ── Retry logic ────────────────────────────────────────────

    #[tokio::test]
    async fn test_retry_on_transient_error() {
        let (handle, mock) = handle(
            MockProvider::new("mock")
                .with_error("HTTP 429: rate limited")
                .with_response("success after retry"),
        );
        let req = handle.request(vec![Message::user("x")], 10, 0.0);
        let resp = handle.generate(&req).await.unwrap();
        assert_eq!(resp.message.text_content(), "success after retry");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_no_retry_on_permanent_error() {
        let (handle, mock) = handle(
            MockProvider::new("mock")
                .with_error("HTTP 400: bad request")
                .with_response("never reached"),
        );
        let req = handle.request(vec![], 10, 0.0);
        assert!(handle.generate(&req).await.is_err());
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_retry_budget_is_respected() {
        let mock = MockProvider::new("mock");
        for _ in 0..5 {
            mock.queue_response(MockResponse::error("HTTP 503: unavailable"));
        }
        let (handle, mock) = handle(mock);
        let handle = handle.with_max_retries(2);
        let req = handle.request(vec![], 10, 0.0);
        let err = handle.generate(&req).await.unwrap_err();
        assert!(err.to_string().contains("503"));
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_zero_retries_means_single_attempt() {
        let (handle, mock) = handle(
            MockProvider::new("mock")
                .with_error("HTTP 500: oops")
                .with_response("late"),
        );
        let handle = handle.with_max_retries(0);
        let req = handle.request(vec![], 10, 0.0);
        assert!(handle.generate(&req).await.is_err());
        assert_eq!(mock.call_count(), 1);
    }

    #[test]
    fn test_is_retryable_classification() {
        assert!(is_retryable(&PolarisError::RateLimited { retry_after_secs: 1 }));
        assert!(is_retryable(&PolarisError::LlmProvider("HTTP 529: overloaded".into())));
        assert!(!is_retryable(&PolarisError::LlmProvider("HTTP 401: unauthorized".into())));
        assert!(!is_retryable(&PolarisError::Config("x".into())));
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(base, 0), Duration::from_secs(1));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(4));
        assert_eq!(backoff_delay(base, 6), MAX_DELAY);
        assert_eq!(backoff_delay(base, 32), MAX_DELAY);
        assert_eq!(backoff_delay(base, u32::MAX), MAX_DELAY);
    }

    // ── Provider selection ─────────────────────────────────────

    #[test]
    fn test_select_known_providers() {
        let creds = || Credentials {
            api_key: Some("key".into()),
            base_url: None,
        };
        assert_eq!(select_provider("openai", creds()).unwrap().name(), "openai");
        assert_eq!(select_provider("anthropic", creds()).unwrap().name(), "anthropic");
        assert_eq!(select_provider("google", creds()).unwrap().name(), "google");
        assert_eq!(select_provider("mock", Credentials::default()).unwrap().name(), "mock");
    }

    #[test]
    fn test_select_unknown_provider_fails() {
        let err = select_provider("cohere", Credentials::default()).err().unwrap();
        assert!(matches!(err, PolarisError::Config(_)));
        assert!(err.to_string().contains("Invalid provider"));
    }

    #[test]
    fn test_select_without_key_fails() {
        let err = select_provider("openai", Credentials::default()).err().unwrap();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }
}
