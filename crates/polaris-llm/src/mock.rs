//! Mock LLM provider for deterministic testing and dry runs.
//!
//! Returns pre-configured responses without making any HTTP calls.

use async_trait::async_trait;
use parking_lot::Mutex;
use polaris_core::{Message, PolarisError, Result, ToolCall};
use std::collections::VecDeque;
use std::sync::Arc;

use crate::provider::*;

/// A mock LLM provider that returns pre-configured responses in order.
///
/// # Example
/// ```
/// use polaris_llm::mock::MockProvider;
/// let provider = MockProvider::new("test")
///     .with_response("Hello, world!");
/// ```
pub struct MockProvider {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    /// Every request received, for assertions in tests.
    requests: Arc<Mutex<Vec<LlmRequest>>>,
    name: String,
}

/// A pre-configured response from the mock provider.
#[derive(Clone)]
pub struct MockResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: StopReason,
    pub usage: Usage,
    /// If set, the provider returns this error instead.
    pub error: Option<String>,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            text: String::new(),
            tool_calls: vec![],
            stop_reason: StopReason::EndTurn,
            usage: Usage {
                input_tokens: 100,
                output_tokens: 50,
            },
            error: None,
        }
    }
}

impl MockResponse {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }

    pub fn error(msg: &str) -> Self {
        Self {
            error: Some(msg.to_string()),
            ..Default::default()
        }
    }

    /// A response requesting the given tool calls.
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            stop_reason: StopReason::ToolUse,
            ..Default::default()
        }
    }
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(vec![])),
            name: name.into(),
        }
    }

    /// Queue a simple text response.
    pub fn with_response(self, text: &str) -> Self {
        self.queue_response(MockResponse::text(text));
        self
    }

    /// Queue a response with a single tool call.
    pub fn with_tool_call(self, name: &str, args: serde_json::Value) -> Self {
        self.queue_response(MockResponse::tool_calls(vec![ToolCall {
            id: format!("call_{}", uuid::Uuid::new_v4()),
            tool_name: name.to_string(),
            arguments: args,
        }]));
        self
    }

    /// Queue an error response.
    pub fn with_error(self, error: &str) -> Self {
        self.queue_response(MockResponse::error(error));
        self
    }

    /// Queue a fully custom response.
    pub fn with_mock_response(self, resp: MockResponse) -> Self {
        self.queue_response(resp);
        self
    }

    pub fn queue_response(&self, resp: MockResponse) {
        self.responses.lock().push_back(resp);
    }

    /// Shared handle to the recorded requests.
    pub fn recorded_requests(&self) -> Arc<Mutex<Vec<LlmRequest>>> {
        Arc::clone(&self.requests)
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn next_response(&self) -> MockResponse {
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| MockResponse::text("(mock: no more queued responses)"))
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        self.requests.lock().push(request.clone());
        let mock = self.next_response();

        if let Some(error) = mock.error {
            return Err(PolarisError::LlmProvider(error));
        }

        let has_tool_calls = !mock.tool_calls.is_empty();
        Ok(LlmResponse {
            message: Message::assistant(mock.text, mock.tool_calls),
            usage: mock.usage,
            has_tool_calls,
            stop_reason: mock.stop_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req() -> LlmRequest {
        LlmRequest {
            model: "test".into(),
            messages: vec![],
            tools: vec![],
            max_tokens: 100,
            temperature: 0.7,
        }
    }

    #[tokio::test]
    async fn test_mock_text_response() {
        let provider = MockProvider::new("mock").with_response("Hello!");
        let resp = provider.complete(&req()).await.unwrap();
        assert_eq!(resp.message.text_content(), "Hello!");
        assert_eq!(resp.stop_reason, StopReason::EndTurn);
        assert!(!resp.has_tool_calls);
    }

    #[tokio::test]
    async fn test_mock_tool_call() {
        let provider = MockProvider::new("mock")
            .with_tool_call("search", serde_json::json!({"q": "rust"}));
        let resp = provider.complete(&req()).await.unwrap();
        assert!(resp.has_tool_calls);
        assert_eq!(resp.message.tool_calls[0].tool_name, "search");
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
    }

    #[tokio::test]
    async fn test_mock_error() {
        let provider = MockProvider::new("mock").with_error("HTTP 400: bad request");
        assert!(provider.complete(&req()).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_records_requests_and_drains_in_order() {
        let provider = MockProvider::new("mock")
            .with_response("first")
            .with_response("second");
        let r1 = provider.complete(&req()).await.unwrap();
        let r2 = provider.complete(&req()).await.unwrap();
        let r3 = provider.complete(&req()).await.unwrap();
        assert_eq!(r1.message.text_content(), "first");
        assert_eq!(r2.message.text_content(), "second");
        assert!(r3.message.text_content().contains("no more queued"));
        assert_eq!(provider.call_count(), 3);
    }
}
