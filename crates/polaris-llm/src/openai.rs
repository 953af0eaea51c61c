use async_trait::async_trait;
use polaris_core::{Message, MessageContent, PolarisError, Result, Role, ToolCall};
use serde_json::{Value, json};
use tracing::debug;

use crate::provider::*;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
/// Gemini's OpenAI-compatible surface.
pub const GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// OpenAI-compatible chat completions provider (OpenAI, Google, vLLM, etc.)
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    provider_name: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: OPENAI_BASE_URL.into(),
            provider_name: "openai".into(),
        }
    }

    /// Use a custom base URL under a different provider name.
    pub fn with_base_url(mut self, url: String, name: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self.provider_name = name;
        self
    }

    pub fn build_request_body(&self, request: &LlmRequest) -> Value {
        let mut messages = Vec::new();

        for msg in &request.messages {
            match msg.role {
                Role::System => {
                    messages.push(json!({ "role": "system", "content": msg.text_content() }));
                }
                Role::User => {
                    messages.push(json!({ "role": "user", "content": user_content(msg) }));
                }
                Role::Assistant => {
                    if msg.tool_calls.is_empty() {
                        messages.push(json!({
                            "role": "assistant",
                            "content": msg.text_content(),
                        }));
                    } else {
                        // Assistant message with tool calls must include the tool_calls array
                        let tc: Vec<Value> = msg
                            .tool_calls
                            .iter()
                            .map(|tc| {
                                json!({
                                    "id": tc.id,
                                    "type": "function",
                                    "function": {
                                        "name": tc.tool_name,
                                        "arguments": tc.arguments.to_string(),
                                    }
                                })
                            })
                            .collect();
                        let text = msg.text_content();
                        let content = if text.is_empty() { Value::Null } else { json!(text) };
                        messages.push(json!({
                            "role": "assistant",
                            "content": content,
                            "tool_calls": tc,
                        }));
                    }
                }
                Role::Tool => {
                    for block in &msg.content {
                        if let MessageContent::ToolResult {
                            tool_call_id,
                            content,
                            ..
                        } = block
                        {
                            messages.push(json!({
                                "role": "tool",
                                "tool_call_id": tool_call_id,
                                "content": content,
                            }));
                        }
                    }
                }
            }
        }

        let mut body = json!({
            "model": &request.model,
            "temperature": request.temperature,
            "messages": messages,
        });

        // Newer OpenAI models (o1, o3, gpt-5, …) require max_completion_tokens
        if uses_max_completion_tokens(&request.model) {
            body["max_completion_tokens"] = json!(request.max_tokens);
        } else {
            body["max_tokens"] = json!(request.max_tokens);
        }

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = json!(tools);
        }

        body
    }
}

/// Plain string for text-only messages, content parts when images are present.
fn user_content(msg: &Message) -> Value {
    let has_image = msg
        .content
        .iter()
        .any(|c| matches!(c, MessageContent::Image { .. }));
    if !has_image {
        return json!(msg.text_content());
    }
    let parts: Vec<Value> = msg
        .content
        .iter()
        .filter_map(|c| match c {
            MessageContent::Text { text } => Some(json!({ "type": "text", "text": text })),
            MessageContent::Image { data, media_type } => Some(json!({
                "type": "image_url",
                "image_url": { "url": format!("data:{media_type};base64,{data}") },
            })),
            MessageContent::ToolResult { .. } => None,
        })
        .collect();
    json!(parts)
}

/// Parse a chat completions response body.
pub fn parse_response(data: &Value) -> LlmResponse {
    let choice = &data["choices"][0];
    let content = choice["message"]["content"]
        .as_str()
        .unwrap_or("")
        .to_string();

    let tool_calls: Vec<ToolCall> = choice["message"]["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .filter_map(|c| {
                    Some(ToolCall {
                        id: c["id"].as_str()?.to_string(),
                        tool_name: c["function"]["name"].as_str()?.to_string(),
                        arguments: serde_json::from_str(
                            c["function"]["arguments"].as_str().unwrap_or("{}"),
                        )
                        .unwrap_or_else(|_| json!({})),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let has_tool_calls = !tool_calls.is_empty();
    let finish_reason = choice["finish_reason"].as_str().unwrap_or("");

    let usage_data = &data["usage"];
    let usage = Usage {
        input_tokens: usage_data["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        output_tokens: usage_data["completion_tokens"].as_u64().unwrap_or(0) as u32,
    };

    LlmResponse {
        message: Message::assistant(content, tool_calls),
        usage,
        has_tool_calls,
        stop_reason: match finish_reason {
            "length" => StopReason::MaxTokens,
            "content_filter" => StopReason::ContentFilter,
            _ if has_tool_calls => StopReason::ToolUse,
            _ => StopReason::EndTurn,
        },
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let body = self.build_request_body(request);
        debug!(provider = %self.provider_name, model = %request.model, "sending chat completion request");

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| PolarisError::LlmProvider(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(PolarisError::LlmProvider(format!("HTTP {status}: {text}")));
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| PolarisError::LlmProvider(e.to_string()))?;

        Ok(parse_response(&data))
    }
}

/// Returns true for models that require `max_completion_tokens` instead of `max_tokens`.
fn uses_max_completion_tokens(model: &str) -> bool {
    let m = model.to_lowercase();
    m.starts_with("o1")
        || m.starts_with("o3")
        || m.starts_with("o4")
        || m.contains("gpt-5")
        || m.contains("gpt5")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(messages: Vec<Message>) -> LlmRequest {
        LlmRequest {
            model: "gpt-4o".into(),
            messages,
            tools: vec![],
            max_tokens: 256,
            temperature: 0.0,
        }
    }

    #[test]
    fn test_body_keeps_system_messages_in_order() {
        let provider = OpenAiProvider::new("k".into());
        let body = provider.build_request_body(&request(vec![
            Message::system("ctx"),
            Message::user("hi"),
        ]));
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "ctx");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["max_tokens"], 256);
    }

    #[test]
    fn test_body_uses_max_completion_tokens_for_reasoning_models() {
        let provider = OpenAiProvider::new("k".into());
        let mut req = request(vec![Message::user("hi")]);
        req.model = "o3-mini".into();
        let body = provider.build_request_body(&req);
        assert_eq!(body["max_completion_tokens"], 256);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_body_serializes_tool_round_trip() {
        let provider = OpenAiProvider::new("k".into());
        let call = ToolCall {
            id: "c1".into(),
            tool_name: "search".into(),
            arguments: json!({"q": "x"}),
        };
        let outcome = polaris_core::ToolOutcome::success(&call, json!([]));
        let body = provider.build_request_body(&request(vec![
            Message::assistant("", vec![call]),
            Message::tool_results(&[outcome]),
        ]));
        assert_eq!(body["messages"][0]["content"], Value::Null);
        assert_eq!(body["messages"][0]["tool_calls"][0]["function"]["name"], "search");
        assert_eq!(body["messages"][1]["role"], "tool");
        assert_eq!(body["messages"][1]["tool_call_id"], "c1");
    }

    #[test]
    fn test_image_becomes_content_part() {
        let provider = OpenAiProvider::new("k".into());
        let mut msg = Message::user("look");
        msg.content.push(MessageContent::Image {
            data: "AAAA".into(),
            media_type: "image/png".into(),
        });
        let body = provider.build_request_body(&request(vec![msg]));
        let parts = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/png;base64,AAAA");
    }

    #[test]
    fn test_parse_response_with_tool_calls() {
        let data = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": "search", "arguments": "{\"q\":\"rust\"}" }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5 }
        });
        let resp = parse_response(&data);
        assert!(resp.has_tool_calls);
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
        assert_eq!(resp.message.tool_calls[0].arguments["q"], "rust");
        assert_eq!(resp.usage.total_tokens(), 15);
    }
}
