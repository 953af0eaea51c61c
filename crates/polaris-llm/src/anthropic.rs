use async_trait::async_trait;
use polaris_core::{Message, MessageContent, PolarisError, Result, Role, ToolCall};
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

use crate::provider::*;

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Anthropic Messages API provider.
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: ANTHROPIC_BASE_URL.into(),
        }
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn build_request_body(&self, request: &LlmRequest) -> Value {
        // System-role messages are lifted into the top-level "system" field
        let mut system_parts: Vec<String> = Vec::new();
        let mut messages = Vec::new();

        for msg in &request.messages {
            match msg.role {
                Role::System => system_parts.push(msg.text_content()),
                Role::User => {
                    messages.push(json!({ "role": "user", "content": user_blocks(msg) }));
                }
                Role::Assistant => {
                    if msg.tool_calls.is_empty() {
                        messages.push(json!({
                            "role": "assistant",
                            "content": msg.text_content(),
                        }));
                    } else {
                        let mut content_blocks: Vec<Value> = Vec::new();
                        let text = msg.text_content();
                        if !text.is_empty() {
                            content_blocks.push(json!({ "type": "text", "text": text }));
                        }
                        for tc in &msg.tool_calls {
                            content_blocks.push(json!({
                                "type": "tool_use",
                                "id": tc.id,
                                "name": tc.tool_name,
                                "input": tc.arguments,
                            }));
                        }
                        messages.push(json!({ "role": "assistant", "content": content_blocks }));
                    }
                }
                Role::Tool => {
                    // Tool results are sent as a user message with tool_result blocks
                    let content_blocks: Vec<Value> = msg
                        .content
                        .iter()
                        .filter_map(|block| match block {
                            MessageContent::ToolResult {
                                tool_call_id,
                                content,
                                is_error,
                            } => Some(json!({
                                "type": "tool_result",
                                "tool_use_id": tool_call_id,
                                "content": content,
                                "is_error": is_error,
                            })),
                            _ => None,
                        })
                        .collect();
                    if !content_blocks.is_empty() {
                        messages.push(json!({ "role": "user", "content": content_blocks }));
                    }
                }
            }
        }

        let mut body = json!({
            "model": &request.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": messages,
        });

        system_parts.retain(|s| !s.is_empty());
        if !system_parts.is_empty() {
            body["system"] = json!(system_parts.join("\n\n"));
        }

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
            body["tools"] = json!(tools);
        }

        body
    }
}

fn user_blocks(msg: &Message) -> Value {
    let blocks: Vec<Value> = msg
        .content
        .iter()
        .filter_map(|c| match c {
            MessageContent::Text { text } => Some(json!({ "type": "text", "text": text })),
            MessageContent::Image { data, media_type } => Some(json!({
                "type": "image",
                "source": { "type": "base64", "media_type": media_type, "data": data },
            })),
            MessageContent::ToolResult { .. } => None,
        })
        .collect();
    json!(blocks)
}

/// Parse a Messages API response body.
pub fn parse_response(data: &Value) -> LlmResponse {
    let blocks = data["content"].as_array().cloned().unwrap_or_default();

    let content_text = blocks
        .iter()
        .filter(|b| b["type"] == "text")
        .filter_map(|b| b["text"].as_str())
        .collect::<Vec<_>>()
        .join("");

    let tool_calls: Vec<ToolCall> = blocks
        .iter()
        .filter(|b| b["type"] == "tool_use")
        .map(|b| ToolCall {
            id: b["id"].as_str().unwrap_or("").to_string(),
            tool_name: b["name"].as_str().unwrap_or("").to_string(),
            arguments: b["input"].clone(),
        })
        .collect();

    let has_tool_calls = !tool_calls.is_empty();

    let stop_reason = match data["stop_reason"].as_str() {
        Some("tool_use") => StopReason::ToolUse,
        Some("max_tokens") => StopReason::MaxTokens,
        Some("stop_sequence") => StopReason::StopSequence,
        _ => StopReason::EndTurn,
    };

    let usage_data = &data["usage"];
    LlmResponse {
        message: Message::assistant(content_text, tool_calls),
        usage: Usage {
            input_tokens: usage_data["input_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: usage_data["output_tokens"].as_u64().unwrap_or(0) as u32,
        },
        has_tool_calls,
        stop_reason,
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let body = self.build_request_body(request);
        debug!(model = %request.model, "sending Anthropic API request");

        let resp = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| PolarisError::LlmProvider(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let text = resp.text().await.unwrap_or_default();
            if status.as_u16() == 429 {
                return Err(PolarisError::RateLimited {
                    retry_after_secs: retry_after.unwrap_or(30),
                });
            }
            return Err(PolarisError::LlmProvider(format!("HTTP {status}: {text}")));
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| PolarisError::LlmProvider(e.to_string()))?;

        Ok(parse_response(&data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(messages: Vec<Message>) -> LlmRequest {
        LlmRequest {
            model: "claude-sonnet-4-20250514".into(),
            messages,
            tools: vec![],
            max_tokens: 1024,
            temperature: 0.0,
        }
    }

    #[test]
    fn test_system_messages_lifted_to_top_level() {
        let provider = AnthropicProvider::new("k".into());
        let body = provider.build_request_body(&request(vec![
            Message::system("<context>{}</context>"),
            Message::user("<title>t</title>"),
        ]));
        assert_eq!(body["system"], "<context>{}</context>");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"][0]["text"], "<title>t</title>");
    }

    #[test]
    fn test_no_system_field_when_absent() {
        let provider = AnthropicProvider::new("k".into());
        let body = provider.build_request_body(&request(vec![Message::user("hi")]));
        assert!(body.get("system").is_none());
    }

    #[test]
    fn test_tool_results_become_user_blocks() {
        let provider = AnthropicProvider::new("k".into());
        let call = ToolCall {
            id: "toolu_1".into(),
            tool_name: "search".into(),
            arguments: json!({"q": "x"}),
        };
        let err = PolarisError::ToolNotFound("search".into());
        let outcome = polaris_core::ToolOutcome::failure(&call, &err);
        let body = provider.build_request_body(&request(vec![
            Message::assistant("thinking", vec![call]),
            Message::tool_results(&[outcome]),
        ]));
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages[0]["content"][1]["type"], "tool_use");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"][0]["tool_use_id"], "toolu_1");
        assert_eq!(messages[1]["content"][0]["is_error"], true);
    }

    #[test]
    fn test_parse_response() {
        let data = json!({
            "content": [
                { "type": "text", "text": "Looking. " },
                { "type": "tool_use", "id": "toolu_1", "name": "search", "input": {"q": "x"} }
            ],
            "stop_reason": "tool_use",
            "usage": { "input_tokens": 12, "output_tokens": 3 }
        });
        let resp = parse_response(&data);
        assert_eq!(resp.message.text_content(), "Looking. ");
        assert_eq!(resp.message.tool_calls[0].tool_name, "search");
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
    }
}
