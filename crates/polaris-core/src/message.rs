use serde::{Deserialize, Serialize};

use crate::tool::{ToolCall, ToolOutcome};

/// A message in the agent transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<MessageContent>,
    /// Tool calls requested by the assistant in this message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single content block within a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        text: String,
    },
    Image {
        /// Base64-encoded image data.
        data: String,
        media_type: String,
    },
    ToolResult {
        tool_call_id: String,
        content: String,
        is_error: bool,
    },
}

impl Message {
    /// Create a simple text message.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![MessageContent::Text { text: text.into() }],
            tool_calls: vec![],
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::text(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    /// Assistant turn carrying the text and the tool calls it requested.
    pub fn assistant(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let text = text.into();
        let content = if text.is_empty() {
            vec![]
        } else {
            vec![MessageContent::Text { text }]
        };
        Self {
            role: Role::Assistant,
            content,
            tool_calls,
        }
    }

    /// Tool-role message holding one result block per outcome.
    pub fn tool_results(outcomes: &[ToolOutcome]) -> Self {
        Self {
            role: Role::Tool,
            content: outcomes
                .iter()
                .map(|o| MessageContent::ToolResult {
                    tool_call_id: o.tool_call_id.clone(),
                    content: o.model_content(),
                    is_error: o.is_error(),
                })
                .collect(),
            tool_calls: vec![],
        }
    }

    /// Extract all text content joined together.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                MessageContent::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_assistant_without_text_has_no_blocks() {
        let msg = Message::assistant("", vec![]);
        assert!(msg.content.is_empty());
        assert_eq!(msg.text_content(), "");
    }

    #[test]
    fn test_tool_results_one_block_per_outcome() {
        let call = ToolCall {
            id: "c1".into(),
            tool_name: "search".into(),
            arguments: json!({}),
        };
        let ok = ToolOutcome::success(&call, json!([{"type": "text", "text": "y"}]));
        let msg = Message::tool_results(&[ok]);
        assert_eq!(msg.role, Role::Tool);
        match &msg.content[0] {
            MessageContent::ToolResult {
                tool_call_id,
                content,
                is_error,
            } => {
                assert_eq!(tool_call_id, "c1");
                let parsed: serde_json::Value = serde_json::from_str(content).unwrap();
                assert_eq!(parsed, json!([{"type": "text", "text": "y"}]));
                assert!(!is_error);
            }
            other => panic!("unexpected block: {other:?}"),
        }
    }
}
