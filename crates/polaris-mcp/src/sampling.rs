//! Answers provider-initiated `sampling/createMessage` requests with the
//! character's own model.

use polaris_core::{Message, MessageContent, Role};
use polaris_llm::{ModelHandle, StopReason};
use rmcp::ErrorData;
use rmcp::model::{
    Content, CreateMessageRequestParam, CreateMessageResult, RawContent, Role as McpRole,
    SamplingMessage,
};
use tracing::{debug, warn};

/// Forwards sampling requests to a shared [`ModelHandle`].
///
/// Holds no per-request state, so one relay can serve overlapping requests
/// while the agent loop is generating on the same handle.
#[derive(Debug, Clone)]
pub struct SamplingRelay {
    model: ModelHandle,
}

impl SamplingRelay {
    pub fn new(model: ModelHandle) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    /// Run one sampling request through the model.
    pub async fn relay(
        &self,
        params: CreateMessageRequestParam,
    ) -> Result<CreateMessageResult, ErrorData> {
        let mut messages = Vec::with_capacity(params.messages.len() + 1);
        if let Some(system) = params.system_prompt.as_deref().filter(|s| !s.is_empty()) {
            messages.push(Message::system(system));
        }
        messages.extend(translate_messages(&params.messages)?);

        debug!(
            model = self.model.model_id(),
            messages = messages.len(),
            max_tokens = params.max_tokens,
            "relaying sampling request"
        );

        let request = self.model.request(
            messages,
            params.max_tokens,
            params.temperature.unwrap_or(0.0),
        );
        let response = self.model.generate(&request).await.map_err(|e| {
            warn!(model = self.model.model_id(), error = %e, "sampling generation failed");
            ErrorData::internal_error(e.to_string(), None)
        })?;

        Ok(CreateMessageResult {
            model: self.model.model_id().to_string(),
            stop_reason: Some(stop_reason(response.stop_reason).to_string()),
            message: SamplingMessage {
                role: McpRole::Assistant,
                content: Content::text(response.message.text_content()),
            },
        })
    }
}

/// Map protocol sampling messages onto transcript messages.
pub fn translate_messages(messages: &[SamplingMessage]) -> Result<Vec<Message>, ErrorData> {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                McpRole::User => Role::User,
                McpRole::Assistant => Role::Assistant,
            };
            let block = match &m.content.raw {
                RawContent::Text(t) => MessageContent::Text {
                    text: t.text.clone(),
                },
                RawContent::Image(img) => MessageContent::Image {
                    data: img.data.clone(),
                    media_type: img.mime_type.clone(),
                },
                _ => {
                    return Err(ErrorData::invalid_params(
                        "unsupported sampling content, expected text or image",
                        None,
                    ));
                }
            };
            Ok(Message {
                role,
                content: vec![block],
                tool_calls: vec![],
            })
        })
        .collect()
}

fn stop_reason(reason: StopReason) -> &'static str {
    match reason {
        StopReason::MaxTokens => CreateMessageResult::STOP_REASON_END_MAX_TOKEN,
        StopReason::StopSequence => CreateMessageResult::STOP_REASON_END_SEQUENCE,
        StopReason::EndTurn | StopReason::ToolUse | StopReason::ContentFilter => {
            CreateMessageResult::STOP_REASON_END_TURN
        }
    }
}
