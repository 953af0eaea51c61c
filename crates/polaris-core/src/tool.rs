use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::PolarisError;

/// Description of a tool the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Name exactly as the provider advertises it.
    pub name: String,
    /// Human-readable description for the model.
    #[serde(default)]
    pub description: String,
    /// JSON Schema of the arguments object.
    pub parameters: Value,
}

/// A request from the model to call a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub tool_name: String,
    pub arguments: Value,
}

/// What a tool invocation produced. Always present, even when the call failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub tool_call_id: String,
    pub tool_name: String,
    pub payload: OutcomePayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomePayload {
    /// Content blocks as returned by the provider.
    Success { content: Value },
    Error {
        message: String,
        kind: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw: Option<Value>,
    },
}

impl ToolOutcome {
    pub fn success(call: &ToolCall, content: Value) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.tool_name.clone(),
            payload: OutcomePayload::Success { content },
        }
    }

    /// Capture an error as an outcome so the model can react to it.
    pub fn failure(call: &ToolCall, err: &PolarisError) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.tool_name.clone(),
            payload: OutcomePayload::Error {
                message: err.to_string(),
                kind: err.kind().to_string(),
                raw: err.raw().cloned(),
            },
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.payload, OutcomePayload::Error { .. })
    }

    /// The value shown to the model and in transcripts.
    pub fn result_value(&self) -> Value {
        match &self.payload {
            OutcomePayload::Success { content } => content.clone(),
            OutcomePayload::Error { message, kind, raw } => {
                let mut error = json!({ "message": message, "name": kind });
                if let Some(raw) = raw {
                    error["raw"] = raw.clone();
                }
                json!({ "error": error })
            }
        }
    }

    /// Serialized result handed back to the model as the tool message body.
    pub fn model_content(&self) -> String {
        self.result_value().to_string()
    }
}
