//! Rendering finished steps as task comments.

use async_trait::async_trait;
use polaris_core::{Result, Task, ToolCall, ToolOutcome, TranscriptSink};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

use crate::prompt::INTERNAL_MARKER;

/// Header of every comment the runner posts.
pub const COMMENT_HEADER: &str = "[Polaris]";

/// What one generation call produced and what its tool calls returned.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    /// Zero-based position in the run.
    pub index: usize,
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub outcomes: Vec<ToolOutcome>,
}

/// Notified after every step of the agent loop.
#[async_trait]
pub trait StepObserver: Send + Sync {
    async fn on_step(&self, step: &StepRecord) -> Result<()>;
}

/// Observer that ignores every step.
pub struct NoopObserver;

#[async_trait]
impl StepObserver for NoopObserver {
    async fn on_step(&self, _step: &StepRecord) -> Result<()> {
        Ok(())
    }
}

fn fenced(label: &str, body: &Value) -> String {
    let pretty = serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string());
    format!("{INTERNAL_MARKER}{label}:\n```json\n{pretty}\n```")
}

/// The comment body for one step, or `None` when the step produced nothing
/// worth posting.
pub fn render_step(step: &StepRecord) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    if !step.text.trim().is_empty() {
        parts.push(step.text.clone());
    }
    parts.extend(step.tool_calls.iter().map(|tc| {
        fenced(
            "Tool Call",
            &json!({ "toolName": tc.tool_name, "args": tc.arguments, "toolCallId": tc.id }),
        )
    }));
    parts.extend(step.outcomes.iter().map(|o| {
        fenced(
            "Tool Result",
            &json!({ "toolName": o.tool_name, "result": o.result_value(), "toolCallId": o.tool_call_id }),
        )
    }));

    if parts.is_empty() {
        return None;
    }
    Some(format!("{COMMENT_HEADER}\n{}", parts.join("\n\n")))
}

/// Posts each step as one comment on the task.
pub struct CommentObserver {
    sink: Arc<dyn TranscriptSink>,
    task: Task,
}

impl CommentObserver {
    pub fn new(sink: Arc<dyn TranscriptSink>, task: Task) -> Self {
        Self { sink, task }
    }
}

#[async_trait]
impl StepObserver for CommentObserver {
    async fn on_step(&self, step: &StepRecord) -> Result<()> {
        let Some(body) = render_step(step) else {
            debug!(step = step.index, "empty step, nothing to post");
            return Ok(());
        };
        self.sink.post_comment(&self.task, &body).await
    }
}
