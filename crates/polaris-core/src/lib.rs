//! # polaris-core
//!
//! Core types, traits, and primitives for the Polaris agent runner.
//! Every other crate in the workspace speaks in terms of these: messages,
//! tool calls and outcomes, tasks, and the unified error type.

pub mod context;
pub mod error;
pub mod message;
pub mod task;
pub mod tool;

pub use context::WorkspaceContext;
pub use error::{PolarisError, Result};
pub use message::{Message, MessageContent, Role};
pub use task::{Task, TaskComment, TaskSource, TranscriptSink};
pub use tool::{OutcomePayload, ToolCall, ToolOutcome, ToolSpec};
