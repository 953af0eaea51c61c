//! # polaris-runtime
//!
//! Runs a character against a task: builds the initial transcript, drives
//! the step-bounded agent loop over the aggregated tool catalog, and posts
//! each step back to the task as a comment.

pub mod agent_loop;
pub mod character;
pub mod prompt;
pub mod transcript;

pub use agent_loop::{FinishReason, LoopState, RunSummary, StepLoop};
pub use character::{Character, credentials_for, model_for};
pub use prompt::{INTERNAL_MARKER, initial_transcript};
pub use transcript::{
    COMMENT_HEADER, CommentObserver, NoopObserver, StepObserver, StepRecord, render_step,
};
