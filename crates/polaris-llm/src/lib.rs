//! # polaris-llm
//!
//! Abstraction layer over LLM providers. A [`ModelHandle`] binds a provider
//! to a model id and adds retry with backoff plus a per-call deadline.

pub mod anthropic;
pub mod handle;
pub mod mock;
pub mod openai;
pub mod provider;
pub mod retry;

pub use handle::{Credentials, ModelHandle, select_provider};
pub use mock::MockProvider;
pub use provider::{LlmProvider, LlmRequest, LlmResponse, StopReason, Usage};
pub use retry::RetryPolicy;
