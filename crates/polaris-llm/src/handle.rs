use polaris_core::{Message, PolarisError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::anthropic::AnthropicProvider;
use crate::mock::MockProvider;
use crate::openai::{GOOGLE_BASE_URL, OpenAiProvider};
use crate::provider::{LlmProvider, LlmRequest, LlmResponse};
use crate::retry::{RetryPolicy, complete_with_retry};

/// A provider bound to one model id: the callable shared by the agent loop
/// and every sampling relay of a run.
///
/// Cloning is cheap and clones share the provider.
#[derive(Clone)]
pub struct ModelHandle {
    provider: Arc<dyn LlmProvider>,
    model: String,
    policy: RetryPolicy,
}

impl ModelHandle {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.policy.max_retries = max_retries;
        self
    }

    /// Deadline per generation attempt. Zero disables it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.policy.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.policy.base_delay = delay;
        self
    }

    pub fn model_id(&self) -> &str {
        &self.model
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Start a request for this handle's model.
    pub fn request(&self, messages: Vec<Message>, max_tokens: u32, temperature: f32) -> LlmRequest {
        LlmRequest {
            model: self.model.clone(),
            messages,
            tools: vec![],
            max_tokens,
            temperature,
        }
    }

    /// Run one generation with the handle's retry budget and deadline.
    pub async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse> {
        debug!(
            provider = self.provider.name(),
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "generating"
        );
        complete_with_retry(&*self.provider, request, self.policy).await
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .finish()
    }
}

/// Credentials and endpoint override for one provider.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

/// Build the provider named in a character's `llm.provider`.
pub fn select_provider(name: &str, credentials: Credentials) -> Result<Arc<dyn LlmProvider>> {
    let require_key = |var: &str| {
        credentials
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| PolarisError::Config(format!("{var} is not set for provider \"{name}\"")))
    };

    let provider: Arc<dyn LlmProvider> = match name {
        "openai" => {
            let mut p = OpenAiProvider::new(require_key("OPENAI_API_KEY")?);
            if let Some(url) = credentials.base_url.clone() {
                p = p.with_base_url(url, "openai".into());
            }
            Arc::new(p)
        }
        "google" => {
            let url = credentials
                .base_url
                .clone()
                .unwrap_or_else(|| GOOGLE_BASE_URL.to_string());
            Arc::new(
                OpenAiProvider::new(require_key("GOOGLE_GENERATIVE_AI_API_KEY")?)
                    .with_base_url(url, "google".into()),
            )
        }
        "anthropic" => {
            let mut p = AnthropicProvider::new(require_key("ANTHROPIC_API_KEY")?);
            if let Some(url) = credentials.base_url.clone() {
                p = p.with_base_url(url);
            }
            Arc::new(p)
        }
        "mock" => Arc::new(MockProvider::new("mock")),
        other => {
            return Err(PolarisError::Config(format!("Invalid provider \"{other}\"")));
        }
    };
    Ok(provider)
}
