use chrono::Utc;
use polaris_config::{CharacterConfig, ServicesConfig};
use polaris_core::{PolarisError, Result, Task, TranscriptSink, WorkspaceContext};
use polaris_llm::{Credentials, ModelHandle, select_provider};
use polaris_mcp::{McpHub, ToolCatalog};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::agent_loop::{RunSummary, StepLoop};
use crate::prompt::initial_transcript;
use crate::transcript::CommentObserver;

/// Provider credentials for `provider` out of the services section.
pub fn credentials_for(provider: &str, services: &ServicesConfig) -> Credentials {
    let (api_key, base_url) = match provider {
        "openai" => (&services.openai_api_key, &services.openai_base_url),
        "anthropic" => (&services.anthropic_api_key, &services.anthropic_base_url),
        "google" => (&services.google_api_key, &services.google_base_url),
        _ => return Credentials::default(),
    };
    Credentials {
        api_key: api_key.clone(),
        base_url: base_url.clone(),
    }
}

/// Build the model handle a character's `llm` section describes.
pub fn model_for(config: &CharacterConfig, services: &ServicesConfig) -> Result<ModelHandle> {
    let llm = &config.llm;
    let provider = select_provider(&llm.provider, credentials_for(&llm.provider, services))?;
    Ok(ModelHandle::new(provider, llm.model.clone())
        .with_max_retries(llm.max_retries)
        .with_timeout(Duration::from_secs(llm.request_timeout_secs)))
}

/// A configured persona: its model, its tool providers and where it reports.
///
/// Lifecycle per task is [`initialize`](Self::initialize), then
/// [`do_task`](Self::do_task), which always tears the providers down again.
pub struct Character {
    config: CharacterConfig,
    context: WorkspaceContext,
    model: ModelHandle,
    sink: Arc<dyn TranscriptSink>,
    hub: Option<McpHub>,
    catalog: ToolCatalog,
}

impl Character {
    pub fn new(
        config: CharacterConfig,
        context: WorkspaceContext,
        model: ModelHandle,
        sink: Arc<dyn TranscriptSink>,
    ) -> Self {
        Self {
            config,
            context,
            model,
            sink,
            hub: None,
            catalog: ToolCatalog::default(),
        }
    }

    /// Resolve the model from config and credentials.
    pub fn from_config(
        config: CharacterConfig,
        services: &ServicesConfig,
        context: WorkspaceContext,
        sink: Arc<dyn TranscriptSink>,
    ) -> Result<Self> {
        let model = model_for(&config, services)?;
        Ok(Self::new(config, context, model, sink))
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CharacterConfig {
        &self.config
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    /// True when the task carries any of the character's labels.
    pub fn matches_labels(&self, labels: &[String]) -> bool {
        self.config.matches_labels(labels)
    }

    /// Connect every configured provider and build the tool catalog.
    pub async fn initialize(&mut self) -> Result<()> {
        if self.hub.is_some() {
            return Ok(());
        }
        let mut hub = McpHub::connect_all(&self.config.mcp.servers, self.model.clone()).await?;
        match ToolCatalog::build(hub.providers()).await {
            Ok(catalog) => {
                info!(
                    character = %self.config.name,
                    providers = hub.len(),
                    tools = catalog.len(),
                    "character initialized"
                );
                self.catalog = catalog;
                self.hub = Some(hub);
                Ok(())
            }
            Err(e) => {
                if let Err(close_err) = hub.disconnect_all().await {
                    warn!(error = %close_err, "cleanup after failed tool listing was incomplete");
                }
                Err(e)
            }
        }
    }

    /// Disconnect every provider. Safe to call more than once.
    pub async fn finalize(&mut self) -> Result<()> {
        self.catalog = ToolCatalog::default();
        match self.hub.take() {
            Some(mut hub) => hub.disconnect_all().await,
            None => Ok(()),
        }
    }

    /// Work the task, posting one comment per step, then disconnect.
    pub async fn do_task(&mut self, task: &Task) -> Result<RunSummary> {
        let result = self.run_loop(task).await;
        let teardown = self.finalize().await;

        match (result, teardown) {
            (Ok(summary), Ok(())) => Ok(summary),
            (Ok(_), Err(teardown)) => Err(teardown),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(teardown)) => {
                error!(character = %self.config.name, error = %teardown, "teardown failed after run failure");
                Err(PolarisError::Other(anyhow::anyhow!(
                    "{e}; teardown also failed: {teardown}"
                )))
            }
        }
    }

    async fn run_loop(&self, task: &Task) -> Result<RunSummary> {
        let llm = &self.config.llm;
        info!(
            character = %self.config.name,
            task = task.id,
            repo = %format!("{}/{}", task.owner, task.repo),
            "working task"
        );

        let transcript = initial_transcript(
            &self.context,
            task,
            &self.config.system_prompt,
            self.config.exclude_internal_comments,
            Utc::now(),
        );
        let observer = CommentObserver::new(Arc::clone(&self.sink), task.clone());
        StepLoop::new(self.model.clone())
            .with_max_steps(llm.max_steps)
            .with_max_tokens(llm.max_tokens)
            .with_temperature(llm.temperature)
            .run(transcript, &self.catalog, &observer)
            .await
    }
}

impl std::fmt::Debug for Character {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Character")
            .field("name", &self.config.name)
            .field("model", &self.model)
            .field("connected", &self.hub.is_some())
            .finish()
    }
}
