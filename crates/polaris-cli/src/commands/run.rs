use polaris_config::{CharacterConfig, ConfigLoader, ServicesConfig};
use polaris_core::{PolarisError, Result, Task, TaskSource, TranscriptSink, WorkspaceContext};
use polaris_platform::{GitHubClient, SCHEDULE_LABEL, TriggerEvent};
use polaris_runtime::{Character, RunSummary};
use std::sync::Arc;
use tracing::{error, info, warn};

pub(super) async fn cmd_run(
    loader: &ConfigLoader,
    context: &WorkspaceContext,
    issue: Option<u64>,
) -> Result<()> {
    let config = loader.get();
    let characters = loader.load_characters()?;
    if characters.is_empty() {
        warn!(dir = %loader.characters_dir().display(), "no characters configured, nothing to do");
        return Ok(());
    }

    let event = match issue {
        Some(id) => Some(TriggerEvent::Issues {
            action: None,
            owner: context.owner.clone(),
            repo: context.repo.clone(),
            id,
        }),
        None => TriggerEvent::from_env()?,
    };
    let Some(event) = event else {
        warn!("unsupported event, nothing to do");
        return Ok(());
    };

    let github = Arc::new(GitHubClient::from_env(config.services.github_token.clone())?);
    let tasks = match event {
        TriggerEvent::Issues {
            owner, repo, id, ..
        } => vec![github.get_task(&owner, &repo, id).await?],
        TriggerEvent::Schedule => {
            github
                .list_tasks(&context.owner, &context.repo, &[SCHEDULE_LABEL.to_string()])
                .await?
        }
    };
    info!(tasks = tasks.len(), characters = characters.len(), "dispatching");

    let sink: Arc<dyn TranscriptSink> = github;
    let mut failures = 0usize;
    for task in &tasks {
        failures += dispatch(&characters, &config.services, context, &sink, task).await;
    }

    if failures > 0 {
        return Err(PolarisError::Other(anyhow::anyhow!(
            "{failures} character run(s) failed"
        )));
    }
    Ok(())
}

/// Run every matching character on `task`, one after another.
/// Returns the number of failed runs.
async fn dispatch(
    characters: &[CharacterConfig],
    services: &ServicesConfig,
    context: &WorkspaceContext,
    sink: &Arc<dyn TranscriptSink>,
    task: &Task,
) -> usize {
    if !task.is_open() {
        info!(task = task.id, state = %task.state, "task is not open, skipping");
        return 0;
    }

    let mut failures = 0;
    for config in characters {
        if !config.matches_labels(&task.labels) {
            continue;
        }
        match run_character(config, services, context, sink, task).await {
            Ok(summary) => info!(
                character = %config.name,
                task = task.id,
                steps = summary.steps.len(),
                finish = ?summary.finish,
                "character finished"
            ),
            Err(e) => {
                error!(character = %config.name, task = task.id, kind = e.kind(), error = %e, "character run failed");
                failures += 1;
            }
        }
    }
    failures
}

async fn run_character(
    config: &CharacterConfig,
    services: &ServicesConfig,
    context: &WorkspaceContext,
    sink: &Arc<dyn TranscriptSink>,
    task: &Task,
) -> Result<RunSummary> {
    let mut character =
        Character::from_config(config.clone(), services, context.clone(), Arc::clone(sink))?;
    character.initialize().await?;
    character.do_task(task).await
}
