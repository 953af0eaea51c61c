use polaris_core::{PolarisError, Result};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, warn};

/// Why the runner was started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEvent {
    /// An issue was opened, edited or commented on.
    Issues {
        action: Option<String>,
        owner: String,
        repo: String,
        id: u64,
    },
    /// Periodic sweep over open issues labelled `schedule`.
    Schedule,
}

/// Label that opts an issue into scheduled runs.
pub const SCHEDULE_LABEL: &str = "schedule";

impl TriggerEvent {
    /// Read `GITHUB_EVENT_NAME` and the payload at `GITHUB_EVENT_PATH`.
    ///
    /// Unsupported events yield `Ok(None)`.
    pub fn from_env() -> Result<Option<Self>> {
        let name = std::env::var("GITHUB_EVENT_NAME")
            .ok()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| PolarisError::Config("GITHUB_EVENT_NAME is not set".into()))?;

        let payload = match std::env::var("GITHUB_EVENT_PATH") {
            Ok(path) if !path.is_empty() => read_payload(Path::new(&path))?,
            _ => Value::Null,
        };
        Self::from_payload(&name, &payload)
    }

    /// Interpret an event name and its JSON payload.
    pub fn from_payload(name: &str, payload: &Value) -> Result<Option<Self>> {
        match name {
            "issues" | "issue_comment" => {
                let field = |ptr: &str| {
                    payload.pointer(ptr).ok_or_else(|| {
                        PolarisError::Platform(format!("{name} event payload is missing {ptr}"))
                    })
                };
                let owner = field("/repository/owner/login")?
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                let repo = field("/repository/name")?
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                let id = field("/issue/number")?.as_u64().ok_or_else(|| {
                    PolarisError::Platform(format!("{name} event has a non-numeric issue number"))
                })?;
                let action = payload
                    .get("action")
                    .and_then(Value::as_str)
                    .map(String::from);
                debug!(event = name, owner = %owner, repo = %repo, id, "issue trigger");
                Ok(Some(Self::Issues {
                    action,
                    owner,
                    repo,
                    id,
                }))
            }
            "schedule" => Ok(Some(Self::Schedule)),
            other => {
                warn!(event = other, "unsupported trigger event");
                Ok(None)
            }
        }
    }
}

fn read_payload(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        PolarisError::Platform(format!("failed to read event payload {}: {e}", path.display()))
    })?;
    serde_json::from_str(&raw).map_err(|e| {
        PolarisError::Platform(format!("failed to parse event payload {}: {e}", path.display()))
    })
}
