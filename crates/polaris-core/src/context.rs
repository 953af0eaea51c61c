use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Value, json};
use std::path::PathBuf;

/// Identity of the checkout the runner operates on.
///
/// Built once at the entry point and threaded into prompt construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceContext {
    pub workspace: PathBuf,
    pub owner: String,
    pub repo: String,
    pub branch: String,
}

impl WorkspaceContext {
    /// Read `GITHUB_WORKSPACE`, `GITHUB_REPOSITORY` and `BRANCH`.
    ///
    /// The workspace falls back to the current directory.
    pub fn from_env() -> Self {
        let workspace = std::env::var("GITHUB_WORKSPACE")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        let (owner, repo) = std::env::var("GITHUB_REPOSITORY")
            .ok()
            .map(|r| split_repository(&r))
            .unwrap_or_default();

        Self {
            workspace,
            owner,
            repo,
            branch: std::env::var("BRANCH").unwrap_or_default(),
        }
    }

    /// The `<context>` object embedded in the system prompt.
    pub fn prompt_context(&self, issue_id: u64, now: DateTime<Utc>) -> Value {
        json!({
            "WORKSPACE": self.workspace.display().to_string(),
            "REPO": self.repo,
            "OWNER": self.owner,
            "CURRENT_BRANCH": self.branch,
            "ISSUE_ID": issue_id,
            "CURRENT_TIME": now.to_rfc3339_opts(SecondsFormat::Millis, true),
        })
    }
}

/// Split `owner/repo`; missing parts become empty strings.
pub fn split_repository(full: &str) -> (String, String) {
    let mut parts = full.splitn(2, '/');
    let owner = parts.next().unwrap_or_default().to_string();
    let repo = parts.next().unwrap_or_default().to_string();
    (owner, repo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_split_repository() {
        assert_eq!(split_repository("acme/widgets"), ("acme".into(), "widgets".into()));
        assert_eq!(split_repository("acme"), ("acme".into(), String::new()));
    }

    #[test]
    fn test_prompt_context_fields() {
        let ctx = WorkspaceContext {
            workspace: PathBuf::from("/work"),
            owner: "acme".into(),
            repo: "widgets".into(),
            branch: "main".into(),
        };
        let now = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let value = ctx.prompt_context(42, now);
        assert_eq!(value["ISSUE_ID"], 42);
        assert_eq!(value["CURRENT_BRANCH"], "main");
        assert_eq!(value["CURRENT_TIME"], "2025-01-02T03:04:05.000Z");
    }
}
