use async_trait::async_trait;
use polaris_core::{PolarisError, Result, Task, TaskComment, TaskSource, TranscriptSink};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Issues returned per scheduled sweep.
pub const LIST_PAGE_SIZE: u32 = 10;

/// GitHub REST client for issues and issue comments.
pub struct GitHubClient {
    client: Client,
    token: String,
    base_url: String,
}

// ── Wire types ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct IssueData {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: String,
    #[serde(default)]
    pub labels: Vec<LabelData>,
    /// Present when the "issue" is a pull request.
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum LabelData {
    Name(String),
    Object { name: Option<String> },
}

impl LabelData {
    fn into_name(self) -> String {
        match self {
            Self::Name(n) => n,
            Self::Object { name } => name.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CommentData {
    #[serde(default)]
    pub user: Option<UserData>,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserData {
    pub login: String,
}

/// Assemble a [`Task`] from an issue and its comments.
pub fn into_task(owner: &str, repo: &str, issue: IssueData, comments: Vec<CommentData>) -> Task {
    Task {
        owner: owner.to_string(),
        repo: repo.to_string(),
        id: issue.number,
        title: issue.title,
        content: issue.body.unwrap_or_default(),
        state: issue.state,
        labels: issue.labels.into_iter().map(LabelData::into_name).collect(),
        comments: comments
            .into_iter()
            .map(|c| TaskComment {
                author: c.user.map(|u| u.login).unwrap_or_else(|| "-".into()),
                content: c.body.unwrap_or_default(),
            })
            .collect(),
    }
}

impl GitHubClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            token: token.into(),
            base_url: GITHUB_API_URL.into(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Token from `GITHUB_TOKEN` (or the explicit override), API root from
    /// `GITHUB_API_URL` when set.
    pub fn from_env(token_override: Option<String>) -> Result<Self> {
        let token = token_override
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()))
            .ok_or_else(|| PolarisError::Config("GITHUB_TOKEN is not set".into()))?;
        let mut client = Self::new(token);
        if let Some(url) = std::env::var("GITHUB_API_URL").ok().filter(|u| !u.is_empty()) {
            client = client.with_base_url(url);
        }
        Ok(client)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.token)
            .header("accept", "application/vnd.github+json")
            .header("x-github-api-version", "2022-11-28")
            .header("user-agent", concat!("polaris/", env!("CARGO_PKG_VERSION")))
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let resp = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| PolarisError::Platform(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(PolarisError::Platform(format!("HTTP {status}: {text}")));
        }
        Ok(resp)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        self.send(builder)
            .await?
            .json()
            .await
            .map_err(|e| PolarisError::Platform(format!("invalid response body: {e}")))
    }

    async fn comments(&self, owner: &str, repo: &str, id: u64) -> Result<Vec<CommentData>> {
        self.get_json(
            self.client
                .get(self.url(&format!("/repos/{owner}/{repo}/issues/{id}/comments")))
                .query(&[("per_page", "100")]),
        )
        .await
    }
}

#[async_trait]
impl TaskSource for GitHubClient {
    async fn get_task(&self, owner: &str, repo: &str, id: u64) -> Result<Task> {
        debug!(owner, repo, id, "fetching issue");
        let issue: IssueData = self
            .get_json(
                self.client
                    .get(self.url(&format!("/repos/{owner}/{repo}/issues/{id}"))),
            )
            .await?;
        let comments = self.comments(owner, repo, id).await?;
        Ok(into_task(owner, repo, issue, comments))
    }

    async fn list_tasks(&self, owner: &str, repo: &str, labels: &[String]) -> Result<Vec<Task>> {
        let per_page = LIST_PAGE_SIZE.to_string();
        let labels = labels.join(",");
        let issues: Vec<IssueData> = self
            .get_json(
                self.client
                    .get(self.url(&format!("/repos/{owner}/{repo}/issues")))
                    .query(&[
                        ("labels", labels.as_str()),
                        ("state", "open"),
                        ("per_page", per_page.as_str()),
                    ]),
            )
            .await?;

        let mut tasks = Vec::with_capacity(issues.len());
        for issue in issues.into_iter().filter(|i| i.pull_request.is_none()) {
            let comments = self.comments(owner, repo, issue.number).await?;
            tasks.push(into_task(owner, repo, issue, comments));
        }
        info!(owner, repo, labels = %labels, count = tasks.len(), "listed issues");
        Ok(tasks)
    }
}

#[async_trait]
impl TranscriptSink for GitHubClient {
    async fn post_comment(&self, task: &Task, body: &str) -> Result<()> {
        let (owner, repo, id) = (&task.owner, &task.repo, task.id);
        self.send(
            self.client
                .post(self.url(&format!("/repos/{owner}/{repo}/issues/{id}/comments")))
                .json(&json!({ "body": body })),
        )
        .await?;
        debug!(owner = %owner, repo = %repo, id, bytes = body.len(), "posted comment");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_into_task_maps_issue_and_comments() {
        let issue: IssueData = serde_json::from_value(json!({
            "number": 3,
            "title": "Docs typo",
            "body": null,
            "state": "open",
            "labels": [{"name": "docs"}, "triage", {"name": null}]
        }))
        .unwrap();
        let comments: Vec<CommentData> = serde_json::from_value(json!([
            {"user": {"login": "alice"}, "body": "+1"},
            {"user": null, "body": null}
        ]))
        .unwrap();

        let task = into_task("acme", "widgets", issue, comments);
        assert_eq!(task.id, 3);
        assert_eq!(task.content, "");
        assert_eq!(task.labels, vec!["docs", "triage", ""]);
        assert_eq!(task.comments[0].author, "alice");
        assert_eq!(task.comments[1].author, "-");
        assert!(task.is_open());
    }

    #[test]
    fn test_pull_requests_are_flagged() {
        let issue: IssueData = serde_json::from_value(json!({
            "number": 9,
            "title": "PR",
            "state": "open",
            "pull_request": {"url": "https://example.com"}
        }))
        .unwrap();
        assert!(issue.pull_request.is_some());
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = GitHubClient::new("t").with_base_url("https://ghe.example.com/api/v3/");
        assert_eq!(
            client.url("/repos/a/b"),
            "https://ghe.example.com/api/v3/repos/a/b"
        );
    }
}
