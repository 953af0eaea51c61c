use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// An issue-like unit of work handed to a character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub owner: String,
    pub repo: String,
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub state: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub comments: Vec<TaskComment>,
}

/// One entry of the task's conversation thread, in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskComment {
    pub author: String,
    pub content: String,
}

impl Task {
    /// Platforms disagree on casing ("open" vs "OPEN").
    pub fn is_open(&self) -> bool {
        self.state.eq_ignore_ascii_case("open")
    }
}

/// Where tasks come from.
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// Fetch a single task with its comment thread.
    async fn get_task(&self, owner: &str, repo: &str, id: u64) -> Result<Task>;

    /// List open tasks carrying all of the given labels.
    async fn list_tasks(&self, owner: &str, repo: &str, labels: &[String]) -> Result<Vec<Task>>;
}

/// Where progress comments are posted.
#[async_trait]
pub trait TranscriptSink: Send + Sync {
    async fn post_comment(&self, task: &Task, body: &str) -> Result<()>;
}
