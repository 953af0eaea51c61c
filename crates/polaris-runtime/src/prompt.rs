use chrono::{DateTime, Utc};
use polaris_core::{Message, Task, WorkspaceContext};

/// Marks comments written for the runner's own bookkeeping.
pub const INTERNAL_MARKER: &str = "[INTERNAL]";

/// The transcript a run starts from: the system prompt with workspace
/// context, the task itself, then its comment thread in arrival order.
pub fn initial_transcript(
    context: &WorkspaceContext,
    task: &Task,
    system_prompt: &str,
    exclude_internal_comments: bool,
    now: DateTime<Utc>,
) -> Vec<Message> {
    let mut messages = Vec::with_capacity(task.comments.len() + 2);
    messages.push(Message::system(format!(
        "<context>{}</context>\n<character>{}</character>",
        context.prompt_context(task.id, now),
        system_prompt
    )));
    messages.push(Message::user(format!(
        "<title>{}</title><content>{}</content>",
        task.title, task.content
    )));
    messages.extend(
        task.comments
            .iter()
            .filter(|c| !(exclude_internal_comments && c.content.contains(INTERNAL_MARKER)))
            .map(|c| Message::user(c.content.clone())),
    );
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use polaris_core::{Role, TaskComment};
    use std::path::PathBuf;

    fn task() -> Task {
        Task {
            owner: "acme".into(),
            repo: "widgets".into(),
            id: 42,
            title: "Crash on start".into(),
            content: "It panics.".into(),
            state: "open".into(),
            labels: vec!["bug".into()],
            comments: vec![
                TaskComment {
                    author: "alice".into(),
                    content: "Seen on linux too".into(),
                },
                TaskComment {
                    author: "polaris".into(),
                    content: "[Polaris]\n[INTERNAL]Tool Call: ...".into(),
                },
            ],
        }
    }

    fn context() -> WorkspaceContext {
        WorkspaceContext {
            workspace: PathBuf::from("/work"),
            owner: "acme".into(),
            repo: "widgets".into(),
            branch: "main".into(),
        }
    }

    #[test]
    fn test_transcript_shape() {
        let now = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let messages = initial_transcript(&context(), &task(), "You triage bugs.", false, now);

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        let system = messages[0].text_content();
        assert!(system.starts_with("<context>{"));
        assert!(system.contains("\"ISSUE_ID\":42"));
        assert!(system.ends_with("</context>\n<character>You triage bugs.</character>"));

        assert_eq!(
            messages[1].text_content(),
            "<title>Crash on start</title><content>It panics.</content>"
        );
        assert_eq!(messages[2].text_content(), "Seen on linux too");
        assert!(messages[1..].iter().all(|m| m.role == Role::User));
    }

    #[test]
    fn test_internal_comments_kept_by_default() {
        let messages = initial_transcript(&context(), &task(), "", false, Utc::now());
        assert!(messages[3].text_content().contains(INTERNAL_MARKER));
    }

    #[test]
    fn test_internal_comments_filtered_on_opt_in() {
        let messages = initial_transcript(&context(), &task(), "", true, Utc::now());
        assert_eq!(messages.len(), 3);
        assert!(messages.iter().all(|m| !m.text_content().contains(INTERNAL_MARKER)));
    }
}
