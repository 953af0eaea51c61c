#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use polaris_config::{CharacterConfig, ServicesConfig};
    use polaris_core::{
        PolarisError, Result, Role, Task, TaskComment, ToolCall, ToolSpec, TranscriptSink,
        WorkspaceContext,
    };
    use polaris_llm::mock::{MockProvider, MockResponse};
    use polaris_llm::ModelHandle;
    use polaris_mcp::{ToolCatalog, ToolProvider};
    use polaris_runtime::{
        Character, FinishReason, LoopState, NoopObserver, StepLoop, credentials_for,
        initial_transcript, model_for,
    };
    use serde_json::{Value, json};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    // ── Fakes ──────────────────────────────────────────────────

    /// Echoes its arguments back and remembers call order.
    struct EchoProvider {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ToolProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        fn allow_list(&self) -> Option<&BTreeMap<String, bool>> {
            None
        }

        async fn list_tools(&self) -> Result<Vec<ToolSpec>> {
            Ok(["search", "read"]
                .iter()
                .map(|n| ToolSpec {
                    name: n.to_string(),
                    description: String::new(),
                    parameters: json!({"type": "object"}),
                })
                .collect())
        }

        async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
            self.calls.lock().push(name.to_string());
            Ok(json!([{"type": "text", "text": arguments.to_string()}]))
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        comments: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl TranscriptSink for RecordingSink {
        async fn post_comment(&self, _task: &Task, body: &str) -> Result<()> {
            self.comments.lock().push(body.to_string());
            if self.fail {
                return Err(PolarisError::Platform("HTTP 502".into()));
            }
            Ok(())
        }
    }

    fn tool_call(name: &str, n: usize) -> ToolCall {
        ToolCall {
            id: format!("call_{n}"),
            tool_name: name.into(),
            arguments: json!({"n": n}),
        }
    }

    fn task() -> Task {
        Task {
            owner: "acme".into(),
            repo: "widgets".into(),
            id: 7,
            title: "Flaky test".into(),
            content: "CI fails sometimes".into(),
            state: "open".into(),
            labels: vec!["triage".into()],
            comments: vec![TaskComment {
                author: "bob".into(),
                content: "Also on main".into(),
            }],
        }
    }

    fn model(mock: MockProvider) -> (ModelHandle, Arc<MockProvider>) {
        let mock = Arc::new(mock);
        let handle = ModelHandle::new(mock.clone(), "loop-model")
            .with_base_delay(Duration::from_millis(1));
        (handle, mock)
    }

    async fn catalog() -> (ToolCatalog, Arc<EchoProvider>) {
        let provider = Arc::new(EchoProvider {
            calls: Mutex::new(vec![]),
        });
        let dynamic: Vec<Arc<dyn ToolProvider>> = vec![provider.clone()];
        (ToolCatalog::build(&dynamic).await.unwrap(), provider)
    }

    fn sink_observer(sink: Arc<RecordingSink>) -> polaris_runtime::CommentObserver {
        polaris_runtime::CommentObserver::new(sink, task())
    }

    fn start() -> Vec<polaris_core::Message> {
        initial_transcript(
            &WorkspaceContext::default(),
            &task(),
            "be helpful",
            false,
            chrono::Utc::now(),
        )
    }

    // ── Step budget ────────────────────────────────────────────

    #[tokio::test]
    async fn test_step_budget_bounds_generations() {
        let mut mock = MockProvider::new("mock");
        for n in 0..5 {
            mock = mock.with_mock_response(MockResponse::tool_calls(vec![tool_call("search", n)]));
        }
        let (handle, mock) = model(mock);
        let (catalog, provider) = catalog().await;
        let sink = Arc::new(RecordingSink::default());

        let summary = StepLoop::new(handle)
            .with_max_steps(3)
            .run(start(), &catalog, &sink_observer(sink.clone()))
            .await
            .unwrap();

        assert_eq!(mock.call_count(), 3);
        assert_eq!(summary.steps.len(), 3);
        assert_eq!(summary.finish, FinishReason::StepLimit);
        assert_eq!(summary.state, LoopState::Done);
        // tools requested by the last generation still ran and were posted
        assert_eq!(provider.calls.lock().len(), 3);
        assert_eq!(summary.steps[2].outcomes.len(), 1);
        assert_eq!(sink.comments.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_zero_steps_means_one() {
        let (handle, mock) = model(
            MockProvider::new("mock")
                .with_mock_response(MockResponse::tool_calls(vec![tool_call("search", 0)]))
                .with_response("never reached"),
        );
        let (catalog, _provider) = catalog().await;
        let step_loop = StepLoop::new(handle).with_max_steps(0);
        assert_eq!(step_loop.max_steps(), 1);

        let summary = step_loop.run(start(), &catalog, &NoopObserver).await.unwrap();
        assert_eq!(mock.call_count(), 1);
        assert_eq!(summary.finish, FinishReason::StepLimit);
    }

    #[tokio::test]
    async fn test_stops_when_no_tools_requested() {
        let (handle, mock) = model(
            MockProvider::new("mock")
                .with_tool_call("search", json!({"q": "flaky"}))
                .with_response("Root cause is a race in the fixture."),
        );
        let (catalog, _provider) = catalog().await;
        let summary = StepLoop::new(handle)
            .with_max_steps(10)
            .run(start(), &catalog, &NoopObserver)
            .await
            .unwrap();

        assert_eq!(mock.call_count(), 2);
        assert_eq!(summary.finish, FinishReason::Completed);
        assert_eq!(summary.final_text(), "Root cause is a race in the fixture.");
    }

    // ── Tool execution ─────────────────────────────────────────

    #[tokio::test]
    async fn test_tools_run_in_request_order_and_feed_back() {
        let (handle, mock) = model(
            MockProvider::new("mock")
                .with_mock_response(MockResponse::tool_calls(vec![
                    tool_call("read", 1),
                    tool_call("search", 2),
                    tool_call("missing", 3),
                ]))
                .with_response("done"),
        );
        let (catalog, provider) = catalog().await;
        let summary = StepLoop::new(handle)
            .with_max_steps(2)
            .run(start(), &catalog, &NoopObserver)
            .await
            .unwrap();

        assert_eq!(*provider.calls.lock(), vec!["read", "search"]);
        let outcomes = &summary.steps[0].outcomes;
        assert_eq!(outcomes.len(), 3);
        assert!(!outcomes[0].is_error());
        assert!(outcomes[2].is_error());

        // the second generation sees the assistant turn and the tool results
        let recorded = mock.recorded_requests();
        let recorded = recorded.lock();
        let second = &recorded[1].messages;
        assert_eq!(second[second.len() - 2].role, Role::Assistant);
        assert_eq!(second[second.len() - 1].role, Role::Tool);
        assert_eq!(second[second.len() - 1].content.len(), 3);
        assert_eq!(recorded[0].tools.len(), 2);
    }

    // ── Failures ───────────────────────────────────────────────

    #[tokio::test]
    async fn test_sink_failure_does_not_stop_run() {
        let (handle, mock) = model(
            MockProvider::new("mock")
                .with_tool_call("search", json!({}))
                .with_response("finished"),
        );
        let (catalog, _provider) = catalog().await;
        let sink = Arc::new(RecordingSink {
            comments: Mutex::new(vec![]),
            fail: true,
        });
        let summary = StepLoop::new(handle)
            .with_max_steps(5)
            .run(start(), &catalog, &sink_observer(sink.clone()))
            .await
            .unwrap();

        assert_eq!(mock.call_count(), 2);
        assert_eq!(summary.finish, FinishReason::Completed);
        assert_eq!(sink.comments.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_generation_failure_fails_run() {
        let (handle, _mock) = model(MockProvider::new("mock").with_error("HTTP 401: unauthorized"));
        let (catalog, _provider) = catalog().await;
        let err = StepLoop::new(handle)
            .with_max_steps(3)
            .run(start(), &catalog, &NoopObserver)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "GenerationError");
    }

    // ── Character ──────────────────────────────────────────────

    fn character_config() -> CharacterConfig {
        let mut config = CharacterConfig {
            name: "triager".into(),
            labels: vec!["triage".into()],
            system_prompt: "You triage issues.".into(),
            ..Default::default()
        };
        config.llm.provider = "mock".into();
        config.llm.model = "mock-model".into();
        config.llm.max_steps = 2;
        config
    }

    #[test]
    fn test_matches_labels() {
        let sink = Arc::new(RecordingSink::default());
        let character = Character::from_config(
            character_config(),
            &ServicesConfig::default(),
            WorkspaceContext::default(),
            sink,
        )
        .unwrap();
        assert!(character.matches_labels(&["triage".into(), "bug".into()]));
        assert!(!character.matches_labels(&["bug".into()]));
    }

    #[tokio::test]
    async fn test_character_without_servers_posts_steps() {
        let (handle, _mock) = model(MockProvider::new("mock").with_response("Needs a repro."));
        let sink = Arc::new(RecordingSink::default());
        let mut character = Character::new(
            character_config(),
            WorkspaceContext::default(),
            handle,
            sink.clone(),
        );
        character.initialize().await.unwrap();
        assert!(character.catalog().is_empty());

        let summary = character.do_task(&task()).await.unwrap();
        assert_eq!(summary.final_text(), "Needs a repro.");
        assert_eq!(*sink.comments.lock(), vec!["[Polaris]\nNeeds a repro."]);

        // teardown already happened; finalizing again is harmless
        character.finalize().await.unwrap();
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        let mut config = character_config();
        config.llm.provider = "nope".into();
        let err = model_for(&config, &ServicesConfig::default()).unwrap_err();
        assert_eq!(err.to_string(), "config error: Invalid provider \"nope\"");
    }

    #[test]
    fn test_credentials_pick_the_provider_section() {
        let services = ServicesConfig {
            anthropic_api_key: Some("sk-ant".into()),
            openai_api_key: Some("sk-oai".into()),
            ..Default::default()
        };
        assert_eq!(
            credentials_for("anthropic", &services).api_key.as_deref(),
            Some("sk-ant")
        );
        assert!(credentials_for("mock", &services).api_key.is_none());
    }
}
