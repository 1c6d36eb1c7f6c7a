//! Integration tests for the query pipeline
//!
//! The first half drives `QueryOrchestrator` through `MockProcessSpawner`,
//! checking the message stream a host would see. The second half (unix only)
//! runs real subprocesses: a generated shell script stands in for `codex`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use codex_bridge::codex::Detector;
use codex_bridge::config_store::ConfigStore;
use codex_bridge::env_vars::EnvSnapshot;
use codex_bridge::query::{
    ContentBlock, MockEvent, MockProcessSpawner, NormalizedMessage, QueryOrchestrator,
    QueryRequest, QuerySettings,
};
use futures_util::StreamExt;
use serde_json::{json, Value};
use tempfile::TempDir;

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Isolated home directory with an API key and no real Codex install
struct TestHome {
    dir: TempDir,
}

impl TestHome {
    fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::create_dir_all(dir.path().join(".codex")).unwrap();
        Self { dir }
    }

    fn env(&self) -> EnvSnapshot {
        EnvSnapshot {
            openai_api_key: Some("sk-integration".to_string()),
            codex_home: Some(self.dir.path().join(".codex")),
            home_dir: Some(self.dir.path().to_path_buf()),
            path: Some(self.dir.path().join("empty-bin").into_os_string()),
            ..Default::default()
        }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn orchestrator(&self, spawner: &MockProcessSpawner) -> QueryOrchestrator {
        self.orchestrator_with(Arc::new(spawner.clone()), QuerySettings::default())
    }

    fn orchestrator_with(
        &self,
        spawner: Arc<dyn codex_bridge::query::ProcessSpawner>,
        settings: QuerySettings,
    ) -> QueryOrchestrator {
        let env = self.env();
        QueryOrchestrator::new(
            Detector::new(env.clone()),
            ConfigStore::from_env(&env),
            spawner,
            settings,
        )
    }
}

fn agent_text(text: &str) -> Value {
    json!({"type": "item.completed", "item": {"type": "agent_message", "content": text}})
}

fn text_block(msg: &NormalizedMessage) -> Option<&str> {
    match msg {
        NormalizedMessage::Assistant { message } => match message.content.first() {
            Some(ContentBlock::Text { text }) => Some(text),
            _ => None,
        },
        _ => None,
    }
}

// ─── Stream contract ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_agent_message_then_trailing_result() {
    let home = TestHome::new();
    let spawner = MockProcessSpawner::with_events(vec![agent_text("Response")]);

    let messages = home
        .orchestrator(&spawner)
        .query(QueryRequest::new("hi", home.path()))
        .await
        .collect_all()
        .await;

    assert_eq!(messages.len(), 2);
    assert_eq!(text_block(&messages[0]), Some("Response"));
    assert!(messages[1].is_success());
}

#[tokio::test]
async fn test_message_item_then_result() {
    let home = TestHome::new();
    let spawner = MockProcessSpawner::with_events(vec![
        json!({"type": "thread.started"}),
        json!({"type": "item.completed", "item": {"type": "message", "content": "Response"}}),
    ]);

    let messages = home
        .orchestrator(&spawner)
        .query(QueryRequest::new("hi", home.path()))
        .await
        .collect_all()
        .await;

    assert_eq!(
        messages,
        vec![
            NormalizedMessage::assistant(ContentBlock::text("Response")),
            NormalizedMessage::success(),
        ]
    );
}

#[tokio::test]
async fn test_immediate_failure_is_the_only_message() {
    let home = TestHome::new();
    let spawner = MockProcessSpawner::new();
    spawner.push_script(vec![MockEvent::Fail("spawn failed".to_string())]);

    let messages = home
        .orchestrator(&spawner)
        .query(QueryRequest::new("hi", home.path()))
        .await
        .collect_all()
        .await;

    assert_eq!(messages, vec![NormalizedMessage::error("spawn failed")]);
}

#[tokio::test]
async fn test_thread_completed_yields_two_results() {
    let home = TestHome::new();
    let spawner = MockProcessSpawner::with_events(vec![json!({"type": "thread.completed"})]);

    let messages = home
        .orchestrator(&spawner)
        .query(QueryRequest::new("hi", home.path()))
        .await
        .collect_all()
        .await;

    assert_eq!(
        messages,
        vec![NormalizedMessage::success(), NormalizedMessage::success()]
    );
}

#[tokio::test]
async fn test_typical_run_preserves_order() {
    let home = TestHome::new();
    let spawner = MockProcessSpawner::with_events(vec![
        json!({"type": "thread.started", "thread_id": "t-1"}),
        json!({"type": "turn.started"}),
        json!({"type": "item.completed", "item": {"type": "reasoning", "text": "Looking around"}}),
        json!({"type": "item.started", "item": {"type": "command_execution", "command": "ls"}}),
        json!({"type": "item.completed", "item": {
            "type": "command_execution", "command": "ls", "aggregated_output": "Cargo.toml\n"
        }}),
        agent_text("Found Cargo.toml"),
        json!({"type": "turn.completed", "usage": {"input_tokens": 10, "output_tokens": 5}}),
    ]);

    let messages = home
        .orchestrator(&spawner)
        .query(QueryRequest::new("what is here?", home.path()))
        .await
        .collect_all()
        .await;

    assert_eq!(messages.len(), 5);
    assert!(matches!(
        &messages[0],
        NormalizedMessage::Assistant { message }
            if matches!(&message.content[0], ContentBlock::Thinking { thinking } if thinking == "Looking around")
    ));
    assert!(matches!(
        &messages[1],
        NormalizedMessage::Assistant { message }
            if matches!(&message.content[0], ContentBlock::ToolUse { name, .. } if name == "Bash")
    ));
    assert_eq!(text_block(&messages[2]), Some("```bash\n$ ls\nCargo.toml\n```"));
    assert_eq!(text_block(&messages[3]), Some("Found Cargo.toml"));
    assert!(messages[4].is_success());
}

#[tokio::test]
async fn test_failure_mid_stream() {
    let home = TestHome::new();
    let spawner = MockProcessSpawner::new();
    spawner.push_script(vec![
        MockEvent::Event(agent_text("partial")),
        MockEvent::Fail("codex exited with code 1: model overloaded".to_string()),
    ]);

    let messages = home
        .orchestrator(&spawner)
        .query(QueryRequest::new("hi", home.path()))
        .await
        .collect_all()
        .await;

    assert_eq!(messages.len(), 2);
    assert_eq!(text_block(&messages[0]), Some("partial"));
    assert_eq!(
        messages[1],
        NormalizedMessage::error("codex exited with code 1: model overloaded")
    );
}

#[tokio::test]
async fn test_into_stream_matches_pull_api() {
    let home = TestHome::new();
    let spawner = MockProcessSpawner::with_events(vec![agent_text("a"), agent_text("b")]);

    let messages: Vec<NormalizedMessage> = home
        .orchestrator(&spawner)
        .query(QueryRequest::new("hi", home.path()))
        .await
        .into_stream()
        .collect()
        .await;

    let texts: Vec<_> = messages.iter().filter_map(text_block).collect();
    assert_eq!(texts, vec!["a", "b"]);
    assert!(messages.last().unwrap().is_success());
}

#[tokio::test]
async fn test_history_reaches_the_prompt_argument() {
    let home = TestHome::new();
    let spawner = MockProcessSpawner::new();

    let request = QueryRequest::new("and then?", home.path()).with_history(vec![
        codex_bridge::query::HistoryTurn {
            role: codex_bridge::query::Role::User,
            content: "first question".to_string(),
        },
    ]);
    home.orchestrator(&spawner)
        .query(request)
        .await
        .collect_all()
        .await;

    let prompt = spawner.requests()[0].args.last().cloned().unwrap();
    assert!(prompt.contains("User: first question"));
    assert!(prompt.ends_with("Current request:\nand then?"));
}

#[tokio::test]
async fn test_managed_server_registered_in_project_config() {
    let home = TestHome::new();
    let project = TempDir::new().unwrap();
    std::fs::create_dir_all(project.path().join(".codex")).unwrap();
    std::fs::write(project.path().join(".codex").join("config.toml"), "").unwrap();

    let spawner = MockProcessSpawner::new();
    let orchestrator = home.orchestrator_with(
        Arc::new(spawner.clone()),
        QuerySettings {
            managed_server_path: Some(PathBuf::from("/opt/codex-bridge/mcp-server.js")),
            ..Default::default()
        },
    );
    orchestrator
        .query(QueryRequest::new("hi", project.path()))
        .await
        .collect_all()
        .await;

    let servers = orchestrator
        .config_store()
        .list_mcp_servers(Some(project.path()))
        .unwrap();
    let entry = &servers["codex-bridge"];
    assert_eq!(entry.args, vec!["/opt/codex-bridge/mcp-server.js"]);
    assert_eq!(spawner.spawn_count(), 1);
}

// ─── Real subprocesses ───────────────────────────────────────────────────────

#[cfg(unix)]
mod subprocess {
    use super::*;
    use codex_bridge::query::SystemProcessSpawner;
    use std::os::unix::fs::PermissionsExt;
    use tokio_util::sync::CancellationToken;

    /// Write an executable `codex` stand-in and return its path
    fn fake_codex(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("codex");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn settings_for(executable: PathBuf) -> QuerySettings {
        QuerySettings {
            executable_path: Some(executable),
            timeout_ms: 5_000,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_script_output_is_streamed() {
        let home = TestHome::new();
        let bin = TempDir::new().unwrap();
        let codex = fake_codex(
            bin.path(),
            r#"echo '{"type":"thread.started","thread_id":"x"}'
echo ''
echo 'not json'
echo '{"type":"item.completed","item":{"type":"agent_message","content":"hello from script"}}'
echo '{"type":"thread.completed"}'"#,
        );

        let messages = home
            .orchestrator_with(Arc::new(SystemProcessSpawner::new()), settings_for(codex))
            .query(QueryRequest::new("hi", home.path()))
            .await
            .collect_all()
            .await;

        assert_eq!(messages.len(), 3);
        assert_eq!(text_block(&messages[0]), Some("hello from script"));
        assert!(messages[1].is_success());
        assert!(messages[2].is_success());
    }

    #[tokio::test]
    async fn test_arguments_and_api_key_reach_the_process() {
        let home = TestHome::new();
        let bin = TempDir::new().unwrap();
        let codex = fake_codex(
            bin.path(),
            r#"printf '{"type":"item.completed","item":{"type":"message","text":"%s|%s|%s"}}\n' "$1" "$5" "$OPENAI_API_KEY""#,
        );

        let messages = home
            .orchestrator_with(Arc::new(SystemProcessSpawner::new()), settings_for(codex))
            .query(QueryRequest::new("ping", home.path()))
            .await
            .collect_all()
            .await;

        assert_eq!(
            text_block(&messages[0]),
            Some("exec|--full-auto|sk-integration")
        );
    }

    #[tokio::test]
    async fn test_non_zero_exit_reports_stderr() {
        let home = TestHome::new();
        let bin = TempDir::new().unwrap();
        let codex = fake_codex(bin.path(), "echo 'unknown flag --full-auto' >&2\nexit 2");

        let messages = home
            .orchestrator_with(Arc::new(SystemProcessSpawner::new()), settings_for(codex))
            .query(QueryRequest::new("hi", home.path()))
            .await
            .collect_all()
            .await;

        assert_eq!(messages.len(), 1);
        let NormalizedMessage::Error { error } = &messages[0] else {
            panic!("expected error, got {:?}", messages[0]);
        };
        assert!(error.contains("code 2"), "{error}");
        assert!(error.contains("unknown flag --full-auto"), "{error}");
    }

    #[tokio::test]
    async fn test_silent_process_times_out() {
        let home = TestHome::new();
        let bin = TempDir::new().unwrap();
        let codex = fake_codex(bin.path(), "sleep 30");

        let request = QueryRequest::new("hi", home.path()).with_timeout_ms(200);
        let messages = home
            .orchestrator_with(Arc::new(SystemProcessSpawner::new()), settings_for(codex))
            .query(request)
            .await
            .collect_all()
            .await;

        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_error());
    }

    #[tokio::test]
    async fn test_cancellation_stops_the_stream() {
        let home = TestHome::new();
        let bin = TempDir::new().unwrap();
        let codex = fake_codex(
            bin.path(),
            r#"echo '{"type":"item.completed","item":{"type":"agent_message","content":"started"}}'
sleep 30"#,
        );

        let token = CancellationToken::new();
        let mut stream = home
            .orchestrator_with(Arc::new(SystemProcessSpawner::new()), settings_for(codex))
            .query(QueryRequest::new("hi", home.path()).with_abort_token(token.clone()))
            .await;

        let first = stream.next().await.unwrap();
        assert_eq!(text_block(&first), Some("started"));

        token.cancel();
        let next = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("cancellation should end the stream promptly");
        assert_eq!(next, Some(NormalizedMessage::error("query cancelled")));
        assert_eq!(stream.next().await, None);
    }
}
