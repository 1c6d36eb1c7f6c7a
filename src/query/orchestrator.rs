//! Query orchestration: preflight auth, spawn `codex exec`, stream messages.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::Stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::messages::{NormalizedMessage, QueryRequest};
use super::prompt::assemble_prompt;
use super::spawn::{EventCursor, ProcessSpawner, SpawnRequest, SystemProcessSpawner};
use super::translate::translate_event;
use crate::codex::{
    default_model, is_model_supported, AuthStatus, Detector, InstallationStatus, CODEX_BINARY,
};
use crate::config_store::ConfigStore;
use crate::env_vars::{EnvSnapshot, OPENAI_API_KEY};

/// Error emitted when no credential of any kind is available
pub const NOT_AUTHENTICATED_MESSAGE: &str =
    "Codex is not authenticated. Run `codex login` or set OPENAI_API_KEY.";

fn default_timeout_ms() -> u64 {
    30_000
}

/// Settings for running queries; the `[codex]` section of the app config
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuerySettings {
    /// Codex binary to run, ahead of `CODEX_PATH` and detection
    #[serde(default)]
    pub executable_path: Option<PathBuf>,
    #[serde(default)]
    pub default_model: Option<String>,
    /// Inactivity timeout for the subprocess
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// codex-bridge MCP server script; registered per project when set
    #[serde(default)]
    pub managed_server_path: Option<PathBuf>,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            executable_path: None,
            default_model: None,
            timeout_ms: default_timeout_ms(),
            managed_server_path: None,
        }
    }
}

/// Lifecycle of one query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryPhase {
    PreflightAuth,
    Spawning,
    Streaming,
    Done,
    Failed,
}

/// Runs queries through the Codex CLI
pub struct QueryOrchestrator {
    detector: Detector,
    config_store: ConfigStore,
    spawner: Arc<dyn ProcessSpawner>,
    settings: QuerySettings,
}

impl QueryOrchestrator {
    pub fn new(
        detector: Detector,
        config_store: ConfigStore,
        spawner: Arc<dyn ProcessSpawner>,
        settings: QuerySettings,
    ) -> Self {
        Self {
            detector,
            config_store,
            spawner,
            settings,
        }
    }

    /// Orchestrator for the current process environment with real subprocesses
    pub fn from_env(env: EnvSnapshot, settings: QuerySettings) -> Self {
        let config_store = ConfigStore::from_env(&env);
        Self::new(
            Detector::new(env),
            config_store,
            Arc::new(SystemProcessSpawner::new()),
            settings,
        )
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    pub fn config_store(&self) -> &ConfigStore {
        &self.config_store
    }

    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    /// Start a query. Never fails: problems arrive as an error message in
    /// the returned stream.
    pub async fn query(&self, request: QueryRequest) -> QueryStream {
        let query_id = Uuid::new_v4();

        let installation = self.detector.detect_installation().await;
        let auth = self.detector.check_auth_with(installation.installed);
        let command = self.resolve_executable(&installation);
        tracing::debug!(
            %query_id,
            command = %command.display(),
            method = ?auth.method,
            "Query preflight"
        );

        if !auth.authenticated && !auth.has_env_key {
            tracing::warn!(%query_id, "No Codex credentials found");
            return QueryStream::failed(query_id, NOT_AUTHENTICATED_MESSAGE);
        }

        self.register_mcp_servers(&request);

        let spawn_request = self.build_spawn_request(command, &request, &auth);
        tracing::info!(
            %query_id,
            cwd = %spawn_request.cwd.display(),
            model = spawn_request.args.get(2).map(String::as_str).unwrap_or_default(),
            "Starting Codex query"
        );
        let cursor = self.spawner.spawn(spawn_request);
        QueryStream::streaming(query_id, cursor)
    }

    /// Configured path, then `CODEX_PATH`, then the detected binary, then
    /// a bare `codex` left to the OS to resolve
    pub fn resolve_executable(&self, installation: &InstallationStatus) -> PathBuf {
        self.settings
            .executable_path
            .clone()
            .or_else(|| self.detector.env().codex_path.clone())
            .or_else(|| installation.path.clone())
            .unwrap_or_else(|| PathBuf::from(CODEX_BINARY))
    }

    fn build_spawn_request(
        &self,
        command: PathBuf,
        request: &QueryRequest,
        auth: &AuthStatus,
    ) -> SpawnRequest {
        let model = request
            .model
            .clone()
            .or_else(|| self.settings.default_model.clone())
            .unwrap_or_else(|| default_model().to_string());
        if !is_model_supported(&model) {
            tracing::warn!(
                model = %model,
                "Model is not in the supported list, passing it through"
            );
        }

        let mut env = BTreeMap::new();
        let mut env_remove = Vec::new();
        match self.detector.env().api_key() {
            Some(key) if !auth.method.is_cli_session() => {
                env.insert(OPENAI_API_KEY.to_string(), key.to_string());
            }
            _ => env_remove.push(OPENAI_API_KEY.to_string()),
        }

        SpawnRequest {
            command,
            args: vec![
                "exec".to_string(),
                "--model".to_string(),
                model,
                "--json".to_string(),
                "--full-auto".to_string(),
                assemble_prompt(request),
            ],
            cwd: request.cwd.clone(),
            env,
            env_remove,
            cancel: request.abort_token.clone(),
            timeout: Duration::from_millis(
                request.timeout_ms.unwrap_or(self.settings.timeout_ms),
            ),
        }
    }

    /// Advisory: a failed registration is logged and the query goes ahead
    fn register_mcp_servers(&self, request: &QueryRequest) {
        if !request.mcp_servers.is_empty() {
            if let Err(e) = self
                .config_store
                .upsert_mcp_servers(&request.cwd, &request.mcp_servers)
            {
                tracing::warn!(error = %e, "Failed to register MCP servers");
            }
        }

        if let Some(server_path) = &self.settings.managed_server_path {
            if let Err(e) = self
                .config_store
                .configure_mcp_server(&request.cwd, server_path)
            {
                tracing::warn!(error = %e, "Failed to register codex-bridge MCP server");
            }
        }
    }
}

/// The normalized output of one query, pulled one message at a time
pub struct QueryStream {
    query_id: Uuid,
    phase: QueryPhase,
    cursor: Option<Box<dyn EventCursor>>,
    pending_error: Option<String>,
}

impl QueryStream {
    fn streaming(query_id: Uuid, cursor: Box<dyn EventCursor>) -> Self {
        Self {
            query_id,
            phase: QueryPhase::Streaming,
            cursor: Some(cursor),
            pending_error: None,
        }
    }

    fn failed(query_id: Uuid, error: &str) -> Self {
        Self {
            query_id,
            phase: QueryPhase::Failed,
            cursor: None,
            pending_error: Some(error.to_string()),
        }
    }

    pub fn query_id(&self) -> Uuid {
        self.query_id
    }

    pub fn phase(&self) -> QueryPhase {
        self.phase
    }

    /// The next message, or `None` once the stream is over.
    ///
    /// A clean end of output always adds one final success result; an error
    /// from the subprocess becomes a single error message with nothing after.
    pub async fn next(&mut self) -> Option<NormalizedMessage> {
        if let Some(error) = self.pending_error.take() {
            return Some(NormalizedMessage::error(error));
        }

        let cursor = self.cursor.as_mut()?;
        loop {
            match cursor.next_event().await {
                Some(Ok(event)) => {
                    if let Some(message) = translate_event(&event) {
                        return Some(message);
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(query_id = %self.query_id, error = %e, "Codex query failed");
                    self.end(QueryPhase::Failed);
                    return Some(NormalizedMessage::error(e.to_string()));
                }
                None => {
                    tracing::info!(query_id = %self.query_id, "Codex query finished");
                    self.end(QueryPhase::Done);
                    return Some(NormalizedMessage::success());
                }
            }
        }
    }

    /// Drain the stream into a vector
    pub async fn collect_all(mut self) -> Vec<NormalizedMessage> {
        let mut messages = Vec::new();
        while let Some(message) = self.next().await {
            messages.push(message);
        }
        messages
    }

    pub fn into_stream(self) -> impl Stream<Item = NormalizedMessage> + Send {
        futures_util::stream::unfold(self, |mut stream| async move {
            stream.next().await.map(|message| (message, stream))
        })
    }

    fn end(&mut self, phase: QueryPhase) {
        self.phase = phase;
        self.cursor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::spawn::{MockEvent, MockProcessSpawner};
    use serde_json::json;
    use tempfile::TempDir;

    struct Fixture {
        _home: TempDir,
        env: EnvSnapshot,
    }

    fn fixture(api_key: Option<&str>, auth_json: Option<&str>) -> Fixture {
        let home = TempDir::new().unwrap();
        let codex_home = home.path().join(".codex");
        std::fs::create_dir_all(&codex_home).unwrap();
        if let Some(auth) = auth_json {
            std::fs::write(codex_home.join("auth.json"), auth).unwrap();
        }
        let env = EnvSnapshot {
            openai_api_key: api_key.map(str::to_string),
            codex_home: Some(codex_home),
            home_dir: Some(home.path().to_path_buf()),
            path: Some(home.path().join("bin").into_os_string()),
            ..Default::default()
        };
        Fixture { _home: home, env }
    }

    fn orchestrator(env: EnvSnapshot, spawner: &MockProcessSpawner) -> QueryOrchestrator {
        let store = ConfigStore::from_env(&env);
        QueryOrchestrator::new(
            Detector::new(env),
            store,
            Arc::new(spawner.clone()),
            QuerySettings::default(),
        )
    }

    #[tokio::test]
    async fn test_unauthenticated_query_fails_without_spawning() {
        let fx = fixture(None, None);
        let spawner = MockProcessSpawner::new();
        let orch = orchestrator(fx.env.clone(), &spawner);

        let mut stream = orch.query(QueryRequest::new("hi", "/work")).await;
        assert_eq!(stream.phase(), QueryPhase::Failed);
        assert_eq!(
            stream.next().await,
            Some(NormalizedMessage::error(NOT_AUTHENTICATED_MESSAGE))
        );
        assert_eq!(stream.next().await, None);
        assert_eq!(spawner.spawn_count(), 0);
    }

    #[tokio::test]
    async fn test_spawn_arguments() {
        let fx = fixture(Some("sk-test"), None);
        let spawner = MockProcessSpawner::new();
        let orch = orchestrator(fx.env.clone(), &spawner);

        let request = QueryRequest::new("List files", "/work").with_model("o3");
        orch.query(request).await.collect_all().await;

        let sent = &spawner.requests()[0];
        assert_eq!(sent.command, PathBuf::from("codex"));
        assert_eq!(
            sent.args,
            vec!["exec", "--model", "o3", "--json", "--full-auto", "List files"]
        );
        assert_eq!(sent.cwd, PathBuf::from("/work"));
        assert_eq!(sent.timeout, Duration::from_millis(30_000));
    }

    #[tokio::test]
    async fn test_default_model_and_timeout_override() {
        let fx = fixture(Some("sk-test"), None);
        let spawner = MockProcessSpawner::new();
        let orch = orchestrator(fx.env.clone(), &spawner);

        orch.query(QueryRequest::new("x", "/work").with_timeout_ms(5_000))
            .await
            .collect_all()
            .await;

        let sent = &spawner.requests()[0];
        assert_eq!(sent.args[2], default_model());
        assert_eq!(sent.timeout, Duration::from_millis(5_000));
    }

    #[tokio::test]
    async fn test_env_key_injected_for_key_auth() {
        let fx = fixture(Some("sk-env"), None);
        let spawner = MockProcessSpawner::new();
        let orch = orchestrator(fx.env.clone(), &spawner);

        orch.query(QueryRequest::new("x", "/work")).await.collect_all().await;

        let sent = &spawner.requests()[0];
        assert_eq!(sent.env.get(OPENAI_API_KEY).map(String::as_str), Some("sk-env"));
        assert!(sent.env_remove.is_empty());
    }

    #[tokio::test]
    async fn test_env_key_stripped_for_cli_session() {
        let fx = fixture(
            Some("sk-env"),
            Some(r#"{"tokens": {"access_token": "tok"}}"#),
        );
        let spawner = MockProcessSpawner::new();
        let orch = orchestrator(fx.env.clone(), &spawner);

        orch.query(QueryRequest::new("x", "/work")).await.collect_all().await;

        let sent = &spawner.requests()[0];
        assert!(sent.env.is_empty());
        assert_eq!(sent.env_remove, vec![OPENAI_API_KEY.to_string()]);
    }

    #[tokio::test]
    async fn test_cli_session_without_env_key_runs() {
        let fx = fixture(None, Some(r#"{"tokens": {"id_token": "tok"}}"#));
        let spawner = MockProcessSpawner::with_events(vec![json!({"type": "thread.completed"})]);
        let orch = orchestrator(fx.env.clone(), &spawner);

        let messages = orch.query(QueryRequest::new("x", "/work")).await.collect_all().await;
        assert_eq!(
            messages,
            vec![NormalizedMessage::success(), NormalizedMessage::success()]
        );
    }

    #[tokio::test]
    async fn test_executable_precedence() {
        let mut fx = fixture(Some("sk"), None);
        fx.env.codex_path = Some(PathBuf::from("/opt/codex/bin/codex"));
        let spawner = MockProcessSpawner::new();

        let orch = orchestrator(fx.env.clone(), &spawner);
        let detected = InstallationStatus {
            installed: true,
            path: Some(PathBuf::from("/usr/bin/codex")),
            ..Default::default()
        };
        assert_eq!(
            orch.resolve_executable(&detected),
            PathBuf::from("/opt/codex/bin/codex")
        );

        let configured = QueryOrchestrator::new(
            Detector::new(fx.env.clone()),
            ConfigStore::from_env(&fx.env),
            Arc::new(spawner),
            QuerySettings {
                executable_path: Some(PathBuf::from("/custom/codex")),
                ..Default::default()
            },
        );
        assert_eq!(
            configured.resolve_executable(&detected),
            PathBuf::from("/custom/codex")
        );

        fx.env.codex_path = None;
        let detected_only = orchestrator(fx.env.clone(), &MockProcessSpawner::new());
        assert_eq!(
            detected_only.resolve_executable(&detected),
            PathBuf::from("/usr/bin/codex")
        );
    }

    #[tokio::test]
    async fn test_error_event_does_not_halt_stream() {
        let fx = fixture(Some("sk"), None);
        let spawner = MockProcessSpawner::with_events(vec![
            json!({"type": "error", "message": "transient"}),
            json!({"type": "item.completed", "item": {"type": "agent_message", "text": "ok"}}),
        ]);
        let orch = orchestrator(fx.env.clone(), &spawner);

        let mut stream = orch.query(QueryRequest::new("x", "/work")).await;
        assert_eq!(stream.next().await, Some(NormalizedMessage::error("transient")));
        assert!(matches!(
            stream.next().await,
            Some(NormalizedMessage::Assistant { .. })
        ));
        assert_eq!(stream.next().await, Some(NormalizedMessage::success()));
        assert_eq!(stream.phase(), QueryPhase::Done);
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_cursor_failure_ends_without_result() {
        let fx = fixture(Some("sk"), None);
        let spawner = MockProcessSpawner::new();
        spawner.push_script(vec![
            MockEvent::Event(json!({"type": "turn.started"})),
            MockEvent::Fail("codex exited with code 1: boom".to_string()),
        ]);
        let orch = orchestrator(fx.env.clone(), &spawner);

        let mut stream = orch.query(QueryRequest::new("x", "/work")).await;
        assert_eq!(
            stream.next().await,
            Some(NormalizedMessage::error("codex exited with code 1: boom"))
        );
        assert_eq!(stream.phase(), QueryPhase::Failed);
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_abort_token_forwarded() {
        let fx = fixture(Some("sk"), None);
        let spawner = MockProcessSpawner::new();
        let orch = orchestrator(fx.env.clone(), &spawner);

        let token = tokio_util::sync::CancellationToken::new();
        orch.query(QueryRequest::new("x", "/work").with_abort_token(token.clone()))
            .await
            .collect_all()
            .await;

        let sent = &spawner.requests()[0];
        let forwarded = sent.cancel.as_ref().unwrap();
        token.cancel();
        assert!(forwarded.is_cancelled());
    }

    #[tokio::test]
    async fn test_request_mcp_servers_registered() {
        let fx = fixture(Some("sk"), None);
        let project = TempDir::new().unwrap();
        let spawner = MockProcessSpawner::new();
        let orch = orchestrator(fx.env.clone(), &spawner);

        let entry = crate::config_store::McpServerEntry {
            command: "npx".to_string(),
            args: vec!["docs-mcp".to_string()],
            env: None,
            startup_timeout_sec: None,
            tool_timeout_sec: None,
            enabled_tools: None,
        };
        orch.query(QueryRequest::new("x", project.path()).with_mcp_server("docs", entry.clone()))
            .await
            .collect_all()
            .await;

        let servers = orch.config_store().list_mcp_servers(None).unwrap();
        assert_eq!(servers.get("docs"), Some(&entry));
    }
}
