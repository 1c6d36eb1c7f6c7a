//! Subprocess collaborator for `codex exec`.
//!
//! The orchestrator never touches processes directly: it hands a
//! [`SpawnRequest`] to a [`ProcessSpawner`] and pulls parsed JSON values out
//! of the returned [`EventCursor`]. Timeouts and cancellation live here.

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Inactivity timeout applied when a request does not set one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

#[derive(Error, Debug)]
pub enum SpawnError {
    #[error("failed to start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {detail}")]
    Exit {
        command: String,
        status: String,
        detail: String,
    },

    #[error("{command} produced no output for {}ms", .timeout.as_millis())]
    Timeout { command: String, timeout: Duration },

    #[error("query cancelled")]
    Cancelled,

    #[error("failed to read process output: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Scripted(String),
}

/// Everything needed to launch one subprocess
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub command: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Variables added to the inherited environment
    pub env: BTreeMap<String, String>,
    /// Variables removed from the inherited environment
    pub env_remove: Vec<String>,
    pub cancel: Option<CancellationToken>,
    /// Maximum silence between two output lines
    pub timeout: Duration,
}

impl SpawnRequest {
    pub fn new(command: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: BTreeMap::new(),
            env_remove: Vec::new(),
            cancel: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    fn command_name(&self) -> String {
        self.command.display().to_string()
    }
}

/// A lazy, ordered sequence of JSON events from one subprocess
#[async_trait]
pub trait EventCursor: Send {
    /// The next event, an error that ends the sequence, or `None` at the end
    async fn next_event(&mut self) -> Option<Result<Value, SpawnError>>;
}

/// Starts subprocesses. Spawning never fails up front; failures come out of
/// the cursor.
pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, request: SpawnRequest) -> Box<dyn EventCursor>;
}

/// Spawner backed by `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessSpawner;

impl SystemProcessSpawner {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessSpawner for SystemProcessSpawner {
    fn spawn(&self, request: SpawnRequest) -> Box<dyn EventCursor> {
        Box::new(ProcessCursor {
            state: CursorState::Pending(request),
        })
    }
}

enum CursorState {
    /// Not started until the first pull
    Pending(SpawnRequest),
    Running(Box<RunningProcess>),
    Finished,
}

struct ProcessCursor {
    state: CursorState,
}

#[async_trait]
impl EventCursor for ProcessCursor {
    async fn next_event(&mut self) -> Option<Result<Value, SpawnError>> {
        loop {
            match std::mem::replace(&mut self.state, CursorState::Finished) {
                CursorState::Finished => return None,
                CursorState::Pending(request) => match RunningProcess::start(request) {
                    Ok(running) => self.state = CursorState::Running(Box::new(running)),
                    Err(e) => return Some(Err(e)),
                },
                CursorState::Running(mut running) => {
                    return match running.read_event().await {
                        ReadOutcome::Event(value) => {
                            self.state = CursorState::Running(running);
                            Some(Ok(value))
                        }
                        ReadOutcome::Eof => running.finish().await.err().map(Err),
                        ReadOutcome::Failed(e) => {
                            running.kill().await;
                            Some(Err(e))
                        }
                    };
                }
            }
        }
    }
}

enum ReadOutcome {
    Event(Value),
    Eof,
    Failed(SpawnError),
}

struct RunningProcess {
    command: String,
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stderr_task: JoinHandle<Vec<u8>>,
    cancel: Option<CancellationToken>,
    timeout: Duration,
}

impl RunningProcess {
    fn start(request: SpawnRequest) -> Result<Self, SpawnError> {
        let command = request.command_name();
        if request.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            return Err(SpawnError::Cancelled);
        }

        let mut cmd = Command::new(&request.command);
        cmd.args(&request.args)
            .current_dir(&request.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for key in &request.env_remove {
            cmd.env_remove(key);
        }
        cmd.envs(&request.env);

        let mut child = cmd.spawn().map_err(|source| SpawnError::Spawn {
            command: command.clone(),
            source,
        })?;
        tracing::debug!(command = %command, pid = ?child.id(), "Spawned subprocess");

        let stdout = child.stdout.take().ok_or_else(|| {
            SpawnError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "missing stdout",
            ))
        })?;
        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_end(&mut buf).await;
            }
            buf
        });

        Ok(Self {
            command,
            child,
            lines: BufReader::new(stdout).lines(),
            stderr_task,
            cancel: request.cancel,
            timeout: request.timeout,
        })
    }

    async fn read_event(&mut self) -> ReadOutcome {
        loop {
            let line = tokio::select! {
                () = cancelled(self.cancel.as_ref()) => {
                    tracing::info!(command = %self.command, "Subprocess cancelled");
                    return ReadOutcome::Failed(SpawnError::Cancelled);
                }
                () = tokio::time::sleep(self.timeout) => {
                    return ReadOutcome::Failed(SpawnError::Timeout {
                        command: self.command.clone(),
                        timeout: self.timeout,
                    });
                }
                line = self.lines.next_line() => line,
            };

            match line {
                Ok(Some(line)) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Value>(trimmed) {
                        Ok(value) => return ReadOutcome::Event(value),
                        Err(_) => {
                            tracing::debug!(line = trimmed, "Skipping non-JSON output line");
                        }
                    }
                }
                Ok(None) => return ReadOutcome::Eof,
                Err(e) => return ReadOutcome::Failed(SpawnError::Io(e)),
            }
        }
    }

    /// Wait for exit after stdout closed; non-zero status is an error
    async fn finish(mut self: Box<Self>) -> Result<(), SpawnError> {
        let status = match tokio::time::timeout(self.timeout, self.child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                self.kill().await;
                return Err(SpawnError::Timeout {
                    command: self.command,
                    timeout: self.timeout,
                });
            }
        };

        let stderr = self.stderr_task.await.unwrap_or_default();
        if status.success() {
            tracing::debug!(command = %self.command, "Subprocess exited cleanly");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&stderr).trim().to_string();
        Err(SpawnError::Exit {
            command: self.command,
            status: status
                .code()
                .map_or_else(|| "a signal".to_string(), |c| format!("code {c}")),
            detail: if stderr.is_empty() {
                "no error output".to_string()
            } else {
                stderr
            },
        })
    }

    async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::debug!(command = %self.command, error = %e, "Failed to kill subprocess");
        }
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

/// One step of a scripted cursor
#[derive(Debug, Clone)]
pub enum MockEvent {
    Event(Value),
    /// End the sequence with this error
    Fail(String),
}

/// Mock spawner for testing: hands out scripted cursors in order and keeps
/// every request it receives
#[derive(Debug, Clone, Default)]
pub struct MockProcessSpawner {
    scripts: Arc<Mutex<VecDeque<Vec<MockEvent>>>>,
    requests: Arc<Mutex<Vec<SpawnRequest>>>,
}

impl MockProcessSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// A spawner whose first cursor yields `events` then ends cleanly
    pub fn with_events(events: Vec<Value>) -> Self {
        let mock = Self::new();
        mock.push_script(events.into_iter().map(MockEvent::Event).collect());
        mock
    }

    pub fn push_script(&self, script: Vec<MockEvent>) {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(script);
    }

    /// Requests received so far, oldest first
    pub fn requests(&self) -> Vec<SpawnRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn spawn_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ProcessSpawner for MockProcessSpawner {
    fn spawn(&self, request: SpawnRequest) -> Box<dyn EventCursor> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        let script = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_default();
        Box::new(MockCursor {
            events: script.into(),
        })
    }
}

struct MockCursor {
    events: VecDeque<MockEvent>,
}

#[async_trait]
impl EventCursor for MockCursor {
    async fn next_event(&mut self) -> Option<Result<Value, SpawnError>> {
        match self.events.pop_front()? {
            MockEvent::Event(value) => Some(Ok(value)),
            MockEvent::Fail(message) => {
                self.events.clear();
                Some(Err(SpawnError::Scripted(message)))
            }
        }
    }
}
