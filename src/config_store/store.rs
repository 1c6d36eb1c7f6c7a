//! Config file I/O and MCP server registration.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::document::{ConfigDocument, ConfigValue};
use super::parser::parse_document;
use super::serializer::serialize_document;
use super::ConfigError;
use crate::env_vars::EnvSnapshot;

/// Table holding MCP server entries, keyed by server name
pub const MCP_SERVERS_KEY: &str = "mcp_servers";

/// Name of the MCP server entry codex-bridge manages
pub const MANAGED_SERVER_NAME: &str = "codex-bridge";

/// Env var through which the managed server learns its project
pub const PROJECT_PATH_ENV: &str = "CODEX_BRIDGE_PROJECT_PATH";

const MANAGED_SERVER_COMMAND: &str = "node";
const MANAGED_STARTUP_TIMEOUT_SEC: u64 = 30;

const CONFIG_FILE_NAME: &str = "config.toml";
const PROJECT_CONFIG_DIR: &str = ".codex";

/// One `[mcp_servers.<name>]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerEntry {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_timeout_sec: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_timeout_sec: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled_tools: Option<Vec<String>>,
}

impl McpServerEntry {
    /// The entry codex-bridge registers for its own MCP server
    pub fn managed(project_path: &Path, server_path: &Path) -> Self {
        let mut env = BTreeMap::new();
        env.insert(
            PROJECT_PATH_ENV.to_string(),
            project_path.to_string_lossy().to_string(),
        );

        Self {
            command: MANAGED_SERVER_COMMAND.to_string(),
            args: vec![server_path.to_string_lossy().to_string()],
            env: Some(env),
            startup_timeout_sec: Some(MANAGED_STARTUP_TIMEOUT_SEC),
            tool_timeout_sec: None,
            enabled_tools: None,
        }
    }

    /// Convert to a table; `env` becomes the `[mcp_servers.<name>.env]` sub-table
    pub fn to_table(&self) -> ConfigDocument {
        let mut table = ConfigDocument::new();
        table.insert("command", self.command.as_str());
        table.insert("args", self.args.clone());
        if let Some(secs) = self.startup_timeout_sec {
            table.insert("startup_timeout_sec", clamp_to_i64(secs));
        }
        if let Some(secs) = self.tool_timeout_sec {
            table.insert("tool_timeout_sec", clamp_to_i64(secs));
        }
        if let Some(tools) = &self.enabled_tools {
            table.insert("enabled_tools", tools.clone());
        }
        if let Some(env) = &self.env {
            let mut env_table = ConfigDocument::new();
            for (k, v) in env {
                env_table.insert(k.as_str(), v.as_str());
            }
            table.insert("env", env_table);
        }
        table
    }

    /// Read an entry back; `None` when `command` is missing
    pub fn from_table(table: &ConfigDocument) -> Option<Self> {
        let command = table.get("command")?.as_str()?.to_string();

        let strings = |key: &str| -> Option<Vec<String>> {
            table.get(key).and_then(ConfigValue::as_array).map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
        };
        let seconds = |key: &str| -> Option<u64> {
            table
                .get(key)
                .and_then(ConfigValue::as_integer)
                .and_then(|i| u64::try_from(i).ok())
        };

        let env = table.table("env").map(|env| {
            env.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        });

        Some(Self {
            command,
            args: strings("args").unwrap_or_default(),
            env,
            startup_timeout_sec: seconds("startup_timeout_sec"),
            tool_timeout_sec: seconds("tool_timeout_sec"),
            enabled_tools: strings("enabled_tools"),
        })
    }
}

fn clamp_to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Read a config file; a missing file reads as an empty document
pub fn read_config(path: &Path) -> Result<ConfigDocument, ConfigError> {
    match fs::read_to_string(path) {
        Ok(text) => parse_document(&text),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(ConfigDocument::new()),
        Err(source) => Err(ConfigError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Replace a config file's contents with the serialized document
pub fn write_config(path: &Path, doc: &ConfigDocument) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
    }

    fs::write(path, serialize_document(doc)).map_err(write_err)
}

/// Resolves which Codex config file is in effect and edits it
#[derive(Debug, Clone)]
pub struct ConfigStore {
    codex_home: PathBuf,
}

impl ConfigStore {
    pub fn new(codex_home: impl Into<PathBuf>) -> Self {
        Self {
            codex_home: codex_home.into(),
        }
    }

    pub fn from_env(env: &EnvSnapshot) -> Self {
        Self::new(env.codex_home())
    }

    /// `<codex_home>/config.toml`
    pub fn user_config_path(&self) -> PathBuf {
        self.codex_home.join(CONFIG_FILE_NAME)
    }

    /// `<project>/.codex/config.toml`
    pub fn project_config_path(project_path: &Path) -> PathBuf {
        project_path.join(PROJECT_CONFIG_DIR).join(CONFIG_FILE_NAME)
    }

    /// Pick the project config when it exists, else the user config.
    ///
    /// Touches nothing on disk.
    pub fn locate_config_path(&self, project_path: Option<&Path>) -> PathBuf {
        if let Some(project) = project_path {
            let project_config = Self::project_config_path(project);
            if project_config.is_file() {
                return project_config;
            }
        }
        self.user_config_path()
    }

    /// Like [`Self::locate_config_path`], but creates the user config
    /// directory on first use.
    pub fn resolve_config_path(&self, project_path: Option<&Path>) -> Result<PathBuf, ConfigError> {
        let path = self.locate_config_path(project_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        Ok(path)
    }

    /// Register codex-bridge's own MCP server for `project_path`.
    ///
    /// Other entries are left as they are. Returns the file written.
    pub fn configure_mcp_server(
        &self,
        project_path: &Path,
        server_path: &Path,
    ) -> Result<PathBuf, ConfigError> {
        let mut servers = BTreeMap::new();
        servers.insert(
            MANAGED_SERVER_NAME.to_string(),
            McpServerEntry::managed(project_path, server_path),
        );
        self.upsert_mcp_servers(project_path, &servers)
    }

    /// Insert or replace MCP server entries in the config in effect for `project_path`
    pub fn upsert_mcp_servers(
        &self,
        project_path: &Path,
        servers: &BTreeMap<String, McpServerEntry>,
    ) -> Result<PathBuf, ConfigError> {
        let path = self.resolve_config_path(Some(project_path))?;
        let mut doc = read_config(&path)?;

        let table = doc
            .ensure_table(MCP_SERVERS_KEY)
            .ok_or_else(|| ConfigError::NotATable {
                key: MCP_SERVERS_KEY.to_string(),
            })?;
        for (name, entry) in servers {
            table.insert(name.as_str(), entry.to_table());
        }

        write_config(&path, &doc)?;
        tracing::info!(
            path = %path.display(),
            servers = ?servers.keys().collect::<Vec<_>>(),
            "Registered MCP servers"
        );
        Ok(path)
    }

    /// Remove the managed MCP server entry.
    ///
    /// Drops `mcp_servers` entirely once it is empty. Never fails: errors are
    /// logged and the call becomes a no-op.
    pub fn remove_mcp_server(&self, project_path: &Path) {
        if let Err(e) = self.try_remove_mcp_server(project_path) {
            tracing::warn!(
                project = %project_path.display(),
                error = %e,
                "Failed to remove MCP server entry"
            );
        }
    }

    fn try_remove_mcp_server(&self, project_path: &Path) -> Result<(), ConfigError> {
        let path = self.locate_config_path(Some(project_path));
        let mut doc = read_config(&path)?;

        let Some(servers) = doc.table_mut(MCP_SERVERS_KEY) else {
            return Ok(());
        };
        if servers.remove(MANAGED_SERVER_NAME).is_none() {
            return Ok(());
        }
        if servers.is_empty() {
            doc.remove(MCP_SERVERS_KEY);
        }

        write_config(&path, &doc)?;
        tracing::info!(path = %path.display(), "Removed MCP server entry");
        Ok(())
    }

    /// MCP server entries in the config in effect for `project_path`
    pub fn list_mcp_servers(
        &self,
        project_path: Option<&Path>,
    ) -> Result<BTreeMap<String, McpServerEntry>, ConfigError> {
        let path = self.locate_config_path(project_path);
        let doc = read_config(&path)?;

        Ok(doc
            .table(MCP_SERVERS_KEY)
            .map(|servers| {
                servers
                    .tables()
                    .filter_map(|(name, t)| {
                        McpServerEntry::from_table(t).map(|e| (name.clone(), e))
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}
