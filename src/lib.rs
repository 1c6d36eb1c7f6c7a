//! codex-bridge: run prompts through the OpenAI Codex CLI.
//!
//! - [`codex`] finds the `codex` binary and its credentials
//! - [`config_store`] edits the MCP server tables in Codex's `config.toml`
//! - [`query`] spawns `codex exec --json` and normalizes its event stream

pub mod codex;
pub mod config;
pub mod config_store;
pub mod env_vars;
pub mod logging;
pub mod query;
