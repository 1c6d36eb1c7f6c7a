//! Codex configuration file management.
//!
//! Codex keeps its settings in `config.toml`, either under the user's Codex
//! home (`~/.codex` or `$CODEX_HOME`) or in a project's `.codex/` directory.
//! This module reads and writes those files. Parsing goes through
//! `toml_edit`, after which the tree is narrowed to the subset codex-bridge
//! edits:
//!
//! - `key = value` with quoted strings, booleans, integers, floats and
//!   arrays of those
//! - `[a.b.c]` table headers and dotted keys
//!
//! Arrays of tables (`[[x]]`), inline tables, multi-line strings and
//! datetimes are rejected with [`ConfigError::Unsupported`] instead of being
//! mangled. Writing is done by hand; comments are not preserved.

mod document;
mod parser;
mod serializer;
mod store;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use document::{ConfigDocument, ConfigValue};
pub use parser::parse_document;
pub use serializer::{escape_string, format_value, serialize_document};
pub use store::{
    read_config, write_config, ConfigStore, McpServerEntry, MANAGED_SERVER_NAME,
    MCP_SERVERS_KEY, PROJECT_PATH_ENV,
};

/// Errors raised while reading, parsing or writing a Codex config file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("line {line}: {}", .source.message().trim())]
    Parse {
        line: usize,
        #[source]
        source: toml_edit::TomlError,
    },

    #[error("line {line}: {construct} is not supported")]
    Unsupported {
        line: usize,
        construct: &'static str,
    },

    #[error("`{key}` is a value, not a table")]
    NotATable { key: String },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
