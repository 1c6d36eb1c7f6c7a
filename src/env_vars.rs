//! Centralized environment variable registry.
//!
//! This module is the single place where codex-bridge reads the process
//! environment. Everything else receives an [`EnvSnapshot`] captured once at
//! startup, which keeps detection and query code deterministic under test.
//!
//! Bridge settings use the `CODEX_BRIDGE_` prefix with `__` separator for
//! nested config paths (e.g., `CODEX_BRIDGE_CODEX__TIMEOUT_MS`). The Codex
//! variables keep the names the Codex CLI itself understands.

use std::ffi::OsString;
use std::path::PathBuf;

/// API key consumed by the Codex CLI
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";

/// Explicit path to the `codex` executable
pub const CODEX_PATH: &str = "CODEX_PATH";

/// Override for the Codex config directory (defaults to `~/.codex`)
pub const CODEX_HOME: &str = "CODEX_HOME";

/// An environment variable definition
#[derive(Debug, Clone)]
pub struct EnvVar {
    /// Environment variable name (e.g., "OPENAI_API_KEY")
    pub name: &'static str,
    /// Human-readable description
    pub description: &'static str,
    /// Category for grouping in documentation
    pub category: EnvVarCategory,
    /// Whether this variable is required for operation
    pub required: bool,
    /// Default value if not set
    pub default: Option<&'static str>,
    /// Example value for documentation
    pub example: Option<&'static str>,
}

/// Categories for organizing environment variables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvVarCategory {
    /// API keys and tokens
    Authentication,
    /// Codex executable and directories
    Paths,
    /// Query defaults
    Codex,
    /// Logging configuration
    Logging,
}

impl EnvVarCategory {
    /// Display name for this category
    pub fn display_name(&self) -> &'static str {
        match self {
            EnvVarCategory::Authentication => "Authentication",
            EnvVarCategory::Paths => "Paths",
            EnvVarCategory::Codex => "Codex",
            EnvVarCategory::Logging => "Logging",
        }
    }

    /// All categories in display order
    pub fn all() -> &'static [EnvVarCategory] {
        &[
            EnvVarCategory::Authentication,
            EnvVarCategory::Paths,
            EnvVarCategory::Codex,
            EnvVarCategory::Logging,
        ]
    }
}

/// Static registry of all documented environment variables
pub static ENV_VARS: &[EnvVar] = &[
    // === Authentication ===
    EnvVar {
        name: OPENAI_API_KEY,
        description: "OpenAI API key, used when no Codex CLI login is available",
        category: EnvVarCategory::Authentication,
        required: false,
        default: None,
        example: Some("sk-proj-..."),
    },
    // === Paths ===
    EnvVar {
        name: CODEX_PATH,
        description: "Explicit path to the codex executable (skips PATH lookup)",
        category: EnvVarCategory::Paths,
        required: false,
        default: None,
        example: Some("/opt/codex/bin/codex"),
    },
    EnvVar {
        name: CODEX_HOME,
        description: "Directory holding Codex's auth.json and config.toml",
        category: EnvVarCategory::Paths,
        required: false,
        default: Some("~/.codex"),
        example: Some("/srv/codex-home"),
    },
    // === Codex ===
    EnvVar {
        name: "CODEX_BRIDGE_CODEX__EXECUTABLE_PATH",
        description: "Executable used for queries; wins over CODEX_PATH",
        category: EnvVarCategory::Codex,
        required: false,
        default: None,
        example: Some("/usr/local/bin/codex"),
    },
    EnvVar {
        name: "CODEX_BRIDGE_CODEX__DEFAULT_MODEL",
        description: "Model passed to `codex exec --model` when a query names none",
        category: EnvVarCategory::Codex,
        required: false,
        default: None,
        example: Some("o3"),
    },
    EnvVar {
        name: "CODEX_BRIDGE_CODEX__TIMEOUT_MS",
        description: "Inactivity timeout for the codex subprocess in milliseconds",
        category: EnvVarCategory::Codex,
        required: false,
        default: Some("30000"),
        example: Some("120000"),
    },
    // === Logging ===
    EnvVar {
        name: "CODEX_BRIDGE_LOGGING__LEVEL",
        description: "Log level (trace, debug, info, warn, error)",
        category: EnvVarCategory::Logging,
        required: false,
        default: Some("info"),
        example: Some("debug"),
    },
    EnvVar {
        name: "CODEX_BRIDGE_LOGGING__TO_FILE",
        description: "Write logs to a file under the state directory instead of stderr",
        category: EnvVarCategory::Logging,
        required: false,
        default: Some("false"),
        example: Some("true"),
    },
];

/// Get all environment variables for a given category
pub fn env_vars_for_category(category: EnvVarCategory) -> impl Iterator<Item = &'static EnvVar> {
    ENV_VARS.iter().filter(move |v| v.category == category)
}

/// Get environment variables grouped by category
pub fn env_vars_by_category() -> Vec<(EnvVarCategory, Vec<&'static EnvVar>)> {
    EnvVarCategory::all()
        .iter()
        .map(|cat| {
            let vars: Vec<&EnvVar> = env_vars_for_category(*cat).collect();
            (*cat, vars)
        })
        .filter(|(_, vars)| !vars.is_empty())
        .collect()
}

/// Values of every environment variable the detector and orchestrator use,
/// read once at the process boundary.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    /// `OPENAI_API_KEY`
    pub openai_api_key: Option<String>,
    /// `CODEX_PATH`
    pub codex_path: Option<PathBuf>,
    /// `CODEX_HOME`
    pub codex_home: Option<PathBuf>,
    /// The user's home directory
    pub home_dir: Option<PathBuf>,
    /// `PATH`, used for executable lookup
    pub path: Option<OsString>,
    /// Directories where package managers drop global binaries
    pub package_dirs: Vec<PathBuf>,
}

impl EnvSnapshot {
    /// Capture the current process environment
    pub fn capture() -> Self {
        let home_dir = dirs::home_dir();
        let package_dirs = default_package_dirs(home_dir.as_ref());
        Self {
            openai_api_key: non_empty_var(OPENAI_API_KEY),
            codex_path: non_empty_var(CODEX_PATH).map(PathBuf::from),
            codex_home: non_empty_var(CODEX_HOME).map(PathBuf::from),
            home_dir,
            path: std::env::var_os("PATH"),
            package_dirs,
        }
    }

    /// The API key, if one is set and non-blank
    pub fn api_key(&self) -> Option<&str> {
        self.openai_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// Directory holding Codex's `auth.json` and `config.toml`
    pub fn codex_home(&self) -> PathBuf {
        if let Some(home) = &self.codex_home {
            return home.clone();
        }
        self.home_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".codex")
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Global bin directories used by npm, Homebrew and friends on this OS
fn default_package_dirs(home: Option<&PathBuf>) -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    if cfg!(target_os = "macos") {
        dirs.push(PathBuf::from("/opt/homebrew/bin"));
        dirs.push(PathBuf::from("/usr/local/bin"));
    } else if cfg!(windows) {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            dirs.push(PathBuf::from(appdata).join("npm"));
        }
    } else {
        dirs.push(PathBuf::from("/usr/local/bin"));
        dirs.push(PathBuf::from("/usr/bin"));
        dirs.push(PathBuf::from("/home/linuxbrew/.linuxbrew/bin"));
    }

    if let Some(home) = home {
        dirs.push(home.join(".npm-global").join("bin"));
        dirs.push(home.join(".local").join("bin"));
        dirs.push(home.join(".volta").join("bin"));
    }

    dirs
}
