//! Codex CLI installation detection
//!
//! Looks for the `codex` binary in three places, in order: the explicit
//! `CODEX_PATH` override, the `PATH`, and the global bin directories package
//! managers install into. The first hit wins.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use super::auth::{evaluate_auth, AuthStatus};
use crate::env_vars::EnvSnapshot;

/// Binary name of the Codex CLI
pub const CODEX_BINARY: &str = "codex";

/// Oldest CLI release with `exec --json` event output
pub const MIN_SUPPORTED_VERSION: &str = "0.44.0";

const AUTH_FILE_NAME: &str = "auth.json";
const VERSION_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the binary was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallMethod {
    PathLookup,
    PackageManager,
}

/// Result of an installation probe
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationStatus {
    pub installed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<InstallMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_api_key: Option<bool>,
    /// False only when a known version is below [`MIN_SUPPORTED_VERSION`]
    #[serde(default)]
    pub version_ok: bool,
}

/// User-facing installation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallationState {
    Installed,
    ApiKeyOnly,
    NotInstalled,
}

/// Installation state plus guidance for the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationInfo {
    pub state: InstallationState,
    pub status: InstallationStatus,
    pub recommendation: String,
    /// Install command per platform
    pub install_commands: BTreeMap<&'static str, &'static str>,
}

/// Probes the local machine for the Codex CLI and its credentials
#[derive(Debug, Clone)]
pub struct Detector {
    env: EnvSnapshot,
}

impl Detector {
    pub fn new(env: EnvSnapshot) -> Self {
        Self { env }
    }

    pub fn env(&self) -> &EnvSnapshot {
        &self.env
    }

    /// `<codex_home>/auth.json`
    pub fn auth_file_path(&self) -> PathBuf {
        self.env.codex_home().join(AUTH_FILE_NAME)
    }

    /// Find the binary and, if it answers `--version`, its version
    pub async fn detect_installation(&self) -> InstallationStatus {
        let Some((path, method)) = self.find_executable() else {
            let has_api_key = self.env.api_key().is_some();
            tracing::debug!(has_api_key, "Codex CLI not found");
            return InstallationStatus {
                installed: false,
                has_api_key: Some(has_api_key),
                version_ok: true,
                ..Default::default()
            };
        };

        let version = probe_version(&path).await;
        let version_ok = version
            .as_deref()
            .map_or(true, |v| check_version_meets_minimum(v, MIN_SUPPORTED_VERSION));

        if !version_ok {
            tracing::warn!(
                installed = version.as_deref().unwrap_or("unknown"),
                required = MIN_SUPPORTED_VERSION,
                "Codex CLI version is below minimum required version"
            );
        }

        tracing::debug!(path = %path.display(), ?method, ?version, "Codex CLI found");
        InstallationStatus {
            installed: true,
            path: Some(path),
            version,
            method: Some(method),
            has_api_key: None,
            version_ok,
        }
    }

    /// Probe installation, then evaluate credentials against it
    pub async fn check_auth(&self) -> AuthStatus {
        let installed = self.detect_installation().await.installed;
        self.check_auth_with(installed)
    }

    /// Evaluate credentials given a known installation state.
    ///
    /// A missing or malformed `auth.json` counts as no auth file.
    pub fn check_auth_with(&self, installed: bool) -> AuthStatus {
        let path = self.auth_file_path();
        let auth_file = std::fs::read_to_string(&path).ok().and_then(|text| {
            serde_json::from_str::<serde_json::Value>(&text)
                .map_err(|e| {
                    tracing::debug!(
                        path = %path.display(),
                        error = %e,
                        "Ignoring malformed auth file"
                    );
                })
                .ok()
        });

        evaluate_auth(auth_file.as_ref(), installed, self.env.api_key().is_some())
    }

    /// Probe installation and map it to a user-facing state
    pub async fn installation_info(&self) -> InstallationInfo {
        installation_info_for(self.detect_installation().await)
    }

    fn find_executable(&self) -> Option<(PathBuf, InstallMethod)> {
        if let Some(path) = &self.env.codex_path {
            if is_executable(path) {
                return Some((path.clone(), InstallMethod::PathLookup));
            }
            tracing::debug!(path = %path.display(), "CODEX_PATH does not point at an executable");
        }

        if let Some(search_path) = &self.env.path {
            if let Ok(path) = which::which_in(CODEX_BINARY, Some(search_path), ".") {
                return Some((path, InstallMethod::PathLookup));
            }
        }

        self.env
            .package_dirs
            .iter()
            .flat_map(|dir| binary_names().iter().map(move |name| dir.join(name)))
            .find(|candidate| is_executable(candidate))
            .map(|path| (path, InstallMethod::PackageManager))
    }
}

/// Map an installation probe to the state shown to users
pub fn installation_info_for(status: InstallationStatus) -> InstallationInfo {
    let (state, recommendation) = if status.installed {
        (
            InstallationState::Installed,
            "Codex CLI is installed. Run `codex login` if you have not signed in yet.",
        )
    } else if status.has_api_key == Some(true) {
        (
            InstallationState::ApiKeyOnly,
            "OPENAI_API_KEY is set but the Codex CLI is missing. Install it to run queries.",
        )
    } else {
        (
            InstallationState::NotInstalled,
            "Install the Codex CLI, then run `codex login` or set OPENAI_API_KEY.",
        )
    };

    InstallationInfo {
        state,
        status,
        recommendation: recommendation.to_string(),
        install_commands: install_commands(),
    }
}

fn install_commands() -> BTreeMap<&'static str, &'static str> {
    BTreeMap::from([
        ("macos", "brew install codex"),
        ("linux", "npm install -g @openai/codex"),
        ("windows", "npm install -g @openai/codex"),
        ("npm", "npm install -g @openai/codex"),
    ])
}

fn binary_names() -> &'static [&'static str] {
    if cfg!(windows) {
        &["codex.cmd", "codex.exe", "codex"]
    } else {
        &[CODEX_BINARY]
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Run `<path> --version` and pull a version out of its first line
async fn probe_version(path: &Path) -> Option<String> {
    let output = Command::new(path)
        .arg("--version")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(VERSION_TIMEOUT, output)
        .await
        .ok()?
        .ok()
        .filter(|o| o.status.success())?;

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .and_then(parse_version)
}

/// Extract a version like `0.46.0` from `--version` output.
///
/// Handles "codex-cli 0.46.0", "v0.46.0", "0.46.0-alpha.2" etc.
pub fn parse_version(text: &str) -> Option<String> {
    text.split_whitespace().find_map(|word| {
        let cleaned = word.trim_start_matches(['v', 'V']);
        let mut parts = cleaned.split('.');
        let major = parts.next()?.parse::<u32>().ok();
        let minor = parts
            .next()
            .and_then(|p| p.split('-').next())
            .and_then(|p| p.parse::<u32>().ok());
        (major.is_some() && minor.is_some()).then(|| cleaned.to_string())
    })
}

/// Check if installed version meets the minimum required version.
fn check_version_meets_minimum(installed: &str, minimum: &str) -> bool {
    let installed_parts = extract_version_parts(installed);
    let minimum_parts = extract_version_parts(minimum);

    match compare_version_parts(&installed_parts, &minimum_parts) {
        Ordering::Less => false,
        Ordering::Equal | Ordering::Greater => true,
    }
}

/// Numeric components of a version; pre-release suffixes are ignored.
///
/// - "0.46.0" -> [0, 46, 0]
/// - "0.46.0-alpha.2" -> [0, 46, 0]
fn extract_version_parts(version: &str) -> Vec<u32> {
    version
        .split('-')
        .next()
        .unwrap_or_default()
        .split('.')
        .map_while(|p| p.parse::<u32>().ok())
        .collect()
}

/// Compare two version part vectors, treating missing elements as 0.
fn compare_version_parts(a: &[u32], b: &[u32]) -> Ordering {
    let max_len = a.len().max(b.len());

    for i in 0..max_len {
        let a_part = a.get(i).copied().unwrap_or(0);
        let b_part = b.get(i).copied().unwrap_or(0);

        match a_part.cmp(&b_part) {
            Ordering::Equal => continue,
            other => return other,
        }
    }

    Ordering::Equal
}
