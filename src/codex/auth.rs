//! Credential discovery from Codex's `auth.json` and the environment.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How the Codex CLI would authenticate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    None,
    /// Only `OPENAI_API_KEY` is available
    Env,
    /// `auth.json` holds a bare API key
    AuthFile,
    /// `auth.json` holds login tokens, installation unconfirmed
    CliTokens,
    /// Login tokens plus a confirmed installation
    CliVerified,
}

impl AuthMethod {
    /// Whether credentials come from a `codex login` session
    pub fn is_cli_session(&self) -> bool {
        matches!(self, AuthMethod::CliTokens | AuthMethod::CliVerified)
    }
}

/// Result of an authentication probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub authenticated: bool,
    pub method: AuthMethod,
    pub has_auth_file: bool,
    pub has_env_key: bool,
}

/// What kind of credential `auth.json` carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileCredential {
    Tokens,
    ApiKey,
}

const TOKEN_OBJECT_FIELDS: &[&str] = &["tokens", "token"];
const NESTED_TOKEN_FIELDS: &[&str] = &["access_token", "refresh_token", "id_token"];
const ROOT_TOKEN_FIELDS: &[&str] = &["access_token", "refresh_token"];
const API_KEY_FIELDS: &[&str] = &["api_key", "openai_api_key"];

/// Decide the auth method from the parsed auth file (if any), whether the
/// CLI is installed, and whether an env key is present.
///
/// Token forms outrank a bare API key in the file, which outranks the env
/// variable.
pub fn evaluate_auth(auth_file: Option<&Value>, installed: bool, has_env_key: bool) -> AuthStatus {
    let method = match auth_file.and_then(classify) {
        Some(FileCredential::Tokens) if installed => AuthMethod::CliVerified,
        Some(FileCredential::Tokens) => AuthMethod::CliTokens,
        Some(FileCredential::ApiKey) => AuthMethod::AuthFile,
        None if has_env_key => AuthMethod::Env,
        None => AuthMethod::None,
    };

    AuthStatus {
        authenticated: method != AuthMethod::None,
        method,
        has_auth_file: auth_file.is_some(),
        has_env_key,
    }
}

fn classify(value: &Value) -> Option<FileCredential> {
    let root = value.as_object()?;

    let token_object = TOKEN_OBJECT_FIELDS
        .iter()
        .find_map(|name| field(root, name).and_then(Value::as_object));
    if let Some(tokens) = token_object {
        if NESTED_TOKEN_FIELDS.iter().any(|f| has_string(tokens, f)) {
            return Some(FileCredential::Tokens);
        }
    }

    if ROOT_TOKEN_FIELDS.iter().any(|f| has_string(root, f)) {
        return Some(FileCredential::Tokens);
    }

    if API_KEY_FIELDS.iter().any(|f| has_string(root, f)) {
        return Some(FileCredential::ApiKey);
    }

    None
}

/// Case-insensitive field lookup
fn field<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    object
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value)
}

fn has_string(object: &Map<String, Value>, name: &str) -> bool {
    field(object, name)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.trim().is_empty())
}
