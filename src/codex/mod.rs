//! Codex CLI installation and authentication detection.
//!
//! All probes read from an [`EnvSnapshot`](crate::env_vars::EnvSnapshot)
//! handed to the [`Detector`] at construction, never from the live process
//! environment, and none of them fail: anything that goes wrong at the OS
//! level reads as "not found".

mod auth;
mod detection;
mod models;

pub use auth::{evaluate_auth, AuthMethod, AuthStatus};
pub use detection::{
    installation_info_for, parse_version, Detector, InstallMethod, InstallationInfo,
    InstallationState, InstallationStatus, CODEX_BINARY, MIN_SUPPORTED_VERSION,
};
pub use models::{
    default_model, is_model_supported, supported_models, supports_capability,
    SUPPORTED_CAPABILITIES,
};
