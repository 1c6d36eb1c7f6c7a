//! Models and capabilities codex-bridge offers through the Codex CLI.

/// Models accepted by `codex exec --model`
const SUPPORTED_MODELS: &[&str] = &[
    "gpt-5-codex",
    "gpt-5",
    "o3",
    "o4-mini",
    "gpt-4.1",
    "codex-mini-latest",
];

const DEFAULT_MODEL: &str = "gpt-5-codex";

/// Capabilities advertised to the host application.
///
/// `thinking` is not listed even though reasoning items are translated into
/// thinking blocks.
pub const SUPPORTED_CAPABILITIES: &[&str] = &[
    "streaming",
    "tools",
    "code_execution",
    "file_operations",
    "mcp",
];

pub fn supported_models() -> &'static [&'static str] {
    SUPPORTED_MODELS
}

pub fn is_model_supported(id: &str) -> bool {
    SUPPORTED_MODELS.contains(&id)
}

pub fn default_model() -> &'static str {
    DEFAULT_MODEL
}

pub fn supports_capability(name: &str) -> bool {
    SUPPORTED_CAPABILITIES.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model_is_supported() {
        assert!(is_model_supported(default_model()));
    }

    #[test]
    fn test_unknown_model() {
        assert!(!is_model_supported("claude-opus"));
        assert!(!is_model_supported(""));
    }

    #[test]
    fn test_thinking_is_not_a_capability() {
        assert!(supports_capability("streaming"));
        assert!(!supports_capability("thinking"));
    }
}
