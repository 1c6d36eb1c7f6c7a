//! Query requests and the normalized message protocol sent back to callers.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config_store::McpServerEntry;

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One unit of assistant output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Thinking { thinking: String },
    ToolUse { name: String, input: Value },
    ToolResult { tool_use_id: String, content: Value },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSubtype {
    Success,
}

/// A message in the normalized output stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NormalizedMessage {
    Assistant { message: AssistantMessage },
    Error { error: String },
    Result { subtype: ResultSubtype },
}

impl NormalizedMessage {
    /// An assistant message holding a single block
    pub fn assistant(block: ContentBlock) -> Self {
        NormalizedMessage::Assistant {
            message: AssistantMessage {
                role: Role::Assistant,
                content: vec![block],
            },
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        NormalizedMessage::Error {
            error: error.into(),
        }
    }

    pub fn success() -> Self {
        NormalizedMessage::Result {
            subtype: ResultSubtype::Success,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, NormalizedMessage::Error { .. })
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            NormalizedMessage::Result {
                subtype: ResultSubtype::Success
            }
        )
    }
}

/// A piece of a multi-part prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    Image {
        #[serde(default)]
        source: Option<Value>,
    },
    #[serde(other)]
    Unsupported,
}

/// The user's prompt: plain text or ordered content parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prompt {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Default for Prompt {
    fn default() -> Self {
        Prompt::Text(String::new())
    }
}

impl From<&str> for Prompt {
    fn from(value: &str) -> Self {
        Prompt::Text(value.to_string())
    }
}

impl From<String> for Prompt {
    fn from(value: String) -> Self {
        Prompt::Text(value)
    }
}

impl From<Vec<ContentPart>> for Prompt {
    fn from(value: Vec<ContentPart>) -> Self {
        Prompt::Parts(value)
    }
}

/// A prior turn replayed into the prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub content: String,
}

/// A request to run one Codex query
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub prompt: Prompt,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub conversation_history: Vec<HistoryTurn>,
    pub cwd: PathBuf,
    /// Extra MCP servers to register before the run
    #[serde(default)]
    pub mcp_servers: BTreeMap<String, McpServerEntry>,
    #[serde(skip)]
    pub abort_token: Option<CancellationToken>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl QueryRequest {
    pub fn new(prompt: impl Into<Prompt>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            prompt: prompt.into(),
            cwd: cwd.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_history(mut self, history: Vec<HistoryTurn>) -> Self {
        self.conversation_history = history;
        self
    }

    pub fn with_abort_token(mut self, token: CancellationToken) -> Self {
        self.abort_token = Some(token);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_mcp_server(mut self, name: impl Into<String>, entry: McpServerEntry) -> Self {
        self.mcp_servers.insert(name.into(), entry);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_wire_format() {
        let msg = NormalizedMessage::assistant(ContentBlock::text("Response"));
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "type": "assistant",
                "message": {
                    "role": "assistant",
                    "content": [{"type": "text", "text": "Response"}]
                }
            })
        );

        assert_eq!(
            serde_json::to_value(NormalizedMessage::success()).unwrap(),
            json!({"type": "result", "subtype": "success"})
        );
        assert_eq!(
            serde_json::to_value(NormalizedMessage::error("boom")).unwrap(),
            json!({"type": "error", "error": "boom"})
        );
    }

    #[test]
    fn test_tool_blocks_wire_format() {
        let block = ContentBlock::ToolResult {
            tool_use_id: "call_1".to_string(),
            content: json!("ok"),
        };
        assert_eq!(
            serde_json::to_value(&block).unwrap(),
            json!({"type": "tool_result", "tool_use_id": "call_1", "content": "ok"})
        );
    }

    #[test]
    fn test_request_deserializes_from_host_json() {
        let request: QueryRequest = serde_json::from_value(json!({
            "prompt": [
                {"type": "text", "text": "Describe"},
                {"type": "image", "source": {"data": "..."}},
                {"type": "audio"}
            ],
            "systemPrompt": "Be brief",
            "conversationHistory": [{"role": "user", "content": "hi"}],
            "cwd": "/work",
            "timeoutMs": 5000,
            "mcpServers": {"docs": {"command": "npx", "args": ["docs-mcp"]}}
        }))
        .unwrap();

        let Prompt::Parts(parts) = &request.prompt else {
            panic!("expected parts");
        };
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2], ContentPart::Unsupported);
        assert_eq!(request.system_prompt.as_deref(), Some("Be brief"));
        assert_eq!(request.conversation_history[0].role, Role::User);
        assert_eq!(request.timeout_ms, Some(5000));
        assert_eq!(request.mcp_servers["docs"].command, "npx");
        assert!(request.abort_token.is_none());
    }

    #[test]
    fn test_plain_text_prompt_deserializes() {
        let request: QueryRequest =
            serde_json::from_value(json!({"prompt": "hello", "cwd": "/work"})).unwrap();
        assert_eq!(request.prompt, Prompt::Text("hello".to_string()));
    }
}
