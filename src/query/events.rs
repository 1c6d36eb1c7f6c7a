//! Typed view over the JSON lines `codex exec --json` prints.
//!
//! The CLI's event schema has drifted between releases, so every field is
//! read leniently: missing strings become empty, and the item kind may sit
//! under `type` or `item_type`.

use serde_json::{Map, Value};

/// Which lifecycle event carried an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ItemPhase {
    Started,
    Updated,
    Completed,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TodoEntry {
    pub text: String,
    /// `None` when the entry carries no status at all
    pub done: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ExecItem {
    Reasoning { text: String },
    AgentMessage { text: String },
    Message { text: String },
    CommandExecution { command: String, output: String },
    TodoList { items: Vec<TodoEntry> },
    FileChange { paths: Vec<String> },
    ToolUse { name: String, input: Value },
    ToolResult { tool_use_id: String, content: Value },
    Other { text: String },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ExecEvent {
    /// `thread.started`, `turn.started`, `turn.completed`
    Lifecycle,
    Item { phase: ItemPhase, item: ExecItem },
    Error { message: String },
    TurnFailed { message: String },
    ThreadCompleted,
    /// Anything else; `text` holds a top-level `text` or `message` string
    Unknown { text: Option<String> },
}

impl ExecEvent {
    pub fn from_value(value: &Value) -> Self {
        let Some(event) = value.as_object() else {
            return ExecEvent::Unknown { text: None };
        };

        let phase = match str_field(event, "type") {
            Some("thread.started" | "turn.started" | "turn.completed") => {
                return ExecEvent::Lifecycle
            }
            Some("thread.completed") => return ExecEvent::ThreadCompleted,
            Some("error") => {
                return ExecEvent::Error {
                    message: error_message(event),
                }
            }
            Some("turn.failed") => {
                return ExecEvent::TurnFailed {
                    message: error_message(event),
                }
            }
            Some("item.started") => ItemPhase::Started,
            Some("item.updated") => ItemPhase::Updated,
            Some("item.completed") => ItemPhase::Completed,
            _ => {
                let text = str_field(event, "text")
                    .or_else(|| str_field(event, "message"))
                    .map(str::to_string);
                return ExecEvent::Unknown { text };
            }
        };

        let empty = Map::new();
        let item = event
            .get("item")
            .and_then(Value::as_object)
            .unwrap_or(&empty);
        ExecEvent::Item {
            phase,
            item: ExecItem::from_object(item),
        }
    }
}

impl ExecItem {
    fn from_object(item: &Map<String, Value>) -> Self {
        let kind = str_field(item, "type").or_else(|| str_field(item, "item_type"));

        match kind {
            Some("reasoning") => ExecItem::Reasoning {
                text: text_of(item.get("text")),
            },
            Some("agent_message") => ExecItem::AgentMessage {
                text: first_text(item, &["content", "text"]),
            },
            Some("message") => ExecItem::Message {
                text: first_text(item, &["text", "content"]),
            },
            Some("command_execution") => ExecItem::CommandExecution {
                command: command_of(item.get("command")),
                output: first_text(item, &["aggregated_output", "output"]),
            },
            Some("todo_list") => ExecItem::TodoList {
                items: array_field(item, "items")
                    .iter()
                    .map(TodoEntry::from_value)
                    .collect(),
            },
            Some("file_change") => ExecItem::FileChange {
                paths: array_field(item, "changes")
                    .iter()
                    .filter_map(change_path)
                    .collect(),
            },
            Some("tool_use") => ExecItem::ToolUse {
                name: str_field(item, "tool")
                    .or_else(|| str_field(item, "name"))
                    .unwrap_or_default()
                    .to_string(),
                input: item
                    .get("input")
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Map::new())),
            },
            Some("tool_result") => ExecItem::ToolResult {
                tool_use_id: str_field(item, "tool_use_id")
                    .unwrap_or_default()
                    .to_string(),
                content: item.get("output").cloned().unwrap_or(Value::Null),
            },
            _ => ExecItem::Other {
                text: text_of(item.get("text")),
            },
        }
    }
}

impl TodoEntry {
    fn from_value(value: &Value) -> Self {
        let Some(entry) = value.as_object() else {
            return TodoEntry {
                text: text_of(Some(value)),
                done: None,
            };
        };

        let done = match entry.get("completed") {
            Some(Value::Bool(done)) => Some(*done),
            _ => str_field(entry, "status").map(|s| matches!(s, "completed" | "done")),
        };
        TodoEntry {
            text: first_text(entry, &["text", "content"]),
            done,
        }
    }
}

fn str_field<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    object.get(name).and_then(Value::as_str)
}

fn array_field<'a>(object: &'a Map<String, Value>, name: &str) -> &'a [Value] {
    object
        .get(name)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Flatten a string, a `{text}` object, or an array of either
fn text_of(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .map(|part| text_of(Some(part)))
            .collect::<Vec<_>>()
            .join(""),
        Some(Value::Object(object)) => text_of(object.get("text")),
        _ => String::new(),
    }
}

/// Text of the first field present, in order
fn first_text(object: &Map<String, Value>, names: &[&str]) -> String {
    names
        .iter()
        .find_map(|name| object.get(*name).filter(|v| !v.is_null()))
        .map(|value| text_of(Some(value)))
        .unwrap_or_default()
}

/// Commands arrive as a shell string or an argv array
fn command_of(value: Option<&Value>) -> String {
    match value {
        Some(Value::Array(argv)) => argv
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" "),
        other => text_of(other),
    }
}

fn change_path(change: &Value) -> Option<String> {
    match change {
        Value::String(path) => Some(path.clone()),
        Value::Object(object) => str_field(object, "path").map(str::to_string),
        _ => None,
    }
}

fn error_message(event: &Map<String, Value>) -> String {
    event
        .get("error")
        .and_then(|error| match error {
            Value::String(message) => Some(message.clone()),
            Value::Object(object) => str_field(object, "message").map(str::to_string),
            _ => None,
        })
        .or_else(|| str_field(event, "message").map(str::to_string))
        .unwrap_or_else(|| "Unknown error".to_string())
}
