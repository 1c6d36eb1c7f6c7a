//! Translation from Codex exec events to normalized messages.
//!
//! Each input event yields at most one message, in arrival order.

use serde_json::{json, Value};

use super::events::{ExecEvent, ExecItem, ItemPhase, TodoEntry};
use super::messages::{ContentBlock, NormalizedMessage};

/// Tool name reported for shell commands
const SHELL_TOOL: &str = "Bash";

/// Translate one raw event into zero or one normalized messages
pub fn translate_event(event: &Value) -> Option<NormalizedMessage> {
    match ExecEvent::from_value(event) {
        ExecEvent::Lifecycle => None,
        ExecEvent::ThreadCompleted => Some(NormalizedMessage::success()),
        ExecEvent::Error { message } | ExecEvent::TurnFailed { message } => {
            Some(NormalizedMessage::error(message))
        }
        ExecEvent::Item { phase, item } => {
            translate_item(phase, item).map(NormalizedMessage::assistant)
        }
        ExecEvent::Unknown { text } => {
            text.map(|t| NormalizedMessage::assistant(ContentBlock::text(t)))
        }
    }
}

fn translate_item(phase: ItemPhase, item: ExecItem) -> Option<ContentBlock> {
    let block = match item {
        ExecItem::Reasoning { text } => ContentBlock::Thinking { thinking: text },
        ExecItem::AgentMessage { text } | ExecItem::Message { text } | ExecItem::Other { text } => {
            ContentBlock::text(text)
        }
        ExecItem::CommandExecution { command, output } => match phase {
            ItemPhase::Started => ContentBlock::ToolUse {
                name: SHELL_TOOL.to_string(),
                input: json!({ "command": command }),
            },
            ItemPhase::Completed => ContentBlock::text(render_command(&command, &output)),
            ItemPhase::Updated => return None,
        },
        ExecItem::TodoList { items } => ContentBlock::text(render_todo_list(phase, &items)),
        ExecItem::FileChange { paths } => ContentBlock::text(render_file_changes(&paths)),
        ExecItem::ToolUse { name, input } => ContentBlock::ToolUse { name, input },
        ExecItem::ToolResult {
            tool_use_id,
            content,
        } => ContentBlock::ToolResult {
            tool_use_id,
            content,
        },
    };
    Some(block)
}

fn render_command(command: &str, output: &str) -> String {
    let mut text = format!("```bash\n$ {command}\n");
    let output = output.trim_end();
    if !output.is_empty() {
        text.push_str(output);
        text.push('\n');
    }
    text.push_str("```");
    text
}

fn render_todo_list(phase: ItemPhase, items: &[TodoEntry]) -> String {
    let header = match phase {
        ItemPhase::Updated => "Updated Todo List",
        ItemPhase::Started | ItemPhase::Completed => "Todo List",
    };

    let mut lines = vec![format!("{header}:")];
    for (i, entry) in items.iter().enumerate() {
        let line = match entry.done {
            Some(true) => format!("{}. [x] {}", i + 1, entry.text),
            Some(false) => format!("{}. [ ] {}", i + 1, entry.text),
            None => format!("{}. {}", i + 1, entry.text),
        };
        lines.push(line);
    }
    lines.join("\n")
}

fn render_file_changes(paths: &[String]) -> String {
    let mut lines = vec!["File changes:".to_string()];
    lines.extend(paths.iter().map(|path| format!("Modified: {path}")));
    lines.join("\n")
}
