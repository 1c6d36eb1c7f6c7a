//! Prompt assembly for `codex exec`.
//!
//! Each `codex exec` run starts with no memory, so prior turns are replayed
//! into the prompt text ahead of the current request.

use super::messages::{ContentPart, Prompt, QueryRequest, Role};

const SECTION_SEPARATOR: &str = "\n\n---\n\n";
const HISTORY_HEADER: &str = "Previous conversation:";
const CURRENT_REQUEST_MARKER: &str = "Current request:";

/// The text of the user's prompt; non-text parts are dropped
pub fn user_content(prompt: &Prompt) -> String {
    match prompt {
        Prompt::Text(text) => text.clone(),
        Prompt::Parts(parts) => parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Build the full prompt: system prompt, replayed history, current content
pub fn assemble_prompt(request: &QueryRequest) -> String {
    let content = user_content(&request.prompt);
    let mut prompt = String::new();

    if let Some(system) = request.system_prompt.as_deref().filter(|s| !s.is_empty()) {
        prompt.push_str(system);
        prompt.push_str(SECTION_SEPARATOR);
    }

    if request.conversation_history.is_empty() {
        prompt.push_str(&content);
        return prompt;
    }

    prompt.push_str(HISTORY_HEADER);
    prompt.push_str("\n\n");
    for turn in &request.conversation_history {
        let speaker = match turn.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        prompt.push_str(&format!("{speaker}: {}\n\n", turn.content));
    }
    prompt.push_str("---\n\n");
    prompt.push_str(CURRENT_REQUEST_MARKER);
    prompt.push('\n');
    prompt.push_str(&content);
    prompt
}
