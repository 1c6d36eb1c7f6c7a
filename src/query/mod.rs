//! Running prompts through `codex exec` and normalizing its event stream.
//!
//! A query moves through `PreflightAuth -> Spawning -> Streaming` and ends
//! `Done` or `Failed`. Output is pulled lazily: each JSON line the CLI prints
//! becomes zero or one [`NormalizedMessage`], in order, as soon as it arrives.

mod events;
pub mod messages;
pub mod orchestrator;
pub mod prompt;
pub mod spawn;
pub mod translate;

pub use messages::{
    AssistantMessage, ContentBlock, ContentPart, HistoryTurn, NormalizedMessage, Prompt,
    QueryRequest, ResultSubtype, Role,
};
pub use orchestrator::{
    QueryOrchestrator, QueryPhase, QuerySettings, QueryStream, NOT_AUTHENTICATED_MESSAGE,
};
pub use prompt::{assemble_prompt, user_content};
pub use spawn::{
    EventCursor, MockEvent, MockProcessSpawner, ProcessSpawner, SpawnError, SpawnRequest,
    SystemProcessSpawner, DEFAULT_TIMEOUT,
};
pub use translate::translate_event;
