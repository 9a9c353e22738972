//! Conversation data and the events exchanged between workers

pub mod events;
pub mod storage;
pub mod types;

pub use events::{
    AssistantEvent, Button, ButtonEvent, Edge, PlaybackEvent, SessionEvent, SessionState,
    TranscriptEvent, TranscriptKind, WorkerSource,
};
pub use storage::ConversationLog;
pub use types::{ConversationEntry, SenderKind};
