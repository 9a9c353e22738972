//! Typed events flowing from the workers to the turn coordinator
//!
//! Every worker publishes onto one ordered fan-in channel of
//! [`AssistantEvent`]; the coordinator matches on it exhaustively.

use super::types::{ConversationEntry, SenderKind};
use std::time::Duration;
use uuid::Uuid;

/// Physical buttons on the appliance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Power,
    ScrollUp,
    ScrollDown,
}

impl Button {
    pub const ALL: [Button; 3] = [Button::Power, Button::ScrollUp, Button::ScrollDown];
}

/// Direction of a debounced pin transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Pressed,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub button: Button,
    pub edge: Edge,
}

impl ButtonEvent {
    pub fn pressed(button: Button) -> Self {
        Self {
            button,
            edge: Edge::Pressed,
        }
    }

    pub fn released(button: Button) -> Self {
        Self {
            button,
            edge: Edge::Released,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptKind {
    /// Provisional text, superseded by the next partial or final
    Partial,
    /// The merged utterance of one armed interval
    Final,
    /// The assembler reports a fault (recognizer unavailable)
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEvent {
    pub kind: TranscriptKind,
    pub text: String,
}

impl TranscriptEvent {
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            kind: TranscriptKind::Partial,
            text: text.into(),
        }
    }

    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            kind: TranscriptKind::Final,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self {
            kind: TranscriptKind::Info,
            text: text.into(),
        }
    }
}

/// Connection state of the session client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events raised by the session client
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Handshake with the conversation service succeeded
    Connected,

    /// Full chat history pushed by the server on connect
    HistorySnapshot(Vec<ConversationEntry>),

    /// A reply to the last message, optionally with a spoken clip
    Reply {
        text: String,
        sender: SenderKind,
        audio: Option<Vec<u8>>,
    },

    /// The live connection ended
    Disconnected { reason: String },

    /// The reconnect loop is about to try again
    Retrying {
        failures: u32,
        backoff: Duration,
        reason: String,
    },

    /// A logical send reached the server
    Delivered { request_id: Uuid },

    /// A logical send exhausted its attempts, or was never attempted
    /// (`attempts == 0`) because no connection was up
    SendFailed {
        request_id: Uuid,
        attempts: u32,
        reason: String,
    },
}

/// Events raised by the playback controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Started { clip: u64 },
    /// The player exited on its own
    Finished { clip: u64 },
    /// The clip was cut short by `stop()`
    Stopped { clip: u64 },
    Error(String),
}

/// Which worker produced a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerSource {
    Buttons,
    Transcriber,
    Session,
    Playback,
}

/// Fan-in event consumed exclusively by the turn coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantEvent {
    Button(ButtonEvent),
    Transcript(TranscriptEvent),
    Session(SessionEvent),
    Playback(PlaybackEvent),

    /// Human-readable fault report from a worker
    Notice { source: WorkerSource, text: String },

    /// Stop the coordinator loop
    Shutdown,
}

impl From<ButtonEvent> for AssistantEvent {
    fn from(event: ButtonEvent) -> Self {
        AssistantEvent::Button(event)
    }
}

impl From<TranscriptEvent> for AssistantEvent {
    fn from(event: TranscriptEvent) -> Self {
        AssistantEvent::Transcript(event)
    }
}

impl From<SessionEvent> for AssistantEvent {
    fn from(event: SessionEvent) -> Self {
        AssistantEvent::Session(event)
    }
}

impl From<PlaybackEvent> for AssistantEvent {
    fn from(event: PlaybackEvent) -> Self {
        AssistantEvent::Playback(event)
    }
}
