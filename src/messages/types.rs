use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who produced a conversation entry.
///
/// The wire names follow the conversation service: the device is the
/// `client`, the remote assistant is the `server`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SenderKind {
    #[serde(rename = "client")]
    User,
    #[serde(rename = "server")]
    Peer,
    #[serde(rename = "info")]
    Info,
}

impl SenderKind {
    /// Parse a wire sender tag, returning `None` for tags the device does not render.
    pub fn from_wire(tag: &str) -> Option<Self> {
        match tag {
            "client" | "user" => Some(SenderKind::User),
            "server" | "assistant" => Some(SenderKind::Peer),
            "info" => Some(SenderKind::Info),
            _ => None,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            SenderKind::User => "client",
            SenderKind::Peer => "server",
            SenderKind::Info => "info",
        }
    }
}

/// One line of the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub id: Uuid,
    pub sender: SenderKind,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationEntry {
    pub fn new(sender: SenderKind, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(SenderKind::User, text)
    }

    pub fn peer(text: impl Into<String>) -> Self {
        Self::new(SenderKind::Peer, text)
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(SenderKind::Info, text)
    }
}
