//! Wire format of the conversation service
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.
//!
//! Inbound events:
//! - `initialize`: `[{"message": .., "sender": ..}, ..]` chat history
//! - `response`: `{"message": .., "sender": .., "audio_file": <base64>?}`
//! - `disconnect`: the server is closing the session
//!
//! Outbound events:
//! - `message`: the user's utterance as a string

use crate::messages::{ConversationEntry, SenderKind};
use crate::{Result, ZelnaError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

pub const EVENT_INITIALIZE: &str = "initialize";
pub const EVENT_RESPONSE: &str = "response";
pub const EVENT_DISCONNECT: &str = "disconnect";
pub const EVENT_MESSAGE: &str = "message";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Deserialize)]
struct WireEntry {
    #[serde(default)]
    message: String,
    #[serde(default)]
    sender: String,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    message: String,
    #[serde(default)]
    sender: Option<String>,
    #[serde(default)]
    audio_file: Option<String>,
}

/// Decoded inbound event
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Initialize(Vec<ConversationEntry>),
    Response {
        text: String,
        sender: SenderKind,
        audio: Option<Vec<u8>>,
    },
    Disconnect,
    /// An event this device does not handle
    Ignored(String),
}

/// Decode one text frame from the service
pub fn decode_inbound(text: &str) -> Result<InboundMessage> {
    let frame: WireFrame = serde_json::from_str(text)?;

    match frame.event.as_str() {
        EVENT_INITIALIZE => {
            let entries: Vec<WireEntry> = serde_json::from_value(frame.data)?;
            let history = entries
                .into_iter()
                .filter_map(|entry| {
                    let sender = SenderKind::from_wire(&entry.sender)?;
                    if entry.message.is_empty() {
                        return None;
                    }
                    Some(ConversationEntry::new(sender, entry.message))
                })
                .collect();
            Ok(InboundMessage::Initialize(history))
        }
        EVENT_RESPONSE => {
            let response: WireResponse = serde_json::from_value(frame.data)?;
            let sender = match response.sender.as_deref() {
                None => SenderKind::Peer,
                Some(tag) => SenderKind::from_wire(tag).ok_or_else(|| {
                    ZelnaError::Protocol(format!("unknown sender {:?}", tag))
                })?,
            };
            let audio = response
                .audio_file
                .filter(|encoded| !encoded.is_empty())
                .map(|encoded| STANDARD.decode(encoded.as_bytes()))
                .transpose()
                .map_err(|e| ZelnaError::Protocol(format!("bad audio_file: {}", e)))?;
            Ok(InboundMessage::Response {
                text: response.message,
                sender,
                audio,
            })
        }
        EVENT_DISCONNECT => Ok(InboundMessage::Disconnect),
        other => {
            debug!("Ignoring inbound event {:?}", other);
            Ok(InboundMessage::Ignored(other.to_string()))
        }
    }
}

/// Encode one outbound event
pub fn encode_outbound(event: &str, payload: Value) -> Result<String> {
    let frame = WireFrame {
        event: event.to_string(),
        data: payload,
    };
    Ok(serde_json::to_string(&frame)?)
}
