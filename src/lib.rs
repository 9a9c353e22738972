pub mod audio;
pub mod display;
pub mod gpio;
pub mod input;
pub mod integration;
pub mod messages;
pub mod playback;
pub mod session;
pub mod speech;
pub mod utils;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ZelnaError {
    #[error("GPIO error: {0}")]
    Gpio(String),

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Model load error: {0}")]
    ModelLoad(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Playback engine not found: {0}")]
    PlayerMissing(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ZelnaError {
    fn from(e: std::io::Error) -> Self {
        ZelnaError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for ZelnaError {
    fn from(e: serde_json::Error) -> Self {
        ZelnaError::Protocol(e.to_string())
    }
}

/// How a failure is handled by the worker that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retried automatically and surfaced as an info entry.
    TransientIo,
    /// Surfaced once; the owning feature is disabled.
    ResourceUnavailable,
    /// Logged and the offending event dropped.
    ProtocolMismatch,
}

impl ZelnaError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ZelnaError::Gpio(_) => ErrorClass::TransientIo,
            ZelnaError::AudioDevice(_) => ErrorClass::ResourceUnavailable,
            ZelnaError::ModelLoad(_) => ErrorClass::ResourceUnavailable,
            ZelnaError::Transcription(_) => ErrorClass::TransientIo,
            ZelnaError::Playback(_) => ErrorClass::TransientIo,
            ZelnaError::PlayerMissing(_) => ErrorClass::ResourceUnavailable,
            ZelnaError::Connection(_) => ErrorClass::TransientIo,
            ZelnaError::Protocol(_) => ErrorClass::ProtocolMismatch,
            ZelnaError::Config(_) => ErrorClass::ResourceUnavailable,
            ZelnaError::Channel(_) => ErrorClass::ResourceUnavailable,
            ZelnaError::Io(_) => ErrorClass::TransientIo,
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        self.class() != ErrorClass::ResourceUnavailable
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            ZelnaError::Gpio(_) => "Button read failed. Still listening for presses.".to_string(),
            ZelnaError::AudioDevice(_) => {
                "Microphone unavailable. Voice input is disabled.".to_string()
            }
            ZelnaError::ModelLoad(_) => {
                "Speech recognizer failed to load. Voice input is disabled.".to_string()
            }
            ZelnaError::Transcription(_) => {
                "Speech recognition hiccup. Please try again.".to_string()
            }
            ZelnaError::Playback(msg) => format!("Could not play the reply: {}", msg),
            ZelnaError::PlayerMissing(program) => {
                format!("Audio player `{}` is not installed. Replies are text only.", program)
            }
            ZelnaError::Connection(_) => "Connection to the server was lost.".to_string(),
            ZelnaError::Protocol(_) => "Received a message the device did not understand.".to_string(),
            ZelnaError::Config(_) => "Configuration error. Please check settings.".to_string(),
            ZelnaError::Channel(_) => {
                "Internal communication error. Please restart the device.".to_string()
            }
            ZelnaError::Io(_) => "File system error occurred.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ZelnaError>;
