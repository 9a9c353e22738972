//! Configuration for the integration layer
//!
//! Provides centralized configuration for all components.

use crate::audio::CaptureConfig;
use crate::display::DisplayConfig;
use crate::input::ButtonConfig;
use crate::playback::PlaybackConfig;
use crate::session::SessionConfig;
use crate::speech::WhisperConfig;
use crate::{Result, ZelnaError};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the complete appliance
#[derive(Clone, Debug)]
pub struct AssistantConfig {
    pub buttons: ButtonConfig,

    pub capture: CaptureConfig,

    /// Speech recognition (Whisper) configuration
    pub whisper: WhisperConfig,

    pub session: SessionConfig,

    pub playback: PlaybackConfig,

    pub display: DisplayConfig,

    /// Pause after interrupting playback before listening starts
    pub settle_wait: Duration,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            buttons: ButtonConfig::default(),
            capture: CaptureConfig::default(),
            whisper: WhisperConfig::default(),
            session: SessionConfig::default(),
            playback: PlaybackConfig::default(),
            display: DisplayConfig::default(),
            settle_wait: Duration::from_millis(100),
        }
    }
}

impl AssistantConfig {
    /// Create a configuration for a service endpoint and recognizer model
    pub fn with_endpoint(url: impl Into<String>, whisper_model: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.session.url = url.into();
        config.whisper.model_path = whisper_model.into();
        config
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.session.auth_token = Some(token.into());
        self
    }

    pub fn with_player(mut self, program: impl Into<String>, args: Vec<String>) -> Self {
        self.playback.program = program.into();
        self.playback.args = args;
        self
    }

    /// Run without a microphone (buttons and replies only)
    pub fn without_audio_input(mut self) -> Self {
        self.capture.enabled = false;
        self
    }

    /// Poll the stub GPIO backend instead of real lines
    pub fn without_gpio(mut self) -> Self {
        self.buttons.use_stub = true;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.session.url.is_empty() {
            return Err(ZelnaError::Config("Session URL is required".to_string()));
        }

        if self.session.max_send_attempts == 0 {
            return Err(ZelnaError::Config(
                "Send attempts must be at least 1".to_string(),
            ));
        }

        if self.buttons.poll_interval.is_zero() {
            return Err(ZelnaError::Config(
                "Button poll interval must be non-zero".to_string(),
            ));
        }

        let mut pins: Vec<u32> = self.buttons.pins.iter().map(|b| b.pin).collect();
        pins.sort_unstable();
        pins.dedup();
        if pins.len() != self.buttons.pins.len() {
            return Err(ZelnaError::Config(
                "Each button needs its own GPIO pin".to_string(),
            ));
        }

        if self.capture.enabled && self.capture.queue_seconds < self.whisper.max_segment_duration {
            return Err(ZelnaError::Config(format!(
                "Capture queue must hold at least {}s of audio",
                self.whisper.max_segment_duration
            )));
        }

        if self.playback.program.is_empty() {
            return Err(ZelnaError::Config("Player program is required".to_string()));
        }

        Ok(())
    }
}
