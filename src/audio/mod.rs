//! Audio input path: microphone capture, resampling and voice activity

#[cfg(feature = "audio-io")]
pub mod capture;
pub mod resampler;
pub mod vad;

#[cfg(feature = "audio-io")]
pub use capture::AudioCapture;
pub use resampler::StreamResampler;
pub use vad::SpeechDetector;

/// Sample rate expected by the recognizer
pub const RECOGNIZER_SAMPLE_RATE: u32 = 16000;

/// Capture callbacks per second at the smallest buffer cpal hands out (5 ms)
pub const MAX_CALLBACKS_PER_SECOND: f32 = 200.0;

/// Configuration for microphone capture
#[derive(Clone, Debug)]
pub struct CaptureConfig {
    /// Whether to open the microphone at all
    pub enabled: bool,

    /// Seconds of audio the frame queue holds while the recognizer is busy.
    /// A Whisper pass over a full-length utterance must fit in it.
    pub queue_seconds: f32,
}

impl CaptureConfig {
    /// Frame slots needed to buffer `queue_seconds` of callbacks
    pub fn queue_depth(&self) -> usize {
        (self.queue_seconds.max(0.0) * MAX_CALLBACKS_PER_SECOND).ceil() as usize
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_seconds: 30.0,
        }
    }
}
