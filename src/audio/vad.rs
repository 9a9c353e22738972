use crate::{Result, ZelnaError};
use tracing::info;
use voice_activity_detector::VoiceActivityDetector;

/// Silero VAD window at 16 kHz (32 ms)
pub const VAD_CHUNK: usize = 512;

/// Streaming speech detector used to find the end of an utterance.
///
/// Accepts any frame size; samples are regrouped into VAD windows.
pub struct SpeechDetector {
    detector: VoiceActivityDetector,
    threshold: f32,
    carry: Vec<f32>,
}

impl SpeechDetector {
    /// Create a detector for 16 kHz mono audio
    pub fn new(threshold: f32) -> Result<Self> {
        let detector = VoiceActivityDetector::builder()
            .sample_rate(16000)
            .chunk_size(VAD_CHUNK)
            .build()
            .map_err(|e| ZelnaError::ModelLoad(format!("Failed to create VAD: {:?}", e)))?;

        info!("Initialized VAD with threshold {}", threshold);

        Ok(Self {
            detector,
            threshold: threshold.clamp(0.0, 1.0),
            carry: Vec::with_capacity(VAD_CHUNK * 2),
        })
    }

    /// Feed samples and get one verdict per completed window
    pub fn feed(&mut self, samples: &[f32]) -> Vec<bool> {
        self.carry.extend_from_slice(samples);
        let mut verdicts = Vec::new();
        while self.carry.len() >= VAD_CHUNK {
            let window: Vec<f32> = self.carry.drain(..VAD_CHUNK).collect();
            let probability = self.detector.predict(window);
            verdicts.push(probability >= self.threshold);
        }
        verdicts
    }

    pub fn reset(&mut self) {
        self.carry.clear();
        self.detector.reset();
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}
