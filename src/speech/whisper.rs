//! Whisper-backed streaming recognizer
//!
//! Whisper transcribes whole buffers, so streaming is emulated: the current
//! utterance is re-transcribed on a fixed cadence to produce partials, and
//! confirmed as a final fragment once the VAD sees enough trailing silence
//! (or the utterance hits its maximum length).

use crate::audio::vad::VAD_CHUNK;
use crate::audio::{SpeechDetector, StreamResampler, RECOGNIZER_SAMPLE_RATE};
use crate::speech::recognizer::{Recognition, Recognizer, RecognizerFactory};
use crate::utils::TimingTracker;
use crate::{Result, ZelnaError};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

/// Leading audio kept before speech starts (0.3 s)
const PRE_ROLL_SAMPLES: usize = 4800;

/// Configuration for the Whisper recognizer
#[derive(Clone, Debug)]
pub struct WhisperConfig {
    /// Path to the ggml model file
    pub model_path: PathBuf,

    /// Language to transcribe (None for auto-detection)
    pub language: Option<String>,

    /// Number of threads to use for transcription
    pub n_threads: i32,

    /// Seconds of new audio between partial hypotheses
    pub partial_interval: f32,

    /// Trailing silence that confirms an utterance (seconds)
    pub silence_threshold: f32,

    /// Utterances shorter than this are discarded (seconds)
    pub min_segment_duration: f32,

    /// Utterances are confirmed once they reach this length (seconds)
    pub max_segment_duration: f32,

    /// Speech probability threshold for the VAD
    pub vad_threshold: f32,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/ggml-base.en.bin"),
            language: Some("en".to_string()),
            n_threads: 4,
            partial_interval: 0.6,
            silence_threshold: 0.7,
            min_segment_duration: 0.3,
            max_segment_duration: 20.0,
            vad_threshold: 0.5,
        }
    }
}

fn seconds_to_samples(seconds: f32) -> usize {
    (seconds.max(0.0) * RECOGNIZER_SAMPLE_RATE as f32) as usize
}

/// Loaded Whisper model
struct WhisperEngine {
    config: WhisperConfig,
    context: WhisperContext,
}

impl WhisperEngine {
    fn new(config: WhisperConfig) -> Result<Self> {
        info!("Loading Whisper model from: {:?}", config.model_path);

        if !config.model_path.exists() {
            return Err(ZelnaError::ModelLoad(format!(
                "Model file not found: {:?}",
                config.model_path
            )));
        }

        let path = config
            .model_path
            .to_str()
            .ok_or_else(|| ZelnaError::ModelLoad("Invalid model path".to_string()))?;

        let context = WhisperContext::new_with_params(path, WhisperContextParameters::default())
            .map_err(|e| ZelnaError::ModelLoad(format!("Failed to load Whisper model: {:?}", e)))?;

        info!("Whisper model loaded successfully");
        Ok(Self { config, context })
    }

    fn transcribe(&self, samples: &[f32]) -> Result<String> {
        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_n_threads(self.config.n_threads);
        params.set_translate(false);
        params.set_no_context(true);
        params.set_print_timestamps(false);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);

        if let Some(lang) = self.config.language.as_deref() {
            params.set_language(Some(lang));
        }

        let mut state = self.context.create_state().map_err(|e| {
            ZelnaError::Transcription(format!("Failed to create state: {:?}", e))
        })?;

        state
            .full(params, samples)
            .map_err(|e| ZelnaError::Transcription(format!("Transcription failed: {:?}", e)))?;

        let num_segments = state.full_n_segments().map_err(|e| {
            ZelnaError::Transcription(format!("Failed to get segments: {:?}", e))
        })?;

        let mut text = String::new();
        for i in 0..num_segments {
            let segment = state.full_get_segment_text(i).map_err(|e| {
                ZelnaError::Transcription(format!("Failed to get segment text: {:?}", e))
            })?;
            text.push_str(&segment);
        }

        Ok(text.trim().to_string())
    }
}

/// Streaming adapter over Whisper
pub struct WhisperRecognizer {
    engine: WhisperEngine,
    resampler: StreamResampler,
    vad: SpeechDetector,
    utterance: Vec<f32>,
    in_speech: bool,
    silence_samples: usize,
    since_partial: usize,
    timings: TimingTracker,
}

impl WhisperRecognizer {
    /// Load the model and prepare for audio captured at `input_rate`
    pub fn new(config: WhisperConfig, input_rate: u32) -> Result<Self> {
        let vad = SpeechDetector::new(config.vad_threshold)?;
        let resampler = StreamResampler::new(input_rate, RECOGNIZER_SAMPLE_RATE)?;
        let engine = WhisperEngine::new(config)?;

        Ok(Self {
            engine,
            resampler,
            vad,
            utterance: Vec::with_capacity(RECOGNIZER_SAMPLE_RATE as usize * 10),
            in_speech: false,
            silence_samples: 0,
            since_partial: 0,
            timings: TimingTracker::new("whisper pass", 20),
        })
    }

    /// Defer model loading to the assembler thread
    pub fn factory(config: WhisperConfig, input_rate: u32) -> RecognizerFactory {
        Box::new(move || {
            let recognizer = WhisperRecognizer::new(config, input_rate)?;
            Ok(Box::new(recognizer) as Box<dyn Recognizer>)
        })
    }

    fn config(&self) -> &WhisperConfig {
        &self.engine.config
    }

    fn timed_transcribe(&mut self) -> Result<String> {
        let started = Instant::now();
        let text = self.engine.transcribe(&self.utterance)?;
        self.timings.record(started.elapsed());
        debug!("{}", self.timings.summary());
        Ok(text)
    }

    /// Transcribe and clear the current utterance
    fn confirm(&mut self) -> Result<Option<String>> {
        let long_enough =
            self.utterance.len() >= seconds_to_samples(self.config().min_segment_duration);

        let text = if long_enough {
            self.timed_transcribe()?
        } else {
            debug!("Utterance too short ({} samples), discarding", self.utterance.len());
            String::new()
        };

        self.clear_utterance();
        Ok(if text.is_empty() { None } else { Some(text) })
    }

    fn clear_utterance(&mut self) {
        self.utterance.clear();
        self.in_speech = false;
        self.silence_samples = 0;
        self.since_partial = 0;
    }
}

impl Recognizer for WhisperRecognizer {
    fn accept(&mut self, samples: &[f32]) -> Result<Recognition> {
        let resampled = self.resampler.process(samples)?;
        if resampled.is_empty() {
            return Ok(Recognition::Pending);
        }

        for is_speech in self.vad.feed(&resampled) {
            if is_speech {
                self.in_speech = true;
                self.silence_samples = 0;
            } else if self.in_speech {
                self.silence_samples += VAD_CHUNK;
            }
        }

        self.utterance.extend_from_slice(&resampled);
        self.since_partial += resampled.len();

        if !self.in_speech {
            let excess = self.utterance.len().saturating_sub(PRE_ROLL_SAMPLES);
            self.utterance.drain(..excess);
            return Ok(Recognition::Pending);
        }

        let silence_done = self.silence_samples >= seconds_to_samples(self.config().silence_threshold);
        let too_long = self.utterance.len() >= seconds_to_samples(self.config().max_segment_duration);
        if silence_done || too_long {
            return Ok(match self.confirm()? {
                Some(text) => Recognition::Final(text),
                None => Recognition::Pending,
            });
        }

        if self.since_partial >= seconds_to_samples(self.config().partial_interval) {
            self.since_partial = 0;
            let text = self.timed_transcribe()?;
            if !text.is_empty() {
                return Ok(Recognition::Partial(text));
            }
        }

        Ok(Recognition::Pending)
    }

    fn flush(&mut self) -> Result<Option<String>> {
        if self.in_speech {
            self.confirm()
        } else {
            self.clear_utterance();
            Ok(None)
        }
    }

    fn reset(&mut self) {
        self.clear_utterance();
        self.resampler.reset();
        self.vad.reset();
    }
}
