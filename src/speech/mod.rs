//! Speech recognition and transcript assembly
//!
//! This module provides:
//! - The [`Recognizer`] codec contract
//! - A Whisper-backed streaming recognizer
//! - The transcript assembler worker that merges partial and final text

pub mod assembler;
pub mod recognizer;
pub mod whisper;

pub use assembler::{AudioFrame, ListenGate, TranscriptAssembler, TranscriptMerger};
pub use recognizer::{Recognition, Recognizer, RecognizerFactory};
pub use whisper::{WhisperConfig, WhisperRecognizer};
