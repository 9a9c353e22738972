//! Streaming recognizer contract
//!
//! The assembler feeds raw mono frames at the capture rate and gets back
//! either a confirmed fragment, a refreshed partial, or nothing yet.

use crate::Result;

/// Outcome of feeding one frame to a recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recognition {
    /// A confirmed fragment; it will not be revised
    Final(String),
    /// The current provisional hypothesis for unconfirmed audio
    Partial(String),
    /// Nothing new to report
    Pending,
}

/// A speech recognition engine driven frame by frame
pub trait Recognizer: Send {
    /// Consume one frame of mono samples
    fn accept(&mut self, samples: &[f32]) -> Result<Recognition>;

    /// Confirm whatever audio is still buffered, if it holds speech
    fn flush(&mut self) -> Result<Option<String>>;

    /// Forget all buffered audio and hypotheses
    fn reset(&mut self);
}

/// Builds the recognizer inside the assembler thread
pub type RecognizerFactory = Box<dyn FnOnce() -> Result<Box<dyn Recognizer>> + Send>;
