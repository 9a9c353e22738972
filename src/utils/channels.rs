use crate::messages::AssistantEvent;
use crate::speech::assembler::AudioFrame;
use crossbeam_channel::{bounded, Receiver, Sender};

/// Default depth of the fan-in event channel
pub const EVENT_QUEUE_DEPTH: usize = 256;

/// Single ordered fan-in channel read only by the turn coordinator
pub struct EventBus {
    pub event_tx: Sender<AssistantEvent>,
    pub event_rx: Receiver<AssistantEvent>,
}

impl EventBus {
    pub fn new(buffer_size: usize) -> Self {
        let (event_tx, event_rx) = bounded(buffer_size);
        Self { event_tx, event_rx }
    }

    /// A publisher handle for one worker
    pub fn publisher(&self) -> Sender<AssistantEvent> {
        self.event_tx.clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_QUEUE_DEPTH)
    }
}

/// Bounded queue between the real-time capture callback and the assembler
pub struct AudioChannels {
    pub frame_tx: Sender<AudioFrame>,
    pub frame_rx: Receiver<AudioFrame>,
}

impl AudioChannels {
    pub fn new(buffer_size: usize) -> Self {
        let (frame_tx, frame_rx) = bounded(buffer_size);
        Self { frame_tx, frame_rx }
    }
}

impl Default for AudioChannels {
    fn default() -> Self {
        Self::new(crate::audio::CaptureConfig::default().queue_depth())
    }
}
