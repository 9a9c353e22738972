//! Transcript assembler
//!
//! Turns recognizer output for one armed interval into partial updates and a
//! single final utterance. Audio frames carry the generation of the interval
//! they were captured in; arming, disarming and resetting move the
//! [`ListenGate`] so frames from a stale interval are dropped without locks.

use crate::messages::{AssistantEvent, TranscriptEvent};
use crate::speech::recognizer::{Recognition, Recognizer, RecognizerFactory};
use crate::utils::{AudioChannels, WorkerThread};
use crate::{Result, ZelnaError};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// One capture callback's worth of mono samples
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub generation: u64,
    pub samples: Vec<f32>,
}

impl AudioFrame {
    pub fn new(generation: u64, samples: Vec<f32>) -> Self {
        Self {
            generation,
            samples,
        }
    }
}

/// Armed flag plus generation counter shared with the capture callback
#[derive(Debug, Default)]
pub struct ListenGate {
    armed: AtomicBool,
    generation: AtomicU64,
    overflowed: AtomicU64,
}

impl ListenGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new interval and return its generation
    pub fn arm(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.armed.store(true, Ordering::SeqCst);
        generation
    }

    /// Close the current interval and return its generation
    pub fn disarm(&self) -> u64 {
        self.armed.store(false, Ordering::SeqCst);
        self.generation.load(Ordering::SeqCst)
    }

    /// Invalidate every frame captured so far
    pub fn invalidate(&self) -> u64 {
        self.armed.store(false, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Generation to tag a frame with, or `None` while disarmed
    pub fn open_generation(&self) -> Option<u64> {
        if self.armed.load(Ordering::SeqCst) {
            Some(self.generation.load(Ordering::SeqCst))
        } else {
            None
        }
    }

    /// Count a frame the capture callback could not queue
    pub fn record_overflow(&self) {
        self.overflowed.fetch_add(1, Ordering::Relaxed);
    }

    /// Frames lost to a full queue since the last call
    pub fn take_overflow(&self) -> u64 {
        self.overflowed.swap(0, Ordering::Relaxed)
    }
}

/// Merges confirmed fragments and the running partial into one utterance.
///
/// The boundary between confirmed text and the next partial is joined with a
/// single space. Recognizers often echo the last confirmed word at the start
/// of the next hypothesis; when the partial opens with that word it is
/// dropped. This is a prefix heuristic, not an exact alignment.
#[derive(Debug, Clone, Default)]
pub struct TranscriptMerger {
    final_text: String,
    last_partial: String,
    last_final_word: String,
    last_combined: String,
}

impl TranscriptMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_final(&mut self, fragment: &str) {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return;
        }

        if !self.final_text.is_empty() && !self.final_text.ends_with(char::is_whitespace) {
            self.final_text.push(' ');
        }
        self.final_text.push_str(fragment);

        self.last_partial.clear();
        self.last_combined.clear();
        self.last_final_word = fragment
            .split_whitespace()
            .last()
            .unwrap_or_default()
            .to_string();
    }

    /// Returns the combined text to display when the partial changed
    pub fn on_partial(&mut self, partial: &str) -> Option<String> {
        if partial == self.last_partial {
            return None;
        }
        self.last_partial = partial.to_string();
        self.last_combined = self.combine(partial);
        Some(self.last_combined.clone())
    }

    fn combine(&self, partial: &str) -> String {
        let mut tail = partial.trim_start();
        if !self.last_final_word.is_empty() {
            if let Some(rest) = tail.strip_prefix(self.last_final_word.as_str()) {
                if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                    tail = rest.trim_start();
                }
            }
        }

        let mut combined = self.final_text.clone();
        if !combined.is_empty() && !combined.ends_with(char::is_whitespace) && !tail.is_empty() {
            combined.push(' ');
        }
        combined.push_str(tail);
        combined
    }

    /// The full utterance for this interval, if anything was heard
    pub fn finish(&self) -> Option<String> {
        let text = if self.last_partial.is_empty() {
            self.final_text.trim()
        } else {
            self.last_combined.trim()
        };

        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }

    pub fn final_text(&self) -> &str {
        &self.final_text
    }

    pub fn reset(&mut self) {
        self.final_text.clear();
        self.last_partial.clear();
        self.last_final_word.clear();
        self.last_combined.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.final_text.is_empty() && self.last_partial.is_empty()
    }
}

#[derive(Debug)]
enum AssemblerCommand {
    Arm { generation: u64 },
    Disarm { generation: u64 },
    Reset { generation: u64 },
    Shutdown,
}

/// Handle to the transcript assembler worker
pub struct TranscriptAssembler {
    gate: Arc<ListenGate>,
    command_tx: Sender<AssemblerCommand>,
    frame_tx: Sender<AudioFrame>,
    alive: Arc<AtomicBool>,
    worker: Option<WorkerThread>,
}

impl TranscriptAssembler {
    /// Start the processing thread.
    ///
    /// The recognizer is built on that thread; if it fails, an info
    /// transcript event is published and the worker exits.
    pub fn start(
        factory: RecognizerFactory,
        audio: AudioChannels,
        event_tx: Sender<AssistantEvent>,
    ) -> Result<Self> {
        let gate = Arc::new(ListenGate::new());
        let (command_tx, command_rx) = bounded(32);
        let alive = Arc::new(AtomicBool::new(true));

        let worker_gate = Arc::clone(&gate);
        let worker_alive = Arc::clone(&alive);
        let frame_rx = audio.frame_rx;

        let worker = WorkerThread::spawn("transcript-assembler", move |stop| {
            info!("Transcript assembler starting");

            let recognizer = match factory() {
                Ok(recognizer) => recognizer,
                Err(e) => {
                    error!("Failed to initialize recognizer: {}", e);
                    worker_alive.store(false, Ordering::SeqCst);
                    let _ = event_tx.send(
                        TranscriptEvent::info(format!(
                            "Voice input unavailable: {}",
                            e.user_message()
                        ))
                        .into(),
                    );
                    return;
                }
            };

            let mut worker = AssemblerWorker {
                recognizer,
                merger: TranscriptMerger::new(),
                gate: worker_gate,
                frame_rx,
                event_tx,
                active: None,
                last_closed: 0,
                held: None,
            };
            worker.run(&command_rx, &stop);

            worker_alive.store(false, Ordering::SeqCst);
            info!("Transcript assembler stopped");
        })?;

        Ok(Self {
            gate,
            command_tx,
            frame_tx: audio.frame_tx,
            alive,
            worker: Some(worker),
        })
    }

    /// Gate shared with the capture callback
    pub fn gate(&self) -> Arc<ListenGate> {
        Arc::clone(&self.gate)
    }

    /// Producer side of the frame queue
    pub fn frame_sender(&self) -> Sender<AudioFrame> {
        self.frame_tx.clone()
    }

    pub fn arm(&self) -> Result<u64> {
        let generation = self.gate.arm();
        self.command(AssemblerCommand::Arm { generation })?;
        Ok(generation)
    }

    pub fn disarm(&self) -> Result<()> {
        let generation = self.gate.disarm();
        self.command(AssemblerCommand::Disarm { generation })
    }

    /// Clear accumulated text and drop buffered audio
    pub fn reset(&self) -> Result<()> {
        let generation = self.gate.invalidate();
        self.command(AssemblerCommand::Reset { generation })
    }

    /// False once the worker has exited (e.g. recognizer failed to load)
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn command(&self, command: AssemblerCommand) -> Result<()> {
        if !self.is_alive() {
            return Err(ZelnaError::Channel("transcript assembler is not running".into()));
        }
        self.command_tx
            .send(command)
            .map_err(|e| ZelnaError::Channel(format!("Failed to send assembler command: {}", e)))
    }

    /// Stop the worker and wait for it
    pub fn shutdown(mut self) {
        self.gate.invalidate();
        let _ = self.command_tx.send(AssemblerCommand::Shutdown);
        if let Some(worker) = self.worker.take() {
            worker.stop_and_join();
        }
    }
}

struct AssemblerWorker {
    recognizer: Box<dyn Recognizer>,
    merger: TranscriptMerger,
    gate: Arc<ListenGate>,
    frame_rx: Receiver<AudioFrame>,
    event_tx: Sender<AssistantEvent>,
    /// Generation of the interval being transcribed
    active: Option<u64>,
    /// Frames at or below this generation belong to closed intervals
    last_closed: u64,
    /// Frame taken off the queue but not yet processed
    held: Option<AudioFrame>,
}

impl AssemblerWorker {
    fn run(&mut self, command_rx: &Receiver<AssemblerCommand>, stop: &AtomicBool) {
        let frame_rx = self.frame_rx.clone();
        loop {
            if stop.load(Ordering::SeqCst) {
                break;
            }
            self.report_overflow();

            // Pending control takes priority over queued audio
            while let Ok(command) = command_rx.try_recv() {
                if !self.handle_command(command) {
                    return;
                }
            }

            if let Some(frame) = self.held.take() {
                self.handle_frame(frame);
                continue;
            }

            select! {
                recv(command_rx) -> command => match command {
                    Ok(command) => {
                        if !self.handle_command(command) {
                            return;
                        }
                    }
                    Err(_) => return,
                },
                recv(frame_rx) -> frame => match frame {
                    // Control issued before this frame applies first
                    Ok(frame) => self.held = Some(frame),
                    Err(_) => return,
                },
                default(Duration::from_millis(100)) => {}
            }
        }
    }

    fn handle_command(&mut self, command: AssemblerCommand) -> bool {
        match command {
            AssemblerCommand::Arm { generation } => {
                // Audio can reach the worker ahead of its arm command
                if self.active != Some(generation) && generation > self.last_closed {
                    self.begin_interval(generation);
                }
            }
            AssemblerCommand::Disarm { generation } => {
                if self.active == Some(generation) {
                    self.catch_up(generation);
                    self.finish_interval();
                }
                self.close_through(generation);
            }
            AssemblerCommand::Reset { generation } => {
                self.merger.reset();
                self.recognizer.reset();
                self.active = None;
                self.close_through(generation);
            }
            AssemblerCommand::Shutdown => return false,
        }
        true
    }

    fn begin_interval(&mut self, generation: u64) {
        self.merger.reset();
        self.recognizer.reset();
        self.active = Some(generation);
        debug!("Armed interval {}", generation);
    }

    fn handle_frame(&mut self, frame: AudioFrame) {
        if frame.generation <= self.last_closed {
            return;
        }
        match self.active {
            Some(active) if active == frame.generation => {}
            None => self.begin_interval(frame.generation),
            Some(active) => {
                debug!(
                    "Frame of interval {} while {} is open, dropped",
                    frame.generation, active
                );
                return;
            }
        }
        self.feed(&frame.samples);
    }

    fn feed(&mut self, samples: &[f32]) {
        match self.recognizer.accept(samples) {
            Ok(Recognition::Final(fragment)) => {
                debug!("Final fragment: {:?}", fragment);
                self.merger.on_final(&fragment);
            }
            Ok(Recognition::Partial(partial)) => {
                if let Some(combined) = self.merger.on_partial(&partial) {
                    self.publish(TranscriptEvent::partial(combined));
                }
            }
            Ok(Recognition::Pending) => {}
            Err(e) => warn!("Recognizer error: {}", e),
        }
    }

    fn next_queued(&mut self) -> Option<AudioFrame> {
        self.held.take().or_else(|| self.frame_rx.try_recv().ok())
    }

    /// Feed audio of `generation` still sitting in the queue
    fn catch_up(&mut self, generation: u64) {
        while let Some(frame) = self.next_queued() {
            if frame.generation > generation {
                self.held = Some(frame);
                break;
            }
            if frame.generation == generation {
                self.feed(&frame.samples);
            }
        }
    }

    fn finish_interval(&mut self) {
        match self.recognizer.flush() {
            Ok(Some(fragment)) => self.merger.on_final(&fragment),
            Ok(None) => {}
            Err(e) => warn!("Recognizer flush failed: {}", e),
        }

        if let Some(text) = self.merger.finish() {
            info!("Utterance: {:?}", text);
            self.publish(TranscriptEvent::final_text(text));
        }
        self.publish(TranscriptEvent::partial(""));
        self.merger.reset();
        self.recognizer.reset();
    }

    /// Close every interval up to `generation` and drop its queued frames
    fn close_through(&mut self, generation: u64) {
        self.last_closed = self.last_closed.max(generation);
        if self.active.is_some_and(|active| active <= self.last_closed) {
            self.active = None;
        }

        let mut dropped = 0;
        while let Some(frame) = self.next_queued() {
            if frame.generation > self.last_closed {
                self.held = Some(frame);
                break;
            }
            dropped += 1;
        }
        if dropped > 0 {
            debug!("Discarded {} queued frames", dropped);
        }
    }

    fn report_overflow(&self) {
        let lost = self.gate.take_overflow();
        if lost > 0 {
            warn!("Capture queue full, {} frames of audio lost", lost);
        }
    }

    fn publish(&self, event: TranscriptEvent) {
        let _ = self.event_tx.send(event.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragments_join_with_single_space() {
        let mut merger = TranscriptMerger::new();
        merger.on_final("  turn on ");
        merger.on_final("the lights");
        merger.on_final("please");
        assert_eq!(merger.finish().as_deref(), Some("turn on the lights please"));
    }

    #[test]
    fn test_partial_extends_final() {
        let mut merger = TranscriptMerger::new();
        merger.on_final("hello");
        assert_eq!(
            merger.on_partial("there").as_deref(),
            Some("hello there")
        );
        assert_eq!(merger.finish().as_deref(), Some("hello there"));
    }

    #[test]
    fn test_echoed_boundary_word_dropped() {
        let mut merger = TranscriptMerger::new();
        merger.on_final("what is the weather");
        assert_eq!(
            merger.on_partial("weather like today").as_deref(),
            Some("what is the weather like today")
        );
        // A word that merely starts with the same letters is kept
        assert_eq!(
            merger.on_partial("weatherman said").as_deref(),
            Some("what is the weather weatherman said")
        );
    }

    #[test]
    fn test_unchanged_partial_not_reemitted() {
        let mut merger = TranscriptMerger::new();
        assert!(merger.on_partial("h").is_some());
        assert!(merger.on_partial("h").is_none());
        assert_eq!(merger.on_partial("hello").as_deref(), Some("hello"));
    }

    #[test]
    fn test_final_clears_partial() {
        let mut merger = TranscriptMerger::new();
        merger.on_partial("hel");
        merger.on_final("hello");
        assert_eq!(merger.finish().as_deref(), Some("hello"));
    }

    #[test]
    fn test_empty_interval_has_no_final() {
        let merger = TranscriptMerger::new();
        assert!(merger.finish().is_none());
        assert!(merger.is_empty());
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut merger = TranscriptMerger::new();
        merger.on_final("one");
        merger.on_partial("two");
        merger.reset();
        let once = format!("{:?}", merger);
        merger.reset();
        assert_eq!(format!("{:?}", merger), once);
        assert!(merger.is_empty());
        assert_eq!(merger.final_text(), "");
    }

    #[test]
    fn test_gate_generations() {
        let gate = ListenGate::new();
        assert_eq!(gate.open_generation(), None);

        let first = gate.arm();
        assert_eq!(gate.open_generation(), Some(first));
        assert_eq!(gate.disarm(), first);
        assert_eq!(gate.open_generation(), None);

        let invalidated = gate.invalidate();
        assert!(invalidated > first);
        let second = gate.arm();
        assert!(second > invalidated);
    }

    #[test]
    fn test_gate_counts_overflow() {
        let gate = ListenGate::new();
        assert_eq!(gate.take_overflow(), 0);

        gate.record_overflow();
        gate.record_overflow();
        assert_eq!(gate.take_overflow(), 2);
        assert_eq!(gate.take_overflow(), 0);
    }
}
