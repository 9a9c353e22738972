//! Transcript assembler worker tests
//!
//! A scripted recognizer stands in for Whisper so the tests exercise the
//! arm/disarm/reset protocol and the generation gate end to end.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use zelna::messages::{AssistantEvent, TranscriptEvent, TranscriptKind};
use zelna::speech::{
    AudioFrame, Recognition, Recognizer, RecognizerFactory, TranscriptAssembler,
};
use zelna::utils::{AudioChannels, EventBus};
use zelna::{Result, ZelnaError};

const TIMEOUT: Duration = Duration::from_secs(2);

struct ScriptedRecognizer {
    script: VecDeque<Recognition>,
    on_flush: Option<String>,
    flush_delay: Duration,
    accepted: Arc<AtomicUsize>,
}

impl Recognizer for ScriptedRecognizer {
    fn accept(&mut self, _samples: &[f32]) -> Result<Recognition> {
        self.accepted.fetch_add(1, Ordering::SeqCst);
        Ok(self.script.pop_front().unwrap_or(Recognition::Pending))
    }

    fn flush(&mut self) -> Result<Option<String>> {
        // Stands in for a slow Whisper pass
        std::thread::sleep(self.flush_delay);
        Ok(self.on_flush.take())
    }

    fn reset(&mut self) {}
}

fn scripted(
    script: Vec<Recognition>,
    on_flush: Option<&str>,
    accepted: Arc<AtomicUsize>,
) -> RecognizerFactory {
    slow_flush(script, on_flush, Duration::ZERO, accepted)
}

fn slow_flush(
    script: Vec<Recognition>,
    on_flush: Option<&str>,
    flush_delay: Duration,
    accepted: Arc<AtomicUsize>,
) -> RecognizerFactory {
    let on_flush = on_flush.map(str::to_string);
    Box::new(move || {
        Ok(Box::new(ScriptedRecognizer {
            script: script.into(),
            on_flush,
            flush_delay,
            accepted,
        }) as Box<dyn Recognizer>)
    })
}

/// Final texts published until the bus goes quiet
fn finals(rx: &Receiver<AssistantEvent>) -> Vec<String> {
    let mut finals = Vec::new();
    while let Ok(event) = rx.recv_timeout(Duration::from_millis(600)) {
        if let AssistantEvent::Transcript(event) = event {
            if event.kind == TranscriptKind::Final {
                finals.push(event.text);
            }
        }
    }
    finals
}

fn next_transcript(rx: &Receiver<AssistantEvent>) -> TranscriptEvent {
    match rx.recv_timeout(TIMEOUT) {
        Ok(AssistantEvent::Transcript(event)) => event,
        other => panic!("expected transcript event, got {:?}", other),
    }
}

fn frame(generation: u64) -> AudioFrame {
    AudioFrame::new(generation, vec![0.0; 160])
}

#[test]
fn test_partials_then_final_on_disarm() {
    let bus = EventBus::new(64);
    let accepted = Arc::new(AtomicUsize::new(0));
    let factory = scripted(
        vec![
            Recognition::Partial("h".into()),
            Recognition::Partial("hello".into()),
        ],
        None,
        Arc::clone(&accepted),
    );
    let assembler =
        TranscriptAssembler::start(factory, AudioChannels::new(16), bus.publisher()).unwrap();

    let generation = assembler.arm().unwrap();
    let frames = assembler.frame_sender();
    frames.send(frame(generation)).unwrap();
    frames.send(frame(generation)).unwrap();

    assert_eq!(next_transcript(&bus.event_rx), TranscriptEvent::partial("h"));
    assert_eq!(next_transcript(&bus.event_rx), TranscriptEvent::partial("hello"));

    assembler.disarm().unwrap();
    assert_eq!(
        next_transcript(&bus.event_rx),
        TranscriptEvent::final_text("hello")
    );
    assert_eq!(next_transcript(&bus.event_rx), TranscriptEvent::partial(""));

    assembler.shutdown();
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
}

#[test]
fn test_finals_are_joined_and_flushed() {
    let bus = EventBus::new(64);
    let factory = scripted(
        vec![
            Recognition::Final("turn on".into()),
            Recognition::Partial("on the".into()),
        ],
        Some("the lights"),
        Arc::new(AtomicUsize::new(0)),
    );
    let assembler =
        TranscriptAssembler::start(factory, AudioChannels::new(16), bus.publisher()).unwrap();

    let generation = assembler.arm().unwrap();
    let frames = assembler.frame_sender();
    frames.send(frame(generation)).unwrap();
    frames.send(frame(generation)).unwrap();

    // The echoed "on" is not doubled
    assert_eq!(
        next_transcript(&bus.event_rx),
        TranscriptEvent::partial("turn on the")
    );

    assembler.disarm().unwrap();
    assert_eq!(
        next_transcript(&bus.event_rx),
        TranscriptEvent::final_text("turn on the lights")
    );
    assembler.shutdown();
}

#[test]
fn test_silent_interval_emits_no_final() {
    let bus = EventBus::new(64);
    let factory = scripted(Vec::new(), None, Arc::new(AtomicUsize::new(0)));
    let assembler =
        TranscriptAssembler::start(factory, AudioChannels::new(16), bus.publisher()).unwrap();

    assembler.arm().unwrap();
    assembler.disarm().unwrap();

    let event = next_transcript(&bus.event_rx);
    assert_eq!(event.kind, TranscriptKind::Partial);
    assert!(event.text.is_empty());
    assert!(bus.event_rx.recv_timeout(Duration::from_millis(200)).is_err());

    // Disarming while idle is only a reset
    assembler.disarm().unwrap();
    assembler.reset().unwrap();
    assembler.reset().unwrap();
    assert!(bus.event_rx.recv_timeout(Duration::from_millis(200)).is_err());

    assembler.shutdown();
}

#[test]
fn test_stale_generation_frames_are_dropped() {
    let bus = EventBus::new(64);
    let accepted = Arc::new(AtomicUsize::new(0));
    let factory = scripted(
        vec![Recognition::Partial("fresh".into())],
        None,
        Arc::clone(&accepted),
    );
    let assembler =
        TranscriptAssembler::start(factory, AudioChannels::new(16), bus.publisher()).unwrap();

    let old = assembler.arm().unwrap();
    assembler.disarm().unwrap();
    assert_eq!(next_transcript(&bus.event_rx), TranscriptEvent::partial(""));

    let current = assembler.arm().unwrap();
    assert!(current > old);

    let frames = assembler.frame_sender();
    frames.send(frame(old)).unwrap();
    frames.send(frame(current)).unwrap();

    assert_eq!(next_transcript(&bus.event_rx), TranscriptEvent::partial("fresh"));
    assert_eq!(accepted.load(Ordering::SeqCst), 1);

    assembler.shutdown();
}

#[test]
fn test_audio_queued_during_flush_reaches_next_interval() {
    let bus = EventBus::new(64);
    let accepted = Arc::new(AtomicUsize::new(0));
    let factory = slow_flush(
        vec![
            Recognition::Final("first".into()),
            Recognition::Partial("second".into()),
        ],
        None,
        Duration::from_millis(300),
        Arc::clone(&accepted),
    );
    let assembler =
        TranscriptAssembler::start(factory, AudioChannels::new(16), bus.publisher()).unwrap();
    let frames = assembler.frame_sender();

    let first = assembler.arm().unwrap();
    frames.send(frame(first)).unwrap();
    assembler.disarm().unwrap();

    // The worker is still flushing the first interval
    std::thread::sleep(Duration::from_millis(50));
    let second = assembler.arm().unwrap();
    for _ in 0..3 {
        frames.send(frame(second)).unwrap();
    }
    assembler.disarm().unwrap();

    assert_eq!(finals(&bus.event_rx), vec!["first", "second"]);
    assert_eq!(accepted.load(Ordering::SeqCst), 4);

    assembler.shutdown();
}

#[test]
fn test_frames_queued_before_release_are_transcribed() {
    let bus = EventBus::new(64);
    let accepted = Arc::new(AtomicUsize::new(0));
    let factory = slow_flush(
        vec![
            Recognition::Partial("turn".into()),
            Recognition::Partial("turn on".into()),
            Recognition::Partial("turn on the lights".into()),
        ],
        None,
        Duration::ZERO,
        Arc::clone(&accepted),
    );
    let assembler =
        TranscriptAssembler::start(factory, AudioChannels::new(16), bus.publisher()).unwrap();
    let frames = assembler.frame_sender();

    let generation = assembler.arm().unwrap();
    for _ in 0..3 {
        frames.send(frame(generation)).unwrap();
    }
    assembler.disarm().unwrap();

    assert_eq!(finals(&bus.event_rx), vec!["turn on the lights"]);
    assert_eq!(accepted.load(Ordering::SeqCst), 3);

    assembler.shutdown();
}

#[test]
fn test_recognizer_failure_disables_listening() {
    let bus = EventBus::new(64);
    let factory: RecognizerFactory =
        Box::new(|| Err(ZelnaError::ModelLoad("Model file not found".into())));
    let assembler =
        TranscriptAssembler::start(factory, AudioChannels::new(16), bus.publisher()).unwrap();

    let event = next_transcript(&bus.event_rx);
    assert_eq!(event.kind, TranscriptKind::Info);
    assert!(event.text.starts_with("Voice input unavailable"));

    // The alive flag drops just before the thread returns
    for _ in 0..100 {
        if !assembler.is_alive() {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(!assembler.is_alive());
    assert!(assembler.arm().is_err());

    assembler.shutdown();
}
