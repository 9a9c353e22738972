//! Turn coordinator tests
//!
//! The workers are replaced by recording fakes, so each test drives the
//! state machine with events and inspects the commands it issued.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use uuid::Uuid;
use zelna::display::{DisplayConfig, DisplaySink, ScrollDirection};
use zelna::integration::{Listener, Outbox, Player, TurnCoordinator, GENERATING_TEXT};
use zelna::messages::{
    AssistantEvent, Button, ButtonEvent, ConversationEntry, PlaybackEvent, SenderKind,
    SessionEvent, TranscriptEvent, WorkerSource,
};
use zelna::{Result, ZelnaError};

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Arm,
    Disarm,
    Play(Vec<u8>),
    Stop,
    Send(String),
}

#[derive(Debug, Clone, PartialEq)]
enum DisplayOp {
    Append(String, SenderKind),
    Partial(String),
    Scroll(ScrollDirection, i32),
    Clear,
}

type Journal<T> = Arc<Mutex<Vec<T>>>;

struct FakeListener(Journal<Command>);

impl Listener for FakeListener {
    fn arm(&mut self) -> Result<()> {
        self.0.lock().push(Command::Arm);
        Ok(())
    }

    fn disarm(&mut self) -> Result<()> {
        self.0.lock().push(Command::Disarm);
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }
}

struct FakePlayer {
    commands: Journal<Command>,
    next_clip: u64,
    playing: bool,
}

impl Player for FakePlayer {
    fn play(&mut self, audio: &[u8]) -> Result<u64> {
        self.commands.lock().push(Command::Play(audio.to_vec()));
        self.next_clip += 1;
        self.playing = true;
        Ok(self.next_clip)
    }

    fn stop(&mut self) -> bool {
        self.commands.lock().push(Command::Stop);
        std::mem::replace(&mut self.playing, false)
    }

    fn is_playing(&self) -> bool {
        self.playing
    }
}

struct FakeOutbox {
    commands: Journal<Command>,
    sent: Journal<Uuid>,
    connected: bool,
}

impl Outbox for FakeOutbox {
    fn send_message(&mut self, text: &str) -> Result<Uuid> {
        if !self.connected {
            return Err(ZelnaError::Channel("session worker gone".into()));
        }
        self.commands.lock().push(Command::Send(text.to_string()));
        let id = Uuid::new_v4();
        self.sent.lock().push(id);
        Ok(id)
    }
}

struct RecordingDisplay(Journal<DisplayOp>);

impl DisplaySink for RecordingDisplay {
    fn append_message(&mut self, text: &str, sender: SenderKind) {
        self.0.lock().push(DisplayOp::Append(text.to_string(), sender));
    }

    fn update_partial(&mut self, text: &str) {
        self.0.lock().push(DisplayOp::Partial(text.to_string()));
    }

    fn scroll(&mut self, direction: ScrollDirection, amount: i32) {
        self.0.lock().push(DisplayOp::Scroll(direction, amount));
    }

    fn clear_history(&mut self) {
        self.0.lock().push(DisplayOp::Clear);
    }
}

struct Harness {
    coordinator: TurnCoordinator<FakeListener, FakePlayer, FakeOutbox>,
    commands: Journal<Command>,
    display: Journal<DisplayOp>,
    sent: Journal<Uuid>,
}

impl Harness {
    fn new() -> Self {
        Self::with_outbox(true)
    }

    fn with_outbox(connected: bool) -> Self {
        let commands: Journal<Command> = Arc::default();
        let display: Journal<DisplayOp> = Arc::default();
        let sent: Journal<Uuid> = Arc::default();

        let coordinator = TurnCoordinator::new(
            Some(FakeListener(Arc::clone(&commands))),
            FakePlayer {
                commands: Arc::clone(&commands),
                next_clip: 0,
                playing: false,
            },
            FakeOutbox {
                commands: Arc::clone(&commands),
                sent: Arc::clone(&sent),
                connected,
            },
            Box::new(RecordingDisplay(Arc::clone(&display))),
            &DisplayConfig::default(),
            Duration::ZERO,
        );

        Self {
            coordinator,
            commands,
            display,
            sent,
        }
    }

    fn send(&mut self, event: impl Into<AssistantEvent>) {
        assert!(self.coordinator.handle(event.into()));
    }

    fn press(&mut self, button: Button) {
        self.send(ButtonEvent::pressed(button));
    }

    fn release(&mut self, button: Button) {
        self.send(ButtonEvent::released(button));
    }

    fn commands(&self) -> Vec<Command> {
        self.commands.lock().clone()
    }

    fn last_display(&self) -> Option<DisplayOp> {
        self.display.lock().last().cloned()
    }

    fn arm_count(&self) -> usize {
        self.commands().iter().filter(|c| **c == Command::Arm).count()
    }

    /// Speak "hello" and leave the coordinator awaiting a reply
    fn ask_hello(&mut self) {
        self.press(Button::Power);
        self.send(TranscriptEvent::partial("hello"));
        self.release(Button::Power);
        self.send(TranscriptEvent::final_text("hello"));
        self.send(TranscriptEvent::partial(""));
    }
}

#[test]
fn test_end_to_end_turn() {
    let mut h = Harness::new();

    h.send(SessionEvent::HistorySnapshot(vec![ConversationEntry::peer("hi")]));
    assert_eq!(
        *h.display.lock(),
        vec![DisplayOp::Clear, DisplayOp::Append("hi".into(), SenderKind::Peer)]
    );
    assert_eq!(h.coordinator.log().len(), 1);

    h.press(Button::Power);
    assert!(h.coordinator.state().listening);
    h.send(TranscriptEvent::partial("h"));
    assert_eq!(h.last_display(), Some(DisplayOp::Partial("h".into())));
    h.send(TranscriptEvent::partial("hello"));
    assert_eq!(h.last_display(), Some(DisplayOp::Partial("hello".into())));
    h.release(Button::Power);
    assert!(!h.coordinator.state().listening);

    h.send(TranscriptEvent::final_text("hello"));
    h.send(TranscriptEvent::partial(""));

    let state = h.coordinator.state();
    assert!(state.awaiting_reply);
    assert_eq!(
        h.coordinator.log().last().map(|e| (e.sender, e.text.as_str())),
        Some((SenderKind::User, "hello"))
    );
    // The empty partial does not clobber the generating indicator
    assert_eq!(h.last_display(), Some(DisplayOp::Partial(GENERATING_TEXT.into())));

    h.send(SessionEvent::Reply {
        text: "hi there".into(),
        sender: SenderKind::Peer,
        audio: Some(b"X".to_vec()),
    });

    let state = h.coordinator.state();
    assert!(!state.awaiting_reply);
    assert_eq!(state.speaking, Some(1));
    assert_eq!(
        h.commands(),
        vec![
            Command::Arm,
            Command::Disarm,
            Command::Send("hello".into()),
            Command::Play(b"X".to_vec()),
        ]
    );

    let log = h.coordinator.log();
    assert_eq!(log.len(), 3);
    assert_eq!(log.count_of(SenderKind::Peer), 2);
    assert_eq!(log.last().map(|e| e.text.as_str()), Some("hi there"));
}

#[test]
fn test_power_does_not_arm_while_awaiting_reply() {
    let mut h = Harness::new();
    h.ask_hello();
    assert_eq!(h.arm_count(), 1);

    h.press(Button::Power);
    h.release(Button::Power);

    assert_eq!(h.arm_count(), 1);
    assert!(!h.coordinator.state().listening);
    assert!(h.coordinator.state().awaiting_reply);
}

#[test]
fn test_reply_without_audio_clears_awaiting() {
    let mut h = Harness::new();
    h.ask_hello();

    h.send(SessionEvent::Reply {
        text: "ok".into(),
        sender: SenderKind::Peer,
        audio: None,
    });

    assert!(!h.coordinator.state().awaiting_reply);
    assert_eq!(h.coordinator.state().speaking, None);
    assert!(!h.commands().iter().any(|c| matches!(c, Command::Play(_))));
}

#[test]
fn test_power_interrupts_playback_then_listens() {
    let mut h = Harness::new();
    h.ask_hello();
    h.send(SessionEvent::Reply {
        text: "a long answer".into(),
        sender: SenderKind::Peer,
        audio: Some(vec![1, 2, 3]),
    });

    h.press(Button::Power);

    let commands = h.commands();
    assert_eq!(
        &commands[commands.len() - 2..],
        &[Command::Stop, Command::Arm]
    );
    assert_eq!(h.coordinator.state().speaking, None);
    assert!(h.coordinator.state().listening);

    // The stop notice for the interrupted clip changes nothing
    h.send(PlaybackEvent::Stopped { clip: 1 });
    assert!(h.coordinator.state().listening);
}

#[test]
fn test_stale_finish_keeps_newer_clip_speaking() {
    let mut h = Harness::new();
    for text in ["first", "second"] {
        h.send(SessionEvent::Reply {
            text: text.into(),
            sender: SenderKind::Peer,
            audio: Some(vec![0]),
        });
    }
    assert_eq!(h.coordinator.state().speaking, Some(2));

    h.send(PlaybackEvent::Stopped { clip: 1 });
    assert_eq!(h.coordinator.state().speaking, Some(2));

    h.send(PlaybackEvent::Finished { clip: 2 });
    assert_eq!(h.coordinator.state().speaking, None);
}

#[test]
fn test_send_failure_clears_awaiting_with_one_notice() {
    let mut h = Harness::new();
    h.ask_hello();
    let request_id = h.sent.lock()[0];

    h.send(SessionEvent::SendFailed {
        request_id,
        attempts: 0,
        reason: "not connected".into(),
    });

    assert!(!h.coordinator.state().awaiting_reply);
    assert_eq!(h.coordinator.log().count_of(SenderKind::Info), 1);
    assert_eq!(
        h.coordinator.log().last().map(|entry| entry.text.as_str()),
        Some("Message not delivered: not connected")
    );

    // Listening works again
    h.press(Button::Power);
    assert_eq!(h.arm_count(), 2);
}

#[test]
fn test_unqueued_message_reports_and_stays_idle() {
    let mut h = Harness::with_outbox(false);
    h.ask_hello();

    assert!(!h.coordinator.state().awaiting_reply);
    assert_eq!(h.coordinator.log().count_of(SenderKind::User), 1);
    assert_eq!(h.coordinator.log().count_of(SenderKind::Info), 1);
}

#[test]
fn test_disconnect_clears_awaiting() {
    let mut h = Harness::new();
    h.ask_hello();

    h.send(SessionEvent::Disconnected {
        reason: "connection closed by server".into(),
    });

    assert!(!h.coordinator.state().awaiting_reply);
    let last = h.coordinator.log().last().cloned().unwrap();
    assert_eq!(last.sender, SenderKind::Info);
    assert!(last.text.contains("connection closed"));
}

#[test]
fn test_history_snapshot_replaces_log() {
    let mut h = Harness::new();
    h.ask_hello();

    h.send(SessionEvent::HistorySnapshot(vec![
        ConversationEntry::user("earlier"),
        ConversationEntry::peer("reply"),
    ]));

    assert!(!h.coordinator.state().awaiting_reply);
    let texts: Vec<&str> = h
        .coordinator
        .log()
        .entries()
        .iter()
        .map(|e| e.text.as_str())
        .collect();
    assert_eq!(texts, vec!["earlier", "reply"]);
}

#[test]
fn test_scroll_buttons_forward_to_display() {
    let mut h = Harness::new();
    h.press(Button::ScrollUp);
    h.release(Button::ScrollUp);
    h.press(Button::ScrollDown);

    assert_eq!(
        *h.display.lock(),
        vec![
            DisplayOp::Scroll(ScrollDirection::Up, 100),
            DisplayOp::Scroll(ScrollDirection::Down, 100),
        ]
    );
    assert!(h.commands().is_empty());
}

#[test]
fn test_worker_notices_become_info_entries() {
    let mut h = Harness::new();

    h.send(AssistantEvent::Notice {
        source: WorkerSource::Buttons,
        text: "Power button read failed".into(),
    });
    h.send(SessionEvent::Retrying {
        failures: 1,
        backoff: Duration::from_secs(5),
        reason: "refused".into(),
    });
    h.send(PlaybackEvent::Error("Playback engine not found".into()));

    assert_eq!(h.coordinator.log().count_of(SenderKind::Info), 3);
    let state = h.coordinator.state();
    assert!(!state.listening && !state.awaiting_reply);
    assert_eq!(state.speaking, None);
}
