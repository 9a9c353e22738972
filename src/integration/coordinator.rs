//! Turn coordinator
//!
//! The single consumer of the fan-in event channel. It owns the conversation
//! log and the turn state, reacts to one event at a time, and issues commands
//! back to the workers through the [`Listener`], [`Player`] and [`Outbox`]
//! seams. Nothing here blocks on I/O except the brief settle pause after
//! interrupting playback.

use crate::display::{DisplayConfig, DisplaySink, ScrollDirection};
use crate::messages::{
    AssistantEvent, Button, ButtonEvent, ConversationEntry, ConversationLog, Edge, PlaybackEvent,
    SenderKind, SessionEvent, TranscriptEvent, TranscriptKind,
};
use crate::playback::PlaybackController;
use crate::session::SessionClient;
use crate::speech::TranscriptAssembler;
use crate::utils::TimingTracker;
use crate::Result;
use crossbeam_channel::Receiver;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Partial line shown while a reply is pending
pub const GENERATING_TEXT: &str = "Generating response...";

/// Arm/disarm control over transcription
pub trait Listener {
    fn arm(&mut self) -> Result<()>;
    fn disarm(&mut self) -> Result<()>;
    /// False once transcription is permanently gone
    fn is_available(&self) -> bool;
}

pub trait Player {
    fn play(&mut self, audio: &[u8]) -> Result<u64>;
    fn stop(&mut self) -> bool;
    fn is_playing(&self) -> bool;
}

pub trait Outbox {
    fn send_message(&mut self, text: &str) -> Result<Uuid>;
}

impl Listener for TranscriptAssembler {
    fn arm(&mut self) -> Result<()> {
        TranscriptAssembler::arm(self).map(|_| ())
    }

    fn disarm(&mut self) -> Result<()> {
        TranscriptAssembler::disarm(self)
    }

    fn is_available(&self) -> bool {
        self.is_alive()
    }
}

impl Player for PlaybackController {
    fn play(&mut self, audio: &[u8]) -> Result<u64> {
        PlaybackController::play(self, audio)
    }

    fn stop(&mut self) -> bool {
        PlaybackController::stop(self)
    }

    fn is_playing(&self) -> bool {
        PlaybackController::is_playing(self)
    }
}

impl Outbox for SessionClient {
    fn send_message(&mut self, text: &str) -> Result<Uuid> {
        SessionClient::send_message(self, text)
    }
}

/// Point-in-time view of the turn state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TurnState {
    pub listening: bool,
    pub awaiting_reply: bool,
    /// Clip id while a reply is being spoken
    pub speaking: Option<u64>,
}

pub struct TurnCoordinator<L, P, O> {
    listener: Option<L>,
    player: P,
    outbox: O,
    display: Box<dyn DisplaySink>,
    log: ConversationLog,
    state: TurnState,
    scroll_amount: i32,
    settle_wait: Duration,
    /// Listening loss has been reported
    listening_lost: bool,
    pending_request: Option<Uuid>,
    turn_started: Option<Instant>,
    turn_timings: TimingTracker,
}

impl<L: Listener, P: Player, O: Outbox> TurnCoordinator<L, P, O> {
    /// `listener` is `None` when the device has no voice input
    pub fn new(
        listener: Option<L>,
        player: P,
        outbox: O,
        display: Box<dyn DisplaySink>,
        display_config: &DisplayConfig,
        settle_wait: Duration,
    ) -> Self {
        Self {
            listener,
            player,
            outbox,
            display,
            log: ConversationLog::new(),
            state: TurnState::default(),
            scroll_amount: display_config.scroll_amount,
            settle_wait,
            listening_lost: false,
            pending_request: None,
            turn_started: None,
            turn_timings: TimingTracker::new("turn", 20),
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    /// Process events until a shutdown event arrives or every publisher is gone
    pub fn run(&mut self, events: &Receiver<AssistantEvent>) {
        info!("Turn coordinator running");
        while let Ok(event) = events.recv() {
            if !self.handle(event) {
                break;
            }
        }
        info!("Turn coordinator stopped");
    }

    /// Apply one event. Returns `false` on shutdown.
    pub fn handle(&mut self, event: AssistantEvent) -> bool {
        match event {
            AssistantEvent::Button(event) => self.on_button(event),
            AssistantEvent::Transcript(event) => self.on_transcript(event),
            AssistantEvent::Session(event) => self.on_session(event),
            AssistantEvent::Playback(event) => self.on_playback(event),
            AssistantEvent::Notice { source, text } => {
                debug!("Notice from {:?}", source);
                self.append_info(text);
            }
            AssistantEvent::Shutdown => return false,
        }
        true
    }

    /// Return the worker handles for shutdown
    pub fn into_parts(self) -> (Option<L>, P, O) {
        (self.listener, self.player, self.outbox)
    }

    fn on_button(&mut self, event: ButtonEvent) {
        match (event.button, event.edge) {
            (Button::Power, Edge::Pressed) => self.on_power_pressed(),
            (Button::Power, Edge::Released) => self.on_power_released(),
            (Button::ScrollUp, Edge::Pressed) => {
                self.display.scroll(ScrollDirection::Up, self.scroll_amount)
            }
            (Button::ScrollDown, Edge::Pressed) => {
                self.display.scroll(ScrollDirection::Down, self.scroll_amount)
            }
            (Button::ScrollUp | Button::ScrollDown, Edge::Released) => {}
        }
    }

    fn on_power_pressed(&mut self) {
        if let Some(clip) = self.state.speaking.take() {
            debug!("Interrupting clip {}", clip);
            if self.player.stop() && !self.settle_wait.is_zero() {
                thread::sleep(self.settle_wait);
            }
        }

        if self.state.awaiting_reply {
            debug!("Reply pending, not listening");
            return;
        }
        if self.state.listening {
            return;
        }

        let armed = match self.listener.as_mut() {
            Some(listener) if listener.is_available() => listener.arm(),
            _ => {
                self.report_listening_lost("Voice input unavailable");
                return;
            }
        };

        match armed {
            Ok(()) => {
                debug!("Listening");
                self.state.listening = true;
            }
            Err(e) => {
                warn!("Failed to start listening: {}", e);
                self.report_listening_lost(&e.user_message());
            }
        }
    }

    fn on_power_released(&mut self) {
        if !self.state.listening {
            return;
        }
        self.state.listening = false;

        if let Some(listener) = self.listener.as_mut() {
            if let Err(e) = listener.disarm() {
                warn!("Failed to stop listening: {}", e);
            }
        }
    }

    fn on_transcript(&mut self, event: TranscriptEvent) {
        match event.kind {
            TranscriptKind::Partial => {
                if !self.state.awaiting_reply {
                    self.display.update_partial(&event.text);
                }
            }
            TranscriptKind::Final => self.on_final(event.text.trim()),
            TranscriptKind::Info => {
                // The assembler reports its own death; don't repeat it per press
                self.listening_lost = true;
                self.state.listening = false;
                self.append_info(event.text);
            }
        }
    }

    fn on_final(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }

        info!("User said: {}", text);
        self.log.push(ConversationEntry::user(text));
        self.display.append_message(text, SenderKind::User);

        match self.outbox.send_message(text) {
            Ok(request_id) => {
                self.state.awaiting_reply = true;
                self.pending_request = Some(request_id);
                self.turn_started = Some(Instant::now());
                self.display.update_partial(GENERATING_TEXT);
            }
            Err(e) => {
                warn!("Failed to queue message: {}", e);
                self.display.update_partial("");
                self.append_info(format!("Message not sent: {}", e.user_message()));
            }
        }
    }

    fn on_session(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Connected => info!("Session connected"),
            SessionEvent::HistorySnapshot(entries) => {
                debug!("Replacing history with {} entries", entries.len());
                self.display.clear_history();
                for entry in &entries {
                    self.display.append_message(&entry.text, entry.sender);
                }
                self.log.replace(entries);
                self.clear_awaiting_reply();
            }
            SessionEvent::Reply {
                text,
                sender,
                audio,
            } => self.on_reply(text, sender, audio),
            SessionEvent::Disconnected { reason } => {
                self.clear_awaiting_reply();
                self.append_info(format!("Disconnected from server: {}", reason));
            }
            SessionEvent::Retrying {
                failures, backoff, ..
            } => {
                self.append_info(format!(
                    "Reconnecting to server (attempt {}, waited {}s)",
                    failures,
                    backoff.as_secs()
                ));
            }
            SessionEvent::Delivered { request_id } => debug!("Delivered {}", request_id),
            SessionEvent::SendFailed {
                request_id,
                attempts,
                reason,
            } => {
                if self.pending_request == Some(request_id) {
                    self.clear_awaiting_reply();
                }
                let text = match attempts {
                    0 => format!("Message not delivered: {}", reason),
                    1 => format!("Message not delivered after 1 attempt: {}", reason),
                    n => format!("Message not delivered after {} attempts: {}", n, reason),
                };
                self.append_info(text);
            }
        }
    }

    fn on_reply(&mut self, text: String, sender: SenderKind, audio: Option<Vec<u8>>) {
        if let Some(started) = self.turn_started.take() {
            self.turn_timings.record(started.elapsed());
            debug!("{}", self.turn_timings.summary());
        }

        self.clear_awaiting_reply();
        self.display.append_message(&text, sender);
        self.log.push(ConversationEntry::new(sender, text));

        let Some(audio) = audio.filter(|clip| !clip.is_empty()) else {
            return;
        };
        match self.player.play(&audio) {
            Ok(clip) => self.state.speaking = Some(clip),
            Err(e) => {
                warn!("Reply playback failed: {}", e);
                self.append_info(e.user_message());
            }
        }
    }

    fn on_playback(&mut self, event: PlaybackEvent) {
        match event {
            PlaybackEvent::Started { clip } => debug!("Clip {} started", clip),
            PlaybackEvent::Finished { clip } | PlaybackEvent::Stopped { clip } => {
                if self.state.speaking == Some(clip) {
                    self.state.speaking = None;
                }
            }
            PlaybackEvent::Error(message) => {
                if !self.player.is_playing() {
                    self.state.speaking = None;
                }
                self.append_info(message);
            }
        }
    }

    fn clear_awaiting_reply(&mut self) {
        if self.state.awaiting_reply {
            self.display.update_partial("");
        }
        self.state.awaiting_reply = false;
        self.pending_request = None;
    }

    fn report_listening_lost(&mut self, reason: &str) {
        if self.listening_lost {
            debug!("Listening unavailable");
            return;
        }
        self.listening_lost = true;
        self.append_info(reason.to_string());
    }

    fn append_info(&mut self, text: String) {
        self.display.append_message(&text, SenderKind::Info);
        self.log.push(ConversationEntry::info(text));
    }
}
