//! Wiring for the complete appliance
//!
//! Starts every worker against one event bus, runs the turn coordinator on
//! the calling thread, then tears the workers down in order. The button
//! worker is joined last so the GPIO lines are released only after every
//! other worker has acknowledged shutdown.

use crate::display::DisplaySink;
use crate::gpio::{GpioPins, StubGpio, SysfsGpio};
use crate::input::EdgeDetector;
use crate::integration::config::AssistantConfig;
use crate::integration::coordinator::TurnCoordinator;
use crate::messages::{AssistantEvent, TranscriptEvent};
use crate::playback::PlaybackController;
use crate::session::{SessionClient, WebSocketTransport};
use crate::speech::TranscriptAssembler;
use crate::utils::{EventBus, WorkerThread};
use crate::Result;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[cfg(feature = "audio-io")]
use crate::audio::AudioCapture;
#[cfg(feature = "audio-io")]
use crate::speech::WhisperRecognizer;
#[cfg(feature = "audio-io")]
use crate::utils::AudioChannels;

const DRAIN_POLL: Duration = Duration::from_millis(50);

#[cfg(feature = "audio-io")]
type CaptureHandle = AudioCapture;
#[cfg(not(feature = "audio-io"))]
type CaptureHandle = ();

/// Owns the configuration and event bus for one run of the appliance
pub struct AssistantRuntime {
    config: AssistantConfig,
    bus: EventBus,
}

impl AssistantRuntime {
    pub fn new(config: AssistantConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            bus: EventBus::default(),
        })
    }

    /// Publisher for out-of-band events such as [`AssistantEvent::Shutdown`]
    pub fn publisher(&self) -> Sender<AssistantEvent> {
        self.bus.publisher()
    }

    /// Run until a shutdown event arrives
    pub fn run(self, display: Box<dyn DisplaySink>) -> Result<()> {
        let config = self.config;
        let publisher = self.bus.publisher();

        let pins: Box<dyn GpioPins> = if config.buttons.use_stub {
            info!("Using stub GPIO");
            Box::new(StubGpio::new())
        } else {
            Box::new(SysfsGpio::new())
        };
        let buttons = EdgeDetector::new(config.buttons.clone(), publisher.clone()).start(pins)?;

        let transport = Arc::new(WebSocketTransport::new(
            config.session.url.clone(),
            config.session.auth_token.clone(),
            config.session.connect_timeout,
        ));
        let session = SessionClient::start(config.session.clone(), transport, publisher.clone())?;

        let player = PlaybackController::new(config.playback.clone(), publisher.clone());

        let (listener, capture) = start_voice_input(&config, &publisher);

        let mut coordinator = TurnCoordinator::new(
            listener,
            player,
            session,
            display,
            &config.display,
            config.settle_wait,
        );
        info!("Assistant ready");
        coordinator.run(&self.bus.event_rx);

        info!("Shutting down");
        let (listener, player, session) = coordinator.into_parts();

        // Workers may still publish while they wind down
        let drain = drain_bus(self.bus.event_rx.clone());

        // Close the microphone before its consumer goes away
        drop(capture);
        if let Some(assembler) = listener {
            assembler.shutdown();
        }
        player.stop();
        drop(player);
        session.shutdown();
        buttons.stop_and_join();
        if let Some(drain) = drain {
            drain.stop_and_join();
        }

        info!("Shutdown complete");
        Ok(())
    }
}

/// Discard bus traffic until stopped so no worker blocks on a full bus
fn drain_bus(events: Receiver<AssistantEvent>) -> Option<WorkerThread> {
    let spawned = WorkerThread::spawn("bus-drain", move |stop| {
        while !stop.load(Ordering::SeqCst) {
            match events.recv_timeout(DRAIN_POLL) {
                Ok(event) => debug!("Discarding {:?} during shutdown", event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    });
    match spawned {
        Ok(worker) => Some(worker),
        Err(e) => {
            warn!("Shutting down without draining the bus: {}", e);
            None
        }
    }
}

/// Open the microphone and start transcription.
///
/// Failures are published as info transcript events so the coordinator
/// treats listening as permanently unavailable.
#[cfg(feature = "audio-io")]
fn start_voice_input(
    config: &AssistantConfig,
    publisher: &Sender<AssistantEvent>,
) -> (Option<TranscriptAssembler>, Option<CaptureHandle>) {
    if !config.capture.enabled {
        info!("Voice input disabled");
        return (None, None);
    }

    let unavailable = |e: crate::ZelnaError| {
        warn!("Voice input unavailable: {}", e);
        let _ = publisher.send(
            TranscriptEvent::info(format!("Voice input unavailable: {}", e.user_message())).into(),
        );
    };

    let mut capture = match AudioCapture::new() {
        Ok(capture) => capture,
        Err(e) => {
            unavailable(e);
            return (None, None);
        }
    };

    let factory = WhisperRecognizer::factory(config.whisper.clone(), capture.sample_rate());
    let channels = AudioChannels::new(config.capture.queue_depth());
    let assembler = match TranscriptAssembler::start(factory, channels, publisher.clone()) {
        Ok(assembler) => assembler,
        Err(e) => {
            unavailable(e);
            return (None, None);
        }
    };

    if let Err(e) = capture.start(assembler.gate(), assembler.frame_sender()) {
        unavailable(e);
        assembler.shutdown();
        return (None, None);
    }

    (Some(assembler), Some(capture))
}

#[cfg(not(feature = "audio-io"))]
fn start_voice_input(
    config: &AssistantConfig,
    publisher: &Sender<AssistantEvent>,
) -> (Option<TranscriptAssembler>, Option<CaptureHandle>) {
    if config.capture.enabled {
        let _ = publisher.send(
            TranscriptEvent::info("Voice input unavailable: built without audio support").into(),
        );
    }
    (None, None)
}
