//! Edge detector for the appliance buttons
//!
//! Polls each configured pin on a fixed interval and turns level changes
//! into [`ButtonEvent`]s. Events are transition-driven, so a held or idle
//! button produces nothing.

use crate::gpio::{GpioGuard, GpioPins};
use crate::messages::{AssistantEvent, Button, ButtonEvent, Edge, WorkerSource};
use crate::utils::WorkerThread;
use crate::Result;
use crossbeam_channel::Sender;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Binding of a logical button to a GPIO line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonPin {
    pub button: Button,
    pub pin: u32,
}

/// Configuration for button polling
#[derive(Clone, Debug)]
pub struct ButtonConfig {
    pub pins: Vec<ButtonPin>,

    /// Interval between polls of every pin
    pub poll_interval: Duration,

    /// Buttons pull the line low when pressed
    pub active_low: bool,

    /// Use the stub GPIO backend instead of sysfs
    pub use_stub: bool,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            pins: vec![
                ButtonPin {
                    button: Button::Power,
                    pin: 17,
                },
                ButtonPin {
                    button: Button::ScrollUp,
                    pin: 27,
                },
                ButtonPin {
                    button: Button::ScrollDown,
                    pin: 22,
                },
            ],
            poll_interval: Duration::from_millis(50),
            active_low: true,
            use_stub: false,
        }
    }
}

impl ButtonConfig {
    fn is_pressed(&self, level: bool) -> bool {
        if self.active_low {
            !level
        } else {
            level
        }
    }
}

/// Per-pin "currently pressed" flags
#[derive(Debug, Clone)]
pub struct EdgeTracker {
    pressed: Vec<bool>,
}

impl EdgeTracker {
    pub fn new(pin_count: usize) -> Self {
        Self {
            pressed: vec![false; pin_count],
        }
    }

    /// Record a reading and return the edge it completes, if any
    pub fn observe(&mut self, index: usize, pressed: bool) -> Option<Edge> {
        let slot = self.pressed.get_mut(index)?;
        if *slot == pressed {
            return None;
        }
        *slot = pressed;
        Some(if pressed { Edge::Pressed } else { Edge::Released })
    }

    pub fn is_pressed(&self, index: usize) -> bool {
        self.pressed.get(index).copied().unwrap_or(false)
    }
}

/// Button polling worker
pub struct EdgeDetector {
    config: ButtonConfig,
    event_tx: Sender<AssistantEvent>,
}

impl EdgeDetector {
    pub fn new(config: ButtonConfig, event_tx: Sender<AssistantEvent>) -> Self {
        Self { config, event_tx }
    }

    /// Spawn the polling thread. The pins are released when the thread exits.
    pub fn start(self, pins: Box<dyn GpioPins>) -> Result<WorkerThread> {
        WorkerThread::spawn("edge-detector", move |stop| {
            let mut guard = GpioGuard::new(pins);
            let config = self.config;
            let event_tx = self.event_tx;

            for binding in &config.pins {
                if let Err(e) = guard.pins().configure_input(binding.pin) {
                    warn!("Failed to configure {:?} on pin {}: {}", binding.button, binding.pin, e);
                    let _ = event_tx.send(AssistantEvent::Notice {
                        source: WorkerSource::Buttons,
                        text: format!("{:?} button unavailable: {}", binding.button, e),
                    });
                }
            }

            info!("Edge detector polling {} pins", config.pins.len());

            let mut tracker = EdgeTracker::new(config.pins.len());
            let mut faulted = vec![false; config.pins.len()];

            'poll: while !stop.load(Ordering::SeqCst) {
                for (index, binding) in config.pins.iter().enumerate() {
                    match guard.pins().read(binding.pin) {
                        Ok(level) => {
                            if faulted[index] {
                                debug!("Pin {} readable again", binding.pin);
                                faulted[index] = false;
                            }
                            let pressed = config.is_pressed(level);
                            if let Some(edge) = tracker.observe(index, pressed) {
                                let event = ButtonEvent {
                                    button: binding.button,
                                    edge,
                                };
                                debug!("Button event: {:?}", event);
                                if event_tx.send(event.into()).is_err() {
                                    break 'poll;
                                }
                            }
                        }
                        Err(e) => {
                            // Report once per fault, then keep polling
                            if !faulted[index] {
                                faulted[index] = true;
                                warn!("Pin {} read failed: {}", binding.pin, e);
                                let notice = AssistantEvent::Notice {
                                    source: WorkerSource::Buttons,
                                    text: format!("{:?} button read failed: {}", binding.button, e),
                                };
                                if event_tx.send(notice).is_err() {
                                    break 'poll;
                                }
                            }
                        }
                    }
                }

                thread::sleep(config.poll_interval);
            }

            guard.release();
            info!("Edge detector stopped");
        })
    }
}
