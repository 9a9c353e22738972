//! Reconnecting session with the conversation service
//!
//! The client runs on its own worker thread with a private tokio runtime.
//! It keeps one connection open, reconnecting after a fixed backoff for as
//! long as the process runs, and reports everything it learns as
//! [`SessionEvent`]s on the shared bus.

use super::protocol::{decode_inbound, encode_outbound, InboundMessage, EVENT_MESSAGE};
use super::transport::{Connection, Transport};
use crate::messages::{AssistantEvent, SessionEvent, SessionState, WorkerSource};
use crate::utils::WorkerThread;
use crate::{Result, ZelnaError};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Configuration for the session client
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// WebSocket endpoint of the conversation service
    pub url: String,

    /// Sent as `Authorization: Bearer <token>` when present
    pub auth_token: Option<String>,

    /// Wait between reconnect attempts
    pub backoff: Duration,

    /// Attempts per logical send before it is reported failed
    pub max_send_attempts: u32,

    /// Give up on a handshake after this long
    pub connect_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/ws".to_string(),
            auth_token: None,
            backoff: Duration::from_secs(5),
            max_send_attempts: 3,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug)]
struct OutboundRequest {
    request_id: Uuid,
    event: String,
    payload: Value,
}

#[derive(Debug)]
enum SessionCommand {
    Send(OutboundRequest),
    Shutdown,
}

/// How a connection attempt or live connection ended
enum LoopExit {
    Shutdown,
    Lost(String),
}

/// Handle to the session worker
pub struct SessionClient {
    command_tx: mpsc::UnboundedSender<SessionCommand>,
    state: Arc<Mutex<SessionState>>,
    worker: Option<WorkerThread>,
}

impl SessionClient {
    /// Spawn the session worker; it starts connecting immediately
    pub fn start(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        event_tx: Sender<AssistantEvent>,
    ) -> Result<Self> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(SessionState::Disconnected));
        let worker_state = Arc::clone(&state);

        let worker = WorkerThread::spawn("session-client", move |_stop| {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!("Failed to create session runtime: {}", e);
                    let _ = event_tx.send(AssistantEvent::Notice {
                        source: WorkerSource::Session,
                        text: format!("Session unavailable: {}", e),
                    });
                    return;
                }
            };

            let mut session = SessionWorker {
                config,
                transport,
                event_tx,
                state: worker_state,
                command_rx,
            };
            runtime.block_on(session.connection_loop());
            info!("Session worker stopped");
        })?;

        Ok(Self {
            command_tx,
            state,
            worker: Some(worker),
        })
    }

    /// Queue `payload` under `event` for delivery.
    ///
    /// The outcome arrives later as exactly one [`SessionEvent::Delivered`]
    /// or [`SessionEvent::SendFailed`] carrying the returned id.
    pub fn send(&self, event: &str, payload: Value) -> Result<Uuid> {
        let request_id = Uuid::new_v4();
        self.command_tx
            .send(SessionCommand::Send(OutboundRequest {
                request_id,
                event: event.to_string(),
                payload,
            }))
            .map_err(|_| ZelnaError::Channel("Session worker is not running".to_string()))?;
        Ok(request_id)
    }

    /// Send the user's utterance
    pub fn send_message(&self, text: &str) -> Result<Uuid> {
        self.send(EVENT_MESSAGE, Value::String(text.to_string()))
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Close the connection and join the worker
    pub fn shutdown(mut self) {
        self.stop_worker();
    }

    fn stop_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.command_tx.send(SessionCommand::Shutdown);
            worker.stop_and_join();
        }
    }
}

impl Drop for SessionClient {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

struct SessionWorker {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    event_tx: Sender<AssistantEvent>,
    state: Arc<Mutex<SessionState>>,
    command_rx: mpsc::UnboundedReceiver<SessionCommand>,
}

impl SessionWorker {
    async fn connection_loop(&mut self) {
        let mut failures: u32 = 0;

        loop {
            self.set_state(SessionState::Connecting);

            let exit = match self.try_connect().await {
                Ok(Some(connection)) => {
                    failures = 0;
                    self.set_state(SessionState::Connected);
                    info!("Connected to {}", self.config.url);
                    self.publish(SessionEvent::Connected);

                    let exit = self.serve(connection).await;
                    if let LoopExit::Lost(reason) = &exit {
                        warn!("Session lost: {}", reason);
                        self.publish(SessionEvent::Disconnected {
                            reason: reason.clone(),
                        });
                    }
                    exit
                }
                Ok(None) => LoopExit::Shutdown,
                Err(e) => {
                    warn!("Connection to {} failed: {}", self.config.url, e);
                    LoopExit::Lost(e.to_string())
                }
            };

            self.set_state(SessionState::Disconnected);

            let reason = match exit {
                LoopExit::Shutdown => break,
                LoopExit::Lost(reason) => reason,
            };

            failures += 1;
            if !self.wait_backoff().await {
                break;
            }

            info!("Reconnecting (failure {})", failures);
            self.publish(SessionEvent::Retrying {
                failures,
                backoff: self.config.backoff,
                reason,
            });
        }

        self.set_state(SessionState::Disconnected);
    }

    /// Connect while still answering commands. `Ok(None)` means shut down.
    async fn try_connect(&mut self) -> Result<Option<Box<dyn Connection>>> {
        let transport = Arc::clone(&self.transport);
        let connect = transport.connect();
        tokio::pin!(connect);

        loop {
            tokio::select! {
                result = &mut connect => return result.map(Some),
                command = self.command_rx.recv() => match command {
                    Some(SessionCommand::Send(request)) => self.reject(request),
                    Some(SessionCommand::Shutdown) | None => return Ok(None),
                },
            }
        }
    }

    /// Sleep out the backoff while still answering commands.
    /// Returns `false` when shutdown was requested instead.
    async fn wait_backoff(&mut self) -> bool {
        let sleep = tokio::time::sleep(self.config.backoff);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                command = self.command_rx.recv() => match command {
                    Some(SessionCommand::Send(request)) => self.reject(request),
                    Some(SessionCommand::Shutdown) | None => return false,
                },
            }
        }
    }

    async fn serve(&mut self, mut connection: Box<dyn Connection>) -> LoopExit {
        enum Step {
            Inbound(Option<Result<String>>),
            Command(Option<SessionCommand>),
        }

        loop {
            let step = tokio::select! {
                inbound = connection.recv_text() => Step::Inbound(inbound),
                command = self.command_rx.recv() => Step::Command(command),
            };

            match step {
                Step::Inbound(Some(Ok(text))) => {
                    if let Some(exit) = self.handle_inbound(&text) {
                        connection.close().await;
                        return exit;
                    }
                }
                Step::Inbound(Some(Err(e))) => return LoopExit::Lost(e.to_string()),
                Step::Inbound(None) => {
                    return LoopExit::Lost("connection closed by server".to_string())
                }
                Step::Command(Some(SessionCommand::Send(request))) => {
                    if let Err(reason) = self.deliver(connection.as_mut(), request).await {
                        connection.close().await;
                        return LoopExit::Lost(reason);
                    }
                }
                Step::Command(Some(SessionCommand::Shutdown)) | Step::Command(None) => {
                    connection.close().await;
                    return LoopExit::Shutdown;
                }
            }
        }
    }

    /// Returns an exit when the server asked to end the session
    fn handle_inbound(&self, text: &str) -> Option<LoopExit> {
        match decode_inbound(text) {
            Ok(InboundMessage::Initialize(entries)) => {
                debug!("History snapshot with {} entries", entries.len());
                self.publish(SessionEvent::HistorySnapshot(entries));
            }
            Ok(InboundMessage::Response {
                text,
                sender,
                audio,
            }) => {
                debug!(
                    "Reply received ({} chars, audio: {})",
                    text.len(),
                    audio.as_ref().map_or(0, Vec::len)
                );
                self.publish(SessionEvent::Reply {
                    text,
                    sender,
                    audio,
                });
            }
            Ok(InboundMessage::Disconnect) => {
                info!("Server requested disconnect");
                return Some(LoopExit::Lost("server requested disconnect".to_string()));
            }
            Ok(InboundMessage::Ignored(_)) => {}
            Err(e) => warn!("Dropping malformed frame: {}", e),
        }
        None
    }

    /// Deliver one logical send; `Err` means the connection is unusable
    async fn deliver(
        &self,
        connection: &mut dyn Connection,
        request: OutboundRequest,
    ) -> std::result::Result<(), String> {
        let frame = match encode_outbound(&request.event, request.payload) {
            Ok(frame) => frame,
            Err(e) => {
                self.publish(SessionEvent::SendFailed {
                    request_id: request.request_id,
                    attempts: 0,
                    reason: e.to_string(),
                });
                return Ok(());
            }
        };

        let attempts = self.config.max_send_attempts.max(1);
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match connection.send_text(frame.clone()).await {
                Ok(()) => {
                    debug!("Sent {} on attempt {}", request.request_id, attempt);
                    self.publish(SessionEvent::Delivered {
                        request_id: request.request_id,
                    });
                    return Ok(());
                }
                Err(e) => {
                    warn!("Send attempt {}/{} failed: {}", attempt, attempts, e);
                    last_error = e.to_string();
                }
            }
        }

        self.publish(SessionEvent::SendFailed {
            request_id: request.request_id,
            attempts,
            reason: last_error.clone(),
        });
        Err(last_error)
    }

    /// Fail a send that arrived with no live connection
    fn reject(&self, request: OutboundRequest) {
        debug!("Dropping {}: not connected", request.request_id);
        self.publish(SessionEvent::SendFailed {
            request_id: request.request_id,
            attempts: 0,
            reason: "not connected".to_string(),
        });
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
    }

    fn publish(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event.into());
    }
}
