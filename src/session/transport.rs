//! Connection seam between the session client and the network
//!
//! The client only needs to open a connection and exchange text frames, so
//! the WebSocket stack hides behind [`Transport`] and [`Connection`]. Tests
//! substitute scripted implementations.

use crate::{Result, ZelnaError};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// Opens connections to the conversation service
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Connection>>;
}

/// One live connection carrying text frames
#[async_trait]
pub trait Connection: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Next text frame; `None` once the peer has closed.
    ///
    /// Must be cancel-safe: the client races it against outbound commands.
    async fn recv_text(&mut self) -> Option<Result<String>>;

    async fn close(&mut self);
}

/// WebSocket transport with optional bearer authentication
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
    auth_token: Option<String>,
    connect_timeout: Duration,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>, auth_token: Option<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            auth_token,
            connect_timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ZelnaError::Config(format!("Invalid session URL {}: {}", self.url, e)))?;

        if let Some(token) = &self.auth_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ZelnaError::Config(format!("Invalid auth token: {}", e)))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (stream, response) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| {
                    ZelnaError::Connection(format!(
                        "Timed out after {:?} connecting to {}",
                        self.connect_timeout, self.url
                    ))
                })?
                .map_err(|e| ZelnaError::Connection(format!("{}: {}", self.url, e)))?;

        debug!("WebSocket handshake status {}", response.status());
        Ok(Box::new(WebSocketConnection { stream }))
    }
}

struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| ZelnaError::Connection(format!("send failed: {}", e)))
    }

    async fn recv_text(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(text)),
                Some(Ok(Message::Close(_))) | None => return None,
                // Pings are answered by tungstenite on the next read
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Some(Err(ZelnaError::Connection(format!(
                        "websocket error: {}",
                        e
                    ))))
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("WebSocket close: {}", e);
        }
    }
}
