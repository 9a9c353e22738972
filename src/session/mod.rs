//! Session with the remote conversation service
//!
//! - [`protocol`]: JSON frames exchanged with the service
//! - [`transport`]: connection traits and the WebSocket implementation
//! - [`client`]: the reconnecting session worker

pub mod client;
pub mod protocol;
pub mod transport;

pub use client::{SessionClient, SessionConfig};
pub use protocol::{decode_inbound, encode_outbound, InboundMessage, WireFrame};
pub use transport::{Connection, Transport, WebSocketTransport};
