//! Transport seam between the connection manager and the socket
//!
//! A dialed connection is handed out as two halves: a shared [`FrameSink`]
//! (the enter frame and heartbeats are written through it) and an exclusive
//! [`FrameSource`] owned by whoever drives reads.

mod websocket;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportError;

pub use websocket::WsConnector;

/// One transport-level message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Binary(Bytes),
    Text(String),
    /// Ping/pong and other control traffic; never dispatched
    Control,
}

/// Write half of a live connection
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Write one binary frame. Fails with [`TransportError::Closed`] once closed.
    async fn send(&self, data: Bytes) -> Result<(), TransportError>;

    /// Close the connection. Idempotent.
    async fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Read half of a live connection
#[async_trait]
pub trait FrameSource: Send {
    async fn next_frame(&mut self) -> Result<Frame, TransportError>;
}

/// A freshly dialed connection
pub struct Connection {
    pub sink: Arc<dyn FrameSink>,
    pub source: Box<dyn FrameSource>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("closed", &self.sink.is_closed())
            .finish_non_exhaustive()
    }
}

/// Extra HTTP headers sent with the WebSocket upgrade request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeHeaders {
    pub user_agent: Option<String>,
    pub referer: Option<String>,
}

impl HandshakeHeaders {
    /// Empty strings mean "do not send the header"
    #[must_use]
    pub fn new(user_agent: &str, referer: &str) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Self {
            user_agent: non_empty(user_agent),
            referer: non_empty(referer),
        }
    }
}

/// Dials push servers
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str, headers: &HandshakeHeaders) -> Result<Connection, TransportError>;
}

/// Push endpoint for a host
#[must_use]
pub fn endpoint_url(host: &str) -> String {
    format!("wss://{host}/sub")
}
