//! `tokio-tungstenite` implementation of the transport seam

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::{Connection, Connector, Frame, FrameSink, FrameSource, HandshakeHeaders};
use crate::error::TransportError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default time allowed for TCP + TLS + upgrade
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed to acquire the writer and flush a close frame
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

const ABNORMAL_CLOSURE: u16 = 1006;

/// Dials `wss://` push endpoints
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new()
    }
}

fn header_value(value: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value).map_err(|e| TransportError::Dial(format!("invalid header value: {e}")))
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str, headers: &HandshakeHeaders) -> Result<Connection, TransportError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| TransportError::Dial(e.to_string()))?;
        if let Some(user_agent) = &headers.user_agent {
            request.headers_mut().insert(header::USER_AGENT, header_value(user_agent)?);
        }
        if let Some(referer) = &headers.referer {
            request.headers_mut().insert(header::REFERER, header_value(referer)?);
        }

        let (stream, _response) = timeout(self.connect_timeout, tokio_tungstenite::connect_async(request))
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout))?
            .map_err(|e| TransportError::Dial(e.to_string()))?;

        let (sink, source) = stream.split();
        Ok(Connection {
            sink: Arc::new(WsSink {
                inner: Mutex::new(sink),
                closed: AtomicBool::new(false),
            }),
            source: Box::new(WsSource { inner: source }),
        })
    }
}

struct WsSink {
    inner: Mutex<SplitSink<WsStream, Message>>,
    closed: AtomicBool,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&self, data: Bytes) -> Result<(), TransportError> {
        let mut sink = self.inner.lock().await;
        // Checked under the lock so nothing is written after close() returns.
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed("connection superseded".to_string()));
        }
        sink.send(Message::Binary(data))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // A send stalled on a dead socket holds the lock; bound the wait for it too.
        let closing = async {
            let mut sink = self.inner.lock().await;
            sink.close().await
        };
        match timeout(CLOSE_TIMEOUT, closing).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "Error closing websocket"),
            Err(_) => debug!("Timed out closing websocket"),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

struct WsSource {
    inner: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WsSource {
    async fn next_frame(&mut self) -> Result<Frame, TransportError> {
        match self.inner.next().await {
            Some(Ok(Message::Binary(data))) => Ok(Frame::Binary(data)),
            Some(Ok(Message::Text(text))) => Ok(Frame::Text(text.as_str().to_owned())),
            Some(Ok(Message::Close(frame))) => Err(close_error(frame)),
            Some(Ok(_)) => Ok(Frame::Control),
            Some(Err(e)) => Err(read_error(e)),
            None => Err(TransportError::Closed("stream ended".to_string())),
        }
    }
}

fn close_error(frame: Option<CloseFrame>) -> TransportError {
    match frame {
        Some(frame) => {
            let code = u16::from(frame.code);
            let detail = format!("close {code}: {}", frame.reason.as_str());
            if code == ABNORMAL_CLOSURE {
                TransportError::AbnormalClosure(detail)
            } else {
                TransportError::Closed(detail)
            }
        }
        None => TransportError::Closed("close frame without status".to_string()),
    }
}

fn read_error(err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            TransportError::AbnormalClosure("unexpected EOF".to_string())
        }
        tungstenite::Error::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            TransportError::AbnormalClosure(e.to_string())
        }
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::Closed("connection closed".to_string())
        }
        other => TransportError::Receive(other.to_string()),
    }
}
