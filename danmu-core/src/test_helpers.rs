//! In-memory transport and resolver fakes for exercising the client without
//! a network. Every observable side effect lands in a shared [`EventLog`].

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;

use crate::codec::{self, PROTOCOL_INT, PROTOCOL_JSON};
use crate::error::{LookupError, TransportError};
use crate::packet::Operation;
use crate::resolver::{EndpointInfo, SessionResolver};
use crate::transport::{Connection, Connector, Frame, FrameSink, FrameSource, HandshakeHeaders};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Dial { host: String, headers: HandshakeHeaders },
    Send { conn: usize, data: Bytes },
    Close(usize),
    Handled(String),
}

#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    pub fn push(&self, event: Event) {
        self.0.lock().push(event);
    }

    pub fn snapshot(&self) -> Vec<Event> {
        self.0.lock().clone()
    }

    pub fn dials(&self) -> Vec<String> {
        self.snapshot()
            .into_iter()
            .filter_map(|e| match e {
                Event::Dial { host, .. } => Some(host),
                _ => None,
            })
            .collect()
    }

    /// Upgrade headers presented on each dial, in dial order
    pub fn dial_headers(&self) -> Vec<HandshakeHeaders> {
        self.snapshot()
            .into_iter()
            .filter_map(|e| match e {
                Event::Dial { headers, .. } => Some(headers),
                _ => None,
            })
            .collect()
    }

    pub fn handled(&self) -> Vec<String> {
        self.snapshot()
            .into_iter()
            .filter_map(|e| match e {
                Event::Handled(cmd) => Some(cmd),
                _ => None,
            })
            .collect()
    }

    /// Frames written on one connection, filtered by operation
    pub fn sent(&self, conn: usize, op: Operation) -> Vec<Bytes> {
        self.snapshot()
            .into_iter()
            .filter_map(|e| match e {
                Event::Send { conn: c, data } if c == conn && frame_op(&data) == Some(op) => Some(data),
                _ => None,
            })
            .collect()
    }

    pub fn position(&self, pred: impl Fn(&Event) -> bool) -> Option<usize> {
        self.snapshot().iter().position(pred)
    }
}

/// Operation code of an encoded frame
pub fn frame_op(frame: &[u8]) -> Option<Operation> {
    let raw: [u8; 4] = frame.get(8..12)?.try_into().ok()?;
    Some(Operation::from_u32(u32::from_be_bytes(raw)))
}

/// What a connection does once its scripted frames run out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Then {
    /// Block until the reader gives up on it
    Hold,
    /// Fail the next read
    Fail,
}

/// Scripted outcome of one dial
#[derive(Debug, Clone)]
pub enum Script {
    RefuseDial,
    /// Handshake succeeds, writing the enter frame fails
    FailEnter,
    /// Handshake succeeds, first read is an abnormal closure
    Busy,
    /// Handshake succeeds, the enter ack is followed by `frames`
    Accept { frames: Vec<Frame>, then: Then },
}

impl Script {
    pub fn accept(frames: Vec<Frame>, then: Then) -> Self {
        Self::Accept { frames, then }
    }

    pub fn hold() -> Self {
        Self::accept(Vec::new(), Then::Hold)
    }
}

/// Notification frame carrying one packet per command
pub fn notification_frame(cmds: &[&str]) -> Frame {
    let mut buf = BytesMut::new();
    for cmd in cmds {
        buf.put_slice(&codec::encode(
            PROTOCOL_JSON,
            Operation::Notification,
            format!(r#"{{"cmd":"{cmd}"}}"#).as_bytes(),
        ));
    }
    Frame::Binary(buf.freeze())
}

pub fn enter_reply_frame() -> Frame {
    Frame::Binary(codec::encode(PROTOCOL_INT, Operation::EnterReply, br#"{"code":0}"#))
}

/// Connector that plays back per-host scripts. A host with no script left
/// refuses the dial.
#[derive(Clone, Default)]
pub struct FakeConnector {
    scripts: Arc<Mutex<HashMap<String, VecDeque<Script>>>>,
    log: EventLog,
    next_conn: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn script(self, host: &str, scripts: impl IntoIterator<Item = Script>) -> Self {
        self.scripts
            .lock()
            .entry(host.to_string())
            .or_default()
            .extend(scripts);
        self
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    fn host_of(url: &str) -> String {
        url.trim_start_matches("wss://").trim_end_matches("/sub").to_string()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, url: &str, headers: &HandshakeHeaders) -> Result<Connection, TransportError> {
        let host = Self::host_of(url);
        self.log.push(Event::Dial {
            host: host.clone(),
            headers: headers.clone(),
        });
        let script = self
            .scripts
            .lock()
            .get_mut(&host)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Script::RefuseDial);

        let (fail_sends, frames, then) = match script {
            Script::RefuseDial => return Err(TransportError::Dial(format!("{host} refused"))),
            Script::FailEnter => (true, VecDeque::new(), Then::Hold),
            Script::Busy => (false, VecDeque::new(), Then::Fail),
            Script::Accept { frames, then } => {
                let mut scripted: VecDeque<Frame> = frames.into();
                scripted.push_front(enter_reply_frame());
                (false, scripted, then)
            }
        };
        let busy = frames.is_empty() && then == Then::Fail;

        let id = self.next_conn.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Connection {
            sink: Arc::new(FakeSink {
                id,
                log: self.log.clone(),
                closed: AtomicBool::new(false),
                fail_sends,
            }),
            source: Box::new(FakeSource { frames, then, busy }),
        })
    }
}

struct FakeSink {
    id: usize,
    log: EventLog,
    closed: AtomicBool,
    fail_sends: bool,
}

#[async_trait]
impl FrameSink for FakeSink {
    async fn send(&self, data: Bytes) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed("closed".to_string()));
        }
        if self.fail_sends {
            return Err(TransportError::Send("broken pipe".to_string()));
        }
        self.log.push(Event::Send { conn: self.id, data });
        Ok(())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.log.push(Event::Close(self.id));
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct FakeSource {
    frames: VecDeque<Frame>,
    then: Then,
    busy: bool,
}

#[async_trait]
impl FrameSource for FakeSource {
    async fn next_frame(&mut self) -> Result<Frame, TransportError> {
        if let Some(frame) = self.frames.pop_front() {
            return Ok(frame);
        }
        match self.then {
            Then::Hold => std::future::pending::<Result<Frame, TransportError>>().await,
            Then::Fail if self.busy => Err(TransportError::AbnormalClosure("unexpected EOF".to_string())),
            Then::Fail => Err(TransportError::Receive("connection reset".to_string())),
        }
    }
}

/// Resolver with fixed answers that counts its calls
#[derive(Clone)]
pub struct FakeResolver {
    room: Option<u64>,
    endpoints: Option<EndpointInfo>,
    room_calls: Arc<AtomicUsize>,
    endpoint_calls: Arc<AtomicUsize>,
}

impl FakeResolver {
    pub fn new(room_id: u64, hosts: &[&str], token: &str) -> Self {
        Self {
            room: Some(room_id),
            endpoints: Some(EndpointInfo {
                hosts: hosts.iter().map(ToString::to_string).collect(),
                token: token.to_string(),
            }),
            room_calls: Arc::default(),
            endpoint_calls: Arc::default(),
        }
    }

    #[must_use]
    pub fn failing_room(mut self) -> Self {
        self.room = None;
        self
    }

    #[must_use]
    pub fn failing_endpoints(mut self) -> Self {
        self.endpoints = None;
        self
    }

    pub fn room_calls(&self) -> usize {
        self.room_calls.load(Ordering::SeqCst)
    }

    pub fn endpoint_calls(&self) -> usize {
        self.endpoint_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionResolver for FakeResolver {
    async fn resolve_room(&self, reference: &str) -> Result<u64, LookupError> {
        self.room_calls.fetch_add(1, Ordering::SeqCst);
        self.room.ok_or_else(|| LookupError::NotFound(reference.to_string()))
    }

    async fn resolve_endpoints(&self, room_id: u64) -> Result<EndpointInfo, LookupError> {
        self.endpoint_calls.fetch_add(1, Ordering::SeqCst);
        self.endpoints
            .clone()
            .ok_or_else(|| LookupError::NotFound(room_id.to_string()))
    }
}
