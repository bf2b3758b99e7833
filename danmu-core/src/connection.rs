//! Connection lifecycle: dial, authenticate, rotate and install
//!
//! [`ConnectionManager`] is the only writer of the endpoint rotation index and
//! of the canonical connection. It is owned by whoever calls `connect` (the
//! client during start, the read loop afterwards), so there is never more
//! than one writer. The heartbeat observes the canonical write half through a
//! `watch` channel.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ConstantBuilder};
use bytes::Bytes;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec;
use crate::error::{ConnectError, TransportError};
use crate::session::{EndpointPool, Session};
use crate::transport::{endpoint_url, Connection, Connector, Frame, FrameSink, FrameSource, HandshakeHeaders};

/// Delay between failed dials when nothing else is configured
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Canonical write half, `None` before the first connect and after close
pub type SinkSlot = Option<Arc<dyn FrameSink>>;

type BackoffFactory = dyn Fn() -> Box<dyn Iterator<Item = Duration> + Send> + Send + Sync;

/// Delays between failed dials within one `connect` call.
///
/// Wraps any `backon` builder; a fresh backoff is started on every call. When
/// the backoff runs out, `connect` gives up with
/// [`ConnectError::RetryExhausted`].
#[derive(Clone)]
pub struct RetryPolicy {
    factory: Arc<BackoffFactory>,
}

impl RetryPolicy {
    pub fn from_backoff<B>(builder: B) -> Self
    where
        B: BackoffBuilder + Clone + Send + Sync + 'static,
        B::Backoff: 'static,
    {
        Self {
            factory: Arc::new(move || Box::new(builder.clone().build())),
        }
    }

    /// Fixed delay, retries forever
    #[must_use]
    pub fn constant(delay: Duration) -> Self {
        Self::from_backoff(ConstantBuilder::default().with_delay(delay).with_max_times(usize::MAX))
    }

    /// Fixed delay, gives up after `retries` failed dials past the first
    #[must_use]
    pub fn limited(delay: Duration, retries: usize) -> Self {
        Self::from_backoff(ConstantBuilder::default().with_delay(delay).with_max_times(retries))
    }

    fn backoff(&self) -> Box<dyn Iterator<Item = Duration> + Send> {
        (self.factory)()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::constant(DEFAULT_RETRY_DELAY)
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy").finish_non_exhaustive()
    }
}

/// Outcome of one attempt against one host
enum Attempt {
    Installed,
    /// Dial failed; back off before the next host
    DialFailed,
    /// Connected but rejected; move on immediately
    Rotate,
}

pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    session: Arc<Session>,
    pool: EndpointPool,
    headers: HandshakeHeaders,
    retry: RetryPolicy,
    enter_frame: Bytes,
    current: watch::Sender<SinkSlot>,
    source: Option<Box<dyn FrameSource>>,
    current_host: Option<String>,
    attempts: u64,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        session: Arc<Session>,
        pool: EndpointPool,
        headers: HandshakeHeaders,
        retry: RetryPolicy,
    ) -> Self {
        let enter_frame = codec::encode_enter(&session);
        let (current, _) = watch::channel(None);
        Self {
            connector,
            session,
            pool,
            headers,
            retry,
            enter_frame,
            current,
            source: None,
            current_host: None,
            attempts: 0,
        }
    }

    /// Observe the canonical write half
    pub fn subscribe(&self) -> watch::Receiver<SinkSlot> {
        self.current.subscribe()
    }

    /// Establish a new authenticated connection and make it canonical.
    ///
    /// Rotates through the pool one host per attempt. Only failed dials
    /// consume the retry policy; a rejected enter frame or a busy edge node
    /// moves on to the next host immediately.
    pub async fn connect(&mut self, cancel: &CancellationToken) -> Result<(), ConnectError> {
        let mut backoff = self.retry.backoff();
        let mut dials: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(ConnectError::Cancelled);
            }

            let host = self.pool.next_host().to_string();
            self.attempts += 1;
            dials += 1;

            match self.attempt(host, cancel).await? {
                Attempt::Installed => return Ok(()),
                Attempt::Rotate => {}
                Attempt::DialFailed => {
                    let Some(delay) = backoff.next() else {
                        return Err(ConnectError::RetryExhausted { attempts: dials });
                    };
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(ConnectError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn attempt(&mut self, host: String, cancel: &CancellationToken) -> Result<Attempt, ConnectError> {
        let url = endpoint_url(&host);
        let attempt = self.attempts;

        let dialed = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ConnectError::Cancelled),
            dialed = self.connector.connect(&url, &self.headers) => dialed,
        };
        let Connection { sink, mut source } = match dialed {
            Ok(conn) => conn,
            Err(e) => {
                error!(host = %host, attempt, error = %e, "Failed to connect to push server");
                return Ok(Attempt::DialFailed);
            }
        };

        if let Err(e) = sink.send(self.enter_frame.clone()).await {
            warn!(host = %host, attempt, error = %e, "Failed to send enter frame, trying next host");
            sink.close().await;
            return Ok(Attempt::Rotate);
        }

        // The first frame after enter is its acknowledgement and is not dispatched.
        let ack = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                sink.close().await;
                return Err(ConnectError::Cancelled);
            }
            ack = source.next_frame() => ack,
        };
        match ack {
            Err(e) if e.is_abnormal_closure() => {
                info!(host = %host, attempt, "Push server busy, trying next host");
                sink.close().await;
                return Ok(Attempt::Rotate);
            }
            Err(e) => debug!(host = %host, error = %e, "Read after enter failed"),
            Ok(_) => {}
        }

        self.install(host, sink, source).await;
        Ok(Attempt::Installed)
    }

    async fn install(&mut self, host: String, sink: Arc<dyn FrameSink>, source: Box<dyn FrameSource>) {
        info!(
            host = %host,
            room_id = self.session.room_id,
            attempt = self.attempts,
            "Connected to push server"
        );
        let previous = self.current.send_replace(Some(sink));
        self.source = Some(source);
        self.current_host = Some(host);
        if let Some(previous) = previous {
            previous.close().await;
        }
    }

    /// Read the next frame from the canonical connection
    pub async fn read_frame(&mut self) -> Result<Frame, TransportError> {
        match self.source.as_mut() {
            Some(source) => source.next_frame().await,
            None => Err(TransportError::Closed("not connected".to_string())),
        }
    }

    /// Close and forget the canonical connection
    pub async fn close(&mut self) {
        self.source = None;
        if let Some(sink) = self.current.send_replace(None) {
            sink.close().await;
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Host of the canonical connection
    pub fn current_host(&self) -> Option<&str> {
        self.current_host.as_deref()
    }

    /// Number of hosts selected so far, across all `connect` calls
    pub const fn rotation_index(&self) -> usize {
        self.pool.index()
    }

    /// Total connection attempts, across all `connect` calls
    pub const fn attempts(&self) -> u64 {
        self.attempts
    }

    pub const fn pool(&self) -> &EndpointPool {
        &self.pool
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("room_id", &self.session.room_id)
            .field("pool", &self.pool)
            .field("current_host", &self.current_host)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Operation;
    use crate::test_helpers::{Event, EventLog, FakeConnector, Script};

    fn session() -> Arc<Session> {
        Arc::new(Session {
            room_reference: "7734200".to_string(),
            room_id: 7_734_200,
            viewer_id: 0,
            device_id: String::new(),
            token: "tok".to_string(),
        })
    }

    fn manager(connector: FakeConnector, hosts: &[&str], retry: RetryPolicy) -> ConnectionManager {
        ConnectionManager::new(
            Arc::new(connector),
            session(),
            EndpointPool::new(hosts.iter().copied()).unwrap(),
            HandshakeHeaders::default(),
            retry,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_robin_visits_every_host() {
        let log = EventLog::default();
        let connector = FakeConnector::new(log.clone()).script("d", [Script::hold()]);
        let mut mgr = manager(connector, &["a", "b", "c", "d"], RetryPolicy::default());

        mgr.connect(&CancellationToken::new()).await.unwrap();

        assert_eq!(log.dials(), ["a", "b", "c", "d"]);
        assert_eq!(mgr.rotation_index(), 4);
        assert_eq!(mgr.attempts(), 4);
        assert_eq!(mgr.current_host(), Some("d"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dial_failure_backs_off() {
        let log = EventLog::default();
        let connector = FakeConnector::new(log.clone()).script("a", [Script::RefuseDial, Script::hold()]);
        let mut mgr = manager(connector, &["a"], RetryPolicy::constant(Duration::from_secs(2)));

        let started = tokio::time::Instant::now();
        mgr.connect(&CancellationToken::new()).await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(2));
        assert_eq!(log.dials(), ["a", "a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_and_enter_failure_rotate_without_sleep() {
        let log = EventLog::default();
        let connector = FakeConnector::new(log.clone())
            .script("a", [Script::Busy, Script::hold()])
            .script("b", [Script::FailEnter]);
        let mut mgr = manager(connector, &["a", "b"], RetryPolicy::default());

        let started = tokio::time::Instant::now();
        mgr.connect(&CancellationToken::new()).await.unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(log.dials(), ["a", "b", "a"]);
        // busy connection and the one that rejected enter are both closed
        assert!(log.position(|e| *e == Event::Close(1)).is_some());
        assert!(log.position(|e| *e == Event::Close(2)).is_some());
        assert_eq!(mgr.current_host(), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_enter_frame_sent_on_connect() {
        let log = EventLog::default();
        let connector = FakeConnector::new(log.clone()).script("a", [Script::hold()]);
        let mut mgr = manager(connector, &["a"], RetryPolicy::default());
        mgr.connect(&CancellationToken::new()).await.unwrap();

        let enters = log.sent(1, Operation::Enter);
        assert_eq!(enters.len(), 1);
        assert_eq!(enters[0], codec::encode_enter(mgr.session()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausted() {
        let connector = FakeConnector::new(EventLog::default());
        let mut mgr = manager(connector, &["a", "b"], RetryPolicy::limited(Duration::from_millis(10), 2));

        let err = mgr.connect(&CancellationToken::new()).await.unwrap_err();
        assert_eq!(err, ConnectError::RetryExhausted { attempts: 3 });
        assert_eq!(mgr.current_host(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let log = EventLog::default();
        let connector = FakeConnector::new(log.clone());
        let mut mgr = manager(connector, &["a"], RetryPolicy::constant(Duration::from_secs(60)));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        assert_eq!(mgr.connect(&cancel).await.unwrap_err(), ConnectError::Cancelled);
        assert_eq!(log.dials().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_closes_previous() {
        let log = EventLog::default();
        let connector = FakeConnector::new(log.clone()).script("a", [Script::hold(), Script::hold()]);
        let mut mgr = manager(connector, &["a"], RetryPolicy::default());
        let slot = mgr.subscribe();
        let cancel = CancellationToken::new();

        mgr.connect(&cancel).await.unwrap();
        let first = slot.borrow().clone().unwrap();
        mgr.connect(&cancel).await.unwrap();

        assert!(first.is_closed());
        assert!(!slot.borrow().as_ref().unwrap().is_closed());
        assert!(first.send(Bytes::from_static(b"late")).await.is_err());

        mgr.close().await;
        assert!(slot.borrow().is_none());
        assert!(mgr.read_frame().await.is_err());
    }
}
