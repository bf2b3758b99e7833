//! Public entry point: one client, one room, one logical connection

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, RetryPolicy};
use crate::error::{ClientError, Result};
use crate::handler::HandlerRegistry;
use crate::heartbeat::{HeartbeatScheduler, DEFAULT_HEARTBEAT_INTERVAL};
use crate::packet::{Packet, PacketKind};
use crate::reader::{ReadDispatchLoop, DEFAULT_RECONNECT_DELAY};
use crate::resolver::{BilibiliResolver, EndpointInfo, SessionResolver};
use crate::session::{EndpointPool, Session, DEFAULT_HOST};
use crate::transport::{Connector, HandshakeHeaders, WsConnector};

/// Timing and retry knobs
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub heartbeat_interval: Duration,
    pub reconnect_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            retry: RetryPolicy::default(),
        }
    }
}

/// Live chat client for a single room.
///
/// Register handlers, call [`start`](Self::start), and the client keeps the
/// connection alive (reconnecting and rotating hosts as needed) until
/// [`stop`](Self::stop) is called or the value is dropped.
pub struct DanmuClient {
    room_reference: String,
    viewer_id: u64,
    device_id: String,
    headers: HandshakeHeaders,
    host_override: Option<String>,
    resolver: Arc<dyn SessionResolver>,
    connector: Arc<dyn Connector>,
    options: ClientOptions,
    registry: HandlerRegistry,
    cancel: CancellationToken,
    session: Option<Arc<Session>>,
    tasks: Vec<JoinHandle<()>>,
}

impl DanmuClient {
    pub fn new(
        room_reference: impl Into<String>,
        viewer_id: u64,
        device_id: impl Into<String>,
        user_agent: &str,
        referer: &str,
    ) -> Self {
        Self {
            room_reference: room_reference.into(),
            viewer_id,
            device_id: device_id.into(),
            headers: HandshakeHeaders::new(user_agent, referer),
            host_override: None,
            resolver: Arc::new(BilibiliResolver::new()),
            connector: Arc::new(WsConnector::new()),
            options: ClientOptions::default(),
            registry: HandlerRegistry::new(),
            cancel: CancellationToken::new(),
            session: None,
            tasks: Vec::new(),
        }
    }

    /// Build a client from loaded configuration
    pub fn from_config(config: &ClientConfig) -> Self {
        let mut client = Self::new(
            config.room.clone(),
            config.viewer_id,
            config.device_id.clone(),
            &config.user_agent,
            &config.referer,
        )
        .with_resolver(BilibiliResolver::with_cookies(config.cookies.clone()))
        .with_options(config.options());
        if let Some(host) = &config.host {
            client.set_host(host.clone());
        }
        client
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: impl SessionResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    #[must_use]
    pub fn with_connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Connect to this host only. The endpoint lookup still runs for the
    /// auth token. Has no effect once started.
    pub fn set_host(&mut self, host: impl Into<String>) {
        if self.session.is_some() {
            warn!("set_host after start has no effect");
            return;
        }
        self.host_override = Some(host.into());
    }

    pub fn use_default_host(&mut self) {
        self.set_host(DEFAULT_HOST);
    }

    pub fn on<F>(&self, kind: PacketKind, handler: F)
    where
        F: Fn(Arc<Packet>) + Send + Sync + 'static,
    {
        self.registry.on(kind, handler);
    }

    pub fn on_command<F>(&self, cmd: impl Into<String>, handler: F)
    where
        F: Fn(Arc<Packet>) + Send + Sync + 'static,
    {
        self.registry.on_command(cmd, handler);
    }

    pub fn on_any<F>(&self, handler: F)
    where
        F: Fn(Arc<Packet>) + Send + Sync + 'static,
    {
        self.registry.on_any(handler);
    }

    /// Resolve the session, connect, and spawn the read and heartbeat tasks.
    ///
    /// Returns once the first connection is established. A room lookup
    /// failure is returned before any dial is attempted.
    pub async fn start(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Err(ClientError::AlreadyStarted);
        }

        let room_id = self.resolver.resolve_room(&self.room_reference).await?;
        let (pool, token) = self.endpoint_pool(room_id).await?;
        let session = Arc::new(Session {
            room_reference: self.room_reference.clone(),
            room_id,
            viewer_id: self.viewer_id,
            device_id: self.device_id.clone(),
            token,
        });

        let mut manager = ConnectionManager::new(
            Arc::clone(&self.connector),
            Arc::clone(&session),
            pool,
            self.headers.clone(),
            self.options.retry.clone(),
        );
        manager.connect(&self.cancel).await?;

        let heartbeat = HeartbeatScheduler::new(
            manager.subscribe(),
            self.cancel.clone(),
            self.options.heartbeat_interval,
        )
        .spawn();
        let reader = ReadDispatchLoop::new(
            manager,
            self.registry.clone(),
            self.cancel.clone(),
            self.options.reconnect_delay,
        )
        .spawn();

        self.tasks = vec![reader, heartbeat];
        info!(room_id, reference = %self.room_reference, "Danmu client started");
        self.session = Some(session);
        Ok(())
    }

    async fn endpoint_pool(&self, room_id: u64) -> Result<(EndpointPool, String)> {
        let info = match self.resolver.resolve_endpoints(room_id).await {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(room_id, error = %e, "Endpoint lookup failed, using default host");
                None
            }
        };

        if let Some(host) = &self.host_override {
            let token = info.map(|i| i.token).unwrap_or_default();
            return Ok((EndpointPool::single(host.clone())?, token));
        }

        let Some(EndpointInfo { hosts, token }) = info else {
            return Ok((EndpointPool::default_host(), String::new()));
        };
        match EndpointPool::new(hosts) {
            Ok(pool) => Ok((pool, token)),
            Err(_) => {
                warn!(room_id, "Endpoint lookup returned no hosts, using default host");
                Ok((EndpointPool::default_host(), String::new()))
            }
        }
    }

    /// Signal both loops to stop. Idempotent, does not wait.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            info!(reference = %self.room_reference, "Stopping danmu client");
        }
        self.cancel.cancel();
    }

    /// Wait for the read and heartbeat tasks to finish
    pub async fn join(&mut self) {
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "Client task failed");
            }
        }
    }

    /// Session resolved by `start`
    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token fired by `stop`; also fired when reconnecting gives up
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for DanmuClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for DanmuClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DanmuClient")
            .field("room_reference", &self.room_reference)
            .field("host_override", &self.host_override)
            .field("session", &self.session)
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}
