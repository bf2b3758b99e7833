//! Callback registry keyed by packet kind

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::packet::{Packet, PacketKind};

/// A registered callback. Runs on the blocking pool for every matching
/// packet, so it may block without stalling the read loop.
pub type Handler = Arc<dyn Fn(Arc<Packet>) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    by_kind: HashMap<PacketKind, Vec<Handler>>,
    any: Vec<Handler>,
}

/// Shared registry of packet handlers.
///
/// Cloning is cheap and clones observe the same registrations, so handlers
/// may be added after the client has started.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    inner: Arc<RwLock<Handlers>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one packet kind
    pub fn on<F>(&self, kind: PacketKind, handler: F)
    where
        F: Fn(Arc<Packet>) + Send + Sync + 'static,
    {
        self.inner.write().by_kind.entry(kind).or_default().push(Arc::new(handler));
    }

    /// Register a handler for a notification command such as `DANMU_MSG`
    pub fn on_command<F>(&self, cmd: impl Into<String>, handler: F)
    where
        F: Fn(Arc<Packet>) + Send + Sync + 'static,
    {
        self.on(PacketKind::Command(cmd.into()), handler);
    }

    /// Register a handler that sees every packet
    pub fn on_any<F>(&self, handler: F)
    where
        F: Fn(Arc<Packet>) + Send + Sync + 'static,
    {
        self.inner.write().any.push(Arc::new(handler));
    }

    /// Number of handlers a packet of this kind would reach
    #[must_use]
    pub fn handler_count(&self, kind: &PacketKind) -> usize {
        let handlers = self.inner.read();
        handlers.by_kind.get(kind).map_or(0, Vec::len) + handlers.any.len()
    }

    /// Hand a packet to every matching handler, each on its own blocking task.
    ///
    /// Returns immediately; handlers complete in no particular order. Must be
    /// called from within a tokio runtime. Returns the number of tasks spawned.
    pub fn dispatch(&self, packet: Packet) -> usize {
        let matching: Vec<Handler> = {
            let handlers = self.inner.read();
            handlers
                .by_kind
                .get(packet.kind())
                .into_iter()
                .flatten()
                .chain(handlers.any.iter())
                .cloned()
                .collect()
        };

        if matching.is_empty() {
            tracing::trace!(kind = %packet.kind(), "No handler for packet");
            return 0;
        }

        let packet = Arc::new(packet);
        for handler in &matching {
            let handler = Arc::clone(handler);
            let packet = Arc::clone(&packet);
            tokio::task::spawn_blocking(move || handler(packet));
        }
        matching.len()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.inner.read();
        f.debug_struct("HandlerRegistry")
            .field("kinds", &handlers.by_kind.len())
            .field("any", &handlers.any.len())
            .finish()
    }
}
