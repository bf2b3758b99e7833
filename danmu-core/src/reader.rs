use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::codec;
use crate::connection::ConnectionManager;
use crate::error::ConnectError;
use crate::handler::HandlerRegistry;
use crate::transport::Frame;

/// Pause between a failed read and the reconnect
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3);

/// Long-running task that owns the connection manager: reads frames,
/// dispatches decoded packets and reconnects when a read fails.
pub struct ReadDispatchLoop {
    manager: ConnectionManager,
    registry: HandlerRegistry,
    cancel: CancellationToken,
    reconnect_delay: Duration,
}

impl ReadDispatchLoop {
    pub fn new(
        manager: ConnectionManager,
        registry: HandlerRegistry,
        cancel: CancellationToken,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            manager,
            registry,
            cancel,
            reconnect_delay,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let read = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                read = self.manager.read_frame() => read,
            };

            match read {
                Ok(Frame::Binary(data)) => {
                    let packets = codec::decode(&data);
                    trace!(packets = packets.len(), "Decoded frame");
                    for packet in packets {
                        self.registry.dispatch(packet);
                    }
                }
                Ok(Frame::Text(_)) => warn!("Frame not binary, discarding"),
                Ok(Frame::Control) => {}
                Err(e) => {
                    warn!(
                        host = self.manager.current_host().unwrap_or_default(),
                        error = %e,
                        "Read failed, reconnecting"
                    );
                    if !self.reconnect().await {
                        break;
                    }
                }
            }
        }

        self.manager.close().await;
        debug!(room_id = self.manager.session().room_id, "Read loop stopped");
    }

    /// Returns false when the loop should end
    async fn reconnect(&mut self) -> bool {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => return false,
            () = tokio::time::sleep(self.reconnect_delay) => {}
        }

        match self.manager.connect(&self.cancel).await {
            Ok(()) => {
                info!(host = self.manager.current_host().unwrap_or_default(), "Reconnected");
                true
            }
            Err(ConnectError::Cancelled) => false,
            Err(e @ ConnectError::RetryExhausted { .. }) => {
                error!(error = %e, "Giving up on push connection");
                self.cancel.cancel();
                false
            }
        }
    }
}
