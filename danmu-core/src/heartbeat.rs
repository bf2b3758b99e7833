use std::time::Duration;

use bytes::Bytes;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::codec;
use crate::connection::SinkSlot;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Periodic keep-alive writer.
///
/// Writes to whichever connection is canonical at send time. Never
/// reconnects; a failed write is logged and the next tick tries again.
pub struct HeartbeatScheduler {
    slot: watch::Receiver<SinkSlot>,
    cancel: CancellationToken,
    interval: Duration,
    frame: Bytes,
}

impl HeartbeatScheduler {
    pub fn new(slot: watch::Receiver<SinkSlot>, cancel: CancellationToken, interval: Duration) -> Self {
        Self {
            slot,
            cancel,
            // interval_at panics on zero
            interval: interval.max(Duration::from_millis(1)),
            frame: codec::encode_heartbeat(),
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let sink = self.slot.borrow().clone();
            let Some(sink) = sink else {
                debug!("No connection, skipping heartbeat");
                continue;
            };
            match sink.send(self.frame.clone()).await {
                Ok(()) => debug!("Heartbeat sent"),
                Err(e) => error!(error = %e, "Failed to send heartbeat"),
            }
        }

        debug!("Heartbeat stopped");
    }
}
