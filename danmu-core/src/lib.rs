//! Bilibili live chat ("danmu") client
//!
//! Resolves a room, keeps an authenticated push connection alive across a
//! pool of endpoints, and hands every decoded packet to registered handlers.
//!
//! ```no_run
//! use danmu_core::DanmuClient;
//!
//! # async fn run() -> danmu_core::Result<()> {
//! let mut client = DanmuClient::new("21452505", 0, "", "Mozilla/5.0", "https://live.bilibili.com/");
//! client.on_command("DANMU_MSG", |packet| {
//!     println!("{}", String::from_utf8_lossy(packet.body()));
//! });
//! client.start().await?;
//! tokio::signal::ctrl_c().await.ok();
//! client.stop();
//! client.join().await;
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod heartbeat;
pub mod logging;
pub mod packet;
pub mod reader;
pub mod resolver;
pub mod session;
pub mod transport;

#[cfg(test)]
pub mod test_helpers;

pub use client::{ClientOptions, DanmuClient};
pub use config::{ClientConfig, Config, LoggingConfig};
pub use connection::RetryPolicy;
pub use error::{ClientError, ConnectError, LookupError, Result, TransportError};
pub use handler::HandlerRegistry;
pub use packet::{Operation, Packet, PacketKind};
pub use resolver::{BilibiliResolver, EndpointInfo, SessionResolver};
pub use session::{EndpointPool, Session, DEFAULT_HOST};
