use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use danmu_core::{
    bootstrap::{load_config, validate_config},
    logging, Config, DanmuClient, PacketKind,
};

#[derive(Parser, Debug)]
#[command(name = "danmu")]
#[command(about = "Bilibili live chat client", long_about = None)]
struct Args {
    /// Config file (defaults to DANMU_CONFIG_PATH, then ./danmu.yaml)
    #[arg(long, short)]
    config: Option<String>,

    /// Room id or live room URL, overrides the config file
    #[arg(long, short)]
    room: Option<String>,

    /// Connect to this push host only
    #[arg(long)]
    host: Option<String>,

    /// Viewer uid
    #[arg(long)]
    viewer_id: Option<u64>,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(room) = self.room {
            config.client.room = room;
        }
        if let Some(host) = self.host {
            config.client.host = Some(host);
        }
        if let Some(viewer_id) = self.viewer_id {
            config.client.viewer_id = viewer_id;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration; command line wins over file and environment
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => load_config()?,
    };
    args.apply(&mut config);
    validate_config(&config)?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!(room = %config.client.room, "danmu client starting");

    // 3. Connect
    let mut client = DanmuClient::from_config(&config.client);
    client.on_any(|packet| match packet.kind() {
        PacketKind::HeartbeatReply => info!(popularity = packet.popularity(), "Heartbeat reply"),
        kind => info!(
            kind = %kind,
            body = %String::from_utf8_lossy(packet.body()),
            "Packet"
        ),
    });
    client.start().await?;

    // 4. Run until a signal arrives or the client gives up reconnecting
    let stopped = client.cancel_token();
    tokio::select! {
        () = shutdown_signal() => {}
        () = stopped.cancelled() => error!("Client stopped: could not reconnect"),
    }

    client.stop();
    client.join().await;
    info!("danmu client stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}
