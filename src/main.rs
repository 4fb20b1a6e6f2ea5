//! Tilesync Server
//!
//! Authoritative session registry behind the WebSocket service port.
//! Configuration comes from `TILESYNC_*` environment variables; log level
//! from `RUST_LOG` (default `info`).

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use tilesync::network::{GameServer, ServerConfig};
use tilesync::VERSION;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;

    let config = ServerConfig::from_env();
    info!("Tilesync Server v{}", VERSION);
    info!(
        "Field size {}x{}, orphaned maps: {:?}",
        config.field_width, config.field_height, config.orphan_maps
    );

    let server = Arc::new(GameServer::new(config));

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            signal_server.shutdown();
        }
    });

    server.run().await.context("Server failed")?;
    info!("Server stopped");
    Ok(())
}
