//! KRelay - transparent game protocol relay
//!
//! Relay binary: reads `relayoptions.txt`, loads the reference data and
//! accepts clients until Ctrl-C.

use anyhow::Context;
use krelay_config::{RelayConfig, OPTIONS_FILE};
use krelay_gamedata::GameData;
use krelay_network::{ProxyConfig, Relay, RelayServer};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing (RUST_LOG overrides the default level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("🚀 K Relay starting up...");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    info!("📂 Loading configuration from {}...", OPTIONS_FILE);
    let options = RelayConfig::load_or_default(OPTIONS_FILE);
    options.display();
    options.validate().context("invalid relay options")?;

    let game_data = GameData::load(Path::new(&options.servers_file), Path::new(&options.packets_file))
        .context("failed to load game data")?;

    let proxy_config = ProxyConfig::from_options(&options, Some(PathBuf::from(OPTIONS_FILE)));

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let relay = Relay::with_default_hooks(proxy_config, game_data).context("failed to start relay")?;
    let server = RelayServer::new(relay).await.context("failed to bind relay port")?;

    info!("🎮 Relay is ready, point the client at {}:{}", options.public_host, options.listen_port);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    if let Err(e) = server.run().await {
        error!("💥 Relay error: {}", e);
        return Err(e.into());
    }

    info!("👋 Relay shut down gracefully");
    Ok(())
}
