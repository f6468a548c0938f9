//! # Relay Server - Accept Loop
//!
//! Accepts client sockets and runs one [`ClientConnection`] task per socket.
//!
//! # Architecture
//!
//! 1. **TCP Listener** - Accepts incoming clients on the relay port
//! 2. **Relay** - Shared sessions, reference data and hooks
//! 3. **Handoff sweeper** - Drops sessions whose client never came back
//!
//! # Example
//!
//! ```rust,no_run
//! use krelay_gamedata::GameData;
//! use krelay_network::{ProxyConfig, Relay, RelayServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let relay = Relay::with_default_hooks(ProxyConfig::default(), GameData::bundled()?)?;
//!     let server = RelayServer::new(relay).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

use crate::connection::ClientConnection;
use crate::relay::Relay;
use krelay_core::{RelayError, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// How long connections get to finish after shutdown starts
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Listening relay
pub struct RelayServer {
    relay: Arc<Relay>,
    listener: TcpListener,
}

impl RelayServer {
    /// Bind the relay port
    ///
    /// # Errors
    /// Returns an error if:
    /// - Configuration is invalid
    /// - The listener cannot be bound to the configured address
    pub async fn new(relay: Arc<Relay>) -> Result<Self> {
        let config = relay.config();
        config
            .validate()
            .map_err(|e| RelayError::Config(format!("Invalid configuration: {}", e)))?;

        let listener = TcpListener::bind(config.bind_address).await.map_err(|e| {
            RelayError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to bind to {}: {}", config.bind_address, e),
            ))
        })?;

        info!("Relay listening on {}", config.bind_address);
        info!(
            "Clients are redirected to {}:{}, max_clients={}",
            config.public_host,
            config.public_port(),
            config.max_clients
        );

        Ok(Self { relay, listener })
    }

    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Cannot listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Ctrl-C received, initiating shutdown");
        })
        .await
    }

    /// Accept clients until `shutdown` completes
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        info!("Relay starting main loop");
        let sweeper = self.relay.spawn_handoff_sweeper();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((mut socket, addr)) => {
                            if self.relay.connection_count() >= self.relay.config().max_clients {
                                warn!(
                                    "Connection from {} rejected: relay full ({} clients)",
                                    addr,
                                    self.relay.connection_count()
                                );
                                let _ = socket.shutdown().await;
                                continue;
                            }

                            if let Err(e) = socket.set_nodelay(true) {
                                debug!("Cannot disable Nagle for {}: {}", addr, e);
                            }

                            let (conn, channels) = ClientConnection::new(self.relay.clone(), addr);
                            tokio::spawn(async move {
                                if let Err(e) = conn.run(socket, channels).await {
                                    debug!("Connection task ended with error: {:?}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Error accepting connection: {:?}", e);
                        }
                    }
                }

                _ = &mut shutdown => break,
            }
        }

        sweeper.abort();
        info!("Relay main loop ended");

        let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
        while self.relay.connection_count() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let remaining = self.relay.connection_count();
        if remaining > 0 {
            warn!("Leaving {} connections behind at shutdown", remaining);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_relay;
    use crate::ProxyConfig;

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = ProxyConfig::default();
        config.max_clients = 0;
        assert!(matches!(
            RelayServer::new(test_relay(config)).await,
            Err(RelayError::Config(_))
        ));
    }
}
