//! # Proxy Configuration
//!
//! Options the networking layer and the built-in handlers run with.
//!
//! # Example
//!
//! ```rust
//! use krelay_network::ProxyConfig;
//! use std::time::Duration;
//!
//! let config = ProxyConfig {
//!     bind_address: "0.0.0.0:2050".parse().unwrap(),
//!     public_host: "192.168.1.20".to_string(),
//!     idle_timeout: Duration::from_secs(120),
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use krelay_config::RelayConfig;
use krelay_protocol::{PacketType, DEFAULT_MAX_FRAME_LEN};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Relay networking options
///
/// # Default Values
/// - Listens on `127.0.0.1:2050` and tells clients to reconnect to `localhost`
/// - Game servers on port 2050
/// - 256 clients
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Address and port the relay listens on
    ///
    /// # Notes
    /// - The port is also written into every redirect sent to a client
    pub bind_address: SocketAddr,

    /// Host written into redirects sent to clients
    ///
    /// # Default
    /// `"localhost"`
    pub public_host: String,

    /// Maximum number of concurrent client connections
    pub max_clients: usize,

    /// Port of the game servers
    pub remote_port: u16,

    /// Name of the default game server at startup
    pub default_server: String,

    /// Suppress relay-generated messages (welcome notification)
    pub stealth: bool,

    pub welcome_message: String,
    pub welcome_delay: Duration,

    /// Distance between a player and the origin of their shots
    pub shoot_offset: f32,

    /// Packet types logged in full as they pass through
    pub debug_packets: Vec<PacketType>,

    /// Connections with no traffic in either direction are closed after this
    pub idle_timeout: Duration,

    /// How long to wait for a game server to accept a connection
    pub connect_timeout: Duration,

    /// Sessions waiting longer than this for their client to reconnect are dropped
    pub handoff_timeout: Duration,

    /// Largest accepted frame in bytes
    pub max_frame_len: usize,

    /// Options file the default server is saved to when it changes
    ///
    /// # Notes
    /// - `None` keeps default server changes in memory only
    pub options_file: Option<PathBuf>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 2050)),
            public_host: "localhost".to_string(),
            max_clients: 256,
            remote_port: 2050,
            default_server: "USWest".to_string(),
            stealth: false,
            welcome_message: "Welcome to K Relay!".to_string(),
            welcome_delay: Duration::from_millis(1000),
            shoot_offset: 0.3,
            debug_packets: Vec::new(),
            idle_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            handoff_timeout: Duration::from_secs(120),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            options_file: None,
        }
    }
}

impl ProxyConfig {
    /// Build the networking options from the relay options file
    ///
    /// Unknown names in `debugpackets` are skipped with a warning.
    pub fn from_options(options: &RelayConfig, options_file: Option<PathBuf>) -> Self {
        let debug_packets = options
            .debug_packets
            .iter()
            .filter_map(|name| {
                let packet_type = PacketType::from_name(name);
                if packet_type.is_none() {
                    warn!("Cannot debug unknown packet type {}", name);
                }
                packet_type
            })
            .collect();

        Self {
            bind_address: options.bind_address(),
            public_host: options.public_host.clone(),
            max_clients: options.max_clients,
            remote_port: options.remote_port,
            default_server: options.default_server.clone(),
            stealth: options.stealth,
            welcome_message: options.welcome_message.clone(),
            welcome_delay: options.welcome_delay(),
            shoot_offset: options.shoot_offset,
            debug_packets,
            idle_timeout: options.idle_timeout(),
            connect_timeout: options.connect_timeout(),
            handoff_timeout: options.handoff_timeout(),
            max_frame_len: options.max_frame_len,
            options_file,
        }
    }

    /// Port written into redirects sent to clients
    pub fn public_port(&self) -> u16 {
        self.bind_address.port()
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// `Ok(())` if configuration is valid, `Err(String)` otherwise
    ///
    /// # Checks
    /// - `max_clients` must be > 0
    /// - the listen port must not be 0, redirects could not name it
    /// - `public_host` must not be empty
    /// - `max_frame_len` must fit at least a frame header
    pub fn validate(&self) -> Result<(), String> {
        if self.max_clients == 0 {
            return Err("max_clients must be > 0".to_string());
        }

        if self.bind_address.port() == 0 {
            return Err("bind_address must use a fixed port".to_string());
        }

        if self.public_host.is_empty() {
            return Err("public_host must not be empty".to_string());
        }

        if self.max_frame_len < krelay_protocol::FRAME_HEADER_LEN {
            return Err("max_frame_len is smaller than a frame header".to_string());
        }

        if self.idle_timeout <= self.connect_timeout {
            warn!("idle_timeout is not longer than connect_timeout, slow servers may be dropped");
        }

        Ok(())
    }
}
