//! KRelay Configuration Management
//!
//! Loads relay options from `relayoptions.txt`:
//!
//! ```text
//! # comment
//! listenport = 2050
//! defaultserver = USWest
//! stealth = false
//! ```
//!
//! Unknown keys are ignored and values that do not parse keep their default.

use krelay_core::{RelayError, Result};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default name of the options file
pub const OPTIONS_FILE: &str = "relayoptions.txt";

/// Relay configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    // ========== Listener ==========
    /// Interface the relay binds (from "listenhost")
    pub listen_host: String,
    /// Port the relay binds and writes into redirects (from "listenport")
    pub listen_port: u16,
    /// Host written into redirects sent to clients (from "publichost")
    pub public_host: String,
    /// Maximum simultaneous clients (from "maxclients")
    pub max_clients: usize,

    // ========== Backend ==========
    /// Name of the default game server (from "defaultserver")
    pub default_server: String,
    /// Port of the game servers (from "remoteport")
    pub remote_port: u16,

    // ========== Behaviour ==========
    /// Suppress every message the relay would add on its own (from "stealth")
    pub stealth: bool,
    pub welcome_message: String,
    pub welcome_delay_ms: u64,
    /// Distance between a player and the origin of their shots (from "shootoffset")
    pub shoot_offset: f32,
    /// Packet types logged in full (from "debugpackets", comma separated)
    pub debug_packets: Vec<String>,

    // ========== Files ==========
    pub servers_file: String,
    pub packets_file: String,

    // ========== Limits ==========
    pub idle_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// How long a session waits for its client to follow a redirect (from "handofftimeout")
    pub handoff_timeout_secs: u64,
    /// Largest accepted frame in bytes (from "maxframesize")
    pub max_frame_len: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_host: "127.0.0.1".to_string(),
            listen_port: 2050,
            public_host: "localhost".to_string(),
            max_clients: 256,
            default_server: "USWest".to_string(),
            remote_port: 2050,
            stealth: false,
            welcome_message: "Welcome to K Relay!".to_string(),
            welcome_delay_ms: 1000,
            shoot_offset: 0.3,
            debug_packets: Vec::new(),
            servers_file: "servers.json".to_string(),
            packets_file: "packets.json".to_string(),
            idle_timeout_secs: 60,
            connect_timeout_secs: 10,
            handoff_timeout_secs: 120,
            max_frame_len: 1024 * 1024,
        }
    }
}

impl RelayConfig {
    /// Load configuration from an options file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Load configuration, falling back to the defaults when the file is
    /// missing or unreadable
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load_from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load {:?}: {}, using default configuration",
                    path.as_ref(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Parse options file content
    pub fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();

            // Skip comments and empty lines
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                config.parse_option(&key.trim().to_lowercase(), value.trim());
            }
        }

        config
    }

    fn parse_option(&mut self, key: &str, value: &str) {
        let defaults = Self::default();
        match key {
            "listenhost" => self.listen_host = value.into(),
            "listenport" => self.listen_port = value.parse().unwrap_or(defaults.listen_port),
            "publichost" => self.public_host = value.into(),
            "maxclients" => self.max_clients = value.parse().unwrap_or(defaults.max_clients),
            "defaultserver" => self.default_server = value.into(),
            "remoteport" => self.remote_port = value.parse().unwrap_or(defaults.remote_port),
            "stealth" => self.stealth = value.parse().unwrap_or(defaults.stealth),
            "welcomemessage" => self.welcome_message = value.into(),
            "welcomedelayms" => {
                self.welcome_delay_ms = value.parse().unwrap_or(defaults.welcome_delay_ms);
            }
            "shootoffset" => self.shoot_offset = value.parse().unwrap_or(defaults.shoot_offset),
            "debugpackets" => {
                self.debug_packets = value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            "serversfile" => self.servers_file = value.into(),
            "packetsfile" => self.packets_file = value.into(),
            "idletimeout" => {
                self.idle_timeout_secs = value.parse().unwrap_or(defaults.idle_timeout_secs);
            }
            "connecttimeout" => {
                self.connect_timeout_secs = value.parse().unwrap_or(defaults.connect_timeout_secs);
            }
            "handofftimeout" => {
                self.handoff_timeout_secs = value.parse().unwrap_or(defaults.handoff_timeout_secs);
            }
            "maxframesize" => self.max_frame_len = value.parse().unwrap_or(defaults.max_frame_len),
            _ => {
                debug!("Unknown config option: {} = {}", key, value);
            }
        }
    }

    /// Write a single option back to an options file
    ///
    /// Replaces the first line setting `key`, or appends one. Comments and
    /// other options are kept as they are. A missing file is created.
    pub fn save_option<P: AsRef<Path>>(path: P, key: &str, value: &str) -> Result<()> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let mut replaced = false;
        let mut lines: Vec<String> = content
            .lines()
            .map(|line| {
                let trimmed = line.trim();
                let is_key = !trimmed.starts_with('#')
                    && trimmed
                        .split_once('=')
                        .is_some_and(|(k, _)| k.trim().eq_ignore_ascii_case(key));
                if is_key && !replaced {
                    replaced = true;
                    format!("{} = {}", key, value)
                } else {
                    line.to_string()
                }
            })
            .collect();

        if !replaced {
            lines.push(format!("{} = {}", key, value));
        }

        let mut output = lines.join("\n");
        output.push('\n');
        fs::write(path, output)?;
        Ok(())
    }

    /// Get the bind address for the TCP listener
    pub fn bind_address(&self) -> SocketAddr {
        let ip = self
            .listen_host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        SocketAddr::new(ip, self.listen_port)
    }

    pub fn welcome_delay(&self) -> Duration {
        Duration::from_millis(self.welcome_delay_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn handoff_timeout(&self) -> Duration {
        Duration::from_secs(self.handoff_timeout_secs)
    }

    /// Check values that would make the relay unusable
    pub fn validate(&self) -> Result<()> {
        if self.listen_port == 0 {
            return Err(RelayError::Config("listenport must not be 0".to_string()));
        }
        if self.public_host.is_empty() {
            return Err(RelayError::Config("publichost must not be empty".to_string()));
        }
        if self.default_server.is_empty() {
            return Err(RelayError::Config("defaultserver must not be empty".to_string()));
        }
        if !self.shoot_offset.is_finite() {
            return Err(RelayError::Config("shootoffset must be a finite number".to_string()));
        }
        Ok(())
    }

    /// Display configuration summary
    pub fn display(&self) {
        info!("Relay configuration:");
        info!("  Listen: {} (clients told to use {}:{})", self.bind_address(), self.public_host, self.listen_port);
        info!("  Max clients: {}", self.max_clients);
        info!("  Default server: {} (port {})", self.default_server, self.remote_port);
        info!("  Stealth: {}", self.stealth);
        if !self.stealth {
            info!("  Welcome: {:?} after {} ms", self.welcome_message, self.welcome_delay_ms);
        }
        info!("  Shoot offset: {}", self.shoot_offset);
        info!("  Game data: {} / {}", self.servers_file, self.packets_file);
        info!(
            "  Timeouts: idle {}s, connect {}s, handoff {}s",
            self.idle_timeout_secs,
            self.connect_timeout_secs,
            self.handoff_timeout_secs
        );
        if !self.debug_packets.is_empty() {
            info!("  Debugging packets: {}", self.debug_packets.join(", "));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.listen_port, 2050);
        assert_eq!(config.public_host, "localhost");
        assert_eq!(config.default_server, "USWest");
        assert!((config.shoot_offset - 0.3).abs() < f32::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_simple_config() {
        let config_text = r#"
# relay options
listenport = 2051
DefaultServer = EUWest
stealth = true
welcomemessage = Hello = there
debugpackets = RECONNECT, update,
"#;
        let config = RelayConfig::parse(config_text);
        assert_eq!(config.listen_port, 2051);
        assert_eq!(config.default_server, "EUWest");
        assert!(config.stealth);
        assert_eq!(config.welcome_message, "Hello = there");
        assert_eq!(config.debug_packets, vec!["RECONNECT", "update"]);
    }

    #[test]
    fn test_bad_values_keep_defaults() {
        let config = RelayConfig::parse("listenport = lots\nshootoffset = ?\nnosuchkey = 1");
        assert_eq!(config.listen_port, 2050);
        assert!((config.shoot_offset - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn test_bind_address() {
        let config = RelayConfig::parse("listenhost = 0.0.0.0\nlistenport = 3000");
        assert_eq!(config.bind_address(), "0.0.0.0:3000".parse().unwrap());

        let config = RelayConfig::parse("listenhost = not-an-ip");
        assert_eq!(config.bind_address(), "127.0.0.1:2050".parse().unwrap());
    }

    #[test]
    fn test_validate() {
        let mut config = RelayConfig::default();
        config.public_host.clear();
        assert!(matches!(config.validate(), Err(RelayError::Config(_))));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = RelayConfig::load_or_default(dir.path().join(OPTIONS_FILE));
        assert_eq!(config, RelayConfig::default());
        assert!(RelayConfig::load_from_file(dir.path().join(OPTIONS_FILE)).is_err());
    }

    #[test]
    fn test_save_option_replaces_in_place() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(OPTIONS_FILE);
        fs::write(&path, "# keep me\ndefaultserver = USWest\nstealth = true\n").unwrap();

        RelayConfig::save_option(&path, "defaultserver", "EUWest").unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "# keep me\ndefaultserver = EUWest\nstealth = true\n");

        let config = RelayConfig::load_from_file(&path).unwrap();
        assert_eq!(config.default_server, "EUWest");
        assert!(config.stealth);
    }

    #[test]
    fn test_save_option_creates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(OPTIONS_FILE);
        RelayConfig::save_option(&path, "defaultserver", "Asia").unwrap();
        assert_eq!(RelayConfig::load_from_file(&path).unwrap().default_server, "Asia");
    }
}
