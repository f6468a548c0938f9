//! # KRelay Networking Layer
//!
//! Tokio-based relay between game clients and game servers.
//!
//! ## Modules
//!
//! - [`config`] - Networking options
//! - [`connection`] - One client and its upstream server
//! - [`handlers`] - Packet and command hook registry
//! - [`relay`] - Shared relay context
//! - [`reconnect`] - Redirect rewriting and reconnect commands
//! - [`resolver`] - Player facts and duplicate session merging
//! - [`debugger`] - Packet logging
//! - [`server`] - Accept loop

pub mod config;
pub mod connection;
pub mod debugger;
pub mod handlers;
pub mod reconnect;
pub mod relay;
pub mod resolver;
pub mod server;

#[cfg(test)]
mod testing;

// Re-export commonly used items
pub use config::ProxyConfig;
pub use connection::{ClientConnection, ConnectionChannels, Outgoing};
pub use debugger::PacketDebugger;
pub use handlers::{CommandHook, HookRegistry, PacketHook, Verdict};
pub use reconnect::{resolve_host, send_reconnect, DnsResolver, HostResolver, ReconnectHandler};
pub use relay::{default_hooks, Relay};
pub use resolver::{PlayerStateResolver, MAP_INFO_KEY};
pub use server::RelayServer;
