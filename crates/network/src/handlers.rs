//! # Packet Hook System
//!
//! Routes decoded packets and chat commands to the hooks registered for them.
//!
//! # Architecture
//!
//! ## Hook Registry
//!
//! The registry keeps an ordered list of hooks per packet type and per
//! command name. Every hook registered for a key runs, in registration order.
//!
//! ## Verdicts
//!
//! A packet hook may rewrite the packet in place and returns a [`Verdict`].
//! The packet is forwarded only if no hook blocked it. A hook that fails
//! blocks the packet it was handling; the remaining hooks still run.
//!
//! # Thread Safety
//!
//! Hooks are shared by every connection task and run concurrently for
//! different connections. Hooks for one connection always run sequentially
//! on that connection's task.
//!
//! # Example
//!
//! ```no_run
//! use krelay_network::{HookRegistry, Verdict};
//! use krelay_protocol::PacketType;
//! # use tracing::info;
//!
//! let mut registry = HookRegistry::new();
//! registry.register_fn(PacketType::Text, |_client, packet| {
//!     info!("chat: {:?}", packet);
//!     Ok(Verdict::Forward)
//! });
//! ```

use crate::connection::ClientConnection;
use async_trait::async_trait;
use krelay_core::Result;
use krelay_protocol::{Packet, PacketType};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Decision of a hook about the packet it handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Forward,
    Block,
}

/// Observes or rewrites packets of the types it is registered for
#[async_trait]
pub trait PacketHook: Send + Sync {
    async fn on_packet(&self, client: &Arc<ClientConnection>, packet: &mut Packet) -> Result<Verdict>;
}

/// Handles a `/command` typed by the client
#[async_trait]
pub trait CommandHook: Send + Sync {
    async fn on_command(&self, client: &Arc<ClientConnection>, command: &str, args: &[String]) -> Result<()>;
}

/// Adapter turning a synchronous closure into a [`PacketHook`]
struct FnHook<F>(F);

#[async_trait]
impl<F> PacketHook for FnHook<F>
where
    F: Fn(&Arc<ClientConnection>, &mut Packet) -> Result<Verdict> + Send + Sync,
{
    async fn on_packet(&self, client: &Arc<ClientConnection>, packet: &mut Packet) -> Result<Verdict> {
        (self.0)(client, packet)
    }
}

/// Registry of packet and command hooks
///
/// # Purpose
/// Maps packet types and lowercase command names to the hooks that handle
/// them.
///
/// # Example
///
/// ```no_run
/// use krelay_network::{HookRegistry, PlayerStateResolver};
/// use krelay_protocol::PacketType;
/// use std::sync::Arc;
///
/// let mut registry = HookRegistry::new();
/// let resolver = Arc::new(PlayerStateResolver::new(0.3));
/// registry.register_packet(PacketType::Move, resolver);
/// ```
#[derive(Default)]
pub struct HookRegistry {
    packet_hooks: HashMap<PacketType, Vec<Arc<dyn PacketHook>>>,
    command_hooks: HashMap<String, Vec<Arc<dyn CommandHook>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook for one packet type
    ///
    /// The same hook may be registered for several types.
    pub fn register_packet(&mut self, packet_type: PacketType, hook: Arc<dyn PacketHook>) {
        debug!("Registered hook for packet type: {}", packet_type);
        self.packet_hooks.entry(packet_type).or_default().push(hook);
    }

    /// Register a hook for a chat command
    ///
    /// # Arguments
    /// * `command` - Command name without the leading `/`, matched case-insensitively
    pub fn register_command(&mut self, command: &str, hook: Arc<dyn CommandHook>) {
        let command = command.to_lowercase();
        debug!("Registered hook for command: /{}", command);
        self.command_hooks.entry(command).or_default().push(hook);
    }

    /// Register a closure as a packet hook
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use krelay_network::{HookRegistry, Verdict};
    /// # use krelay_protocol::PacketType;
    /// # let mut registry = HookRegistry::new();
    /// registry.register_fn(PacketType::Failure, |_client, _packet| Ok(Verdict::Block));
    /// ```
    pub fn register_fn<F>(&mut self, packet_type: PacketType, hook: F)
    where
        F: Fn(&Arc<ClientConnection>, &mut Packet) -> Result<Verdict> + Send + Sync + 'static,
    {
        self.register_packet(packet_type, Arc::new(FnHook(hook)));
    }

    /// Run every hook registered for the packet's type
    ///
    /// # Returns
    /// - `Verdict::Forward` - No hook blocked the packet (or none exists)
    /// - `Verdict::Block` - At least one hook blocked or failed
    pub async fn dispatch_packet(&self, client: &Arc<ClientConnection>, packet: &mut Packet) -> Verdict {
        let Some(packet_type) = packet.packet_type() else {
            return Verdict::Forward;
        };
        let Some(hooks) = self.packet_hooks.get(&packet_type) else {
            return Verdict::Forward;
        };

        let mut verdict = Verdict::Forward;
        for hook in hooks {
            match hook.on_packet(client, packet).await {
                Ok(Verdict::Forward) => {}
                Ok(Verdict::Block) => verdict = Verdict::Block,
                Err(e) => {
                    warn!("Connection {}: {} hook failed: {}", client.id(), packet_type, e);
                    verdict = Verdict::Block;
                }
            }
        }
        verdict
    }

    /// Run every hook registered for a command
    ///
    /// # Returns
    /// `true` if at least one hook exists for the command
    pub async fn dispatch_command(&self, client: &Arc<ClientConnection>, command: &str, args: &[String]) -> bool {
        let Some(hooks) = self.command_hooks.get(command) else {
            return false;
        };

        for hook in hooks {
            if let Err(e) = hook.on_command(client, command, args).await {
                warn!("Connection {}: /{} failed: {}", client.id(), command, e);
            }
        }
        true
    }

    /// Check if a hook is registered for a packet type
    pub fn has_hook(&self, packet_type: PacketType) -> bool {
        self.packet_hooks.contains_key(&packet_type)
    }

    pub fn has_command(&self, command: &str) -> bool {
        self.command_hooks.contains_key(&command.to_lowercase())
    }

    /// Total number of registered packet and command hooks
    pub fn hook_count(&self) -> usize {
        self.packet_hooks.values().map(Vec::len).sum::<usize>()
            + self.command_hooks.values().map(Vec::len).sum::<usize>()
    }
}
