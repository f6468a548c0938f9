//! # Relay Context
//!
//! Process-scoped state shared by every connection: configuration, the
//! session table, reference data, the default backend, the live
//! connections and the hook registry. Created once at startup and handed
//! to each connection as an `Arc`.

use crate::{
    config::ProxyConfig,
    connection::ClientConnection,
    debugger::PacketDebugger,
    handlers::HookRegistry,
    reconnect::{send_reconnect, DnsResolver, HostResolver, ReconnectHandler},
    resolver::PlayerStateResolver,
};
use dashmap::DashMap;
use krelay_config::RelayConfig;
use krelay_core::{ConnectionId, RelayError, Result};
use krelay_gamedata::{GameData, ServerRecord};
use krelay_protocol::nexus_redirect;
use krelay_session::SessionTable;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Shared relay state
pub struct Relay {
    config: ProxyConfig,
    sessions: SessionTable,
    game_data: GameData,

    /// Backend new sessions connect to
    default_server: RwLock<ServerRecord>,

    /// All live client connections
    connections: DashMap<ConnectionId, Arc<ClientConnection>>,

    hooks: HookRegistry,

    /// Resolves host names in server redirects
    resolver: Arc<dyn HostResolver>,

    next_connection_id: AtomicU64,
}

impl Relay {
    /// Create the relay context with a prepared hook registry
    ///
    /// # Errors
    /// Returns an error if the configured default server matches zero or
    /// several known servers.
    pub fn new(config: ProxyConfig, game_data: GameData, hooks: HookRegistry) -> Result<Arc<Self>> {
        Self::with_resolver(config, game_data, hooks, Arc::new(DnsResolver))
    }

    /// Create the relay context with a custom host name resolver
    pub fn with_resolver(
        config: ProxyConfig,
        game_data: GameData,
        hooks: HookRegistry,
        resolver: Arc<dyn HostResolver>,
    ) -> Result<Arc<Self>> {
        let default_server = game_data
            .servers
            .lookup_user_input(&config.default_server)
            .map_err(|e| RelayError::Config(format!("default server {}: {}", config.default_server, e)))?
            .clone();

        info!("Default server is {} ({})", default_server.name, default_server.address);

        Ok(Arc::new(Self {
            config,
            sessions: SessionTable::new(),
            game_data,
            default_server: RwLock::new(default_server),
            connections: DashMap::new(),
            hooks,
            resolver,
            next_connection_id: AtomicU64::new(1),
        }))
    }

    /// Create the relay context with the built-in handlers attached
    pub fn with_default_hooks(config: ProxyConfig, game_data: GameData) -> Result<Arc<Self>> {
        let hooks = default_hooks(&config);
        Self::new(config, game_data, hooks)
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn game_data(&self) -> &GameData {
        &self.game_data
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn resolver(&self) -> &Arc<dyn HostResolver> {
        &self.resolver
    }

    /// Current default backend
    pub fn default_server(&self) -> ServerRecord {
        self.default_server.read().clone()
    }

    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_connection_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn register_connection(&self, client: Arc<ClientConnection>) {
        self.connections.insert(client.id(), client);
    }

    pub(crate) fn unregister_connection(&self, id: ConnectionId) {
        self.connections.remove(&id);
    }

    pub fn connection(&self, id: ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.get(&id).map(|c| c.value().clone())
    }

    pub fn is_live(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Make `server` the default backend
    ///
    /// Every state still targeting the previous default is moved to the
    /// new one. Clients currently connected on such a state are sent a hub
    /// redirect to the new server so they hop over immediately.
    ///
    /// # Returns
    /// The connections that were sent a redirect
    pub fn switch_default(&self, server: &ServerRecord) -> Vec<ConnectionId> {
        let previous = std::mem::replace(&mut *self.default_server.write(), server.clone());
        info!("Default server changed from {} to {}", previous.name, server.name);

        if let Some(path) = &self.config.options_file {
            if let Err(e) = RelayConfig::save_option(path, "defaultserver", &server.name) {
                warn!("Could not save default server to {:?}: {}", path, e);
            }
        }

        if previous.address == server.address {
            return Vec::new();
        }

        let redirect = nexus_redirect(&server.address, i32::from(self.config.remote_port));
        let mut redirected = Vec::new();

        for state in self.sessions.states_targeting(&previous.address) {
            let owner = {
                let mut s = state.lock();
                s.set_upstream(server.address.clone(), self.config.remote_port);
                s.owner
            };

            let Some(client) = owner.and_then(|id| self.connection(id)) else {
                continue;
            };
            if !client.state().is_some_and(|current| Arc::ptr_eq(&current, &state)) {
                continue;
            }

            match send_reconnect(&client, &redirect) {
                Ok(()) => redirected.push(client.id()),
                Err(e) => debug!("Connection {} not redirected: {}", client.id(), e),
            }
        }

        info!("Redirected {} clients to {}", redirected.len(), server.name);
        redirected
    }

    /// Periodically drop sessions whose client never followed its redirect
    pub fn spawn_handoff_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let relay = Arc::downgrade(self);
        let timeout = self.config.handoff_timeout;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(timeout.max(std::time::Duration::from_secs(1)));
            loop {
                interval.tick().await;
                let Some(relay) = relay.upgrade() else {
                    break;
                };
                let removed = relay.sessions.sweep_expired_handoffs(timeout, |id| relay.is_live(id));
                if removed > 0 {
                    info!("Dropped {} sessions whose handoff expired", removed);
                }
            }
        })
    }
}

/// Hook registry with the built-in handlers attached
pub fn default_hooks(config: &ProxyConfig) -> HookRegistry {
    let mut hooks = HookRegistry::new();
    ReconnectHandler::new().attach(&mut hooks);
    PlayerStateResolver::new(config.shoot_offset).attach(&mut hooks);
    if !config.debug_packets.is_empty() {
        PacketDebugger::new(config.debug_packets.clone()).attach(&mut hooks);
    }
    hooks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_client_on, test_relay};
    use krelay_core::ConnectionId;
    use krelay_protocol::Packet;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_unknown_default_server_is_rejected() {
        let config = ProxyConfig { default_server: "Nowhere".into(), ..Default::default() };
        assert!(Relay::with_default_hooks(config, GameData::bundled().unwrap()).is_err());
    }

    #[tokio::test]
    async fn test_connection_ids_are_unique() {
        let relay = test_relay(ProxyConfig::default());
        let a = relay.next_connection_id();
        let b = relay.next_connection_id();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_switch_default_retargets_only_old_default() {
        let relay = test_relay(ProxyConfig::default());
        let usw = relay.default_server();
        let euw = relay.game_data().servers.lookup_user_input("EUW").unwrap().clone();

        let (client, mut channels) = test_client_on(&relay);
        let on_default = relay.sessions().create(&usw.address, 2050);
        on_default.lock().owner = Some(client.id());
        client.set_state(on_default.clone());

        let elsewhere = relay.sessions().create("10.9.9.9", 2050);
        let orphan = relay.sessions().create(&usw.address, 2050);
        orphan.lock().owner = Some(ConnectionId::new(9999));

        let redirected = relay.switch_default(&euw);
        assert_eq!(redirected, vec![client.id()]);
        assert_eq!(relay.default_server().name, euw.name);

        assert_eq!(on_default.lock().upstream_address, euw.address);
        assert!(on_default.lock().awaiting_handoff());
        assert_eq!(orphan.lock().upstream_address, euw.address);
        assert_eq!(elsewhere.lock().upstream_address, "10.9.9.9");

        let Some(crate::Outgoing::Packet(Packet::Reconnect(sent))) = channels.client_rx.recv().await else {
            panic!("expected a redirect");
        };
        assert_eq!(sent.host, relay.config().public_host);
        assert_eq!(sent.name, "Nexus");
    }

    #[tokio::test]
    async fn test_switch_default_persists_choice() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("relayoptions.txt");
        let config = ProxyConfig { options_file: Some(path.clone()), ..Default::default() };
        let relay = test_relay(config);

        let euw = relay.game_data().servers.lookup_user_input("EUW").unwrap().clone();
        relay.switch_default(&euw);

        let saved = RelayConfig::load_from_file(&path).unwrap();
        assert_eq!(saved.default_server, euw.name);
    }
}
