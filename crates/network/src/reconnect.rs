//! # Reconnect Protocol Handler
//!
//! Keeps server transitions invisible to the client.
//!
//! Every redirect the game server sends is rewritten to point back at the
//! relay, with the session id as its key. The real destination and key are
//! stored on the session. When the client reconnects and presents the
//! session id, the relay adopts the session and connects upstream to the
//! stored destination with the stored key.
//!
//! # Flow
//!
//! ```text
//! server: RECONNECT host=H port=P key=K
//!   state: upstream = H:P, pending key = K
//!   client: RECONNECT host=relay port=relay key=session id
//! client: HELLO key=session id
//!   state adopted, HELLO key = K, connect upstream to H:P
//! ```
//!
//! The `server`, `recon` and `drecon` commands send the client synthetic
//! redirects through the same path.

use crate::connection::ClientConnection;
use crate::handlers::{CommandHook, HookRegistry, PacketHook, Verdict};
use crate::resolver::MAP_INFO_KEY;
use async_trait::async_trait;
use krelay_core::{GameId, RelayError, Result, SessionId};
use krelay_protocol::{
    nexus_redirect, notification, oryx_notification, server_text, CreateSuccessPacket, HelloPacket,
    MapInfoPacket, Packet, PacketType, ReconnectPacket,
};
use krelay_session::State;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Sender name of relay chat notices
pub const NOTICE_SENDER: &str = "K Relay";

/// Handles handshakes, redirects and the reconnect commands
#[derive(Debug, Default)]
pub struct ReconnectHandler;

impl ReconnectHandler {
    pub fn new() -> Self {
        Self
    }

    /// Register this handler's packet and command hooks
    pub fn attach(self, hooks: &mut HookRegistry) {
        let handler = Arc::new(self);
        hooks.register_packet(PacketType::Hello, handler.clone());
        hooks.register_packet(PacketType::Reconnect, handler.clone());
        hooks.register_packet(PacketType::CreateSuccess, handler.clone());
        hooks.register_command("server", handler.clone());
        hooks.register_command("recon", handler.clone());
        hooks.register_command("drecon", handler);
    }

    /// Adopt or create the session and hand the handshake to the connection
    fn on_hello(&self, client: &Arc<ClientConnection>, hello: &mut HelloPacket) -> Result<Verdict> {
        let relay = client.relay();
        let adopted = SessionId::from_key(&hello.key).and_then(|id| relay.sessions().adopt(&id, client.id()));
        let relay_key = adopted.is_some() || SessionId::is_relay_issued(&hello.key);

        let state = match adopted {
            Some(state) => state,
            None => {
                if relay_key {
                    debug!("Connection {} presented an unknown session, starting a new one", client.id());
                }
                let server = relay.default_server();
                let state = relay.sessions().create(&server.address, relay.config().remote_port);
                state.lock().owner = Some(client.id());
                state
            }
        };

        {
            let mut s = state.lock();
            s.end_handoff();

            let real_key = s.take_pending_real_key();
            if !real_key.is_empty() {
                hello.key = real_key;
            } else if relay_key {
                hello.key.clear();
            }

            s.last_hello = Some(hello.clone());
            debug!(
                "Connection {} handshake on session {} (game id {})",
                client.id(),
                s.id(),
                hello.game_id
            );
        }

        client.set_state(state);
        client.connect(hello.clone());
        Ok(Verdict::Block)
    }

    /// Record where the server sends the client and point the client at the relay
    async fn on_reconnect(&self, client: &Arc<ClientConnection>, packet: &mut ReconnectPacket) -> Result<Verdict> {
        let state = client.state().ok_or(RelayError::NoSession(client.id().get()))?;

        if is_dns_name(&packet.host) {
            packet.host = client.relay().resolver().resolve(&packet.host).await?;
        }

        let config = client.relay().config();
        let mut s = state.lock();

        let name = packet.name.to_lowercase();
        if name.contains("nexusportal") {
            s.last_realm = Some(clone_redirect(&s, packet));
        } else if !name.is_empty() && !name.contains("vault") && packet.game_id != GameId::NEXUS {
            s.last_dungeon = Some(clone_redirect(&s, packet));
        }

        record_destination(&mut s, packet);

        packet.key = s.id().to_key();
        packet.host = config.public_host.clone();
        packet.port = i32::from(config.public_port());
        s.begin_handoff();

        info!(
            "Session {} redirected to {}:{} ({})",
            s.id(),
            s.upstream_address,
            s.upstream_port,
            packet.name
        );
        Ok(Verdict::Forward)
    }

    fn on_create_success(&self, client: &Arc<ClientConnection>, packet: &CreateSuccessPacket) {
        let config = client.relay().config();
        if config.stealth {
            return;
        }

        let client = client.clone();
        let object_id = packet.object_id;
        let delay = config.welcome_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let relay = client.relay();
            let mut message = relay.config().welcome_message.clone();
            let server = client.state().and_then(|state| {
                let address = state.lock().upstream_address.clone();
                relay.game_data().servers.by_address(&address).map(|s| s.name.clone())
            });
            if let Some(server) = server {
                message.push('\n');
                message.push_str(&server);
            }

            if let Err(e) = client.send_to_client(notification(object_id, &message)) {
                debug!("Welcome not sent: {}", e);
            }
        });
    }

    /// `/server` alone reports where the client is, `/server <name>` switches the default
    fn on_server_command(&self, client: &Arc<ClientConnection>, args: &[String]) -> Result<()> {
        let relay = client.relay();

        let [name] = args else {
            if args.is_empty() {
                return client.send_to_client(server_text(&describe_location(client)));
            }
            return send_notice(client, "Unknown server!");
        };

        let Ok(server) = relay.game_data().servers.lookup_user_input(name) else {
            return send_notice(client, "Unknown server!");
        };
        let server = server.clone();

        let redirected = relay.switch_default(&server);
        if !redirected.contains(&client.id()) {
            let port = i32::from(relay.config().remote_port);
            send_reconnect(client, &nexus_redirect(&server.address, port))?;
        }
        Ok(())
    }

    fn on_recon_command(&self, client: &Arc<ClientConnection>, dungeon: bool) -> Result<()> {
        let template = client.state().and_then(|state| {
            let s = state.lock();
            if dungeon {
                s.last_dungeon.clone()
            } else {
                s.last_realm.clone()
            }
        });

        match (template, dungeon) {
            (Some(template), _) => send_reconnect(client, &template),
            (None, false) => send_notice(client, "Last realm is unknown!"),
            (None, true) => send_notice(client, "Last dungeon is unknown!"),
        }
    }
}

#[async_trait]
impl PacketHook for ReconnectHandler {
    async fn on_packet(&self, client: &Arc<ClientConnection>, packet: &mut Packet) -> Result<Verdict> {
        match packet {
            Packet::Hello(hello) => self.on_hello(client, hello),
            Packet::Reconnect(reconnect) => self.on_reconnect(client, reconnect).await,
            Packet::CreateSuccess(create) => {
                self.on_create_success(client, create);
                Ok(Verdict::Forward)
            }
            _ => Ok(Verdict::Forward),
        }
    }
}

#[async_trait]
impl CommandHook for ReconnectHandler {
    async fn on_command(&self, client: &Arc<ClientConnection>, command: &str, args: &[String]) -> Result<()> {
        match command {
            "server" => self.on_server_command(client, args),
            "recon" => self.on_recon_command(client, false),
            "drecon" => self.on_recon_command(client, true),
            _ => Ok(()),
        }
    }
}

/// Send the client a redirect built from `template`
///
/// The template's destination and key become the session's next upstream
/// target and pending key. The client receives a copy pointing at the
/// relay with the session id as key; `template` itself is left untouched.
pub fn send_reconnect(client: &ClientConnection, template: &ReconnectPacket) -> Result<()> {
    let state = client.state().ok_or(RelayError::NoSession(client.id().get()))?;
    let config = client.relay().config();

    let key = {
        let mut s = state.lock();
        record_destination(&mut s, template);
        s.set_pending_real_key(template.key.clone());
        s.begin_handoff();
        s.id().to_key()
    };

    let outgoing = ReconnectPacket {
        host: config.public_host.clone(),
        port: i32::from(config.public_port()),
        key,
        ..template.clone()
    };

    debug!("Connection {} sent to {} via relay", client.id(), template.name);
    client.send_to_client(Packet::Reconnect(outgoing))
}

/// Store the fields a redirect actually sets as the session's next target
fn record_destination(state: &mut State, redirect: &ReconnectPacket) {
    if redirect.port != ReconnectPacket::PORT_UNCHANGED {
        match u16::try_from(redirect.port) {
            Ok(port) => state.upstream_port = port,
            Err(_) => warn!("Ignoring redirect port {}", redirect.port),
        }
    }
    if !redirect.host.is_empty() {
        state.upstream_address = redirect.host.clone();
    }
    if !redirect.key.is_empty() {
        state.set_pending_real_key(redirect.key.clone());
    }
}

/// Copy of a redirect for later replay, with an unset host or port filled
/// from the session's current target
fn clone_redirect(state: &State, packet: &ReconnectPacket) -> ReconnectPacket {
    ReconnectPacket {
        name: packet.name.clone(),
        host: if packet.host.is_empty() {
            state.upstream_address.clone()
        } else {
            packet.host.clone()
        },
        stats: packet.stats.clone(),
        port: if packet.port == ReconnectPacket::PORT_UNCHANGED {
            i32::from(state.upstream_port)
        } else {
            packet.port
        },
        game_id: packet.game_id,
        key_time: packet.key_time,
        is_from_arena: false,
        key: packet.key.clone(),
    }
}

/// `"<default server>, <where the client is>"`
fn describe_location(client: &ClientConnection) -> String {
    let relay = client.relay();
    let default = relay.default_server();

    let location = client.state().and_then(|state| {
        let s = state.lock();
        let on_known_server = relay.game_data().servers.any(|r| r.address == s.upstream_address);
        if on_known_server {
            s.get::<MapInfoPacket>(MAP_INFO_KEY).map(|map| map.name.clone())
        } else {
            s.last_realm
                .as_ref()
                .and_then(|realm| realm.name.rsplit('.').next())
                .map(str::to_string)
        }
    });

    format!("{}, {}", default.name, location.as_deref().unwrap_or("unknown"))
}

fn send_notice(client: &ClientConnection, message: &str) -> Result<()> {
    client.send_to_client(oryx_notification(NOTICE_SENDER, message))
}

/// Whether `host` needs a DNS lookup before it can be connected to
///
/// Numeric addresses and single-label names such as `localhost` do not.
pub fn is_dns_name(host: &str) -> bool {
    host.contains('.') && host.parse::<IpAddr>().is_err()
}

/// Turns redirect host names into numeric addresses
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str) -> Result<String>;
}

/// System resolver backed by [`resolve_host`]
#[derive(Debug, Default)]
pub struct DnsResolver;

#[async_trait]
impl HostResolver for DnsResolver {
    async fn resolve(&self, host: &str) -> Result<String> {
        resolve_host(host).await
    }
}

/// Resolve a host name to a numeric address, preferring IPv4
pub async fn resolve_host(host: &str) -> Result<String> {
    let addresses: Vec<_> = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| RelayError::Resolve {
            host: host.to_string(),
            reason: e.to_string(),
        })?
        .collect();

    addresses
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addresses.first())
        .map(|a| a.ip().to_string())
        .ok_or_else(|| RelayError::Resolve {
            host: host.to_string(),
            reason: "no addresses".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionChannels, Outgoing};
    use crate::testing::{test_client, test_client_on, test_relay};
    use crate::ProxyConfig;
    use std::time::Duration;

    fn handshake(client: &Arc<ClientConnection>, key: Vec<u8>, game_id: i32) -> HelloPacket {
        let mut hello = HelloPacket { key, game_id, ..Default::default() };
        let verdict = ReconnectHandler::new().on_hello(client, &mut hello).unwrap();
        assert_eq!(verdict, Verdict::Block);
        client.take_connect_request().unwrap()
    }

    fn redirect(name: &str, host: &str, port: i32, game_id: i32, key: &[u8]) -> ReconnectPacket {
        ReconnectPacket {
            name: name.to_string(),
            host: host.to_string(),
            port,
            game_id,
            key: key.to_vec(),
            stats: "stats".to_string(),
            key_time: 77,
            ..Default::default()
        }
    }

    fn sent_to_client(channels: &mut ConnectionChannels) -> Packet {
        match channels.client_rx.try_recv() {
            Ok(Outgoing::Packet(packet)) => packet,
            other => panic!("expected a packet, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fresh_handshake_creates_session_on_default() {
        let (client, _channels) = test_client();
        let hello = handshake(&client, Vec::new(), GameId::NEXUS);

        let state = client.state().unwrap();
        let s = state.lock();
        assert_eq!(s.upstream_address, client.relay().default_server().address);
        assert_eq!(s.upstream_port, 2050);
        assert_eq!(s.owner, Some(client.id()));
        assert_eq!(s.last_hello.as_ref().unwrap().game_id, GameId::NEXUS);
        assert!(hello.key.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_keys_get_distinct_sessions() {
        let relay = test_relay(ProxyConfig::default());
        let (a, _ca) = test_client_on(&relay);
        let (b, _cb) = test_client_on(&relay);
        handshake(&a, b"unknown-1".to_vec(), GameId::NEXUS);
        handshake(&b, b"unknown-2".to_vec(), GameId::NEXUS);

        assert!(!Arc::ptr_eq(&a.state().unwrap(), &b.state().unwrap()));
        assert_ne!(a.session_id(), b.session_id());
        assert_eq!(relay.sessions().len(), 2);
    }

    #[tokio::test]
    async fn test_redirect_is_rewritten_and_classified() {
        let (client, _channels) = test_client();
        handshake(&client, Vec::new(), GameId::NEXUS);

        let mut packet = Packet::Reconnect(redirect("nexusportal.Medusa", "10.1.2.3", 2051, 5, b"real"));
        let verdict = ReconnectHandler::new().on_packet(&client, &mut packet).await.unwrap();
        assert_eq!(verdict, Verdict::Forward);

        let Packet::Reconnect(sent) = &packet else { panic!() };
        let session_key = client.session_id().unwrap().to_key();
        assert_eq!(sent.host, "localhost");
        assert_eq!(sent.port, 2050);
        assert_eq!(sent.key, session_key);
        assert_eq!(sent.name, "nexusportal.Medusa");

        let state = client.state().unwrap();
        let s = state.lock();
        assert_eq!(s.upstream_address, "10.1.2.3");
        assert_eq!(s.upstream_port, 2051);
        assert_eq!(s.pending_real_key(), b"real");
        assert!(s.awaiting_handoff());

        let realm = s.last_realm.as_ref().unwrap();
        assert_eq!(realm.host, "10.1.2.3");
        assert_eq!(realm.key, b"real");
        assert!(s.last_dungeon.is_none());
    }

    #[tokio::test]
    async fn test_classification() {
        let (client, _channels) = test_client();
        handshake(&client, Vec::new(), GameId::NEXUS);
        let handler = ReconnectHandler::new();

        let mut dungeon = Packet::Reconnect(redirect("Snake Pit", "10.0.0.5", 2050, 42, b""));
        handler.on_packet(&client, &mut dungeon).await.unwrap();
        {
            let state = client.state().unwrap();
            let s = state.lock();
            assert_eq!(s.last_dungeon.as_ref().unwrap().name, "Snake Pit");
            assert!(s.last_realm.is_none());
        }

        for name in ["", "Vault", "Nexus"] {
            let mut packet = Packet::Reconnect(redirect(name, "10.0.0.6", 2050, GameId::NEXUS, b""));
            handler.on_packet(&client, &mut packet).await.unwrap();
        }
        let state = client.state().unwrap();
        let s = state.lock();
        assert_eq!(s.last_dungeon.as_ref().unwrap().name, "Snake Pit");
        assert!(s.last_realm.is_none());
        assert_eq!(s.upstream_address, "10.0.0.6");
    }

    #[tokio::test]
    async fn test_clone_falls_back_and_does_not_alias() {
        let (client, _channels) = test_client();
        handshake(&client, Vec::new(), GameId::NEXUS);
        let state = client.state().unwrap();
        state.lock().set_upstream("10.0.0.8", 2052);

        let mut packet = Packet::Reconnect(redirect("nexusportal.Abyss", "", -1, 1, b"k"));
        ReconnectHandler::new().on_packet(&client, &mut packet).await.unwrap();

        // the forwarded packet was rewritten after the clone was taken
        let s = state.lock();
        let realm = s.last_realm.as_ref().unwrap();
        assert_eq!(realm.host, "10.0.0.8");
        assert_eq!(realm.port, 2052);
        assert_eq!(realm.key, b"k");
        assert_eq!(realm.stats, "stats");
        assert_eq!(realm.key_time, 77);
        assert_eq!(s.upstream_address, "10.0.0.8");
        assert_eq!(s.upstream_port, 2052);
    }

    #[tokio::test]
    async fn test_reconnect_handshake_uses_real_key() {
        let relay = test_relay(ProxyConfig::default());
        let (first, _c1) = test_client_on(&relay);
        handshake(&first, Vec::new(), GameId::NEXUS);

        let mut packet = Packet::Reconnect(redirect("Snake Pit", "10.0.0.5", 2050, 42, b"real-key"));
        ReconnectHandler::new().on_packet(&first, &mut packet).await.unwrap();
        let Packet::Reconnect(sent) = packet else { panic!() };

        // the client follows the redirect on a new connection
        let (second, _c2) = test_client_on(&relay);
        let hello = handshake(&second, sent.key.clone(), 42);
        assert_eq!(hello.key, b"real-key");
        assert!(Arc::ptr_eq(&first.state().unwrap(), &second.state().unwrap()));

        let state = second.state().unwrap();
        let s = state.lock();
        assert_eq!(s.owner, Some(second.id()));
        assert!(!s.awaiting_handoff());
        assert!(s.pending_real_key().is_empty());
        drop(s);

        // a later handshake on the same session never carries the relay key
        let (third, _c3) = test_client_on(&relay);
        let hello = handshake(&third, sent.key, 42);
        assert!(hello.key.is_empty());
    }

    #[tokio::test]
    async fn test_stale_session_key_is_not_forwarded() {
        let relay = test_relay(ProxyConfig::default());
        let (first, _c1) = test_client_on(&relay);
        handshake(&first, Vec::new(), GameId::NEXUS);

        let mut packet = Packet::Reconnect(redirect("Snake Pit", "10.0.0.5", 2050, 42, b"real-key"));
        ReconnectHandler::new().on_packet(&first, &mut packet).await.unwrap();
        let Packet::Reconnect(sent) = packet else { panic!() };

        // the session is gone before the client comes back
        let stale = first.session_id().unwrap();
        relay.sessions().remove(&stale);

        let (second, _c2) = test_client_on(&relay);
        let hello = handshake(&second, sent.key, 42);
        assert!(hello.key.is_empty());

        let state = second.state().unwrap();
        let s = state.lock();
        assert_ne!(s.id(), &stale);
        assert_eq!(s.upstream_address, relay.default_server().address);
        assert!(s.last_hello.as_ref().unwrap().key.is_empty());
        assert_eq!(relay.sessions().len(), 1);
    }

    #[tokio::test]
    async fn test_send_reconnect_leaves_template_untouched() {
        let (client, mut channels) = test_client();
        handshake(&client, Vec::new(), GameId::NEXUS);

        let template = redirect("nexusportal.Medusa", "10.4.4.4", 2050, 3, b"");
        let before = template.clone();
        send_reconnect(&client, &template).unwrap();
        assert_eq!(template, before);

        let Packet::Reconnect(sent) = sent_to_client(&mut channels) else { panic!() };
        assert_eq!(sent.host, "localhost");
        assert_eq!(sent.key, client.session_id().unwrap().to_key());
        assert_eq!(sent.name, template.name);

        let state = client.state().unwrap();
        assert_eq!(state.lock().upstream_address, "10.4.4.4");
    }

    #[tokio::test]
    async fn test_recon_commands() {
        let (client, mut channels) = test_client();
        handshake(&client, Vec::new(), GameId::NEXUS);
        let handler = ReconnectHandler::new();

        handler.on_command(&client, "recon", &[]).await.unwrap();
        let Packet::Text(text) = sent_to_client(&mut channels) else { panic!() };
        assert_eq!(text.text, "Last realm is unknown!");
        assert_eq!(text.name, "#K Relay");

        handler.on_command(&client, "drecon", &[]).await.unwrap();
        let Packet::Text(text) = sent_to_client(&mut channels) else { panic!() };
        assert_eq!(text.text, "Last dungeon is unknown!");

        let mut packet = Packet::Reconnect(redirect("nexusportal.Medusa", "10.1.2.3", 2050, 5, b""));
        handler.on_packet(&client, &mut packet).await.unwrap();

        handler.on_command(&client, "recon", &[]).await.unwrap();
        let Packet::Reconnect(sent) = sent_to_client(&mut channels) else { panic!() };
        assert_eq!(sent.name, "nexusportal.Medusa");
        assert_eq!(sent.host, "localhost");
    }

    #[tokio::test]
    async fn test_server_command() {
        let (client, mut channels) = test_client();
        handshake(&client, Vec::new(), GameId::NEXUS);
        let handler = ReconnectHandler::new();

        handler.on_command(&client, "server", &["nowhere".to_string()]).await.unwrap();
        let Packet::Text(text) = sent_to_client(&mut channels) else { panic!() };
        assert_eq!(text.text, "Unknown server!");

        handler.on_command(&client, "server", &["a".to_string(), "b".to_string()]).await.unwrap();
        let Packet::Text(text) = sent_to_client(&mut channels) else { panic!() };
        assert_eq!(text.text, "Unknown server!");

        handler.on_command(&client, "server", &["euw".to_string()]).await.unwrap();
        let Packet::Reconnect(sent) = sent_to_client(&mut channels) else { panic!() };
        assert_eq!(sent.game_id, GameId::NEXUS);
        assert_eq!(client.relay().default_server().name, "EUWest");

        let state = client.state().unwrap();
        let euw = client.relay().default_server();
        assert_eq!(state.lock().upstream_address, euw.address);
        assert!(channels.client_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_server_query() {
        let (client, mut channels) = test_client();
        handshake(&client, Vec::new(), GameId::NEXUS);
        let handler = ReconnectHandler::new();

        handler.on_command(&client, "server", &[]).await.unwrap();
        let Packet::Text(text) = sent_to_client(&mut channels) else { panic!() };
        assert_eq!(text.text, "USWest, unknown");
        assert_eq!(text.bubble_time, 184);

        let state = client.state().unwrap();
        state.lock().set(MAP_INFO_KEY, MapInfoPacket { name: "Nexus".into(), ..Default::default() });
        handler.on_command(&client, "server", &[]).await.unwrap();
        let Packet::Text(text) = sent_to_client(&mut channels) else { panic!() };
        assert_eq!(text.text, "USWest, Nexus");

        {
            let mut s = state.lock();
            s.set_upstream("10.7.7.7", 2050);
            s.last_realm = Some(redirect("nexusportal.Medusa", "10.7.7.7", 2050, 5, b""));
        }
        handler.on_command(&client, "server", &[]).await.unwrap();
        let Packet::Text(text) = sent_to_client(&mut channels) else { panic!() };
        assert_eq!(text.text, "USWest, Medusa");
    }

    #[tokio::test]
    async fn test_welcome_notification() {
        let config = ProxyConfig { welcome_delay: Duration::from_millis(10), ..Default::default() };
        let relay = test_relay(config);
        let (client, mut channels) = test_client_on(&relay);
        handshake(&client, Vec::new(), GameId::NEXUS);

        let mut packet = Packet::CreateSuccess(CreateSuccessPacket { object_id: 12, char_id: 1 });
        let verdict = ReconnectHandler::new().on_packet(&client, &mut packet).await.unwrap();
        assert_eq!(verdict, Verdict::Forward);

        let Some(Outgoing::Packet(Packet::Notification(n))) = channels.client_rx.recv().await else {
            panic!("expected a notification");
        };
        assert_eq!(n.object_id, 12);
        assert!(n.message.contains(r"Welcome to K Relay!\nUSWest"));
    }

    #[tokio::test]
    async fn test_stealth_suppresses_welcome() {
        let config = ProxyConfig { stealth: true, welcome_delay: Duration::ZERO, ..Default::default() };
        let relay = test_relay(config);
        let (client, mut channels) = test_client_on(&relay);
        handshake(&client, Vec::new(), GameId::NEXUS);

        let mut packet = Packet::CreateSuccess(CreateSuccessPacket { object_id: 12, char_id: 1 });
        ReconnectHandler::new().on_packet(&client, &mut packet).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(channels.client_rx.try_recv().is_err());
    }

    struct FixedResolver;

    #[async_trait]
    impl HostResolver for FixedResolver {
        async fn resolve(&self, host: &str) -> Result<String> {
            match host {
                "example.com" => Ok("93.184.216.34".to_string()),
                _ => Err(RelayError::Resolve { host: host.to_string(), reason: "not listed".to_string() }),
            }
        }
    }

    #[tokio::test]
    async fn test_redirect_host_name_is_resolved() {
        let config = ProxyConfig::default();
        let hooks = crate::relay::default_hooks(&config);
        let relay = crate::Relay::with_resolver(
            config,
            krelay_gamedata::GameData::bundled().unwrap(),
            hooks,
            Arc::new(FixedResolver),
        )
        .unwrap();
        let (client, mut channels) = test_client_on(&relay);
        handshake(&client, Vec::new(), GameId::NEXUS);

        client
            .handle_server_packet(Packet::Reconnect(redirect("nexusportal.Medusa", "example.com", 2051, 5, b"real")))
            .await;

        let Packet::Reconnect(sent) = sent_to_client(&mut channels) else { panic!() };
        assert_eq!(sent.host, "localhost");
        assert_eq!(sent.port, 2050);
        assert_eq!(sent.key, client.session_id().unwrap().to_key());

        let state = client.state().unwrap();
        let s = state.lock();
        let realm = s.last_realm.as_ref().unwrap();
        assert_eq!(realm.host, "93.184.216.34");
        assert_eq!(realm.port, 2051);
        assert_eq!(realm.key, b"real");
        assert_eq!(s.upstream_address, "93.184.216.34");
        assert_eq!(s.pending_real_key(), b"real");
    }

    #[test]
    fn test_is_dns_name() {
        assert!(is_dns_name("example.com"));
        assert!(is_dns_name("usw.realm.example.org"));
        assert!(!is_dns_name("54.193.0.1"));
        assert!(!is_dns_name("::1"));
        assert!(!is_dns_name("localhost"));
        assert!(!is_dns_name(""));
    }

    #[tokio::test]
    async fn test_resolve_prefers_ipv4() {
        assert_eq!(resolve_host("localhost").await.unwrap(), "127.0.0.1");
        assert!(matches!(
            resolve_host("no-such-host.invalid").await,
            Err(RelayError::Resolve { .. })
        ));
    }

    #[tokio::test]
    async fn test_unresolvable_redirect_is_blocked() {
        let (client, mut channels) = test_client();
        handshake(&client, Vec::new(), GameId::NEXUS);

        client
            .handle_server_packet(Packet::Reconnect(redirect("Snake Pit", "no-such-host.invalid", 2050, 42, b"")))
            .await;
        assert!(channels.client_rx.try_recv().is_err());

        let state = client.state().unwrap();
        assert!(state.lock().last_dungeon.is_none());
    }
}
