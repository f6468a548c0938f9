//! # Player State Resolver
//!
//! Keeps each session's [`PlayerData`] current from game traffic and merges
//! duplicate sessions once an update reveals the account behind them.

use crate::connection::ClientConnection;
use crate::handlers::{HookRegistry, PacketHook, Verdict};
use async_trait::async_trait;
use krelay_core::Result;
use krelay_protocol::{MapInfoPacket, Packet, PacketType, UpdatePacket};
use krelay_session::{PlayerData, Resolution};
use std::sync::Arc;
use tracing::{debug, info};

/// Context key the last map info is stored under
pub const MAP_INFO_KEY: &str = "MapInfo";

/// Tracks player facts and resolves session identity
#[derive(Debug, Clone)]
pub struct PlayerStateResolver {
    shoot_offset: f32,
}

impl PlayerStateResolver {
    /// # Arguments
    /// * `shoot_offset` - Distance between a player and the origin of their shots
    pub fn new(shoot_offset: f32) -> Self {
        Self { shoot_offset }
    }

    pub fn attach(self, hooks: &mut HookRegistry) {
        let resolver = Arc::new(self);
        for packet_type in [
            PacketType::MapInfo,
            PacketType::CreateSuccess,
            PacketType::Update,
            PacketType::NewTick,
            PacketType::Move,
            PacketType::PlayerShoot,
        ] {
            hooks.register_packet(packet_type, resolver.clone());
        }
    }

    fn on_update(&self, client: &Arc<ClientConnection>, update: &UpdatePacket) {
        let Some(state) = client.state() else {
            return;
        };

        let account_id = {
            let mut s = state.lock();
            s.player_data.parse_update(update);
            if s.is_resolved() {
                return;
            }
            s.player_data.account_id.clone()
        };
        let Some(account_id) = account_id else {
            return;
        };

        let relay = client.relay();
        let default = relay.default_server();
        let resolution = relay.sessions().resolve_identity(
            &state,
            &account_id,
            &default.address,
            relay.config().remote_port,
            |id| relay.is_live(id),
        );

        if let Resolution::Merged { into, removed } = resolution {
            info!(
                "Connection {} now drives session {} ({} duplicate sessions removed)",
                client.id(),
                into.lock().id(),
                removed.len()
            );
            client.set_state(into);
        }
    }
}

#[async_trait]
impl PacketHook for PlayerStateResolver {
    async fn on_packet(&self, client: &Arc<ClientConnection>, packet: &mut Packet) -> Result<Verdict> {
        if let Packet::Update(update) = packet {
            self.on_update(client, update);
            return Ok(Verdict::Forward);
        }

        let Some(state) = client.state() else {
            debug!("Connection {}: {:?} before handshake", client.id(), packet.packet_type());
            return Ok(Verdict::Forward);
        };
        let mut s = state.lock();

        match packet {
            Packet::MapInfo(map) => s.set(MAP_INFO_KEY, map.clone()),
            Packet::CreateSuccess(create) => {
                let map = s.get::<MapInfoPacket>(MAP_INFO_KEY);
                s.player_data = PlayerData::new(create.object_id, map.as_deref());
            }
            Packet::NewTick(tick) => s.player_data.parse_new_tick(tick),
            Packet::Move(movement) => s.player_data.record_move(movement),
            Packet::PlayerShoot(shot) => s.player_data.record_shot(shot, self.shoot_offset),
            _ => {}
        }

        Ok(Verdict::Forward)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_client, test_client_on, test_relay};
    use crate::ProxyConfig;
    use krelay_core::{GameId, Location};
    use krelay_protocol::{
        CreateSuccessPacket, Entity, MovePacket, ObjectStatus, PlayerShootPacket, StatData, STAT_ACCOUNT_ID,
    };
    use krelay_session::StateRef;

    fn spawned(client: &Arc<ClientConnection>, object_id: i32) -> StateRef {
        let state = client.relay().sessions().create("10.0.0.1", 2050);
        {
            let mut s = state.lock();
            s.owner = Some(client.id());
            s.player_data = PlayerData::new(object_id, None);
        }
        client.set_state(state.clone());
        state
    }

    fn update_for(object_id: i32, account_id: &str) -> Packet {
        Packet::Update(UpdatePacket {
            new_objects: vec![Entity {
                object_type: 0x0300,
                status: ObjectStatus {
                    object_id,
                    position: Location::new(1.0, 1.0),
                    stats: vec![StatData::string(STAT_ACCOUNT_ID, account_id)],
                },
            }],
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_map_info_and_spawn() {
        let (client, _channels) = test_client();
        let state = spawned(&client, -1);
        let resolver = PlayerStateResolver::new(0.3);

        let mut map = Packet::MapInfo(MapInfoPacket { name: "Nexus".into(), ..Default::default() });
        resolver.on_packet(&client, &mut map).await.unwrap();
        let mut create = Packet::CreateSuccess(CreateSuccessPacket { object_id: 44, char_id: 2 });
        resolver.on_packet(&client, &mut create).await.unwrap();

        let s = state.lock();
        assert!(s.contains_key(MAP_INFO_KEY));
        assert_eq!(s.player_data.object_id, 44);
        assert_eq!(s.player_data.map_name.as_deref(), Some("Nexus"));
    }

    #[tokio::test]
    async fn test_movement_and_shots() {
        let (client, _channels) = test_client();
        let state = spawned(&client, 1);
        let resolver = PlayerStateResolver::new(1.0);

        let mut movement = Packet::Move(MovePacket {
            time: 500,
            new_position: Location::new(5.0, 5.0),
            ..Default::default()
        });
        assert_eq!(resolver.on_packet(&client, &mut movement).await.unwrap(), Verdict::Forward);
        assert_eq!(state.lock().player_data.previous_time, 500);

        let mut shot = Packet::PlayerShoot(PlayerShootPacket {
            position: Location::new(5.0, 5.0),
            angle: std::f32::consts::FRAC_PI_2,
            ..Default::default()
        });
        resolver.on_packet(&client, &mut shot).await.unwrap();
        let position = state.lock().player_data.position;
        assert!((position.x - 5.0).abs() < 0.0001);
        assert!((position.y - 4.0).abs() < 0.0001);
    }

    #[tokio::test]
    async fn test_first_update_resolves_account() {
        let (client, _channels) = test_client();
        let state = spawned(&client, 7);

        let mut update = update_for(7, "P1");
        PlayerStateResolver::new(0.3).on_packet(&client, &mut update).await.unwrap();
        assert_eq!(state.lock().account_id.as_deref(), Some("P1"));
    }

    #[tokio::test]
    async fn test_update_without_identity_stays_unresolved() {
        let (client, _channels) = test_client();
        let state = spawned(&client, 7);

        let mut update = update_for(8, "OTHER");
        PlayerStateResolver::new(0.3).on_packet(&client, &mut update).await.unwrap();
        assert!(!state.lock().is_resolved());
    }

    #[tokio::test]
    async fn test_duplicate_is_merged_and_connection_repointed() {
        let relay = test_relay(ProxyConfig::default());
        let resolver = PlayerStateResolver::new(0.3);

        let (a, _ca) = test_client_on(&relay);
        let s1 = spawned(&a, 7);
        resolver.on_packet(&a, &mut update_for(7, "P1")).await.unwrap();

        let (b, _cb) = test_client_on(&relay);
        let s2 = spawned(&b, 9);
        s2.lock().last_hello = Some(krelay_protocol::HelloPacket { game_id: GameId::NEXUS, ..Default::default() });
        s2.lock().set("Marker", 1u8);
        resolver.on_packet(&b, &mut update_for(9, "P1")).await.unwrap();

        assert!(Arc::ptr_eq(&b.state().unwrap(), &s1));
        assert_eq!(relay.sessions().len(), 1);
        let s = s1.lock();
        assert_eq!(s.owner, Some(b.id()));
        assert!(s.contains_key("Marker"));
        assert_eq!(s.upstream_address, relay.default_server().address);
    }
}
