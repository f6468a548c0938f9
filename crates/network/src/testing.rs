//! Helpers shared by the unit tests of this crate

use crate::{ClientConnection, ConnectionChannels, ProxyConfig, Relay};
use krelay_gamedata::GameData;
use std::sync::Arc;

pub(crate) fn test_relay(config: ProxyConfig) -> Arc<Relay> {
    Relay::with_default_hooks(config, GameData::bundled().unwrap()).unwrap()
}

pub(crate) fn test_client_on(relay: &Arc<Relay>) -> (Arc<ClientConnection>, ConnectionChannels) {
    ClientConnection::new(relay.clone(), "127.0.0.1:50000".parse().unwrap())
}

pub(crate) fn test_client() -> (Arc<ClientConnection>, ConnectionChannels) {
    test_client_on(&test_relay(ProxyConfig::default()))
}
