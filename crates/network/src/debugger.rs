//! Packet debugger
//!
//! Logs every packet of the configured types in full as it passes through.
//! Enabled with the `debugpackets` option.

use crate::connection::ClientConnection;
use crate::handlers::{HookRegistry, PacketHook, Verdict};
use async_trait::async_trait;
use krelay_core::Result;
use krelay_protocol::{Packet, PacketType};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct PacketDebugger {
    packet_types: Vec<PacketType>,
}

impl PacketDebugger {
    pub fn new(packet_types: Vec<PacketType>) -> Self {
        Self { packet_types }
    }

    pub fn attach(self, hooks: &mut HookRegistry) {
        let types = self.packet_types.clone();
        let debugger = Arc::new(self);
        for packet_type in types {
            info!("Debugging {} packets", packet_type);
            hooks.register_packet(packet_type, debugger.clone());
        }
    }
}

#[async_trait]
impl PacketHook for PacketDebugger {
    async fn on_packet(&self, client: &Arc<ClientConnection>, packet: &mut Packet) -> Result<Verdict> {
        let session = client.session_id();
        info!(
            connection = %client.id(),
            session = session.as_ref().map(|s| s.as_str()).unwrap_or("-"),
            "{:#?}",
            packet
        );
        Ok(Verdict::Forward)
    }
}
