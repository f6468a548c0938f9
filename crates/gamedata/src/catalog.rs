//! Packet id catalog
//!
//! Numeric packet ids differ between game builds. The catalog maps them to
//! the [`PacketType`]s the relay decodes and turns raw frames into packets.

use super::map::{DataRecord, GameDataMap};
use super::error::{GameDataError, Result};
use krelay_protocol::{Packet, PacketType, RawFrame};
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{trace, warn};

/// One packet definition (name and id for the current game build)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketRecord {
    pub name: String,
    pub id: u8,
}

impl DataRecord for PacketRecord {
    type Id = u8;

    fn id(&self) -> u8 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Bidirectional `id <-> PacketType` table
#[derive(Debug, Clone)]
pub struct PacketCatalog {
    records: GameDataMap<PacketRecord>,
    by_id: HashMap<u8, PacketType>,
    by_type: HashMap<PacketType, u8>,
}

impl PacketCatalog {
    /// Build the catalog from packet definitions
    ///
    /// Definitions whose name is not a decoded packet type stay in the
    /// record table but decode as [`Packet::Unknown`].
    pub fn new(records: GameDataMap<PacketRecord>) -> Self {
        let mut by_id = HashMap::new();
        let mut by_type = HashMap::new();

        for record in records.iter() {
            if let Some(packet_type) = PacketType::from_name(&record.name) {
                by_id.insert(record.id, packet_type);
                by_type.insert(packet_type, record.id);
            }
        }

        Self { records, by_id, by_type }
    }

    /// Parse packet definitions from their JSON form
    ///
    /// ```json
    /// [{ "name": "HELLO", "id": 1 }, { "name": "RECONNECT", "id": 45 }]
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let records: Vec<PacketRecord> = serde_json::from_str(json)?;
        Ok(Self::new(GameDataMap::new(records)))
    }

    pub fn records(&self) -> &GameDataMap<PacketRecord> {
        &self.records
    }

    pub fn packet_type(&self, id: u8) -> Option<PacketType> {
        self.by_id.get(&id).copied()
    }

    pub fn id_of(&self, packet_type: PacketType) -> Option<u8> {
        self.by_type.get(&packet_type).copied()
    }

    /// Types the relay decodes that this catalog has no id for
    pub fn missing_types(&self) -> Vec<PacketType> {
        PacketType::ALL
            .iter()
            .copied()
            .filter(|t| !self.by_type.contains_key(t))
            .collect()
    }

    /// Decode a frame
    ///
    /// Frames with an unmapped id, or whose payload does not decode, come
    /// back as [`Packet::Unknown`] so they can still be forwarded untouched.
    pub fn decode(&self, frame: RawFrame) -> Packet {
        let Some(packet_type) = self.packet_type(frame.id) else {
            trace!("Passing through unmapped packet id {}", frame.id);
            return Packet::Unknown { id: frame.id, payload: frame.payload.to_vec() };
        };

        let raw = frame.payload.clone();
        match Packet::decode(packet_type, frame.payload) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Failed to decode {} (id {}): {}", packet_type, frame.id, e);
                Packet::Unknown { id: frame.id, payload: raw.to_vec() }
            }
        }
    }

    /// Encode a packet into a frame
    pub fn encode(&self, packet: &Packet) -> Result<RawFrame> {
        let id = match packet {
            Packet::Unknown { id, .. } => *id,
            _ => {
                let packet_type = packet
                    .packet_type()
                    .ok_or_else(|| GameDataError::NotFound("packet type".to_string()))?;
                self.id_of(packet_type)
                    .ok_or_else(|| GameDataError::NotFound(format!("packet id for {}", packet_type)))?
            }
        };

        let mut payload = BytesMut::new();
        packet.encode(&mut payload);
        Ok(RawFrame::new(id, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use krelay_protocol::{CreateSuccessPacket, PlayerTextPacket};

    fn catalog() -> PacketCatalog {
        PacketCatalog::from_json(
            r#"[
                { "name": "CREATE_SUCCESS", "id": 101 },
                { "name": "PLAYERTEXT", "id": 10 },
                { "name": "SHOOTACK", "id": 100 }
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_id_mapping() {
        let catalog = catalog();
        assert_eq!(catalog.packet_type(101), Some(PacketType::CreateSuccess));
        assert_eq!(catalog.id_of(PacketType::PlayerText), Some(10));
        // known to the table, not decoded by the relay
        assert_eq!(catalog.packet_type(100), None);
        assert_eq!(catalog.records().by_id(&100).unwrap().name, "SHOOTACK");
        assert!(catalog.missing_types().contains(&PacketType::Hello));
    }

    #[test]
    fn test_decode_encode_frame() {
        let catalog = catalog();
        let packet = Packet::PlayerText(PlayerTextPacket { text: "/recon".into() });
        let frame = catalog.encode(&packet).unwrap();
        assert_eq!(frame.id, 10);
        assert_eq!(catalog.decode(frame), packet);
    }

    #[test]
    fn test_unmapped_and_malformed_frames_pass_through() {
        let catalog = catalog();

        let frame = RawFrame::new(100, BytesMut::from(&[1u8, 2, 3][..]));
        let packet = catalog.decode(frame.clone());
        assert_eq!(packet, Packet::Unknown { id: 100, payload: vec![1, 2, 3] });
        assert_eq!(catalog.encode(&packet).unwrap(), frame);

        // create success needs 8 bytes
        let frame = RawFrame::new(101, BytesMut::from(&[0u8, 0, 0][..]));
        assert_eq!(catalog.decode(frame), Packet::Unknown { id: 101, payload: vec![0, 0, 0] });
    }

    #[test]
    fn test_encode_without_id_fails() {
        let catalog = catalog();
        let packet = Packet::CreateSuccess(CreateSuccessPacket::default());
        assert!(catalog.encode(&packet).is_ok());

        let packet = Packet::PlayerShoot(Default::default());
        assert!(matches!(catalog.encode(&packet), Err(GameDataError::NotFound(_))));
    }
}
