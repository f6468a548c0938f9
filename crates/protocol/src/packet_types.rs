//! # Individual Packet Structures
//!
//! Typed, mutable representations of the messages the relay decodes, and the
//! [`Packet`] tagged union that carries them through the hook pipeline.
//!
//! ## Design
//!
//! - Each variant carries only its own fields.
//! - Packets that newer game builds extend keep the bytes after their last
//!   known field in `trailing` and write them back unchanged.
//! - Packets of other kinds travel as [`Packet::Unknown`] and are never
//!   decoded.

use bytes::{BufMut, BytesMut};
use krelay_core::{Location, RelayError, Result};
use super::{codecs::*, packet_structures::*, packets::PacketType};

/// FAILURE - fatal error reported by the server
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FailurePacket {
    pub error_id: i32,
    pub message: String,
}

impl WireFormat for FailurePacket {
    fn write_to(&self, buf: &mut BytesMut) {
        write_i32(buf, self.error_id);
        write_string(buf, &self.message);
    }

    fn read_from(buf: &mut BytesMut) -> Result<Self> {
        Ok(Self {
            error_id: read_i32(buf)?,
            message: read_string(buf)?,
        })
    }
}

/// HELLO - client handshake
///
/// The `key` doubles as the relay's session identifier once the client has
/// been redirected through the relay at least once.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HelloPacket {
    pub build_version: String,
    pub game_id: i32,
    pub guid: String,
    pub random1: i32,
    pub password: String,
    pub random2: i32,
    pub secret: String,
    pub key_time: i32,
    pub key: Vec<u8>,
    pub map_json: String,
    /// Fields newer than this decoder, passed through untouched
    pub trailing: Vec<u8>,
}

impl WireFormat for HelloPacket {
    fn write_to(&self, buf: &mut BytesMut) {
        write_string(buf, &self.build_version);
        write_i32(buf, self.game_id);
        write_string(buf, &self.guid);
        write_i32(buf, self.random1);
        write_string(buf, &self.password);
        write_i32(buf, self.random2);
        write_string(buf, &self.secret);
        write_i32(buf, self.key_time);
        write_bytes(buf, &self.key);
        write_string32(buf, &self.map_json);
        buf.put_slice(&self.trailing);
    }

    fn read_from(buf: &mut BytesMut) -> Result<Self> {
        Ok(Self {
            build_version: read_string(buf)?,
            game_id: read_i32(buf)?,
            guid: read_string(buf)?,
            random1: read_i32(buf)?,
            password: read_string(buf)?,
            random2: read_i32(buf)?,
            secret: read_string(buf)?,
            key_time: read_i32(buf)?,
            key: read_bytes(buf)?,
            map_json: read_string32(buf)?,
            trailing: read_remaining(buf),
        })
    }
}

/// CREATE_SUCCESS - the player's object was spawned
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CreateSuccessPacket {
    pub object_id: i32,
    pub char_id: i32,
}

impl WireFormat for CreateSuccessPacket {
    fn write_to(&self, buf: &mut BytesMut) {
        write_i32(buf, self.object_id);
        write_i32(buf, self.char_id);
    }

    fn read_from(buf: &mut BytesMut) -> Result<Self> {
        Ok(Self {
            object_id: read_i32(buf)?,
            char_id: read_i32(buf)?,
        })
    }
}

/// RECONNECT - instructs the client to connect to another server
///
/// # Sentinels
/// - `port == -1`: keep the current port
/// - empty `host`: keep the current host
/// - empty `key`: no key supplied
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPacket {
    pub name: String,
    pub host: String,
    pub stats: String,
    pub port: i32,
    pub game_id: i32,
    pub key_time: i32,
    pub is_from_arena: bool,
    pub key: Vec<u8>,
}

impl ReconnectPacket {
    /// Port value meaning "unchanged"
    pub const PORT_UNCHANGED: i32 = -1;
}

impl Default for ReconnectPacket {
    fn default() -> Self {
        Self {
            name: String::new(),
            host: String::new(),
            stats: String::new(),
            port: Self::PORT_UNCHANGED,
            game_id: 0,
            key_time: 0,
            is_from_arena: false,
            key: Vec::new(),
        }
    }
}

impl WireFormat for ReconnectPacket {
    fn write_to(&self, buf: &mut BytesMut) {
        write_string(buf, &self.name);
        write_string(buf, &self.host);
        write_string(buf, &self.stats);
        write_i32(buf, self.port);
        write_i32(buf, self.game_id);
        write_i32(buf, self.key_time);
        write_bool(buf, self.is_from_arena);
        write_bytes(buf, &self.key);
    }

    fn read_from(buf: &mut BytesMut) -> Result<Self> {
        Ok(Self {
            name: read_string(buf)?,
            host: read_string(buf)?,
            stats: read_string(buf)?,
            port: read_i32(buf)?,
            game_id: read_i32(buf)?,
            key_time: read_i32(buf)?,
            is_from_arena: read_bool(buf)?,
            key: read_bytes(buf)?,
        })
    }
}

/// MAPINFO - the map the client is entering
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MapInfoPacket {
    pub width: i32,
    pub height: i32,
    pub name: String,
    pub display_name: String,
    pub fp: u32,
    pub background: i32,
    pub difficulty: i32,
    pub allow_player_teleport: bool,
    pub show_displays: bool,
    pub trailing: Vec<u8>,
}

impl WireFormat for MapInfoPacket {
    fn write_to(&self, buf: &mut BytesMut) {
        write_i32(buf, self.width);
        write_i32(buf, self.height);
        write_string(buf, &self.name);
        write_string(buf, &self.display_name);
        write_u32(buf, self.fp);
        write_i32(buf, self.background);
        write_i32(buf, self.difficulty);
        write_bool(buf, self.allow_player_teleport);
        write_bool(buf, self.show_displays);
        buf.put_slice(&self.trailing);
    }

    fn read_from(buf: &mut BytesMut) -> Result<Self> {
        Ok(Self {
            width: read_i32(buf)?,
            height: read_i32(buf)?,
            name: read_string(buf)?,
            display_name: read_string(buf)?,
            fp: read_u32(buf)?,
            background: read_i32(buf)?,
            difficulty: read_i32(buf)?,
            allow_player_teleport: read_bool(buf)?,
            show_displays: read_bool(buf)?,
            trailing: read_remaining(buf),
        })
    }
}

/// UPDATE - tiles and objects entering or leaving view
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdatePacket {
    pub tiles: Vec<Tile>,
    pub new_objects: Vec<Entity>,
    pub drops: Vec<i32>,
}

impl WireFormat for UpdatePacket {
    fn write_to(&self, buf: &mut BytesMut) {
        write_list(buf, &self.tiles);
        write_list(buf, &self.new_objects);
        write_list(buf, &self.drops);
    }

    fn read_from(buf: &mut BytesMut) -> Result<Self> {
        Ok(Self {
            tiles: read_list(buf)?,
            new_objects: read_list(buf)?,
            drops: read_list(buf)?,
        })
    }
}

/// NEWTICK - status changes for the current server tick
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewTickPacket {
    pub tick_id: i32,
    pub tick_time: i32,
    pub statuses: Vec<ObjectStatus>,
    pub trailing: Vec<u8>,
}

impl WireFormat for NewTickPacket {
    fn write_to(&self, buf: &mut BytesMut) {
        write_i32(buf, self.tick_id);
        write_i32(buf, self.tick_time);
        write_list(buf, &self.statuses);
        buf.put_slice(&self.trailing);
    }

    fn read_from(buf: &mut BytesMut) -> Result<Self> {
        Ok(Self {
            tick_id: read_i32(buf)?,
            tick_time: read_i32(buf)?,
            statuses: read_list(buf)?,
            trailing: read_remaining(buf),
        })
    }
}

/// MOVE - client movement report
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MovePacket {
    pub tick_id: i32,
    pub time: i32,
    pub new_position: Location,
    pub records: Vec<LocationRecord>,
}

impl WireFormat for MovePacket {
    fn write_to(&self, buf: &mut BytesMut) {
        write_i32(buf, self.tick_id);
        write_i32(buf, self.time);
        self.new_position.write_to(buf);
        write_list(buf, &self.records);
    }

    fn read_from(buf: &mut BytesMut) -> Result<Self> {
        Ok(Self {
            tick_id: read_i32(buf)?,
            time: read_i32(buf)?,
            new_position: Location::read_from(buf)?,
            records: read_list(buf)?,
        })
    }
}

/// PLAYERSHOOT - client fired a projectile
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayerShootPacket {
    pub time: i32,
    pub bullet_id: u8,
    pub container_type: i16,
    /// Where the projectile starts, not where the player stands
    pub position: Location,
    /// Direction in radians
    pub angle: f32,
}

impl WireFormat for PlayerShootPacket {
    fn write_to(&self, buf: &mut BytesMut) {
        write_i32(buf, self.time);
        write_u8(buf, self.bullet_id);
        write_i16(buf, self.container_type);
        self.position.write_to(buf);
        write_f32(buf, self.angle);
    }

    fn read_from(buf: &mut BytesMut) -> Result<Self> {
        Ok(Self {
            time: read_i32(buf)?,
            bullet_id: read_u8(buf)?,
            container_type: read_i16(buf)?,
            position: Location::read_from(buf)?,
            angle: read_f32(buf)?,
        })
    }
}

/// TEXT - chat line shown to the client
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextPacket {
    pub name: String,
    pub object_id: i32,
    pub num_stars: i32,
    pub bubble_time: u8,
    pub recipient: String,
    pub text: String,
    pub clean_text: String,
    pub trailing: Vec<u8>,
}

impl WireFormat for TextPacket {
    fn write_to(&self, buf: &mut BytesMut) {
        write_string(buf, &self.name);
        write_i32(buf, self.object_id);
        write_i32(buf, self.num_stars);
        write_u8(buf, self.bubble_time);
        write_string(buf, &self.recipient);
        write_string(buf, &self.text);
        write_string(buf, &self.clean_text);
        buf.put_slice(&self.trailing);
    }

    fn read_from(buf: &mut BytesMut) -> Result<Self> {
        Ok(Self {
            name: read_string(buf)?,
            object_id: read_i32(buf)?,
            num_stars: read_i32(buf)?,
            bubble_time: read_u8(buf)?,
            recipient: read_string(buf)?,
            text: read_string(buf)?,
            clean_text: read_string(buf)?,
            trailing: read_remaining(buf),
        })
    }
}

/// PLAYERTEXT - chat line typed by the client
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayerTextPacket {
    pub text: String,
}

impl PlayerTextPacket {
    /// Split a `/command arg1 arg2` line into its lowercase name and arguments.
    ///
    /// Returns `None` for ordinary chat.
    pub fn as_command(&self) -> Option<(String, Vec<String>)> {
        let body = self.text.strip_prefix('/')?;
        let mut parts = body.split_whitespace();
        let name = parts.next()?.to_lowercase();
        Some((name, parts.map(str::to_string).collect()))
    }
}

impl WireFormat for PlayerTextPacket {
    fn write_to(&self, buf: &mut BytesMut) {
        write_string(buf, &self.text);
    }

    fn read_from(buf: &mut BytesMut) -> Result<Self> {
        Ok(Self { text: read_string(buf)? })
    }
}

/// NOTIFICATION - floating text above an object
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NotificationPacket {
    pub object_id: i32,
    pub message: String,
    pub color: i32,
}

impl WireFormat for NotificationPacket {
    fn write_to(&self, buf: &mut BytesMut) {
        write_i32(buf, self.object_id);
        write_string(buf, &self.message);
        write_i32(buf, self.color);
    }

    fn read_from(buf: &mut BytesMut) -> Result<Self> {
        Ok(Self {
            object_id: read_i32(buf)?,
            message: read_string(buf)?,
            color: read_i32(buf)?,
        })
    }
}

/// A decoded protocol message
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Failure(FailurePacket),
    Hello(HelloPacket),
    CreateSuccess(CreateSuccessPacket),
    Reconnect(ReconnectPacket),
    MapInfo(MapInfoPacket),
    Update(UpdatePacket),
    NewTick(NewTickPacket),
    Move(MovePacket),
    PlayerShoot(PlayerShootPacket),
    Text(TextPacket),
    PlayerText(PlayerTextPacket),
    Notification(NotificationPacket),
    /// A message this relay does not decode; forwarded byte-for-byte
    Unknown { id: u8, payload: Vec<u8> },
}

impl Packet {
    /// Decode a payload as the given packet type
    ///
    /// # Errors
    /// Fails if the payload is truncated, or if it is longer than the
    /// structure for a packet type without a trailing buffer.
    pub fn decode(packet_type: PacketType, mut payload: BytesMut) -> Result<Self> {
        let buf = &mut payload;
        let packet = match packet_type {
            PacketType::Failure => Packet::Failure(FailurePacket::read_from(buf)?),
            PacketType::Hello => Packet::Hello(HelloPacket::read_from(buf)?),
            PacketType::CreateSuccess => Packet::CreateSuccess(CreateSuccessPacket::read_from(buf)?),
            PacketType::Reconnect => Packet::Reconnect(ReconnectPacket::read_from(buf)?),
            PacketType::MapInfo => Packet::MapInfo(MapInfoPacket::read_from(buf)?),
            PacketType::Update => Packet::Update(UpdatePacket::read_from(buf)?),
            PacketType::NewTick => Packet::NewTick(NewTickPacket::read_from(buf)?),
            PacketType::Move => Packet::Move(MovePacket::read_from(buf)?),
            PacketType::PlayerShoot => Packet::PlayerShoot(PlayerShootPacket::read_from(buf)?),
            PacketType::Text => Packet::Text(TextPacket::read_from(buf)?),
            PacketType::PlayerText => Packet::PlayerText(PlayerTextPacket::read_from(buf)?),
            PacketType::Notification => Packet::Notification(NotificationPacket::read_from(buf)?),
        };

        if !payload.is_empty() {
            return Err(RelayError::InvalidData(format!(
                "{} packet has {} unexpected trailing bytes",
                packet_type,
                payload.len()
            )));
        }

        Ok(packet)
    }

    /// Write the payload (without frame header) into `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Packet::Failure(p) => p.write_to(buf),
            Packet::Hello(p) => p.write_to(buf),
            Packet::CreateSuccess(p) => p.write_to(buf),
            Packet::Reconnect(p) => p.write_to(buf),
            Packet::MapInfo(p) => p.write_to(buf),
            Packet::Update(p) => p.write_to(buf),
            Packet::NewTick(p) => p.write_to(buf),
            Packet::Move(p) => p.write_to(buf),
            Packet::PlayerShoot(p) => p.write_to(buf),
            Packet::Text(p) => p.write_to(buf),
            Packet::PlayerText(p) => p.write_to(buf),
            Packet::Notification(p) => p.write_to(buf),
            Packet::Unknown { payload, .. } => buf.put_slice(payload),
        }
    }

    /// Type discriminator, `None` for opaque packets
    pub fn packet_type(&self) -> Option<PacketType> {
        Some(match self {
            Packet::Failure(_) => PacketType::Failure,
            Packet::Hello(_) => PacketType::Hello,
            Packet::CreateSuccess(_) => PacketType::CreateSuccess,
            Packet::Reconnect(_) => PacketType::Reconnect,
            Packet::MapInfo(_) => PacketType::MapInfo,
            Packet::Update(_) => PacketType::Update,
            Packet::NewTick(_) => PacketType::NewTick,
            Packet::Move(_) => PacketType::Move,
            Packet::PlayerShoot(_) => PacketType::PlayerShoot,
            Packet::Text(_) => PacketType::Text,
            Packet::PlayerText(_) => PacketType::PlayerText,
            Packet::Notification(_) => PacketType::Notification,
            Packet::Unknown { .. } => return None,
        })
    }
}
