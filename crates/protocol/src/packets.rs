//! # Packet Type Definitions
//!
//! The message kinds this relay decodes. Everything else travels through the
//! relay as an opaque [`Packet::Unknown`](crate::Packet::Unknown).
//!
//! ## Direction
//!
//! - **Client-to-Server**: `Hello`, `Move`, `PlayerShoot`, `PlayerText`
//! - **Server-to-Client**: `Failure`, `CreateSuccess`, `Reconnect`, `MapInfo`,
//!   `Update`, `NewTick`, `Text`, `Notification`
//!
//! ## Numeric IDs
//!
//! Packet IDs change between game builds, so they are not part of this enum.
//! The id table lives in the game data catalog and is loaded at startup.

use std::fmt;

/// Packet type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PacketType {
    //=== Connection lifecycle ===//

    /// Server reports a fatal error to the client
    ///
    /// # Packet Format
    /// ```text
    /// {i32 error_id}{string message}
    /// ```
    Failure,

    /// Client's initial handshake
    ///
    /// # Packet Format
    /// ```text
    /// {string build_version}{i32 game_id}{string guid}{i32 random1}
    /// {string password}{i32 random2}{string secret}{i32 key_time}
    /// {bytes key}{string32 map_json}{...}
    /// ```
    Hello,

    /// Server confirms the player object was spawned
    ///
    /// # Packet Format
    /// ```text
    /// {i32 object_id}{i32 char_id}
    /// ```
    CreateSuccess,

    /// Server tells the client to connect somewhere else
    ///
    /// # Packet Format
    /// ```text
    /// {string name}{string host}{string stats}{i32 port}{i32 game_id}
    /// {i32 key_time}{bool is_from_arena}{bytes key}
    /// ```
    Reconnect,

    //=== World ===//

    /// Description of the map the client just entered
    MapInfo,

    /// New tiles, new objects and removed objects
    Update,

    /// Per-tick status changes of known objects
    NewTick,

    //=== Player actions ===//

    /// Client reports its own movement
    Move,

    /// Client fires a projectile
    ///
    /// # Packet Format
    /// ```text
    /// {i32 time}{u8 bullet_id}{i16 container_type}{f32 x}{f32 y}{f32 angle}
    /// ```
    PlayerShoot,

    //=== Chat ===//

    /// Chat line shown to the client
    Text,

    /// Chat line typed by the client (also carries `/commands`)
    PlayerText,

    /// Floating notification above an object
    Notification,
}

impl PacketType {
    /// Every decoded packet type
    pub const ALL: [PacketType; 12] = [
        PacketType::Failure,
        PacketType::Hello,
        PacketType::CreateSuccess,
        PacketType::Reconnect,
        PacketType::MapInfo,
        PacketType::Update,
        PacketType::NewTick,
        PacketType::Move,
        PacketType::PlayerShoot,
        PacketType::Text,
        PacketType::PlayerText,
        PacketType::Notification,
    ];

    /// Protocol name of the packet type (as used in packet definition files)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Failure => "FAILURE",
            Self::Hello => "HELLO",
            Self::CreateSuccess => "CREATE_SUCCESS",
            Self::Reconnect => "RECONNECT",
            Self::MapInfo => "MAPINFO",
            Self::Update => "UPDATE",
            Self::NewTick => "NEWTICK",
            Self::Move => "MOVE",
            Self::PlayerShoot => "PLAYERSHOOT",
            Self::Text => "TEXT",
            Self::PlayerText => "PLAYERTEXT",
            Self::Notification => "NOTIFICATION",
        }
    }

    /// Look up a packet type by its protocol name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_lookup() {
        assert_eq!(PacketType::from_name("RECONNECT"), Some(PacketType::Reconnect));
        assert_eq!(PacketType::from_name("newtick"), Some(PacketType::NewTick));
        assert_eq!(PacketType::from_name("SHOOTACK"), None);
    }

    #[test]
    fn test_names_are_unique() {
        for (i, a) in PacketType::ALL.iter().enumerate() {
            for b in &PacketType::ALL[i + 1..] {
                assert_ne!(a.as_str(), b.as_str());
            }
        }
    }
}
