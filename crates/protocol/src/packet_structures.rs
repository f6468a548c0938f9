//! # Shared Data Objects
//!
//! Structures embedded inside several packets (tiles, object statuses, stats).

use bytes::BytesMut;
use krelay_core::{Location, Result};
use super::codecs::*;

/// Stat type carrying the object's display name
pub const STAT_NAME: u8 = 31;
/// Stat type carrying the owning account id of a player object
pub const STAT_ACCOUNT_ID: u8 = 38;
pub const STAT_OWNER_ACCOUNT_ID: u8 = 54;
pub const STAT_GUILD_NAME: u8 = 62;
pub const STAT_PET_NAME: u8 = 82;
pub const STAT_GRAVE_ACCOUNT_ID: u8 = 115;

/// Whether a stat type is encoded as a string rather than an `i32`
pub fn is_string_stat(stat_type: u8) -> bool {
    matches!(
        stat_type,
        STAT_NAME
            | STAT_ACCOUNT_ID
            | STAT_OWNER_ACCOUNT_ID
            | STAT_GUILD_NAME
            | STAT_PET_NAME
            | STAT_GRAVE_ACCOUNT_ID
    )
}

/// Value of a single stat
#[derive(Debug, Clone, PartialEq)]
pub enum StatValue {
    Int(i32),
    Str(String),
}

/// One stat entry of an object status
#[derive(Debug, Clone, PartialEq)]
pub struct StatData {
    pub stat_type: u8,
    pub value: StatValue,
}

impl StatData {
    pub fn int(stat_type: u8, value: i32) -> Self {
        Self { stat_type, value: StatValue::Int(value) }
    }

    pub fn string(stat_type: u8, value: impl Into<String>) -> Self {
        Self { stat_type, value: StatValue::Str(value.into()) }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            StatValue::Str(s) => Some(s),
            StatValue::Int(_) => None,
        }
    }
}

impl WireFormat for StatData {
    fn write_to(&self, buf: &mut BytesMut) {
        write_u8(buf, self.stat_type);
        match &self.value {
            StatValue::Str(s) => write_string(buf, s),
            StatValue::Int(v) => write_i32(buf, *v),
        }
    }

    fn read_from(buf: &mut BytesMut) -> Result<Self> {
        let stat_type = read_u8(buf)?;
        let value = if is_string_stat(stat_type) {
            StatValue::Str(read_string(buf)?)
        } else {
            StatValue::Int(read_i32(buf)?)
        };
        Ok(Self { stat_type, value })
    }
}

/// Position and changed stats of one object
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectStatus {
    pub object_id: i32,
    pub position: Location,
    pub stats: Vec<StatData>,
}

impl ObjectStatus {
    /// First string value of the given stat type, if present
    pub fn string_stat(&self, stat_type: u8) -> Option<&str> {
        self.stats
            .iter()
            .filter(|s| s.stat_type == stat_type)
            .find_map(|s| s.as_str())
    }
}

impl WireFormat for ObjectStatus {
    fn write_to(&self, buf: &mut BytesMut) {
        write_i32(buf, self.object_id);
        self.position.write_to(buf);
        write_list(buf, &self.stats);
    }

    fn read_from(buf: &mut BytesMut) -> Result<Self> {
        Ok(Self {
            object_id: read_i32(buf)?,
            position: Location::read_from(buf)?,
            stats: read_list(buf)?,
        })
    }
}

/// Object entering the client's view
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub object_type: u16,
    pub status: ObjectStatus,
}

impl WireFormat for Entity {
    fn write_to(&self, buf: &mut BytesMut) {
        write_u16(buf, self.object_type);
        self.status.write_to(buf);
    }

    fn read_from(buf: &mut BytesMut) -> Result<Self> {
        Ok(Self {
            object_type: read_u16(buf)?,
            status: ObjectStatus::read_from(buf)?,
        })
    }
}

/// A map tile
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tile {
    pub x: i16,
    pub y: i16,
    pub tile_type: u16,
}

impl WireFormat for Tile {
    fn write_to(&self, buf: &mut BytesMut) {
        write_i16(buf, self.x);
        write_i16(buf, self.y);
        write_u16(buf, self.tile_type);
    }

    fn read_from(buf: &mut BytesMut) -> Result<Self> {
        Ok(Self {
            x: read_i16(buf)?,
            y: read_i16(buf)?,
            tile_type: read_u16(buf)?,
        })
    }
}

/// Intermediate position reported inside a move packet
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationRecord {
    pub time: i32,
    pub position: Location,
}

impl WireFormat for LocationRecord {
    fn write_to(&self, buf: &mut BytesMut) {
        write_i32(buf, self.time);
        self.position.write_to(buf);
    }

    fn read_from(buf: &mut BytesMut) -> Result<Self> {
        Ok(Self {
            time: read_i32(buf)?,
            position: Location::read_from(buf)?,
        })
    }
}
