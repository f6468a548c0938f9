//! # Player Data
//!
//! Facts about the player derived from live traffic. Rebuilt whenever the
//! player spawns and never persisted.

use krelay_core::Location;
use krelay_protocol::{
    MapInfoPacket, MovePacket, NewTickPacket, ObjectStatus, PlayerShootPacket, UpdatePacket,
    STAT_ACCOUNT_ID, STAT_NAME,
};
use std::time::Instant;

/// Derived per-player facts
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerData {
    /// Object id of the player's character, `-1` before it spawned
    pub object_id: i32,
    pub position: Location,
    /// When the client last reported movement
    pub last_update: Option<Instant>,
    /// Protocol time of the last movement report
    pub previous_time: i32,
    pub account_id: Option<String>,
    pub name: Option<String>,
    /// Name of the map the player spawned in
    pub map_name: Option<String>,
}

impl Default for PlayerData {
    fn default() -> Self {
        Self {
            object_id: -1,
            position: Location::default(),
            last_update: None,
            previous_time: 0,
            account_id: None,
            name: None,
            map_name: None,
        }
    }
}

impl PlayerData {
    /// Fresh data for a newly spawned character
    ///
    /// # Arguments
    /// * `object_id` - Object id from the spawn confirmation
    /// * `map_info` - Last map entered, if one was seen
    pub fn new(object_id: i32, map_info: Option<&MapInfoPacket>) -> Self {
        Self {
            object_id,
            map_name: map_info.map(|m| m.name.clone()),
            ..Self::default()
        }
    }

    /// Apply the statuses of the player's own object from an update
    pub fn parse_update(&mut self, update: &UpdatePacket) {
        for entity in &update.new_objects {
            self.apply_status(&entity.status);
        }
    }

    /// Apply the statuses of the player's own object from a tick
    pub fn parse_new_tick(&mut self, tick: &NewTickPacket) {
        for status in &tick.statuses {
            self.apply_status(status);
        }
    }

    pub fn record_move(&mut self, movement: &MovePacket) {
        self.previous_time = movement.time;
        self.last_update = Some(Instant::now());
        self.position = movement.new_position;
    }

    /// Approximate the shooter's position from a shot
    ///
    /// Projectiles start `offset` units in front of the player along the
    /// shot angle.
    pub fn record_shot(&mut self, shot: &PlayerShootPacket, offset: f32) {
        self.position = shot.position.offset_along(shot.angle, -offset);
    }

    fn apply_status(&mut self, status: &ObjectStatus) {
        if status.object_id != self.object_id {
            return;
        }

        self.position = status.position;
        if let Some(account_id) = status.string_stat(STAT_ACCOUNT_ID) {
            self.account_id = Some(account_id.to_string());
        }
        if let Some(name) = status.string_stat(STAT_NAME) {
            self.name = Some(name.to_string());
        }
    }
}
