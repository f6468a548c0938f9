//! World positions

use serde::{Deserialize, Serialize};

/// Position in world tile space, as carried on the wire (two `f32`s)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    pub x: f32,
    pub y: f32,
}

impl Location {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Step `distance` units from this position along `angle` (radians).
    /// A negative distance steps backwards.
    pub fn offset_along(self, angle: f32, distance: f32) -> Location {
        Location {
            x: self.x + distance * angle.cos(),
            y: self.y + distance * angle.sin(),
        }
    }

    /// Calculate distance to another position
    pub fn distance_to(self, other: Location) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}
