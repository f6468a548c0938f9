//! # Packet Builder
//!
//! Constructors for the packets the relay itself sends to a client.

use krelay_core::GameId;
use serde_json::json;
use super::packet_types::*;

/// Color of relay notifications (green)
pub const NOTIFICATION_COLOR: i32 = 0x00FF00;

/// Bubble time the client uses for server status replies
pub const SERVER_TEXT_BUBBLE_TIME: u8 = 184;

/// Build a floating notification above `object_id`
///
/// # Packet Format
/// The message is wrapped in the client's string-table envelope:
/// ```text
/// {"key":"blank","tokens":{"data":"<message>"}}
/// ```
pub fn notification(object_id: i32, message: &str) -> Packet {
    let envelope = json!({
        "key": "blank",
        "tokens": { "data": message },
    });

    Packet::Notification(NotificationPacket {
        object_id,
        message: envelope.to_string(),
        color: NOTIFICATION_COLOR,
    })
}

/// Build a chat line that appears to come from the game's announcer
///
/// # Arguments
/// * `sender` - Shown after the `#` prefix
/// * `message` - Chat text
pub fn oryx_notification(sender: &str, message: &str) -> Packet {
    Packet::Text(TextPacket {
        name: format!("#{}", sender),
        object_id: -1,
        num_stars: -1,
        bubble_time: 0,
        recipient: String::new(),
        text: message.to_string(),
        clean_text: String::new(),
        trailing: Vec::new(),
    })
}

/// Build the anonymous status line used to answer a server query
pub fn server_text(text: &str) -> Packet {
    Packet::Text(TextPacket {
        name: String::new(),
        object_id: -1,
        num_stars: -1,
        bubble_time: SERVER_TEXT_BUBBLE_TIME,
        recipient: String::new(),
        text: text.to_string(),
        clean_text: String::new(),
        trailing: Vec::new(),
    })
}

/// Build a redirect into the hub of another server
///
/// Carries no key, so the target server issues a fresh session.
pub fn nexus_redirect(host: &str, port: i32) -> ReconnectPacket {
    ReconnectPacket {
        name: "Nexus".to_string(),
        host: host.to_string(),
        stats: String::new(),
        port,
        game_id: GameId::NEXUS,
        key_time: 0,
        is_from_arena: false,
        key: Vec::new(),
    }
}
