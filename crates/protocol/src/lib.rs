//! # KRelay Protocol Library
//!
//! Wire format of the game protocol as seen by the relay.
//!
//! ## Layers
//!
//! ### 1. Codecs ([`codecs`])
//! Big-endian primitives and length-prefixed strings/byte arrays, plus the
//! [`WireFormat`] trait shared by every structure.
//!
//! ### 2. Frames ([`frame`])
//! A `tokio_util` codec that splits the stream into `{length}{id}{payload}`
//! frames.
//!
//! ### 3. Packet Types ([`packets`])
//! The message kinds the relay decodes. Numeric ids come from the game data
//! catalog, not from this crate.
//!
//! ### 4. Packet Structures ([`packet_types`], [`packet_structures`])
//! Typed packets and the [`Packet`] tagged union. Anything not listed travels
//! as [`Packet::Unknown`].
//!
//! ### 5. Builders ([`packet_builder`])
//! Notifications and synthetic redirects sent by the relay itself.
//!
//! ## Usage Example
//!
//! ```rust
//! use krelay_protocol::{Packet, PacketType, nexus_redirect};
//! use bytes::BytesMut;
//!
//! let packet = Packet::Reconnect(nexus_redirect("54.1.2.3", 2050));
//! let mut buf = BytesMut::new();
//! packet.encode(&mut buf);
//!
//! let decoded = Packet::decode(PacketType::Reconnect, buf).unwrap();
//! assert_eq!(decoded, packet);
//! ```

pub mod codecs;
pub mod frame;
pub mod packets;
pub mod packet_types;
pub mod packet_structures;
pub mod packet_builder;

// Re-export commonly used items
pub use codecs::WireFormat;
pub use frame::*;
pub use packets::*;
pub use packet_types::*;
pub use packet_structures::*;
pub use packet_builder::*;
