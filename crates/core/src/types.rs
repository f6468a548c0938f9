//! Core type definitions

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one logical player session.
///
/// Stable across server transitions: the client receives its UTF-8 bytes as
/// the key of every rewritten redirect and presents them again in its next
/// handshake.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Length of a generated identifier (hex characters)
    pub const LEN: usize = 32;

    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        let bytes: [u8; Self::LEN / 2] = rand::thread_rng().gen();
        let mut id = String::with_capacity(Self::LEN);
        for b in bytes {
            id.push_str(&format!("{:02x}", b));
        }
        Self(id)
    }

    /// Interpret a handshake key as a session identifier.
    ///
    /// Returns `None` for empty or non-UTF-8 keys.
    pub fn from_key(key: &[u8]) -> Option<Self> {
        if key.is_empty() {
            return None;
        }
        std::str::from_utf8(key).ok().map(|s| Self(s.to_string()))
    }

    /// Whether `key` has the shape of an identifier this relay generates
    ///
    /// Holds even when the session it named is gone, so a stale relay key
    /// can still be kept away from game servers.
    pub fn is_relay_issued(key: &[u8]) -> bool {
        key.len() == Self::LEN && key.iter().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key bytes handed to the client
    pub fn to_key(&self) -> Vec<u8> {
        self.0.as_bytes().to_vec()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Physical connection ID (one per accepted client socket)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ConnectionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Well-known area identifiers carried by handshakes and redirects
pub struct GameId;

impl GameId {
    /// The hub ("nexus"); also the "use default server" marker in a handshake
    pub const NEXUS: i32 = -2;
    /// Outcome of a random realm selection
    pub const RANDOM_REALM: i32 = -3;
    /// Player vault
    pub const VAULT: i32 = -5;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_distinct_hex() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), SessionId::LEN);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_key_roundtrip() {
        let id = SessionId::generate();
        assert_eq!(SessionId::from_key(&id.to_key()), Some(id));
        assert_eq!(SessionId::from_key(&[]), None);
        assert_eq!(SessionId::from_key(&[0xff, 0xfe]), None);
    }

    #[test]
    fn test_relay_issued_keys() {
        assert!(SessionId::is_relay_issued(&SessionId::generate().to_key()));
        assert!(!SessionId::is_relay_issued(b""));
        assert!(!SessionId::is_relay_issued(b"real-key"));
        assert!(!SessionId::is_relay_issued(b"63D50BB8504F94C88C2AFC2C06E51B4C"));
        assert!(!SessionId::is_relay_issued(b"63d50bb8504f94c88c2afc2c06e51b4"));
    }
}
