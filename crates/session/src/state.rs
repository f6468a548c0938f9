//! # Session State
//!
//! The relay-side record of one logical player. Survives server transitions:
//! each new physical connection that presents the session id as its key
//! adopts the same state.

use crate::player_data::PlayerData;
use krelay_core::{ConnectionId, SessionId};
use krelay_protocol::{HelloPacket, ReconnectPacket};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A value stored in a state's context
pub type ContextValue = Arc<dyn Any + Send + Sync>;

/// Per-player session state
///
/// # Ownership
/// `owner` names the connection currently driving this state. Only that
/// connection may drop the state when it closes, and only while no
/// redirect handoff is in flight.
pub struct State {
    id: SessionId,

    /// Account identity, set once confirmed from an update
    pub account_id: Option<String>,

    /// Arbitrary values keyed by name (e.g. the last map info)
    context: HashMap<String, ContextValue>,

    /// Last redirect into a realm (hub portal)
    pub last_realm: Option<ReconnectPacket>,
    /// Last redirect into a dungeon
    pub last_dungeon: Option<ReconnectPacket>,
    /// Most recent handshake seen for this state
    pub last_hello: Option<HelloPacket>,

    /// Backend used the next time this session connects upstream
    pub upstream_address: String,
    pub upstream_port: u16,

    /// Key issued by the backend for the next handshake; never sent to the client
    pending_real_key: Vec<u8>,

    pub player_data: PlayerData,

    pub owner: Option<ConnectionId>,
    /// When a rewritten redirect was sent to a client that has not reconnected yet
    handoff_since: Option<Instant>,
}

impl State {
    pub fn new(id: SessionId, upstream_address: impl Into<String>, upstream_port: u16) -> Self {
        Self {
            id,
            account_id: None,
            context: HashMap::new(),
            last_realm: None,
            last_dungeon: None,
            last_hello: None,
            upstream_address: upstream_address.into(),
            upstream_port,
            pending_real_key: Vec::new(),
            player_data: PlayerData::default(),
            owner: None,
            handoff_since: None,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Whether the account behind this state is known
    pub fn is_resolved(&self) -> bool {
        self.account_id.is_some()
    }

    /// Typed context lookup; `None` if missing or of another type
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.context.get(key).cloned()?.downcast::<T>().ok()
    }

    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.context.insert(key.into(), Arc::new(value));
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.context.contains_key(key)
    }

    /// Copy of every context entry (values are shared, not deep-copied)
    pub fn context(&self) -> HashMap<String, ContextValue> {
        self.context.clone()
    }

    /// Insert entries, replacing existing values on key collision
    pub fn extend_context(&mut self, entries: HashMap<String, ContextValue>) {
        self.context.extend(entries);
    }

    pub fn context_len(&self) -> usize {
        self.context.len()
    }

    pub fn set_pending_real_key(&mut self, key: Vec<u8>) {
        self.pending_real_key = key;
    }

    pub fn pending_real_key(&self) -> &[u8] {
        &self.pending_real_key
    }

    /// Consume the pending key, leaving it empty
    pub fn take_pending_real_key(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending_real_key)
    }

    /// Mark that the client was told to reconnect through the relay
    pub fn begin_handoff(&mut self) {
        self.handoff_since = Some(Instant::now());
    }

    /// The client came back with a handshake
    pub fn end_handoff(&mut self) {
        self.handoff_since = None;
    }

    pub fn awaiting_handoff(&self) -> bool {
        self.handoff_since.is_some()
    }

    /// Whether a handoff has been pending for longer than `timeout`
    pub fn handoff_expired(&self, timeout: Duration) -> bool {
        self.handoff_since.is_some_and(|since| since.elapsed() > timeout)
    }

    pub(crate) fn handoff_since(&self) -> Option<Instant> {
        self.handoff_since
    }

    pub(crate) fn set_handoff_since(&mut self, since: Option<Instant>) {
        self.handoff_since = since;
    }

    /// Point the next upstream connection at `address:port`
    pub fn set_upstream(&mut self, address: impl Into<String>, port: u16) {
        self.upstream_address = address.into();
        self.upstream_port = port;
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("id", &self.id)
            .field("account_id", &self.account_id)
            .field("context_keys", &self.context.keys().collect::<Vec<_>>())
            .field("upstream", &format_args!("{}:{}", self.upstream_address, self.upstream_port))
            .field("owner", &self.owner)
            .field("awaiting_handoff", &self.awaiting_handoff())
            .finish_non_exhaustive()
    }
}
