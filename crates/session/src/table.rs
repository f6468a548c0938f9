//! # Session Table
//!
//! Process-wide registry of session states.
//!
//! # Locking
//! One mutex guards the whole table. A state mutex is only ever taken
//! after the table mutex or on its own, never before it, and no operation
//! holds two state mutexes at once. Everything a merge touches happens
//! under a single table lock, so other connections never see it half done.

use crate::state::State;
use krelay_core::{ConnectionId, GameId, SessionId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Shared handle to a state
pub type StateRef = Arc<Mutex<State>>;

/// Outcome of [`SessionTable::resolve_identity`]
#[derive(Debug)]
pub enum Resolution {
    /// The state already carried an account id; nothing changed
    AlreadyResolved,
    /// First sighting of the account; it was recorded on the state
    Resolved,
    /// The account already had a state; the duplicate was folded into it
    Merged {
        /// State the connection must switch to
        into: StateRef,
        /// Every session removed from the table by the merge
        removed: Vec<SessionId>,
    },
}

/// Registry mapping session ids to states
#[derive(Default)]
pub struct SessionTable {
    states: Mutex<HashMap<SessionId, StateRef>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a state with a fresh id
    pub fn create(&self, upstream_address: &str, upstream_port: u16) -> StateRef {
        let mut states = self.states.lock();

        let mut id = SessionId::generate();
        while states.contains_key(&id) {
            id = SessionId::generate();
        }

        debug!("Creating session {} -> {}:{}", id, upstream_address, upstream_port);
        let state = Arc::new(Mutex::new(State::new(id.clone(), upstream_address, upstream_port)));
        states.insert(id, state.clone());
        state
    }

    pub fn get(&self, id: &SessionId) -> Option<StateRef> {
        self.states.lock().get(id).cloned()
    }

    pub fn remove(&self, id: &SessionId) -> Option<StateRef> {
        let removed = self.states.lock().remove(id);
        if removed.is_some() {
            debug!("Removed session {}", id);
        }
        removed
    }

    /// Hand an existing state to a new connection
    ///
    /// Returns `None` if no state has this id.
    pub fn adopt(&self, id: &SessionId, connection: ConnectionId) -> Option<StateRef> {
        let states = self.states.lock();
        let state = states.get(id)?.clone();
        {
            let mut s = state.lock();
            if let Some(previous) = s.owner.replace(connection) {
                if previous != connection {
                    debug!("Session {} moves from connection {} to {}", id, previous, connection);
                }
            }
            s.end_handoff();
        }
        Some(state)
    }

    /// Drop a state on behalf of a closing connection
    ///
    /// The state is only removed while `connection` still owns it and no
    /// handoff is in flight. Returns whether it was removed.
    pub fn remove_owned(&self, id: &SessionId, connection: ConnectionId) -> bool {
        let mut states = self.states.lock();
        let removable = states.get(id).is_some_and(|state| {
            let s = state.lock();
            s.owner == Some(connection) && !s.awaiting_handoff()
        });
        if removable {
            states.remove(id);
            debug!("Connection {} closed, removed session {}", connection, id);
        }
        removable
    }

    /// Remove states whose client never followed its redirect
    ///
    /// `is_live` reports whether a connection is still open; a state whose
    /// owner is live is kept regardless of its handoff age.
    pub fn sweep_expired_handoffs(&self, timeout: Duration, is_live: impl Fn(ConnectionId) -> bool) -> usize {
        let mut states = self.states.lock();
        let before = states.len();
        states.retain(|id, state| {
            let s = state.lock();
            let expired = s.handoff_expired(timeout) && !s.owner.is_some_and(|owner| is_live(owner));
            if expired {
                debug!("Handoff of session {} expired", id);
            }
            !expired
        });
        before - states.len()
    }

    pub fn len(&self) -> usize {
        self.states.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.lock().is_empty()
    }

    /// Handles to every live state
    pub fn snapshot(&self) -> Vec<StateRef> {
        self.states.lock().values().cloned().collect()
    }

    pub fn find_by_account(&self, account_id: &str) -> Option<StateRef> {
        let states = self.states.lock();
        find_account(&states, account_id, None)
    }

    /// States whose next upstream connection goes to `address`
    pub fn states_targeting(&self, address: &str) -> Vec<StateRef> {
        self.states
            .lock()
            .values()
            .filter(|s| s.lock().upstream_address == address)
            .cloned()
            .collect()
    }

    /// Attach an account identity to `current`, merging duplicates
    ///
    /// # Behavior
    /// 1. If `current` is already resolved, nothing happens.
    /// 2. If no other state carries `account_id`, it is recorded on `current`.
    /// 3. Otherwise `current` is a duplicate of that resolved state:
    ///    - its context is copied over, its values winning on collision,
    ///    - its player data and connection ownership move over,
    ///    - a random-realm placeholder (a state whose last handshake asked
    ///      for [`GameId::RANDOM_REALM`], which recorded a realm redirect and
    ///      is not held by another live connection) hands its realm to the
    ///      resolved state and is removed,
    ///    - failing that, a duplicate whose handshake asked for the hub
    ///      sends the resolved state back to the default backend,
    ///    - the duplicate is removed from the table.
    pub fn resolve_identity(
        &self,
        current: &StateRef,
        account_id: &str,
        default_address: &str,
        default_port: u16,
        is_live: impl Fn(ConnectionId) -> bool,
    ) -> Resolution {
        let mut states = self.states.lock();

        let (duplicate_id, duplicate_game_id) = {
            let state = current.lock();
            if state.is_resolved() {
                return Resolution::AlreadyResolved;
            }
            (state.id().clone(), state.last_hello.as_ref().map(|h| h.game_id))
        };

        let Some(resolved) = find_account(&states, account_id, Some(current)) else {
            current.lock().account_id = Some(account_id.to_string());
            info!("Session {} resolved to account {}", duplicate_id, account_id);
            return Resolution::Resolved;
        };

        let (context, player_data, owner, handoff_since) = {
            let duplicate = current.lock();
            (
                duplicate.context(),
                duplicate.player_data.clone(),
                duplicate.owner,
                duplicate.handoff_since(),
            )
        };

        let placeholder = states.iter().find_map(|(id, state)| {
            if Arc::ptr_eq(state, &resolved) {
                return None;
            }
            let state = state.lock();
            if state.owner.is_some_and(|o| Some(o) != owner && is_live(o)) {
                return None;
            }
            let asked_random = state
                .last_hello
                .as_ref()
                .is_some_and(|h| h.game_id == GameId::RANDOM_REALM);
            match (&state.last_realm, asked_random) {
                (Some(realm), true) => Some((id.clone(), realm.clone())),
                _ => None,
            }
        });

        let mut removed = Vec::new();
        {
            let mut target = resolved.lock();
            target.extend_context(context);
            target.player_data = player_data;
            target.owner = owner;
            target.set_handoff_since(handoff_since);

            if let Some((_, realm)) = &placeholder {
                target.upstream_address = realm.host.clone();
                if let Ok(port) = u16::try_from(realm.port) {
                    target.upstream_port = port;
                }
                target.last_realm = Some(realm.clone());
            } else if duplicate_game_id == Some(GameId::NEXUS) {
                target.set_upstream(default_address, default_port);
            }

            info!(
                "Merged session {} into {} (account {})",
                duplicate_id,
                target.id(),
                account_id
            );
        }

        if let Some((placeholder_id, _)) = placeholder {
            states.remove(&placeholder_id);
            removed.push(placeholder_id);
        }
        if states.remove(&duplicate_id).is_some() {
            removed.push(duplicate_id);
        }

        Resolution::Merged { into: resolved, removed }
    }
}

fn find_account(
    states: &HashMap<SessionId, StateRef>,
    account_id: &str,
    exclude: Option<&StateRef>,
) -> Option<StateRef> {
    states
        .values()
        .filter(|s| exclude.map_or(true, |e| !Arc::ptr_eq(s, e)))
        .find(|s| s.lock().account_id.as_deref() == Some(account_id))
        .cloned()
}
