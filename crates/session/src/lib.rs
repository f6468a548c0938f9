//! # KRelay Session Layer
//!
//! Tracks logical players across the physical connections they make while
//! roaming between game servers.
//!
//! ## Modules
//!
//! - `state` - Per-player session state
//! - `player_data` - Facts derived from live traffic
//! - `table` - Registry of live sessions and the duplicate merge

pub mod player_data;
pub mod state;
pub mod table;

// Re-export commonly used types
pub use player_data::PlayerData;
pub use state::{ContextValue, State};
pub use table::{Resolution, SessionTable, StateRef};
