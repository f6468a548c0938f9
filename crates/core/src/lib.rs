//! KRelay Core - Fundamental types and utilities shared by every relay crate

mod error;
mod types;
mod positions;

pub use error::*;
pub use types::*;
pub use positions::*;
