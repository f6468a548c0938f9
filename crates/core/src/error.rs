//! Core error types for KRelay

#[derive(thiserror::Error, Debug)]
pub enum RelayError {
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// A redirect destination could not be resolved to an address
    #[error("Unable to resolve host {host}: {reason}")]
    Resolve { host: String, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    /// A lookup matched more than one record
    #[error("Ambiguous lookup: {0}")]
    Ambiguous(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The connection has not completed its handshake yet
    #[error("Connection {0} has no session")]
    NoSession(u64),

    #[error("Peer disconnected: {0}")]
    Disconnected(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;
