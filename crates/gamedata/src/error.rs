//! Game data errors

use krelay_core::RelayError;
use thiserror::Error;

/// Errors raised while loading or querying reference data
#[derive(Error, Debug)]
pub enum GameDataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid game data file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No record matches {0}")]
    NotFound(String),

    #[error("More than one record matches {0}")]
    Ambiguous(String),
}

pub type Result<T> = std::result::Result<T, GameDataError>;

impl From<GameDataError> for RelayError {
    fn from(err: GameDataError) -> Self {
        match err {
            GameDataError::Io(e) => RelayError::Io(e),
            GameDataError::Json(e) => RelayError::InvalidData(e.to_string()),
            GameDataError::NotFound(what) => RelayError::NotFound(what),
            GameDataError::Ambiguous(what) => RelayError::Ambiguous(what),
        }
    }
}
