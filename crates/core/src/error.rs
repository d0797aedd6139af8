//! Error type for the trip-detection core.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DrivelogError>;

#[derive(Debug, Error)]
pub enum DrivelogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("event store is closed")]
    DatabaseClosed,

    #[error("lock poisoned: {0}")]
    Lock(String),

    #[error("invalid format: {0}")]
    InvalidFormat(String),
}

impl From<serde_json::Error> for DrivelogError {
    fn from(e: serde_json::Error) -> Self {
        DrivelogError::Serialization(e.to_string())
    }
}
