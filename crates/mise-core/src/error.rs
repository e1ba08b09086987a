//! Error types for Mise.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the error means a backing store or service could not be reached,
    /// as opposed to a problem with the request itself.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Error::Storage(_) | Error::Database(_) | Error::Io(_) | Error::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
