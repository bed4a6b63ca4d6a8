//! Error types for Steer

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already processed: {0}")]
    AlreadyProcessed(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Upstream unavailable: {0}")]
    Upstream(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl Error {
    /// Whether the caller may safely retry the operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Upstream(_) | Error::Pool(_) | Error::Http(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
