//! Error types for briefcase-core

use thiserror::Error;

/// Result type alias using briefcase-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in briefcase-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Record already exists
    #[error("Already exists: {0}")]
    Duplicate(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid configuration, raised before any network activity
    #[error("Configuration error: {0}")]
    Config(String),

    /// Document is not well-formed markup
    #[error("Malformed document: {0}")]
    Malformed(String),

    /// HTTP transport failure (connection error or unexpected status)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Blob storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Run was cancelled between two resource operations
    #[error("Sync run cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

impl From<quick_xml::Error> for Error {
    fn from(error: quick_xml::Error) -> Self {
        Self::Malformed(error.to_string())
    }
}
